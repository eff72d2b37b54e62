//! In-process relay implementing the server side of the collaboration
//! channel.
//!
//! The hub keeps one room per page, answers joins with the current member
//! list, announces joins and leaves, and relays block broadcasts to the other
//! members of the room with a per-page version. Each connection has a single
//! ordered queue, so frames from one sender arrive in the order sent.

use async_trait::async_trait;
use futures_util::{sink, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{
    BlocksUpdated, ClientEvent, HistoryNavigated, SettingsUpdated, ServerEvent, SyncProtocol,
    TitleUpdated, UserPresence,
};
use super::transport::{FrameSink, FrameStream, Transport};
use super::{ChannelError, ChannelResult, ConnectionId};
use crate::document::{PageId, UserSummary};

struct Connection {
    user: UserSummary,
    tx: mpsc::UnboundedSender<String>,
    page: Option<PageId>,
}

#[derive(Default)]
struct Room {
    /// Member connections in join order
    members: Vec<ConnectionId>,
    version: u64,
}

#[derive(Default)]
struct HubState {
    /// Accepted credentials
    users: HashMap<String, UserSummary>,
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<PageId, Room>,
}

/// In-process collaboration server
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as a credential for `user`
    pub fn register_user(&self, token: impl Into<String>, user: UserSummary) {
        self.state.lock().users.insert(token.into(), user);
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// User ids currently in a page's room, in join order
    pub fn members(&self, page_id: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .rooms
            .get(page_id)
            .map(|room| {
                room.members
                    .iter()
                    .filter_map(|id| state.connections.get(id))
                    .map(|c| c.user.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Latest relayed block version for a page
    pub fn version(&self, page_id: &str) -> u64 {
        self.state
            .lock()
            .rooms
            .get(page_id)
            .map(|room| room.version)
            .unwrap_or(0)
    }

    /// Drop every connection, as if the server went away
    pub fn disconnect_all(&self) {
        let ids: Vec<ConnectionId> = self.state.lock().connections.keys().cloned().collect();
        for id in ids {
            self.disconnect(&id);
        }
        info!("Loopback hub dropped all connections");
    }

    fn connect(&self, user: UserSummary, tx: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = Uuid::new_v4().to_string();
        debug!("Loopback connection {} for {}", id, user.id);
        self.state.lock().connections.insert(
            id.clone(),
            Connection {
                user,
                tx,
                page: None,
            },
        );
        id
    }

    fn disconnect(&self, connection_id: &str) {
        let mut state = self.state.lock();
        leave_room(&mut state, connection_id);
        state.connections.remove(connection_id);
    }

    fn handle_frame(&self, connection_id: &str, frame: &str) {
        let mut state = self.state.lock();

        let event = match SyncProtocol::decode_client(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Loopback rejected frame from {}: {}", connection_id, e);
                send_to(&state, connection_id, &ServerEvent::error(e.to_string()));
                return;
            }
        };

        let (user, page) = match state.connections.get(connection_id) {
            Some(conn) => (conn.user.clone(), conn.page.clone()),
            None => return,
        };

        if let ClientEvent::JoinPage(page_id) = &event {
            join_room(&mut state, connection_id, page_id, &user);
            return;
        }
        if matches!(event, ClientEvent::LeavePage) {
            leave_room(&mut state, connection_id);
            return;
        }

        let page_id = match page {
            Some(page_id) => page_id,
            None => {
                send_to(&state, connection_id, &ServerEvent::error("Not in a page"));
                return;
            }
        };
        if event.page_id().map(|p| p != page_id).unwrap_or(false) {
            send_to(&state, connection_id, &ServerEvent::error("Page mismatch"));
            return;
        }

        let relay = match event {
            ClientEvent::UpdateBlocks(update) => {
                let room = state.rooms.entry(page_id.clone()).or_default();
                room.version += 1;
                ServerEvent::BlocksUpdated(BlocksUpdated {
                    page_id: Some(page_id.clone()),
                    blocks: update.blocks,
                    version: room.version,
                    updated_by: user,
                    change_type: update.change_type,
                    block_id: update.block_id,
                    timestamp: chrono::Utc::now()
                        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                })
            }
            ClientEvent::CursorMove(cursor) => ServerEvent::UserCursor(UserPresence {
                position: Some(cursor.position),
                block_id: cursor.block_id,
                ..UserPresence::new(user)
            }),
            ClientEvent::BlockSelect(selected) => ServerEvent::BlockSelected(UserPresence {
                block_id: Some(selected.block_id),
                ..UserPresence::new(user)
            }),
            ClientEvent::TypingStart(block) => ServerEvent::UserTyping(UserPresence {
                block_id: Some(block.block_id),
                is_typing: Some(true),
                ..UserPresence::new(user)
            }),
            ClientEvent::TypingStop(block) => ServerEvent::UserTyping(UserPresence {
                block_id: Some(block.block_id),
                is_typing: Some(false),
                ..UserPresence::new(user)
            }),
            ClientEvent::UpdatePageSettings(update) => {
                ServerEvent::PageSettingsUpdated(SettingsUpdated {
                    page_id: Some(update.page_id),
                    settings: update.settings,
                    updated_by: Some(user),
                })
            }
            ClientEvent::UpdatePageTitle(update) => ServerEvent::PageTitleUpdated(TitleUpdated {
                page_id: Some(update.page_id),
                title: update.title,
                updated_by: Some(user),
            }),
            ClientEvent::UndoRedo(update) => ServerEvent::HistoryNavigated(HistoryNavigated {
                page_id: Some(update.page_id),
                action: update.action,
                version: update.version,
                user: Some(user),
            }),
            ClientEvent::JoinPage(_) | ClientEvent::LeavePage => return,
        };

        broadcast_to_room(&state, &page_id, connection_id, &relay);
    }
}

#[async_trait]
impl Transport for LoopbackHub {
    async fn open(&self, _url: &str, credential: &str) -> ChannelResult<(FrameSink, FrameStream)> {
        let user = self
            .state
            .lock()
            .users
            .get(credential)
            .cloned()
            .ok_or_else(|| ChannelError::Unauthorized("unknown credential".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = self.connect(user, tx);

        let hub = self.clone();
        let id = connection_id.clone();
        let frame_sink = sink::unfold((), move |(), frame: String| {
            let hub = hub.clone();
            let id = id.clone();
            async move {
                if !hub.state.lock().connections.contains_key(&id) {
                    return Err(ChannelError::Closed("connection dropped".to_string()));
                }
                hub.handle_frame(&id, &frame);
                Ok::<_, ChannelError>(())
            }
        });

        let guard = ConnectionGuard {
            hub: self.clone(),
            connection_id,
        };
        let frame_stream = UnboundedReceiverStream::new(rx).map(move |frame| {
            let _alive = &guard;
            Ok(frame)
        });

        Ok((Box::pin(frame_sink), Box::pin(frame_stream)))
    }
}

/// Removes the connection when the client drops its stream
struct ConnectionGuard {
    hub: LoopbackHub,
    connection_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.hub.disconnect(&self.connection_id);
    }
}

fn join_room(state: &mut HubState, connection_id: &str, page_id: &str, user: &UserSummary) {
    let current = state
        .connections
        .get(connection_id)
        .and_then(|c| c.page.clone());
    if current.as_deref() == Some(page_id) {
        return;
    }
    if current.is_some() {
        leave_room(state, connection_id);
    }

    let room = state.rooms.entry(page_id.to_string()).or_default();
    let others: Vec<ConnectionId> = room.members.clone();
    room.members.push(connection_id.to_string());
    if let Some(conn) = state.connections.get_mut(connection_id) {
        conn.page = Some(page_id.to_string());
    }

    let active: Vec<UserPresence> = others
        .iter()
        .filter_map(|id| state.connections.get(id))
        .map(|c| UserPresence::new(c.user.clone()))
        .collect();
    send_to(state, connection_id, &ServerEvent::ActiveUsers(active));
    broadcast_to_room(
        state,
        page_id,
        connection_id,
        &ServerEvent::UserJoined(UserPresence::new(user.clone())),
    );

    info!("{} joined page {}", user.id, page_id);
}

fn leave_room(state: &mut HubState, connection_id: &str) {
    let (page_id, user) = match state.connections.get_mut(connection_id) {
        Some(conn) => match conn.page.take() {
            Some(page_id) => (page_id, conn.user.clone()),
            None => return,
        },
        None => return,
    };

    if let Some(room) = state.rooms.get_mut(&page_id) {
        room.members.retain(|id| id != connection_id);
    }
    broadcast_to_room(
        state,
        &page_id,
        connection_id,
        &ServerEvent::UserLeft(UserPresence::new(user.clone())),
    );

    info!("{} left page {}", user.id, page_id);
}

fn send_to(state: &HubState, connection_id: &str, event: &ServerEvent) {
    let frame = match SyncProtocol::encode_server(event) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to encode {}: {}", event.name(), e);
            return;
        }
    };
    if let Some(conn) = state.connections.get(connection_id) {
        let _ = conn.tx.send(frame);
    }
}

/// Send to every member of the room except `exclude`
fn broadcast_to_room(state: &HubState, page_id: &str, exclude: &str, event: &ServerEvent) {
    let members = match state.rooms.get(page_id) {
        Some(room) => room.members.clone(),
        None => return,
    };
    for member in members.iter().filter(|id| id.as_str() != exclude) {
        send_to(state, member, event);
    }
}
