//! Collaboration session: one connection, at most one joined page.
//!
//! `connect`, `join_page` and `leave_page` only queue work for the channel
//! task; their effects are observed through [`SessionEvent`]s. Every queued
//! frame and every inbound event is keyed by a connection generation and the
//! page it belongs to, and is discarded once either no longer matches.
//!
//! Server payloads do not always name their page, so inbound events are
//! tagged with the page the wire was on when they arrived: the last
//! `join-page` sent, cleared by `leave-page`.

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::presence::{PresenceRecord, PresenceSet};
use super::protocol::{
    BlockRef, BlocksUpdate, ChangeType, ClientEvent, CursorMove, HistoryAction, Position,
    ServerEvent, SettingsUpdate, SyncProtocol, TitleUpdate, UndoRedo,
};
use super::transport::{Transport, WebSocketTransport};
use super::{ChannelError, ChannelResult, SyncConfig};
use crate::document::{Block, BlockId, PageId, PageSettings};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Something the caller should react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected { reason: Option<String> },
    Server(ServerEvent),
    /// Advisory; the session stays up unless a `Disconnected` follows
    Error(ChannelError),
}

struct Shared {
    status: SessionStatus,
    joined_page: Option<PageId>,
    generation: u64,
    presence: PresenceSet,
}

impl Shared {
    fn reset(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.joined_page = None;
        self.presence.clear();
    }
}

/// A frame waiting for the channel task, tagged with the page it was
/// issued for
struct Outbound {
    page_id: Option<PageId>,
    event: ClientEvent,
}

/// An inbound event with the connection and wire page it arrived on
struct Inbound {
    generation: u64,
    page_id: Option<PageId>,
    event: SessionEvent,
}

pub struct CollaborationSession {
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<RwLock<Shared>>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    events_tx: mpsc::UnboundedSender<Inbound>,
    events_rx: mpsc::UnboundedReceiver<Inbound>,
    task: Option<JoinHandle<()>>,
}

impl CollaborationSession {
    pub fn new(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport,
            shared: Arc::new(RwLock::new(Shared {
                status: SessionStatus::Disconnected,
                joined_page: None,
                generation: 0,
                presence: PresenceSet::new(),
            })),
            outbound: None,
            events_tx,
            events_rx,
            task: None,
        }
    }

    /// Session over a WebSocket to `config.socket_url`
    pub fn websocket(config: SyncConfig) -> Self {
        Self::new(config, Arc::new(WebSocketTransport::new()))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.read().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    pub fn joined_page(&self) -> Option<PageId> {
        self.shared.read().joined_page.clone()
    }

    /// Peers on the joined page, ordered by join time
    pub fn presence(&self) -> Vec<PresenceRecord> {
        self.shared.read().presence.all()
    }

    pub fn peer(&self, user_id: &str) -> Option<PresenceRecord> {
        self.shared.read().presence.get(user_id).cloned()
    }

    /// Start connecting. The outcome arrives as `Connected`, or as `Error`
    /// followed by `Disconnected`. An existing connection is dropped first.
    pub fn connect(&mut self, credential: &str) {
        if self.status() != SessionStatus::Disconnected {
            self.disconnect();
        }

        let generation = {
            let mut shared = self.shared.write();
            shared.generation += 1;
            shared.status = SessionStatus::Connecting;
            shared.generation
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);

        info!("Connecting to {}", self.config.socket_url);
        let channel = Channel {
            transport: self.transport.clone(),
            url: self.config.socket_url.clone(),
            credential: credential.to_string(),
            connect_timeout: self.config.connect_timeout,
            generation,
            shared: self.shared.clone(),
            events: self.events_tx.clone(),
        };
        self.task = Some(tokio::spawn(channel.run(rx)));
    }

    /// Drop the connection and discard everything still queued for it
    pub fn disconnect(&mut self) {
        let (was, generation) = {
            let mut shared = self.shared.write();
            let was = shared.status;
            shared.generation += 1;
            shared.reset();
            (was, shared.generation)
        };

        // The task closes the channel once its queue is gone
        self.outbound = None;
        self.task = None;

        if was != SessionStatus::Disconnected {
            info!("Disconnected from {}", self.config.socket_url);
            let _ = self.events_tx.send(Inbound {
                generation,
                page_id: None,
                event: SessionEvent::Disconnected { reason: None },
            });
        }
    }

    /// Join `page_id`, leaving the current page first if it differs.
    pub fn join_page(&mut self, page_id: impl Into<PageId>) -> ChannelResult<()> {
        let page_id = page_id.into();
        let previous = {
            let mut shared = self.shared.write();
            if shared.status == SessionStatus::Disconnected {
                return Err(ChannelError::NotConnected);
            }
            if shared.joined_page.as_deref() == Some(page_id.as_str()) {
                return Ok(());
            }
            shared.presence.clear();
            shared.joined_page.replace(page_id.clone())
        };

        if let Some(previous) = previous {
            info!("Leaving page {}", previous);
            self.send(None, ClientEvent::LeavePage)?;
        }

        info!("Joining page {}", page_id);
        self.send(Some(page_id.clone()), ClientEvent::JoinPage(page_id))
    }

    pub fn leave_page(&mut self) -> ChannelResult<()> {
        let previous = {
            let mut shared = self.shared.write();
            shared.presence.clear();
            shared.joined_page.take()
        };

        match previous {
            Some(page_id) => {
                info!("Leaving page {}", page_id);
                self.send(None, ClientEvent::LeavePage)
            }
            None => Ok(()),
        }
    }

    /// Queue a whole-tree broadcast. Returns false when the tree was not
    /// queued because `page_id` is not the joined page.
    pub fn broadcast_blocks(
        &self,
        page_id: &str,
        blocks: Vec<Block>,
        change_type: ChangeType,
        block_id: Option<BlockId>,
    ) -> bool {
        self.send_for_page(
            page_id,
            ClientEvent::UpdateBlocks(BlocksUpdate {
                page_id: page_id.to_string(),
                blocks,
                change_type,
                block_id,
            }),
        )
    }

    pub fn broadcast_title(&self, page_id: &str, title: impl Into<String>) -> bool {
        self.send_for_page(
            page_id,
            ClientEvent::UpdatePageTitle(TitleUpdate {
                page_id: page_id.to_string(),
                title: title.into(),
            }),
        )
    }

    pub fn broadcast_settings(&self, page_id: &str, settings: PageSettings) -> bool {
        self.send_for_page(
            page_id,
            ClientEvent::UpdatePageSettings(SettingsUpdate {
                page_id: page_id.to_string(),
                settings,
            }),
        )
    }

    pub fn broadcast_undo_redo(
        &self,
        page_id: &str,
        action: HistoryAction,
        version: Option<u64>,
    ) -> bool {
        self.send_for_page(
            page_id,
            ClientEvent::UndoRedo(UndoRedo {
                page_id: page_id.to_string(),
                action,
                version,
            }),
        )
    }

    pub fn broadcast_cursor(&self, position: Position, block_id: Option<BlockId>) -> bool {
        self.send_in_joined_page(ClientEvent::CursorMove(CursorMove { position, block_id }))
    }

    pub fn broadcast_selection(&self, block_id: impl Into<BlockId>) -> bool {
        self.send_in_joined_page(ClientEvent::BlockSelect(BlockRef {
            block_id: block_id.into(),
        }))
    }

    pub fn start_typing(&self, block_id: impl Into<BlockId>) -> bool {
        self.send_in_joined_page(ClientEvent::TypingStart(BlockRef {
            block_id: block_id.into(),
        }))
    }

    pub fn stop_typing(&self, block_id: impl Into<BlockId>) -> bool {
        self.send_in_joined_page(ClientEvent::TypingStop(BlockRef {
            block_id: block_id.into(),
        }))
    }

    /// Wait for the next event that is still current
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let inbound = self.events_rx.recv().await?;
            if let Some(event) = self.accept(inbound) {
                return Some(event);
            }
        }
    }

    /// Like `next_event`, without waiting
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let inbound = self.events_rx.try_recv().ok()?;
            if let Some(event) = self.accept(inbound) {
                return Some(event);
            }
        }
    }

    /// Filter stale events and fold presence changes into the peer set
    fn accept(&self, inbound: Inbound) -> Option<SessionEvent> {
        let Inbound {
            generation,
            page_id: arrived_on,
            event,
        } = inbound;
        let mut shared = self.shared.write();
        if generation != shared.generation {
            debug!("Discarding event from an earlier connection");
            return None;
        }

        let server_event = match &event {
            SessionEvent::Server(server_event) => server_event,
            _ => return Some(event),
        };
        if let ServerEvent::Error(payload) = server_event {
            warn!("Server reported an error: {}", payload.message);
            return Some(event);
        }

        let joined = match shared.joined_page.clone() {
            Some(joined) => joined,
            None => {
                debug!("Discarding {}: no page joined", server_event.name());
                return None;
            }
        };
        if arrived_on.as_deref() != Some(joined.as_str()) {
            debug!(
                "Discarding {} received on page {:?} (joined {})",
                server_event.name(),
                arrived_on,
                joined
            );
            return None;
        }
        if let Some(page_id) = server_event.page_id() {
            if page_id != joined {
                debug!(
                    "Discarding {} for page {} (joined {})",
                    server_event.name(),
                    page_id,
                    joined
                );
                return None;
            }
        }

        let local = self.config.local_user_id();
        let is_local = |user_id: &str| local == Some(user_id);
        match server_event {
            ServerEvent::UserJoined(presence) if !is_local(&presence.user_id) => {
                shared.presence.join(presence);
            }
            ServerEvent::UserLeft(presence) => {
                shared.presence.leave(&presence.user_id);
            }
            ServerEvent::ActiveUsers(users) => {
                let peers: Vec<_> = users
                    .iter()
                    .filter(|p| !is_local(&p.user_id))
                    .cloned()
                    .collect();
                shared.presence.replace_all(&peers);
            }
            ServerEvent::UserCursor(presence)
            | ServerEvent::BlockSelected(presence)
            | ServerEvent::UserTyping(presence)
                if !is_local(&presence.user_id) =>
            {
                shared.presence.update(presence);
            }
            _ => {}
        }

        Some(event)
    }

    fn send_for_page(&self, page_id: &str, event: ClientEvent) -> bool {
        if self.joined_page().as_deref() != Some(page_id) {
            debug!("Dropping {} for page {}: not the joined page", event.name(), page_id);
            return false;
        }
        self.send(Some(page_id.to_string()), event).is_ok()
    }

    fn send_in_joined_page(&self, event: ClientEvent) -> bool {
        match self.joined_page() {
            Some(page_id) => self.send(Some(page_id), event).is_ok(),
            None => {
                debug!("Dropping {}: no page joined", event.name());
                false
            }
        }
    }

    fn send(&self, page_id: Option<PageId>, event: ClientEvent) -> ChannelResult<()> {
        let outbound = self.outbound.as_ref().ok_or(ChannelError::NotConnected)?;
        outbound
            .send(Outbound { page_id, event })
            .map_err(|_| ChannelError::Closed("channel task stopped".to_string()))
    }
}

impl Drop for CollaborationSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Everything the channel task needs, captured at connect time
struct Channel {
    transport: Arc<dyn Transport>,
    url: String,
    credential: String,
    connect_timeout: Duration,
    generation: u64,
    shared: Arc<RwLock<Shared>>,
    events: mpsc::UnboundedSender<Inbound>,
}

impl Channel {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
        let opened = tokio::time::timeout(
            self.connect_timeout,
            self.transport.open(&self.url, &self.credential),
        )
        .await;

        let (mut sink, mut stream) = match opened {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return self.fail(e),
            Err(_) => {
                return self.fail(ChannelError::Timeout(self.connect_timeout.as_millis() as u64))
            }
        };

        {
            let mut shared = self.shared.write();
            if shared.generation != self.generation {
                return;
            }
            shared.status = SessionStatus::Connected;
        }
        info!("Connected to {}", self.url);
        self.emit(SessionEvent::Connected);

        let mut wire_page: Option<PageId> = None;
        loop {
            tokio::select! {
                queued = outbound.recv() => {
                    let Some(queued) = queued else {
                        let _ = sink.close().await;
                        return;
                    };
                    if !self.is_current(queued.page_id.as_deref()) {
                        debug!("Discarding queued {}: page no longer joined", queued.event.name());
                        continue;
                    }
                    let frame = match SyncProtocol::encode_client(&queued.event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Failed to encode {}: {}", queued.event.name(), e);
                            self.emit(SessionEvent::Error(e.into()));
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(frame).await {
                        return self.fail(e);
                    }
                    match queued.event {
                        ClientEvent::JoinPage(page_id) => wire_page = Some(page_id),
                        ClientEvent::LeavePage => wire_page = None,
                        _ => {}
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(frame)) => match SyncProtocol::decode_server(&frame) {
                        Ok(event) => self.emit_on(wire_page.clone(), SessionEvent::Server(event)),
                        Err(e) => {
                            warn!("Ignoring undecodable frame: {}", e);
                            self.emit(SessionEvent::Error(e.into()));
                        }
                    },
                    Some(Err(e)) => return self.fail(e),
                    None => return self.close(Some("closed by server".to_string())),
                }
            }
        }
    }

    /// Queued frames go out only for the current connection and, when tagged,
    /// only while their page is still joined
    fn is_current(&self, page_id: Option<&str>) -> bool {
        let shared = self.shared.read();
        shared.generation == self.generation
            && page_id.map_or(true, |p| shared.joined_page.as_deref() == Some(p))
    }

    fn emit(&self, event: SessionEvent) {
        self.emit_on(None, event);
    }

    fn emit_on(&self, page_id: Option<PageId>, event: SessionEvent) {
        let _ = self.events.send(Inbound {
            generation: self.generation,
            page_id,
            event,
        });
    }

    fn fail(&self, error: ChannelError) {
        warn!("Channel to {} failed: {}", self.url, error);
        let reason = error.to_string();
        self.emit(SessionEvent::Error(error));
        self.close(Some(reason));
    }

    fn close(&self, reason: Option<String>) {
        {
            let mut shared = self.shared.write();
            if shared.generation != self.generation {
                return;
            }
            shared.reset();
        }
        info!("Channel to {} closed", self.url);
        self.emit(SessionEvent::Disconnected { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BlockType, UserSummary};
    use crate::sync::protocol::{BlocksUpdated, TitleUpdated, UserPresence};
    use crate::sync::transport::{FrameSink, FrameStream};
    use crate::sync::LoopbackHub;
    use async_trait::async_trait;

    const WAIT: Duration = Duration::from_secs(2);

    fn hub() -> LoopbackHub {
        let hub = LoopbackHub::new();
        hub.register_user("token-a", UserSummary::new("user-a", "Ann"));
        hub.register_user("token-b", UserSummary::new("user-b", "Ben"));
        hub
    }

    fn session(hub: &LoopbackHub, user: &str, name: &str) -> CollaborationSession {
        let config = SyncConfig::new("loopback").with_local_user(UserSummary::new(user, name));
        CollaborationSession::new(config, Arc::new(hub.clone()))
    }

    /// Wait for the first event matching `pred`, skipping the rest
    async fn wait_for<F>(session: &mut CollaborationSession, pred: F) -> SessionEvent
    where
        F: Fn(&SessionEvent) -> bool,
    {
        tokio::time::timeout(WAIT, async {
            loop {
                let event = session.next_event().await.expect("event channel open");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn inject(session: &CollaborationSession, generation: u64, page_id: Option<&str>, event: SessionEvent) {
        session
            .events_tx
            .send(Inbound {
                generation,
                page_id: page_id.map(str::to_string),
                event,
            })
            .unwrap();
    }

    async fn connected(hub: &LoopbackHub, token: &str, user: &str, name: &str) -> CollaborationSession {
        let mut s = session(hub, user, name);
        s.connect(token);
        wait_for(&mut s, |e| *e == SessionEvent::Connected).await;
        s
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn open(&self, _url: &str, _credential: &str) -> ChannelResult<(FrameSink, FrameStream)> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let hub = hub();
        let mut a = connected(&hub, "token-a", "user-a", "Ann").await;
        assert!(a.is_connected());
        assert_eq!(hub.connection_count(), 1);

        a.disconnect();
        assert_eq!(a.status(), SessionStatus::Disconnected);
        assert_eq!(
            wait_for(&mut a, |_| true).await,
            SessionEvent::Disconnected { reason: None }
        );
    }

    #[tokio::test]
    async fn test_unauthorized_credential() {
        let hub = hub();
        let mut s = session(&hub, "user-x", "Xavier");
        s.connect("wrong");

        let event = wait_for(&mut s, |e| matches!(e, SessionEvent::Error(_))).await;
        assert!(matches!(event, SessionEvent::Error(ChannelError::Unauthorized(_))));
        wait_for(&mut s, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
        assert_eq!(s.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        let config = SyncConfig::new("stalled").with_connect_timeout(Duration::from_millis(50));
        let mut s = CollaborationSession::new(config, Arc::new(StalledTransport));
        s.connect("token");
        assert_eq!(s.status(), SessionStatus::Connecting);

        let event = wait_for(&mut s, |e| matches!(e, SessionEvent::Error(_))).await;
        assert_eq!(event, SessionEvent::Error(ChannelError::Timeout(50)));
        assert_eq!(s.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_join_requires_connection() {
        let hub = hub();
        let mut s = session(&hub, "user-a", "Ann");
        assert_eq!(s.join_page("p1"), Err(ChannelError::NotConnected));
        assert!(!s.broadcast_blocks("p1", vec![], ChangeType::Add, None));
    }

    #[tokio::test]
    async fn test_presence_follows_joins_and_leaves() {
        let hub = hub();
        let mut a = connected(&hub, "token-a", "user-a", "Ann").await;
        let mut b = connected(&hub, "token-b", "user-b", "Ben").await;

        a.join_page("p1").unwrap();
        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;

        b.join_page("p1").unwrap();
        wait_for(&mut b, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;
        assert_eq!(b.presence().len(), 1);
        assert_eq!(b.presence()[0].user_id, "user-a");

        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::UserJoined(_)))).await;
        assert!(a.peer("user-b").is_some());

        b.leave_page().unwrap();
        assert_eq!(b.joined_page(), None);
        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::UserLeft(_)))).await;
        assert!(a.peer("user-b").is_none());
    }

    #[tokio::test]
    async fn test_blocks_reach_the_other_peer() {
        let hub = hub();
        let mut a = connected(&hub, "token-a", "user-a", "Ann").await;
        let mut b = connected(&hub, "token-b", "user-b", "Ben").await;
        a.join_page("p1").unwrap();
        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;
        b.join_page("p1").unwrap();
        wait_for(&mut b, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;

        let blocks = vec![Block::with_id("x", BlockType::Text)];
        assert!(a.broadcast_blocks("p1", blocks, ChangeType::Add, Some("x".into())));
        assert!(!a.broadcast_blocks("p2", vec![], ChangeType::Add, None));

        let event = wait_for(&mut b, |e| {
            matches!(e, SessionEvent::Server(ServerEvent::BlocksUpdated(_)))
        })
        .await;
        match event {
            SessionEvent::Server(ServerEvent::BlocksUpdated(update)) => {
                assert_eq!(update.updated_by.id, "user-a");
                assert_eq!(update.blocks[0].id, "x");
                assert_eq!(update.version, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_switching_pages_leaves_the_first() {
        let hub = hub();
        let mut a = connected(&hub, "token-a", "user-a", "Ann").await;
        a.join_page("p1").unwrap();
        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;

        a.join_page("p2").unwrap();
        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;

        assert_eq!(a.joined_page().as_deref(), Some("p2"));
        assert!(hub.members("p1").is_empty());
        assert_eq!(hub.members("p2"), vec!["user-a"]);
    }

    #[tokio::test]
    async fn test_events_for_other_pages_are_discarded() {
        let hub = hub();
        let mut a = connected(&hub, "token-a", "user-a", "Ann").await;
        a.join_page("p1").unwrap();
        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;

        let generation = a.shared.read().generation;
        let stale = ServerEvent::PageTitleUpdated(TitleUpdated {
            page_id: Some("p0".into()),
            title: "Old".into(),
            updated_by: None,
        });
        inject(&a, generation, Some("p1"), SessionEvent::Server(stale));
        inject(&a, generation - 1, None, SessionEvent::Connected);

        assert_eq!(a.try_next_event(), None);
    }

    #[tokio::test]
    async fn test_untagged_events_from_the_previous_page_are_discarded() {
        let hub = hub();
        let mut a = connected(&hub, "token-a", "user-a", "Ann").await;
        a.join_page("p1").unwrap();
        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;

        // Neither payload names its page; both arrived while p1 was joined
        let generation = a.shared.read().generation;
        let update = ServerEvent::BlocksUpdated(BlocksUpdated {
            page_id: None,
            blocks: vec![Block::with_id("from-p1", BlockType::Text)],
            version: 7,
            updated_by: UserSummary::new("user-b", "Ben"),
            change_type: ChangeType::Add,
            block_id: None,
            timestamp: String::new(),
        });
        let peers = ServerEvent::ActiveUsers(vec![UserPresence::new(UserSummary::new("user-b", "Ben"))]);
        inject(&a, generation, Some("p1"), SessionEvent::Server(update));
        inject(&a, generation, Some("p1"), SessionEvent::Server(peers));

        a.join_page("p2").unwrap();
        assert_eq!(a.try_next_event(), None);

        let event = wait_for(&mut a, |e| matches!(e, SessionEvent::Server(_))).await;
        match event {
            SessionEvent::Server(ServerEvent::ActiveUsers(users)) => assert!(users.is_empty()),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(a.peer("user-b").is_none());
    }

    #[tokio::test]
    async fn test_server_loss_disconnects() {
        let hub = hub();
        let mut a = connected(&hub, "token-a", "user-a", "Ann").await;
        a.join_page("p1").unwrap();
        wait_for(&mut a, |e| matches!(e, SessionEvent::Server(ServerEvent::ActiveUsers(_)))).await;

        hub.disconnect_all();

        let event = wait_for(&mut a, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
        assert_eq!(
            event,
            SessionEvent::Disconnected {
                reason: Some("closed by server".into())
            }
        );
        assert_eq!(a.status(), SessionStatus::Disconnected);
        assert_eq!(a.joined_page(), None);
    }
}
