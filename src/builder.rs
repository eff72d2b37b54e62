//! One page editing session: the editor, its collaboration channel and its
//! local draft.
//!
//! Local edits are committed to history, broadcast to peers as a whole tree
//! and saved as a draft. Remote trees replace the local one without touching
//! history; the last tree applied wins.

use tracing::{debug, info, warn};

use crate::document::{
    BlockError, BlockPatch, BlockType, EditorAction, EditorState, HistoryConfig, Outcome, Page,
    PageSettings, UserSummary,
};
use crate::document::{BlockId, PageId, UserId};
use crate::storage::DraftStore;
use crate::sync::protocol::{BlocksUpdated, HistoryAction, Position};
use crate::sync::{ChangeType, CollaborationSession, ServerEvent, SessionEvent};
use crate::BuilderResult;

/// Advisory message for the user about something that happened
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected,
    Disconnected {
        reason: Option<String>,
    },
    /// A peer's tree replaced the local one
    RemoteBlocksApplied {
        user: UserSummary,
        change_type: ChangeType,
        block_count: usize,
        version: u64,
    },
    /// A peer's tree was malformed and was not applied
    RemoteBlocksRejected {
        user: UserSummary,
        reason: String,
    },
    PeerJoined(UserSummary),
    PeerLeft(UserSummary),
    /// Presence bootstrap after joining; number of other peers
    PeersPresent(usize),
    PeerActivity(UserId),
    TitleChanged {
        title: String,
        user: Option<UserSummary>,
    },
    SettingsChanged {
        user: Option<UserSummary>,
    },
    HistoryNavigated {
        action: HistoryAction,
        user: Option<UserSummary>,
    },
    ChannelError(String),
}

pub struct BuilderSession {
    editor: EditorState,
    session: CollaborationSession,
    drafts: Option<DraftStore>,
}

impl BuilderSession {
    pub fn new(
        page: Page,
        session: CollaborationSession,
        drafts: Option<DraftStore>,
        history: HistoryConfig,
    ) -> BuilderResult<Self> {
        Ok(Self {
            editor: EditorState::new(page, history)?,
            session,
            drafts,
        })
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn session(&self) -> &CollaborationSession {
        &self.session
    }

    pub fn page_id(&self) -> PageId {
        self.editor.page_id().to_string()
    }

    pub fn can_undo(&self) -> bool {
        self.editor.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.editor.can_redo()
    }

    pub fn connect(&mut self, credential: &str) {
        self.session.connect(credential);
    }

    /// Join the page being edited
    pub fn join(&mut self) -> BuilderResult<()> {
        let page_id = self.page_id();
        self.session.join_page(page_id)?;
        Ok(())
    }

    pub fn leave(&mut self) -> BuilderResult<()> {
        self.session.leave_page()?;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    /// Load another page into the editor. When a page is joined, the session
    /// moves to the new one.
    pub fn open_page(&mut self, page: Page) -> BuilderResult<()> {
        self.editor.dispatch(EditorAction::SetPage(page))?;
        if self.session.joined_page().is_some() {
            self.join()?;
        }
        Ok(())
    }

    /// Replace the page's blocks with a saved draft, if there is one.
    /// History starts over from the draft.
    pub fn restore_draft(&mut self) -> BuilderResult<bool> {
        let drafts = match &self.drafts {
            Some(drafts) => drafts,
            None => return Ok(false),
        };
        let blocks = match drafts.load_draft(self.editor.page_id())? {
            Some(blocks) => blocks,
            None => return Ok(false),
        };

        info!(
            "Restoring draft for {} ({} blocks)",
            self.editor.page_id(),
            blocks.len()
        );
        let page = Page {
            blocks,
            ..self.editor.page_meta().clone()
        };
        self.editor.dispatch(EditorAction::SetPage(page))?;
        Ok(true)
    }

    /// Apply a local action, then broadcast and save what it changed
    pub fn dispatch(&mut self, action: EditorAction) -> BuilderResult<Outcome> {
        let title_set = matches!(action, EditorAction::SetTitle(_));
        let settings_set = matches!(action, EditorAction::SetSettings(_));
        let outcome = self.editor.dispatch(action)?;
        let page_id = self.page_id();

        match &outcome {
            Outcome::MetadataChanged => {
                let meta = self.editor.page_meta();
                if title_set {
                    self.session.broadcast_title(&page_id, meta.title.clone());
                }
                if settings_set {
                    self.session
                        .broadcast_settings(&page_id, meta.settings.clone());
                }
            }
            Outcome::Replaced => {
                self.save_draft();
            }
            outcome if outcome.changed_blocks() => {
                if let Some((change_type, block_id)) = change_of(outcome) {
                    self.session.broadcast_blocks(
                        &page_id,
                        self.editor.blocks(),
                        change_type,
                        block_id,
                    );
                }
                if let Some(action) = history_action_of(outcome) {
                    let version = Some(self.editor.page_meta().version);
                    self.session.broadcast_undo_redo(&page_id, action, version);
                }
                self.save_draft();
            }
            _ => {}
        }

        Ok(outcome)
    }

    pub fn add_block(
        &mut self,
        kind: BlockType,
        parent_id: Option<&str>,
        index: Option<usize>,
    ) -> BuilderResult<BlockId> {
        let outcome = self.dispatch(EditorAction::AddBlock {
            kind,
            parent_id: parent_id.map(str::to_string),
            index,
        })?;
        match outcome {
            Outcome::Added(id) => Ok(id),
            other => Err(BlockError::validation(format!("Unexpected outcome {:?}", other)).into()),
        }
    }

    pub fn update_block(&mut self, id: &str, patch: BlockPatch) -> BuilderResult<Outcome> {
        self.dispatch(EditorAction::UpdateBlock {
            id: id.to_string(),
            patch,
        })
    }

    pub fn delete_block(&mut self, id: &str) -> BuilderResult<Outcome> {
        self.dispatch(EditorAction::DeleteBlock(id.to_string()))
    }

    pub fn move_block(
        &mut self,
        id: &str,
        parent_id: Option<&str>,
        index: Option<usize>,
    ) -> BuilderResult<Outcome> {
        self.dispatch(EditorAction::MoveBlock {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            index,
        })
    }

    pub fn undo(&mut self) -> BuilderResult<Outcome> {
        self.dispatch(EditorAction::Undo)
    }

    pub fn redo(&mut self) -> BuilderResult<Outcome> {
        self.dispatch(EditorAction::Redo)
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> BuilderResult<Outcome> {
        self.dispatch(EditorAction::SetTitle(title.into()))
    }

    pub fn set_settings(&mut self, settings: PageSettings) -> BuilderResult<Outcome> {
        self.dispatch(EditorAction::SetSettings(settings))
    }

    /// Select a block and tell peers about it
    pub fn select_block(&mut self, id: Option<&str>) -> BuilderResult<Outcome> {
        let outcome = self.dispatch(EditorAction::SelectBlock(id.map(str::to_string)))?;
        if let Some(id) = id {
            self.session.broadcast_selection(id);
        }
        Ok(outcome)
    }

    pub fn move_cursor(&self, position: Position, block_id: Option<BlockId>) -> bool {
        self.session.broadcast_cursor(position, block_id)
    }

    pub fn start_typing(&self, block_id: &str) -> bool {
        self.session.start_typing(block_id)
    }

    pub fn stop_typing(&self, block_id: &str) -> bool {
        self.session.stop_typing(block_id)
    }

    /// Wait for the next event worth telling the user about
    pub async fn next_notification(&mut self) -> Option<Notification> {
        loop {
            let event = self.session.next_event().await?;
            if let Some(notification) = self.handle_event(event) {
                return Some(notification);
            }
        }
    }

    /// Apply one session event to local state
    pub fn handle_event(&mut self, event: SessionEvent) -> Option<Notification> {
        match event {
            SessionEvent::Connected => Some(Notification::Connected),
            SessionEvent::Disconnected { reason } => Some(Notification::Disconnected { reason }),
            SessionEvent::Error(err) => Some(Notification::ChannelError(err.to_string())),
            SessionEvent::Server(event) => self.handle_server_event(event),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) -> Option<Notification> {
        match event {
            ServerEvent::BlocksUpdated(update) => self.apply_remote_blocks(update),
            ServerEvent::UserJoined(presence) => Some(Notification::PeerJoined(presence.user)),
            ServerEvent::UserLeft(presence) => Some(Notification::PeerLeft(presence.user)),
            ServerEvent::ActiveUsers(_) => {
                Some(Notification::PeersPresent(self.session.presence().len()))
            }
            ServerEvent::UserCursor(presence)
            | ServerEvent::BlockSelected(presence)
            | ServerEvent::UserTyping(presence) => {
                if self.is_local(&presence.user_id) {
                    None
                } else {
                    Some(Notification::PeerActivity(presence.user_id))
                }
            }
            ServerEvent::PageTitleUpdated(update) => {
                if let Err(e) = self.editor.dispatch(EditorAction::SetTitle(update.title.clone())) {
                    warn!("Ignoring remote title: {}", e);
                    return None;
                }
                Some(Notification::TitleChanged {
                    title: update.title,
                    user: update.updated_by,
                })
            }
            ServerEvent::PageSettingsUpdated(update) => {
                self.editor
                    .dispatch(EditorAction::SetSettings(update.settings))
                    .ok()?;
                Some(Notification::SettingsChanged {
                    user: update.updated_by,
                })
            }
            ServerEvent::HistoryNavigated(navigated) => {
                if let Some(version) = navigated.version {
                    self.editor.observe_version(version);
                }
                Some(Notification::HistoryNavigated {
                    action: navigated.action,
                    user: navigated.user,
                })
            }
            ServerEvent::Error(payload) => Some(Notification::ChannelError(payload.message)),
        }
    }

    fn apply_remote_blocks(&mut self, update: BlocksUpdated) -> Option<Notification> {
        if self.is_local(&update.updated_by.id) {
            debug!("Skipping own broadcast (version {})", update.version);
            self.editor.observe_version(update.version);
            return None;
        }

        let block_count = update.blocks.len();
        if let Err(e) = self.editor.dispatch(EditorAction::ReplaceAll(update.blocks)) {
            warn!(
                "Rejected tree from {} for {}: {}",
                update.updated_by.id,
                self.editor.page_id(),
                e
            );
            return Some(Notification::RemoteBlocksRejected {
                user: update.updated_by,
                reason: e.to_string(),
            });
        }

        self.editor.observe_version(update.version);
        self.save_draft();
        info!(
            "Applied {} blocks from {} (version {})",
            block_count, update.updated_by.id, update.version
        );

        Some(Notification::RemoteBlocksApplied {
            user: update.updated_by,
            change_type: update.change_type,
            block_count,
            version: update.version,
        })
    }

    fn is_local(&self, user_id: &str) -> bool {
        self.session.config().local_user_id() == Some(user_id)
    }

    fn save_draft(&self) {
        let drafts = match &self.drafts {
            Some(drafts) => drafts,
            None => return,
        };
        let page = self.editor.page_meta();
        match drafts.save_draft(&page.id, &self.editor.blocks(), Some(page.version)) {
            Ok(meta) => debug!("Saved draft for {} ({} blocks)", page.id, meta.block_count),
            Err(e) => warn!("Failed to save draft for {}: {}", page.id, e),
        }
    }
}

/// Change type and affected block for a block-changing outcome
fn change_of(outcome: &Outcome) -> Option<(ChangeType, Option<BlockId>)> {
    match outcome {
        Outcome::Added(id) => Some((ChangeType::Add, Some(id.clone()))),
        Outcome::Updated(id) => Some((ChangeType::Update, Some(id.clone()))),
        Outcome::Deleted(ids) => Some((ChangeType::Delete, ids.first().cloned())),
        Outcome::Moved(id) => Some((ChangeType::Move, Some(id.clone()))),
        Outcome::Undone => Some((ChangeType::Undo, None)),
        Outcome::Redone => Some((ChangeType::Redo, None)),
        _ => None,
    }
}

fn history_action_of(outcome: &Outcome) -> Option<HistoryAction> {
    match outcome {
        Outcome::Undone => Some(HistoryAction::Undo),
        Outcome::Redone => Some(HistoryAction::Redo),
        _ => None,
    }
}
