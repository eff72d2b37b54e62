//! JSON text protocol for the collaboration channel.
//!
//! Every frame is a JSON object with a protocol version, an event name and
//! an event payload:
//!
//! ```json
//! {"v":1,"event":"update-blocks","data":{"pageId":"…","blocks":[…],"changeType":"add"}}
//! ```
//!
//! Events without a payload (`leave-page`) omit `data`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{Block, BlockId, PageId, PageSettings, UserId, UserSummary};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum frame size (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Message too large: {0} bytes (max: {1})")]
    MessageTooLarge(usize, usize),

    #[error("Version mismatch: expected {0}, got {1}")]
    VersionMismatch(u8, u8),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

/// Kind of local change carried by a block broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Update,
    Delete,
    Move,
    Undo,
    Redo,
    /// Any change type this client does not know about
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Undo,
    Redo,
}

/// Canvas cursor position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocksUpdate {
    pub page_id: PageId,
    pub blocks: Vec<Block>,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMove {
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRef {
    pub block_id: BlockId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub page_id: PageId,
    pub settings: PageSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleUpdate {
    pub page_id: PageId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRedo {
    pub page_id: PageId,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinPage(PageId),
    LeavePage,
    UpdateBlocks(BlocksUpdate),
    CursorMove(CursorMove),
    BlockSelect(BlockRef),
    TypingStart(BlockRef),
    TypingStop(BlockRef),
    UpdatePageSettings(SettingsUpdate),
    UpdatePageTitle(TitleUpdate),
    UndoRedo(UndoRedo),
}

impl ClientEvent {
    /// Page the event is scoped to, if it names one
    pub fn page_id(&self) -> Option<&str> {
        match self {
            ClientEvent::JoinPage(page_id) => Some(page_id),
            ClientEvent::UpdateBlocks(update) => Some(&update.page_id),
            ClientEvent::UpdatePageSettings(update) => Some(&update.page_id),
            ClientEvent::UpdatePageTitle(update) => Some(&update.page_id),
            ClientEvent::UndoRedo(update) => Some(&update.page_id),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinPage(_) => "join-page",
            ClientEvent::LeavePage => "leave-page",
            ClientEvent::UpdateBlocks(_) => "update-blocks",
            ClientEvent::CursorMove(_) => "cursor-move",
            ClientEvent::BlockSelect(_) => "block-select",
            ClientEvent::TypingStart(_) => "typing-start",
            ClientEvent::TypingStop(_) => "typing-stop",
            ClientEvent::UpdatePageSettings(_) => "update-page-settings",
            ClientEvent::UpdatePageTitle(_) => "update-page-title",
            ClientEvent::UndoRedo(_) => "undo-redo",
        }
    }
}

/// A whole-tree broadcast relayed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocksUpdated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<PageId>,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub version: u64,
    pub updated_by: UserSummary,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
    #[serde(default)]
    pub timestamp: String,
}

/// Presence payload for a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: UserId,
    pub user: UserSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_typing: Option<bool>,
}

impl UserPresence {
    pub fn new(user: UserSummary) -> Self {
        Self {
            user_id: user.id.clone(),
            user,
            position: None,
            block_id: None,
            is_typing: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<PageId>,
    pub settings: PageSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleUpdated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<PageId>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryNavigated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<PageId>,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    BlocksUpdated(BlocksUpdated),
    UserJoined(UserPresence),
    UserLeft(UserPresence),
    ActiveUsers(Vec<UserPresence>),
    UserCursor(UserPresence),
    BlockSelected(UserPresence),
    UserTyping(UserPresence),
    PageSettingsUpdated(SettingsUpdated),
    PageTitleUpdated(TitleUpdated),
    HistoryNavigated(HistoryNavigated),
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Page the event is tagged with, if any
    pub fn page_id(&self) -> Option<&str> {
        match self {
            ServerEvent::BlocksUpdated(e) => e.page_id.as_deref(),
            ServerEvent::PageSettingsUpdated(e) => e.page_id.as_deref(),
            ServerEvent::PageTitleUpdated(e) => e.page_id.as_deref(),
            ServerEvent::HistoryNavigated(e) => e.page_id.as_deref(),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BlocksUpdated(_) => "blocks-updated",
            ServerEvent::UserJoined(_) => "user-joined",
            ServerEvent::UserLeft(_) => "user-left",
            ServerEvent::ActiveUsers(_) => "active-users",
            ServerEvent::UserCursor(_) => "user-cursor",
            ServerEvent::BlockSelected(_) => "block-selected",
            ServerEvent::UserTyping(_) => "user-typing",
            ServerEvent::PageSettingsUpdated(_) => "page-settings-updated",
            ServerEvent::PageTitleUpdated(_) => "page-title-updated",
            ServerEvent::HistoryNavigated(_) => "history-navigated",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

/// Envelope as it appears on the wire
#[derive(Deserialize)]
struct RawFrame {
    v: u8,
    event: String,
    #[serde(default)]
    data: Value,
}

/// Protocol codec for encoding/decoding frames
pub struct SyncProtocol;

impl SyncProtocol {
    /// Encode a client event to a text frame
    pub fn encode_client(event: &ClientEvent) -> Result<String, ProtocolError> {
        Self::encode(event)
    }

    /// Encode a server event to a text frame
    pub fn encode_server(event: &ServerEvent) -> Result<String, ProtocolError> {
        Self::encode(event)
    }

    /// Decode a client event from a text frame
    pub fn decode_client(frame: &str) -> Result<ClientEvent, ProtocolError> {
        Self::decode(frame)
    }

    /// Decode a server event from a text frame
    pub fn decode_server(frame: &str) -> Result<ServerEvent, ProtocolError> {
        Self::decode(frame)
    }

    fn encode<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
        let mut object = match serde_json::to_value(event)? {
            Value::Object(map) => map,
            _ => {
                return Err(ProtocolError::InvalidFormat(
                    "Event did not encode to an object".to_string(),
                ))
            }
        };
        object.insert("v".to_string(), Value::from(PROTOCOL_VERSION));

        let frame = serde_json::to_string(&object)?;
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(frame.len(), MAX_MESSAGE_SIZE));
        }

        Ok(frame)
    }

    fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, ProtocolError> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(frame.len(), MAX_MESSAGE_SIZE));
        }

        let raw: RawFrame = serde_json::from_str(frame)
            .map_err(|e| ProtocolError::InvalidFormat(e.to_string()))?;
        if raw.v != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch(PROTOCOL_VERSION, raw.v));
        }

        let mut tagged = Map::new();
        tagged.insert("event".to_string(), Value::String(raw.event));
        if !raw.data.is_null() {
            tagged.insert("data".to_string(), raw.data);
        }

        Ok(serde_json::from_value(Value::Object(tagged))?)
    }
}
