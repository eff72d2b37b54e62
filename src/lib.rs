//! Page builder client library.
//!
//! A block document engine for a drag-and-drop page builder, paired with a
//! real-time collaboration client:
//! - `document`: block tree, operations, undo/redo history and the editor
//! - `sync`: wire protocol, transports, collaboration session and presence
//! - `api`: client for the pages persistence API
//! - `storage`: local drafts on Sled
//! - `builder`: one editing session tying the above together

pub mod api;
pub mod builder;
pub mod config;
pub mod document;
pub mod storage;
pub mod sync;

pub use builder::{BuilderSession, Notification};
pub use config::ClientConfig;

use api::ApiError;
use config::ConfigError;
use document::BlockError;
use storage::StorageError;
use sync::ChannelError;

/// Result type for builder operations
pub type BuilderResult<T> = Result<T, BuilderError>;

/// Any error the builder can surface
#[derive(Debug)]
pub enum BuilderError {
    /// A document operation was rejected
    Block(BlockError),
    /// The collaboration channel failed
    Channel(ChannelError),
    /// The pages API failed
    Api(ApiError),
    /// The draft store failed
    Storage(StorageError),
    /// Configuration could not be loaded
    Config(ConfigError),
}

impl std::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderError::Block(err) => write!(f, "Document error: {}", err),
            BuilderError::Channel(err) => write!(f, "Channel error: {}", err),
            BuilderError::Api(err) => write!(f, "API error: {}", err),
            BuilderError::Storage(err) => write!(f, "Storage error: {}", err),
            BuilderError::Config(err) => write!(f, "Configuration error: {}", err),
        }
    }
}

impl std::error::Error for BuilderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuilderError::Block(err) => Some(err),
            BuilderError::Channel(err) => Some(err),
            BuilderError::Api(err) => Some(err),
            BuilderError::Storage(err) => Some(err),
            BuilderError::Config(err) => Some(err),
        }
    }
}

impl From<BlockError> for BuilderError {
    fn from(err: BlockError) -> Self {
        BuilderError::Block(err)
    }
}

impl From<ChannelError> for BuilderError {
    fn from(err: ChannelError) -> Self {
        BuilderError::Channel(err)
    }
}

impl From<ApiError> for BuilderError {
    fn from(err: ApiError) -> Self {
        BuilderError::Api(err)
    }
}

impl From<StorageError> for BuilderError {
    fn from(err: StorageError) -> Self {
        BuilderError::Storage(err)
    }
}

impl From<ConfigError> for BuilderError {
    fn from(err: ConfigError) -> Self {
        BuilderError::Config(err)
    }
}
