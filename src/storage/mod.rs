//! Local draft storage on Sled.
//!
//! The latest local block collection of each page is kept on disk so edits
//! made while offline survive a restart. Drafts are stored as JSON in the
//! same shape the collaboration channel and the pages API use.

mod sled_store;

pub use sled_store::{DraftStore, StorageError, StorageResult, StorageStats};

use serde::{Deserialize, Serialize};

use crate::document::PageId;

/// Metadata stored alongside each draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMetadata {
    pub page_id: PageId,
    pub block_count: usize,
    /// Unix timestamp (ms) of the first save
    pub created_at: i64,
    /// Unix timestamp (ms) of the last save
    pub updated_at: i64,
    /// Number of times the draft has been saved
    pub save_count: u64,
    /// Latest collaboration version seen when the draft was saved
    pub version: Option<u64>,
}

impl DraftMetadata {
    pub fn new(page_id: impl Into<PageId>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            page_id: page_id.into(),
            block_count: 0,
            created_at: now,
            updated_at: now,
            save_count: 0,
            version: None,
        }
    }
}

/// Configuration for the draft store
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the Sled database directory
    pub path: String,
    /// Cache size in bytes
    pub cache_size: u64,
    /// Flush interval in milliseconds (0 = flush on every save)
    pub flush_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/drafts.sled".to_string(),
            cache_size: 64 * 1024 * 1024, // 64MB
            flush_interval_ms: 500,
        }
    }
}

impl StorageConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_flush_interval(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_creation() {
        let meta = DraftMetadata::new("page-123");

        assert_eq!(meta.page_id, "page-123");
        assert_eq!(meta.save_count, 0);
        assert!(meta.created_at > 0);
        assert_eq!(meta.created_at, meta.updated_at);
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::new("/tmp/drafts").with_flush_interval(0);
        assert_eq!(config.path, "/tmp/drafts");
        assert_eq!(config.flush_interval_ms, 0);
        assert_eq!(config.cache_size, 64 * 1024 * 1024);
    }
}
