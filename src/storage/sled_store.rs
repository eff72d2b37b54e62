//! Sled-backed draft store.
//!
//! Two trees are kept: `drafts` holds the JSON block collection per page and
//! `metadata` holds a [`DraftMetadata`] record per page. Both are keyed by
//! page id and written in one transaction.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{DraftMetadata, StorageConfig};
use crate::document::Block;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sled database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corruption detected in draft: {0}")]
    Corruption(String),

    #[error("Storage initialization failed: {0}")]
    InitFailed(String),
}

impl From<TransactionError<StorageError>> for StorageError {
    fn from(err: TransactionError<StorageError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StorageError::Sled(e),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

const TREE_DRAFTS: &str = "drafts";
const TREE_METADATA: &str = "metadata";

/// Sled-based store for per-page block drafts
#[derive(Clone)]
pub struct DraftStore {
    db: Arc<Db>,
    drafts: Tree,
    metadata: Tree,
    config: StorageConfig,
}

impl DraftStore {
    /// Open or create a draft store at the configured path
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        let path = Path::new(&config.path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::InitFailed(format!("Failed to create directory: {}", e))
            })?;
        }

        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_size)
            .flush_every_ms(if config.flush_interval_ms > 0 {
                Some(config.flush_interval_ms)
            } else {
                None
            })
            .open()?;

        let drafts = db.open_tree(TREE_DRAFTS)?;
        let metadata = db.open_tree(TREE_METADATA)?;

        Ok(Self {
            db: Arc::new(db),
            drafts,
            metadata,
            config,
        })
    }

    /// Open a store that lives only as long as the process
    pub fn temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let drafts = db.open_tree(TREE_DRAFTS)?;
        let metadata = db.open_tree(TREE_METADATA)?;

        Ok(Self {
            db: Arc::new(db),
            drafts,
            metadata,
            config: StorageConfig::default().with_flush_interval(0),
        })
    }

    /// Replace the draft for `page_id` with `blocks`
    pub fn save_draft(
        &self,
        page_id: &str,
        blocks: &[Block],
        version: Option<u64>,
    ) -> StorageResult<DraftMetadata> {
        let mut meta = self
            .get_metadata(page_id)?
            .unwrap_or_else(|| DraftMetadata::new(page_id));
        meta.block_count = blocks.len();
        meta.updated_at = chrono::Utc::now().timestamp_millis();
        meta.save_count += 1;
        if version.is_some() {
            meta.version = version;
        }

        let draft_bytes = serde_json::to_vec(blocks)?;
        let meta_bytes = serde_json::to_vec(&meta)?;

        (&self.drafts, &self.metadata).transaction(|(drafts, metadata)| {
            drafts.insert(page_id.as_bytes(), draft_bytes.as_slice())?;
            metadata.insert(page_id.as_bytes(), meta_bytes.as_slice())?;
            Ok::<_, ConflictableTransactionError<StorageError>>(())
        })?;

        if self.config.flush_interval_ms == 0 {
            self.flush()?;
        }

        debug!("Saved draft for {} ({} blocks)", page_id, blocks.len());
        Ok(meta)
    }

    /// Load the draft for `page_id`, if one was saved
    pub fn load_draft(&self, page_id: &str) -> StorageResult<Option<Vec<Block>>> {
        match self.drafts.get(page_id.as_bytes())? {
            Some(bytes) => {
                let blocks: Vec<Block> = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::Corruption(format!("draft for {}: {}", page_id, e))
                })?;
                Ok(Some(blocks))
            }
            None => Ok(None),
        }
    }

    pub fn has_draft(&self, page_id: &str) -> StorageResult<bool> {
        Ok(self.drafts.contains_key(page_id.as_bytes())?)
    }

    /// Delete a draft and its metadata. Returns whether one existed.
    pub fn delete_draft(&self, page_id: &str) -> StorageResult<bool> {
        let key = page_id.as_bytes();
        let existed = self.drafts.remove(key)?.is_some();
        self.metadata.remove(key)?;
        Ok(existed)
    }

    pub fn get_metadata(&self, page_id: &str) -> StorageResult<Option<DraftMetadata>> {
        match self.metadata.get(page_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Metadata of every stored draft, most recently saved first
    pub fn list_drafts(&self) -> StorageResult<Vec<DraftMetadata>> {
        let mut drafts = Vec::new();
        for item in self.metadata.iter() {
            let (_, value) = item?;
            let meta: DraftMetadata = serde_json::from_slice(&value)?;
            drafts.push(meta);
        }
        drafts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(drafts)
    }

    /// Force flush all pending writes to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            draft_count: self.drafts.len(),
            total_size_bytes: self.db.size_on_disk().unwrap_or(0),
        }
    }
}

/// Statistics about the store
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub draft_count: usize,
    pub total_size_bytes: u64,
}

impl Drop for DraftStore {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BlockType, NestedBlock};
    use tempfile::{tempdir, TempDir};

    fn test_store() -> (TempDir, DraftStore) {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path().join("drafts.sled").to_string_lossy().to_string())
            .with_flush_interval(0);
        let store = DraftStore::open(config).unwrap();
        (dir, store)
    }

    fn sample_blocks() -> Vec<Block> {
        let mut container = Block::with_id("c1", BlockType::Container);
        container.add_child("t1");
        let text = Block::with_id("t1", BlockType::Text).with_parent("c1");
        vec![container, text]
    }

    #[test]
    fn test_draft_save_load() {
        let (_dir, store) = test_store();

        let meta = store.save_draft("page-1", &sample_blocks(), Some(3)).unwrap();
        assert_eq!(meta.block_count, 2);
        assert_eq!(meta.save_count, 1);
        assert_eq!(meta.version, Some(3));

        let loaded = store.load_draft("page-1").unwrap().unwrap();
        assert_eq!(loaded, sample_blocks());
    }

    #[test]
    fn test_draft_not_found() {
        let (_dir, store) = test_store();
        assert!(store.load_draft("nonexistent").unwrap().is_none());
        assert!(!store.has_draft("nonexistent").unwrap());
    }

    #[test]
    fn test_resave_updates_metadata() {
        let (_dir, store) = test_store();
        store.save_draft("page-1", &sample_blocks(), Some(1)).unwrap();
        let meta = store.save_draft("page-1", &[], None).unwrap();

        assert_eq!(meta.save_count, 2);
        assert_eq!(meta.block_count, 0);
        assert_eq!(meta.version, Some(1));
        assert!(store.load_draft("page-1").unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_drafts_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drafts.sled").to_string_lossy().to_string();

        {
            let store = DraftStore::open(StorageConfig::new(path.clone())).unwrap();
            store.save_draft("page-1", &sample_blocks(), None).unwrap();
        }

        let store = DraftStore::open(StorageConfig::new(path)).unwrap();
        let loaded = store.load_draft("page-1").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_list_and_delete() {
        let (_dir, store) = test_store();
        store.save_draft("page-1", &sample_blocks(), None).unwrap();
        store.save_draft("page-2", &[], None).unwrap();

        let ids: Vec<_> = store.list_drafts().unwrap().into_iter().map(|m| m.page_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"page-1".to_string()));

        assert!(store.delete_draft("page-1").unwrap());
        assert!(!store.delete_draft("page-1").unwrap());
        assert!(store.get_metadata("page-1").unwrap().is_none());
        assert_eq!(store.stats().draft_count, 1);
    }

    #[test]
    fn test_corrupt_draft_is_reported() {
        let (_dir, store) = test_store();
        store.drafts.insert("page-1", b"not json".to_vec()).unwrap();

        assert!(matches!(
            store.load_draft("page-1"),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_temporary_store() {
        let store = DraftStore::temporary().unwrap();
        store.save_draft("p", &sample_blocks(), None).unwrap();
        let nested: Vec<NestedBlock> = crate::document::BlockTree::from_blocks(
            store.load_draft("p").unwrap().unwrap(),
        )
        .unwrap()
        .to_nested();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].children.len(), 1);
    }
}
