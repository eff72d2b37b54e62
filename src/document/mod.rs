//! Block document model for the page builder canvas.
//!
//! This module holds everything that lives inside one editing session:
//! - The block arena with parent/child links and sibling ordering
//! - Pure document operations (add, update, delete, move, replace)
//! - Full-snapshot undo/redo history
//! - Selection and drag state
//! - The editor dispatcher tying the pieces together

pub mod block;
pub mod editor;
pub mod history;
pub mod operations;
pub mod selection;
pub mod tree;

pub use block::{Block, BlockContent, BlockPatch, BlockType, Styles};
pub use editor::{EditorAction, EditorState, Outcome};
pub use history::{History, HistoryConfig, Snapshot};
pub use selection::Selection;
pub use tree::{BlockTree, NestedBlock};

use serde::{Deserialize, Serialize};

/// Unique identifier for a block
pub type BlockId = String;

/// Unique identifier for a page
pub type PageId = String;

/// Unique identifier for a user
pub type UserId = String;

/// Result type for document operations
pub type BlockResult<T> = Result<T, BlockError>;

/// Errors raised by document operations
///
/// A failed operation never mutates the tree or pushes history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("Block not found: {0}")]
    NotFound(BlockId),

    #[error("Invalid parent: {0}")]
    InvalidParent(BlockId),

    #[error("Moving {block_id} under {parent_id} would create a cycle")]
    CycleDetected { block_id: BlockId, parent_id: BlockId },

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl BlockError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        BlockError::Validation(vec![message.into()])
    }
}

/// Minimal user identity as embedded in pages and socket payloads
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl UserSummary {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            avatar: None,
        }
    }
}

/// Role a collaborator holds on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    Viewer,
    Editor,
    Admin,
}

impl Default for CollaboratorRole {
    fn default() -> Self {
        Self::Editor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user: UserSummary,
    #[serde(default)]
    pub role: CollaboratorRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageCategory {
    Business,
    Portfolio,
    Blog,
    Landing,
    Personal,
    Other,
}

impl Default for PageCategory {
    fn default() -> Self {
        Self::Other
    }
}

/// Page-level presentation settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSettings {
    #[serde(default)]
    pub theme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, rename = "customCSS", skip_serializing_if = "Option::is_none")]
    pub custom_css: Option<String>,
    #[serde(default, rename = "customJS", skip_serializing_if = "Option::is_none")]
    pub custom_js: Option<String>,
}

/// The top-level document being edited
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(rename = "_id")]
    pub id: PageId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserSummary>,
    #[serde(default)]
    pub collaborators: Vec<Collaborator>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub settings: PageSettings,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: PageCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Page {
    /// Create an empty page
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Check whether a user owns or collaborates on this page
    pub fn is_member(&self, user_id: &str) -> bool {
        self.owner.as_ref().map(|o| o.id == user_id).unwrap_or(false)
            || self.collaborators.iter().any(|c| c.user.id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_error_display() {
        let err = BlockError::NotFound("block-1".to_string());
        assert_eq!(err.to_string(), "Block not found: block-1");

        let err = BlockError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Validation failed: a; b");
    }

    #[test]
    fn test_page_deserializes_backend_shape() {
        let json = serde_json::json!({
            "_id": "page-1",
            "title": "Landing",
            "blocks": [],
            "owner": { "_id": "user-1", "name": "Alice", "email": "a@example.com" },
            "collaborators": [{ "user": { "_id": "user-2", "name": "Bob" }, "role": "viewer" }],
            "isPublished": true,
            "version": 7,
            "settings": { "theme": "dark", "customCSS": "body{}" },
            "category": "landing",
            "analytics": { "views": 3 }
        });

        let page: Page = serde_json::from_value(json).unwrap();
        assert_eq!(page.id, "page-1");
        assert!(page.is_published);
        assert_eq!(page.version, 7);
        assert_eq!(page.settings.custom_css.as_deref(), Some("body{}"));
        assert_eq!(page.category, PageCategory::Landing);
        assert_eq!(page.collaborators[0].role, CollaboratorRole::Viewer);
        assert!(page.is_member("user-1"));
        assert!(page.is_member("user-2"));
        assert!(!page.is_member("user-3"));
    }
}
