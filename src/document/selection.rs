//! Selection and drag state. Ephemeral: never part of history or persisted.

use serde::{Deserialize, Serialize};

use super::block::BlockType;
use super::tree::BlockTree;
use super::{BlockError, BlockId, BlockResult};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    selected_block_id: Option<BlockId>,
    /// Palette item being dragged before it becomes a block
    dragged_block_type: Option<BlockType>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected_block_id.as_deref()
    }

    pub fn dragged(&self) -> Option<BlockType> {
        self.dragged_block_type
    }

    /// Select an existing block, or clear with `None`
    pub fn select(&mut self, id: Option<&str>, tree: &BlockTree) -> BlockResult<()> {
        match id {
            Some(id) if !tree.contains(id) => Err(BlockError::NotFound(id.to_string())),
            Some(id) => {
                self.selected_block_id = Some(id.to_string());
                Ok(())
            }
            None => {
                self.selected_block_id = None;
                Ok(())
            }
        }
    }

    pub fn set_dragged(&mut self, kind: Option<BlockType>) {
        self.dragged_block_type = kind;
    }

    /// Clear the selection if it points at a block missing from `tree`.
    ///
    /// Returns true if the selection was cleared.
    pub fn retain_valid(&mut self, tree: &BlockTree) -> bool {
        match &self.selected_block_id {
            Some(id) if !tree.contains(id) => {
                self.selected_block_id = None;
                true
            }
            _ => false,
        }
    }

    /// Clear the selection if it is one of `removed`
    pub fn clear_if_removed(&mut self, removed: &[BlockId]) -> bool {
        match &self.selected_block_id {
            Some(id) if removed.contains(id) => {
                self.selected_block_id = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::operations::{add_block, delete_block};

    #[test]
    fn test_select_requires_existing_block() {
        let (tree, id) = add_block(&BlockTree::new(), BlockType::Text, None, None).unwrap();
        let mut selection = Selection::new();

        selection.select(Some(&id), &tree).unwrap();
        assert_eq!(selection.selected(), Some(id.as_str()));

        let result = selection.select(Some("ghost"), &tree);
        assert_eq!(result, Err(BlockError::NotFound("ghost".to_string())));
        assert_eq!(selection.selected(), Some(id.as_str()));

        selection.select(None, &tree).unwrap();
        assert_eq!(selection.selected(), None);
    }

    #[test]
    fn test_retain_valid_after_tree_change() {
        let (tree, c) = add_block(&BlockTree::new(), BlockType::Container, None, None).unwrap();
        let (tree, t) = add_block(&tree, BlockType::Text, Some(&c), None).unwrap();
        let mut selection = Selection::new();
        selection.select(Some(&t), &tree).unwrap();

        assert!(!selection.retain_valid(&tree));

        let (next, removed) = delete_block(&tree, &c).unwrap();
        assert!(selection.clone().clear_if_removed(&removed));
        assert!(selection.retain_valid(&next));
        assert_eq!(selection.selected(), None);
    }

    #[test]
    fn test_drag_state() {
        let mut selection = Selection::new();
        selection.set_dragged(Some(BlockType::Image));
        assert_eq!(selection.dragged(), Some(BlockType::Image));
        selection.set_dragged(None);
        assert_eq!(selection.dragged(), None);
    }
}
