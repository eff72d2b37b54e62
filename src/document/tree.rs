//! Block arena with parent/child links and sibling ordering.
//!
//! Blocks are stored in an id-indexed map. A child index keyed by parent id
//! (with `None` for the page root) is maintained incrementally on every
//! mutation, so sibling queries never scan the whole page.
//!
//! Siblings are sorted by `order`, ties broken by insertion sequence. After a
//! block is added to or moved into a sibling list, that list is renumbered
//! `0..n` and the parent's `children` vector is rewritten to match.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::block::{Block, BlockPatch};
use super::{BlockError, BlockId, BlockResult};

#[derive(Debug, Clone)]
struct Entry {
    block: Block,
    /// Insertion sequence, breaks ties between equal `order` values
    seq: u64,
}

/// The set of blocks on one page
#[derive(Debug, Clone, Default)]
pub struct BlockTree {
    entries: HashMap<BlockId, Entry>,
    /// Sorted sibling ids per parent (`None` = page root)
    child_index: HashMap<Option<BlockId>, Vec<BlockId>>,
    next_seq: u64,
}

impl BlockTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a flat block collection after checking its
    /// structural invariants.
    ///
    /// Rejects duplicate ids, dangling or non-container parents, cycles and
    /// `children` lists that disagree with `parent` links. Sibling order is
    /// taken from `order`, ties broken by position in `blocks`.
    pub fn from_blocks(blocks: Vec<Block>) -> BlockResult<Self> {
        let mut tree = Self::new();

        for block in blocks {
            if tree.entries.contains_key(&block.id) {
                return Err(BlockError::validation(format!(
                    "duplicate block id: {}",
                    block.id
                )));
            }
            let seq = tree.bump_seq();
            tree.entries.insert(block.id.clone(), Entry { block, seq });
        }

        for entry in tree.entries.values() {
            let block = &entry.block;
            if let Some(parent_id) = &block.parent {
                match tree.entries.get(parent_id) {
                    Some(parent) if parent.block.is_container() => {}
                    _ => return Err(BlockError::InvalidParent(parent_id.clone())),
                }
            }
            if !block.children.is_empty() && !block.is_container() {
                return Err(BlockError::InvalidParent(block.id.clone()));
            }
        }

        for id in tree.entries.keys() {
            tree.check_acyclic(id)?;
        }

        for entry in tree.entries.values() {
            let block = &entry.block;
            let mut seen = HashSet::new();
            for child_id in &block.children {
                if !seen.insert(child_id) {
                    return Err(BlockError::validation(format!(
                        "{} lists child {} twice",
                        block.id, child_id
                    )));
                }
                let linked = tree
                    .entries
                    .get(child_id)
                    .map(|child| child.block.parent.as_ref() == Some(&block.id))
                    .unwrap_or(false);
                if !linked {
                    return Err(BlockError::validation(format!(
                        "{} lists child {} which does not belong to it",
                        block.id, child_id
                    )));
                }
            }
            if let Some(parent_id) = &block.parent {
                let listed = tree
                    .entries
                    .get(parent_id)
                    .map(|parent| parent.block.has_child(&block.id))
                    .unwrap_or(false);
                if !listed {
                    return Err(BlockError::validation(format!(
                        "{} is missing from the children of {}",
                        block.id, parent_id
                    )));
                }
            }
        }

        tree.rebuild_index();
        Ok(tree)
    }

    /// Get a block by id
    pub fn get(&self, id: &str) -> Option<&Block> {
        self.entries.get(id).map(|e| &e.block)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all blocks in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.entries.values().map(|e| &e.block)
    }

    /// Sorted sibling ids under a parent (`None` = page root)
    pub fn child_ids(&self, parent_id: Option<&str>) -> &[BlockId] {
        self.child_index
            .get(&parent_id.map(str::to_string))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Direct children of a block in sibling order.
    ///
    /// Returns `None` if the block does not exist.
    pub fn children(&self, id: &str) -> Option<Vec<&Block>> {
        if !self.contains(id) {
            return None;
        }
        Some(self.resolve(self.child_ids(Some(id))))
    }

    /// Root blocks in sibling order
    pub fn roots(&self) -> Vec<&Block> {
        self.resolve(self.child_ids(None))
    }

    /// Check whether `ancestor_id` is a strict ancestor of `id`.
    ///
    /// A block is never its own descendant. The walk is bounded by the block
    /// count so a corrupt parent chain cannot loop forever.
    pub fn is_descendant(&self, ancestor_id: &str, id: &str) -> bool {
        let mut current = self.get(id).and_then(|b| b.parent.as_deref());
        let mut steps = 0;

        while let Some(parent_id) = current {
            if parent_id == ancestor_id {
                return true;
            }
            steps += 1;
            if steps > self.entries.len() {
                return false;
            }
            current = self.get(parent_id).and_then(|b| b.parent.as_deref());
        }

        false
    }

    /// Nesting depth, 0 for root blocks
    pub fn depth(&self, id: &str) -> Option<usize> {
        self.path_to(id).len().checked_sub(1)
    }

    /// All descendants of a block, depth-first in sibling order
    pub fn descendants(&self, id: &str) -> Vec<&Block> {
        let mut result = Vec::new();
        self.collect_descendants(id, &mut result);
        result
    }

    fn collect_descendants<'a>(&'a self, id: &str, result: &mut Vec<&'a Block>) {
        for child_id in self.child_ids(Some(id)) {
            if let Some(child) = self.get(child_id) {
                result.push(child);
                self.collect_descendants(child_id, result);
            }
        }
    }

    /// Ancestor chain from the root down to the block itself
    pub fn path_to(&self, id: &str) -> Vec<&Block> {
        let mut path = Vec::new();
        let mut current = Some(id);

        while let Some(current_id) = current {
            match self.get(current_id) {
                Some(block) if path.len() <= self.entries.len() => {
                    path.push(block);
                    current = block.parent.as_deref();
                }
                _ => break,
            }
        }

        path.reverse();
        path
    }

    /// All blocks, depth-first from the roots in sibling order
    pub fn to_blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(self.entries.len());
        for root in self.roots() {
            blocks.push(root.clone());
            blocks.extend(self.descendants(&root.id).into_iter().cloned());
        }
        blocks
    }

    /// Nested view of the page for renderers
    pub fn to_nested(&self) -> Vec<NestedBlock> {
        self.child_ids(None)
            .iter()
            .filter_map(|id| self.block_to_nested(id))
            .collect()
    }

    fn block_to_nested(&self, id: &str) -> Option<NestedBlock> {
        let block = self.get(id)?.clone();
        let children = self
            .child_ids(Some(id))
            .iter()
            .filter_map(|child_id| self.block_to_nested(child_id))
            .collect();

        Some(NestedBlock { block, children })
    }

    /// Insert a new block under its `parent`, at `index` among its siblings
    /// or at the end.
    pub(crate) fn insert(&mut self, mut block: Block, index: Option<usize>) -> BlockResult<()> {
        if self.contains(&block.id) {
            return Err(BlockError::validation(format!(
                "duplicate block id: {}",
                block.id
            )));
        }
        if let Some(parent_id) = &block.parent {
            self.require_container(parent_id)?;
        }

        block.children.clear();
        let parent_key = block.parent.clone();
        let id = block.id.clone();
        let seq = self.bump_seq();
        self.entries.insert(id.clone(), Entry { block, seq });
        self.place(parent_key, id, index);

        Ok(())
    }

    /// Shallow-merge a patch into a block's content and styles
    pub(crate) fn update(&mut self, id: &str, patch: &BlockPatch) -> BlockResult<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| BlockError::NotFound(id.to_string()))?;
        entry.block.apply_patch(patch)
    }

    /// Remove a block and its whole subtree, returning the removed blocks
    pub(crate) fn remove_subtree(&mut self, id: &str) -> BlockResult<Vec<Block>> {
        let parent_key = self
            .get(id)
            .ok_or_else(|| BlockError::NotFound(id.to_string()))?
            .parent
            .clone();

        let mut to_remove = vec![id.to_string()];
        to_remove.extend(self.descendants(id).into_iter().map(|b| b.id.clone()));

        self.detach(&parent_key, id);

        let mut removed = Vec::with_capacity(to_remove.len());
        for block_id in to_remove {
            self.child_index.remove(&Some(block_id.clone()));
            if let Some(entry) = self.entries.remove(&block_id) {
                removed.push(entry.block);
            }
        }

        Ok(removed)
    }

    /// Re-home a block under a new parent (`None` = page root) at `index`
    /// among its new siblings, or at the end.
    pub(crate) fn reparent(
        &mut self,
        id: &str,
        new_parent: Option<&str>,
        index: Option<usize>,
    ) -> BlockResult<()> {
        if !self.contains(id) {
            return Err(BlockError::NotFound(id.to_string()));
        }

        if let Some(parent_id) = new_parent {
            if parent_id == id || self.is_descendant(id, parent_id) {
                return Err(BlockError::CycleDetected {
                    block_id: id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }
            self.require_container(parent_id)?;
        }

        let old_parent = self.get(id).and_then(|b| b.parent.clone());
        self.detach(&old_parent, id);
        self.renumber(&old_parent);

        let new_parent = new_parent.map(str::to_string);
        if let Some(entry) = self.entries.get_mut(id) {
            entry.block.parent = new_parent.clone();
        }
        self.place(new_parent, id.to_string(), index);

        Ok(())
    }

    fn require_container(&self, parent_id: &str) -> BlockResult<()> {
        match self.get(parent_id) {
            Some(parent) if parent.is_container() => Ok(()),
            _ => Err(BlockError::InvalidParent(parent_id.to_string())),
        }
    }

    /// Put `id` into its parent's sibling list and renumber the list
    fn place(&mut self, parent_key: Option<BlockId>, id: BlockId, index: Option<usize>) {
        let siblings = self.child_index.entry(parent_key.clone()).or_default();
        let position = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(position, id);
        self.renumber(&parent_key);
    }

    /// Take `id` out of its parent's sibling list and `children` vector
    fn detach(&mut self, parent_key: &Option<BlockId>, id: &str) {
        if let Some(siblings) = self.child_index.get_mut(parent_key) {
            siblings.retain(|sibling| sibling != id);
        }
        if let Some(parent) = parent_key.as_ref().and_then(|p| self.entries.get_mut(p)) {
            parent.block.remove_child(id);
        }
    }

    /// Assign `order = 0..n` to a sibling list and sync the parent's `children`
    fn renumber(&mut self, parent_key: &Option<BlockId>) {
        let siblings = self.child_index.get(parent_key).cloned().unwrap_or_default();

        for (position, sibling_id) in siblings.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(sibling_id) {
                entry.block.order = position as f64;
            }
        }
        if let Some(parent) = parent_key.as_ref().and_then(|p| self.entries.get_mut(p)) {
            parent.block.children = siblings;
        }
    }

    fn rebuild_index(&mut self) {
        let mut index: HashMap<Option<BlockId>, Vec<(f64, u64, BlockId)>> = HashMap::new();
        for entry in self.entries.values() {
            index
                .entry(entry.block.parent.clone())
                .or_default()
                .push((entry.block.order, entry.seq, entry.block.id.clone()));
        }

        self.child_index = index
            .into_iter()
            .map(|(parent, mut siblings)| {
                siblings.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                (parent, siblings.into_iter().map(|(_, _, id)| id).collect())
            })
            .collect();

        for (parent_key, siblings) in &self.child_index {
            if let Some(parent) = parent_key.as_ref().and_then(|p| self.entries.get_mut(p)) {
                parent.block.children = siblings.clone();
            }
        }
    }

    fn check_acyclic(&self, id: &str) -> BlockResult<()> {
        let mut visited = HashSet::new();
        let mut current = id;

        while let Some(parent_id) = self.get(current).and_then(|b| b.parent.as_deref()) {
            if parent_id == id || !visited.insert(parent_id) {
                return Err(BlockError::CycleDetected {
                    block_id: id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }
            current = parent_id;
        }

        Ok(())
    }

    fn resolve(&self, ids: &[BlockId]) -> Vec<&Block> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

impl PartialEq for BlockTree {
    /// Structural equality over the block records
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(id, entry)| other.get(id) == Some(&entry.block))
    }
}

/// Nested representation for renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    pub block: Block,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedBlock>,
}
