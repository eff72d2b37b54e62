//! Document operations.
//!
//! Every operation takes the current tree by reference and returns a new
//! tree. On error the input is untouched, so a failed operation never leaks
//! a half-applied state.

use super::block::{Block, BlockPatch, BlockType};
use super::tree::BlockTree;
use super::{BlockError, BlockId, BlockResult};

/// Add a block of `kind` with default content and styles.
///
/// The block goes under `parent_id` (which must be a container) or on the
/// page root, at `index` among its siblings or at the end.
pub fn add_block(
    tree: &BlockTree,
    kind: BlockType,
    parent_id: Option<&str>,
    index: Option<usize>,
) -> BlockResult<(BlockTree, BlockId)> {
    let mut block = Block::new(kind);
    block.parent = parent_id.map(str::to_string);
    insert_block(tree, block, index)
}

/// Add a fully built block, e.g. one taken from a template
pub fn insert_block(
    tree: &BlockTree,
    block: Block,
    index: Option<usize>,
) -> BlockResult<(BlockTree, BlockId)> {
    let mut next = tree.clone();
    let id = block.id.clone();
    next.insert(block, index)?;
    Ok((next, id))
}

/// Shallow-merge a partial update into a block's content and styles
pub fn update_block(tree: &BlockTree, id: &str, patch: &BlockPatch) -> BlockResult<BlockTree> {
    let mut next = tree.clone();
    next.update(id, patch)?;
    Ok(next)
}

/// Delete a block and all of its descendants.
///
/// Returns the ids of every removed block.
pub fn delete_block(tree: &BlockTree, id: &str) -> BlockResult<(BlockTree, Vec<BlockId>)> {
    let mut next = tree.clone();
    let removed = next
        .remove_subtree(id)?
        .into_iter()
        .map(|block| block.id)
        .collect();
    Ok((next, removed))
}

/// Move a block under a new parent (`None` = page root).
///
/// `index` is the position among the new siblings, counted after the block
/// has left its old position; `None` appends.
pub fn move_block(
    tree: &BlockTree,
    id: &str,
    new_parent_id: Option<&str>,
    index: Option<usize>,
) -> BlockResult<BlockTree> {
    let mut next = tree.clone();
    next.reparent(id, new_parent_id, index)?;
    Ok(next)
}

/// Replace the whole block collection after structural checks
pub fn replace_all(blocks: Vec<Block>) -> BlockResult<BlockTree> {
    BlockTree::from_blocks(blocks)
}

/// Collect content rule violations across the whole tree
pub fn validate_tree(tree: &BlockTree) -> BlockResult<()> {
    let problems: Vec<String> = tree
        .to_blocks()
        .iter()
        .filter_map(|block| match block.validate() {
            Err(BlockError::Validation(problems)) => Some(problems),
            _ => None,
        })
        .flatten()
        .collect();

    if problems.is_empty() {
        Ok(())
    } else {
        Err(BlockError::Validation(problems))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::block::BlockContent;
    use proptest::prelude::*;
    use serde_json::json;

    fn text_of(tree: &BlockTree, id: &str) -> String {
        match &tree.get(id).unwrap().content {
            BlockContent::Text(c) => c.text.clone(),
            other => panic!("not a text block: {:?}", other),
        }
    }

    #[test]
    fn test_container_with_text_scenario() {
        let empty = BlockTree::new();
        let (tree, c1) = add_block(&empty, BlockType::Container, None, None).unwrap();
        let (tree, t1) = add_block(&tree, BlockType::Text, Some(&c1), None).unwrap();

        let children: Vec<&str> = tree
            .children(&c1)
            .unwrap()
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(children, vec![t1.as_str()]);

        let roots: Vec<&str> = tree.roots().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(roots, vec![c1.as_str()]);

        let result = move_block(&tree, &c1, Some(&t1), Some(0));
        assert!(matches!(result, Err(BlockError::CycleDetected { .. })));
    }

    #[test]
    fn test_add_block_appends_by_default() {
        let (tree, a) = add_block(&BlockTree::new(), BlockType::Text, None, None).unwrap();
        let (tree, b) = add_block(&tree, BlockType::Image, None, None).unwrap();
        let (tree, c) = add_block(&tree, BlockType::Button, None, Some(1)).unwrap();

        let roots: Vec<&str> = tree.roots().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(roots, vec![a.as_str(), c.as_str(), b.as_str()]);
        assert_eq!(tree.get(&b).unwrap().order, 2.0);
    }

    #[test]
    fn test_add_block_under_leaf_fails_without_change() {
        let (tree, t) = add_block(&BlockTree::new(), BlockType::Text, None, None).unwrap();

        let result = add_block(&tree, BlockType::Text, Some(&t), None);
        assert_eq!(result.map(|_| ()), Err(BlockError::InvalidParent(t.clone())));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_update_block_merges_content() {
        let (tree, t) = add_block(&BlockTree::new(), BlockType::Text, None, None).unwrap();
        let next = update_block(&tree, &t, &BlockPatch::content(json!({ "text": "Hello" }))).unwrap();

        assert_eq!(text_of(&next, &t), "Hello");
        assert_eq!(text_of(&tree, &t), "Click to edit text");

        let missing = update_block(&tree, "nope", &BlockPatch::content(json!({ "text": "x" })));
        assert_eq!(missing, Err(BlockError::NotFound("nope".to_string())));
    }

    #[test]
    fn test_delete_block_removes_descendants() {
        let (tree, c) = add_block(&BlockTree::new(), BlockType::Container, None, None).unwrap();
        let (tree, inner) = add_block(&tree, BlockType::Container, Some(&c), None).unwrap();
        let (tree, leaf) = add_block(&tree, BlockType::Text, Some(&inner), None).unwrap();
        let (tree, other) = add_block(&tree, BlockType::Divider, None, None).unwrap();

        let (next, removed) = delete_block(&tree, &c).unwrap();

        assert_eq!(removed.len(), 3);
        assert!(removed.contains(&leaf));
        assert_eq!(next.len(), 1);
        assert!(next.contains(&other));
        assert!(next.iter().all(|b| b.children.is_empty()));
    }

    #[test]
    fn test_move_block_to_root() {
        let (tree, c) = add_block(&BlockTree::new(), BlockType::Container, None, None).unwrap();
        let (tree, t) = add_block(&tree, BlockType::Text, Some(&c), None).unwrap();

        let next = move_block(&tree, &t, None, Some(0)).unwrap();

        let roots: Vec<&str> = next.roots().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(roots, vec![t.as_str(), c.as_str()]);
        assert!(next.get(&c).unwrap().children.is_empty());
        assert_eq!(
            move_block(&tree, "ghost", None, None),
            Err(BlockError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_validate_tree_collects_all_problems() {
        let (tree, _) = add_block(&BlockTree::new(), BlockType::Image, None, None).unwrap();
        let (tree, _) = add_block(&tree, BlockType::Text, None, None).unwrap();
        let (tree, b) = add_block(&tree, BlockType::Button, None, None).unwrap();

        let tree = update_block(&tree, &b, &BlockPatch::content(json!({ "text": " " }))).unwrap();

        match validate_tree(&tree) {
            Err(BlockError::Validation(problems)) => assert_eq!(problems.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add { container: bool, parent: usize, index: usize },
        Move { block: usize, parent: Option<usize>, index: usize },
        Delete { block: usize },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<bool>(), 0..16usize, 0..4usize)
                .prop_map(|(container, parent, index)| Op::Add { container, parent, index }),
            (0..16usize, proptest::option::of(0..16usize), 0..4usize)
                .prop_map(|(block, parent, index)| Op::Move { block, parent, index }),
            (0..16usize).prop_map(|block| Op::Delete { block }),
        ]
    }

    fn pick(tree: &BlockTree, n: usize) -> Option<BlockId> {
        let mut ids: Vec<BlockId> = tree.iter().map(|b| b.id.clone()).collect();
        ids.sort();
        if ids.is_empty() {
            None
        } else {
            Some(ids[n % ids.len()].clone())
        }
    }

    fn assert_invariants(tree: &BlockTree) {
        for block in tree.iter() {
            assert!(!tree.is_descendant(&block.id, &block.id));

            if let Some(parent_id) = &block.parent {
                assert!(!tree.is_descendant(&block.id, parent_id));
                let parent = tree.get(parent_id).expect("parent exists");
                assert!(parent.is_container());
                assert!(parent.has_child(&block.id));
            }
            for child_id in &block.children {
                let child = tree.get(child_id).expect("child exists");
                assert_eq!(child.parent.as_ref(), Some(&block.id));
            }
        }

        let reachable = tree.roots().len()
            + tree
                .roots()
                .iter()
                .map(|r| tree.descendants(&r.id).len())
                .sum::<usize>();
        assert_eq!(reachable, tree.len());
    }

    proptest! {
        #[test]
        fn prop_operations_preserve_tree_invariants(ops in proptest::collection::vec(op_strategy(), 1..40)) {
            let mut tree = BlockTree::new();

            for op in ops {
                let result = match op {
                    Op::Add { container, parent, index } => {
                        let kind = if container { BlockType::Container } else { BlockType::Text };
                        let parent = pick(&tree, parent).filter(|_| parent % 3 != 0);
                        add_block(&tree, kind, parent.as_deref(), Some(index)).map(|(t, _)| t)
                    }
                    Op::Move { block, parent, index } => match pick(&tree, block) {
                        Some(id) => {
                            let parent = parent.and_then(|p| pick(&tree, p));
                            move_block(&tree, &id, parent.as_deref(), Some(index))
                        }
                        None => Ok(tree.clone()),
                    },
                    Op::Delete { block } => match pick(&tree, block) {
                        Some(id) => delete_block(&tree, &id).map(|(t, _)| t),
                        None => Ok(tree.clone()),
                    },
                };

                if let Ok(next) = result {
                    tree = next;
                }
                assert_invariants(&tree);
            }
        }
    }
}
