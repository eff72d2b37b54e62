//! Editor state and action dispatcher.
//!
//! [`EditorState::dispatch`] is the single entry point for changing the
//! document being edited. Every action is all-or-nothing: the new tree is
//! computed first and only swapped in once the operation has succeeded.

use tracing::debug;

use super::block::{Block, BlockPatch, BlockType};
use super::history::{History, HistoryConfig};
use super::operations;
use super::selection::Selection;
use super::tree::BlockTree;
use super::{BlockError, BlockId, BlockResult, Page, PageSettings};

const MAX_TITLE_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Everything that can happen to an editing session
#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    /// Load a page, resetting history and selection
    SetPage(Page),
    SelectBlock(Option<BlockId>),
    SetDraggedBlock(Option<BlockType>),
    AddBlock {
        kind: BlockType,
        parent_id: Option<BlockId>,
        index: Option<usize>,
    },
    UpdateBlock {
        id: BlockId,
        patch: BlockPatch,
    },
    DeleteBlock(BlockId),
    MoveBlock {
        id: BlockId,
        parent_id: Option<BlockId>,
        index: Option<usize>,
    },
    /// Swap in a whole block collection without touching history
    ReplaceAll(Vec<Block>),
    Undo,
    Redo,
    SetTitle(String),
    SetSettings(PageSettings),
    SetPublished(bool),
}

/// What a dispatched action did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing changed (undo/redo at the end of history)
    Unchanged,
    PageLoaded,
    SelectionChanged,
    Added(BlockId),
    Updated(BlockId),
    Deleted(Vec<BlockId>),
    Moved(BlockId),
    Replaced,
    Undone,
    Redone,
    MetadataChanged,
}

impl Outcome {
    /// Whether the block collection changed
    pub fn changed_blocks(&self) -> bool {
        matches!(
            self,
            Outcome::Added(_)
                | Outcome::Updated(_)
                | Outcome::Deleted(_)
                | Outcome::Moved(_)
                | Outcome::Replaced
                | Outcome::Undone
                | Outcome::Redone
        )
    }
}

/// State of one page editing session
#[derive(Debug, Clone)]
pub struct EditorState {
    /// Page metadata; `blocks` is kept empty, the tree is authoritative
    page: Page,
    tree: BlockTree,
    history: History,
    selection: Selection,
    history_config: HistoryConfig,
}

impl EditorState {
    /// Open a page for editing
    pub fn new(page: Page, history_config: HistoryConfig) -> BlockResult<Self> {
        let mut state = Self {
            page: Page::default(),
            tree: BlockTree::new(),
            history: History::new(BlockTree::new(), history_config),
            selection: Selection::new(),
            history_config,
        };
        state.load_page(page)?;
        Ok(state)
    }

    pub fn dispatch(&mut self, action: EditorAction) -> BlockResult<Outcome> {
        debug!("Dispatching {}", action_name(&action));

        match action {
            EditorAction::SetPage(page) => {
                self.load_page(page)?;
                Ok(Outcome::PageLoaded)
            }
            EditorAction::SelectBlock(id) => {
                self.selection.select(id.as_deref(), &self.tree)?;
                Ok(Outcome::SelectionChanged)
            }
            EditorAction::SetDraggedBlock(kind) => {
                self.selection.set_dragged(kind);
                Ok(Outcome::SelectionChanged)
            }
            EditorAction::AddBlock {
                kind,
                parent_id,
                index,
            } => {
                let (tree, id) =
                    operations::add_block(&self.tree, kind, parent_id.as_deref(), index)?;
                self.commit(tree);
                Ok(Outcome::Added(id))
            }
            EditorAction::UpdateBlock { id, patch } => {
                let tree = operations::update_block(&self.tree, &id, &patch)?;
                self.commit(tree);
                Ok(Outcome::Updated(id))
            }
            EditorAction::DeleteBlock(id) => {
                let (tree, removed) = operations::delete_block(&self.tree, &id)?;
                self.commit(tree);
                self.selection.clear_if_removed(&removed);
                Ok(Outcome::Deleted(removed))
            }
            EditorAction::MoveBlock {
                id,
                parent_id,
                index,
            } => {
                let tree = operations::move_block(&self.tree, &id, parent_id.as_deref(), index)?;
                self.commit(tree);
                Ok(Outcome::Moved(id))
            }
            EditorAction::ReplaceAll(blocks) => {
                self.tree = operations::replace_all(blocks)?;
                self.selection.retain_valid(&self.tree);
                Ok(Outcome::Replaced)
            }
            EditorAction::Undo => match self.history.undo() {
                Some(snapshot) => {
                    self.tree = snapshot.clone();
                    self.selection.retain_valid(&self.tree);
                    Ok(Outcome::Undone)
                }
                None => Ok(Outcome::Unchanged),
            },
            EditorAction::Redo => match self.history.redo() {
                Some(snapshot) => {
                    self.tree = snapshot.clone();
                    self.selection.retain_valid(&self.tree);
                    Ok(Outcome::Redone)
                }
                None => Ok(Outcome::Unchanged),
            },
            EditorAction::SetTitle(title) => {
                let problems = title_problems(&title);
                if !problems.is_empty() {
                    return Err(BlockError::Validation(problems));
                }
                self.page.title = title;
                Ok(Outcome::MetadataChanged)
            }
            EditorAction::SetSettings(settings) => {
                self.page.settings = settings;
                Ok(Outcome::MetadataChanged)
            }
            EditorAction::SetPublished(published) => {
                if published {
                    self.validate_for_publish()?;
                }
                self.page.is_published = published;
                Ok(Outcome::MetadataChanged)
            }
        }
    }

    /// Check page metadata and every block's content rules
    pub fn validate_for_publish(&self) -> BlockResult<()> {
        let mut problems = title_problems(&self.page.title);
        if self.page.description.chars().count() > MAX_DESCRIPTION_LEN {
            problems.push(format!(
                "Page description must be less than {} characters",
                MAX_DESCRIPTION_LEN
            ));
        }
        if let Err(BlockError::Validation(block_problems)) = operations::validate_tree(&self.tree) {
            problems.extend(block_problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BlockError::Validation(problems))
        }
    }

    pub fn tree(&self) -> &BlockTree {
        &self.tree
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn page_id(&self) -> &str {
        &self.page.id
    }

    /// Page metadata without blocks
    pub fn page_meta(&self) -> &Page {
        &self.page
    }

    /// The full page with the current block collection
    pub fn page(&self) -> Page {
        Page {
            blocks: self.tree.to_blocks(),
            ..self.page.clone()
        }
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.tree.to_blocks()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Record the newest server version seen for this page
    pub fn observe_version(&mut self, version: u64) {
        self.page.version = self.page.version.max(version);
    }

    fn load_page(&mut self, mut page: Page) -> BlockResult<()> {
        let blocks = std::mem::take(&mut page.blocks);
        let tree = BlockTree::from_blocks(blocks)?;

        self.history = History::new(tree.clone(), self.history_config);
        self.tree = tree;
        self.page = page;
        self.selection = Selection::new();
        Ok(())
    }

    fn commit(&mut self, tree: BlockTree) {
        self.history.commit(tree.clone());
        self.tree = tree;
    }
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            page: Page::default(),
            tree: BlockTree::new(),
            history: History::default(),
            selection: Selection::new(),
            history_config: HistoryConfig::default(),
        }
    }
}

fn title_problems(title: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if title.trim().is_empty() {
        problems.push("Page title is required".to_string());
    }
    if title.chars().count() > MAX_TITLE_LEN {
        problems.push(format!(
            "Page title must be less than {} characters",
            MAX_TITLE_LEN
        ));
    }
    problems
}

fn action_name(action: &EditorAction) -> &'static str {
    match action {
        EditorAction::SetPage(_) => "set-page",
        EditorAction::SelectBlock(_) => "select-block",
        EditorAction::SetDraggedBlock(_) => "set-dragged-block",
        EditorAction::AddBlock { .. } => "add-block",
        EditorAction::UpdateBlock { .. } => "update-block",
        EditorAction::DeleteBlock(_) => "delete-block",
        EditorAction::MoveBlock { .. } => "move-block",
        EditorAction::ReplaceAll(_) => "replace-all",
        EditorAction::Undo => "undo",
        EditorAction::Redo => "redo",
        EditorAction::SetTitle(_) => "set-title",
        EditorAction::SetSettings(_) => "set-settings",
        EditorAction::SetPublished(_) => "set-published",
    }
}
