//! Block records and their type-specific content.
//!
//! The wire shape of a block is the flat record shared with the backend and
//! with collaborating peers:
//!
//! ```json
//! { "id": "block_…", "type": "text", "content": { … }, "styles": { … },
//!   "children": ["…"], "parent": "…", "order": 0 }
//! ```
//!
//! In memory the `type`/`content` pair is a single [`BlockContent`] sum type,
//! so a block's type can never disagree with the shape of its content.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use super::{BlockError, BlockId, BlockResult};

/// Presentation properties, opaque to the document model
pub type Styles = Map<String, Value>;

/// The closed set of block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Text,
    Image,
    Button,
    Container,
    Form,
    Divider,
    Card,
    List,
}

impl BlockType {
    pub const ALL: [BlockType; 8] = [
        BlockType::Text,
        BlockType::Image,
        BlockType::Button,
        BlockType::Container,
        BlockType::Form,
        BlockType::Divider,
        BlockType::Card,
        BlockType::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Text => "text",
            BlockType::Image => "image",
            BlockType::Button => "button",
            BlockType::Container => "container",
            BlockType::Form => "form",
            BlockType::Divider => "divider",
            BlockType::Card => "card",
            BlockType::List => "list",
        }
    }

    /// Human-readable name shown in the block palette
    pub fn display_name(&self) -> &'static str {
        match self {
            BlockType::Text => "Text",
            BlockType::Image => "Image",
            BlockType::Button => "Button",
            BlockType::Container => "Container",
            BlockType::Form => "Form",
            BlockType::Divider => "Divider",
            BlockType::Card => "Card",
            BlockType::List => "List",
        }
    }

    /// Palette category
    pub fn category(&self) -> &'static str {
        match self {
            BlockType::Text | BlockType::Card | BlockType::List => "Content",
            BlockType::Image => "Media",
            BlockType::Button | BlockType::Form => "Interactive",
            BlockType::Container | BlockType::Divider => "Layout",
        }
    }

    /// Only containers may hold children
    pub fn can_contain_children(&self) -> bool {
        matches!(self, BlockType::Container)
    }

    /// Default styles for a freshly created block of this type
    pub fn default_styles(&self) -> Styles {
        let value = match self {
            BlockType::Text => json!({
                "fontSize": "16px",
                "color": "#000000",
                "backgroundColor": "transparent",
                "padding": "0",
                "margin": "0",
                "fontFamily": "Inter, sans-serif",
                "lineHeight": "1.5",
                "textAlign": "left",
            }),
            BlockType::Image => json!({
                "borderRadius": "0px",
                "objectFit": "cover",
                "opacity": 1,
                "filter": "none",
                "boxShadow": "none",
            }),
            BlockType::Button => json!({
                "backgroundColor": "#3b82f6",
                "color": "#ffffff",
                "borderColor": "#3b82f6",
                "borderRadius": "6px",
                "padding": "8px 16px",
                "fontSize": "16px",
                "fontWeight": "500",
                "border": "1px solid #3b82f6",
                "cursor": "pointer",
                "transition": "all 0.2s",
            }),
            BlockType::Container => json!({
                "padding": "16px",
                "margin": "0",
                "borderRadius": "0px",
                "border": "none",
                "backgroundColor": "transparent",
                "minHeight": "auto",
                "display": "block",
                "flexDirection": "column",
                "justifyContent": "flex-start",
                "alignItems": "stretch",
                "gap": "0px",
            }),
            BlockType::Form => json!({
                "padding": "20px",
                "margin": "0",
                "borderRadius": "8px",
                "backgroundColor": "#ffffff",
                "border": "1px solid #e5e7eb",
                "boxShadow": "none",
            }),
            BlockType::Divider => json!({
                "color": "#e5e7eb",
                "width": "100%",
                "height": "1px",
                "margin": "16px 0",
            }),
            BlockType::Card => json!({
                "padding": "16px",
                "margin": "0",
                "borderRadius": "8px",
                "border": "1px solid #e5e7eb",
                "backgroundColor": "#ffffff",
                "boxShadow": "0 1px 3px rgba(0, 0, 0, 0.1)",
                "overflow": "hidden",
            }),
            BlockType::List => json!({
                "padding": "0",
                "margin": "0",
                "listStyleType": "disc",
                "listStylePosition": "inside",
            }),
        };

        match value {
            Value::Object(map) => map,
            _ => Styles::new(),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTag {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    P,
    Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextFormatting {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
    pub tag: TextTag,
    pub alignment: Alignment,
    #[serde(default)]
    pub formatting: TextFormatting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub src: String,
    pub alt: String,
    pub alignment: Alignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkTarget {
    #[serde(rename = "_self")]
    SameWindow,
    #[serde(rename = "_blank")]
    NewWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonVariant {
    Primary,
    Secondary,
    Outline,
    Ghost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonContent {
    pub text: String,
    pub link: String,
    pub target: LinkTarget,
    pub variant: ButtonVariant,
}

/// Container payload.
///
/// `children` mirrors the historical content shape only; the block's own
/// `children` list is authoritative for structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default)]
    pub children: Vec<BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Password,
    Textarea,
    Select,
    Checkbox,
    Radio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Choices for select and radio fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormContent {
    pub action: String,
    pub method: FormMethod,
    #[serde(default)]
    pub fields: Vec<FormField>,
    pub submit_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DividerDirection {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DividerContent {
    pub direction: DividerDirection,
    pub style: LineStyle,
    pub thickness: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardLayout {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardContent {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_link: Option<String>,
    pub layout: CardLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListContent {
    #[serde(rename = "type")]
    pub kind: ListKind,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullet_style: Option<String>,
}

/// Type-specific payload of a block
#[derive(Debug, Clone, PartialEq)]
pub enum BlockContent {
    Text(TextContent),
    Image(ImageContent),
    Button(ButtonContent),
    Container(ContainerContent),
    Form(FormContent),
    Divider(DividerContent),
    Card(CardContent),
    List(ListContent),
}

impl BlockContent {
    /// Default content for a freshly created block
    pub fn default_for(kind: BlockType) -> Self {
        match kind {
            BlockType::Text => BlockContent::Text(TextContent {
                text: "Click to edit text".to_string(),
                tag: TextTag::P,
                alignment: Alignment::Left,
                formatting: TextFormatting::default(),
            }),
            BlockType::Image => BlockContent::Image(ImageContent {
                src: String::new(),
                alt: "Image".to_string(),
                alignment: Alignment::Center,
                width: Some("100%".to_string()),
                height: Some("auto".to_string()),
            }),
            BlockType::Button => BlockContent::Button(ButtonContent {
                text: "Click me".to_string(),
                link: "#".to_string(),
                target: LinkTarget::SameWindow,
                variant: ButtonVariant::Primary,
            }),
            BlockType::Container => BlockContent::Container(ContainerContent {
                background_color: Some("transparent".to_string()),
                background_image: None,
                children: Vec::new(),
            }),
            BlockType::Form => BlockContent::Form(FormContent {
                action: "#".to_string(),
                method: FormMethod::Post,
                fields: vec![FormField {
                    id: generate_field_id(),
                    field_type: FieldType::Text,
                    name: "name".to_string(),
                    label: "Name".to_string(),
                    placeholder: Some("Enter your name".to_string()),
                    required: true,
                    options: None,
                }],
                submit_text: "Submit".to_string(),
            }),
            BlockType::Divider => BlockContent::Divider(DividerContent {
                direction: DividerDirection::Horizontal,
                style: LineStyle::Solid,
                thickness: "1px".to_string(),
            }),
            BlockType::Card => BlockContent::Card(CardContent {
                title: "Card Title".to_string(),
                description: "Card description goes here".to_string(),
                image: Some(String::new()),
                button_text: Some("Learn More".to_string()),
                button_link: Some("#".to_string()),
                layout: CardLayout::Vertical,
                items: None,
            }),
            BlockType::List => BlockContent::List(ListContent {
                kind: ListKind::Unordered,
                items: vec![
                    "Item 1".to_string(),
                    "Item 2".to_string(),
                    "Item 3".to_string(),
                ],
                bullet_style: Some("disc".to_string()),
            }),
        }
    }

    /// The block type this payload belongs to
    pub fn kind(&self) -> BlockType {
        match self {
            BlockContent::Text(_) => BlockType::Text,
            BlockContent::Image(_) => BlockType::Image,
            BlockContent::Button(_) => BlockType::Button,
            BlockContent::Container(_) => BlockType::Container,
            BlockContent::Form(_) => BlockType::Form,
            BlockContent::Divider(_) => BlockType::Divider,
            BlockContent::Card(_) => BlockType::Card,
            BlockContent::List(_) => BlockType::List,
        }
    }

    /// Decode a wire payload for the given type. A missing payload yields the
    /// type's default content.
    pub fn from_value(kind: BlockType, value: Value) -> BlockResult<Self> {
        if value.is_null() {
            return Ok(Self::default_for(kind));
        }

        let decoded = match kind {
            BlockType::Text => serde_json::from_value(value).map(BlockContent::Text),
            BlockType::Image => serde_json::from_value(value).map(BlockContent::Image),
            BlockType::Button => serde_json::from_value(value).map(BlockContent::Button),
            BlockType::Container => serde_json::from_value(value).map(BlockContent::Container),
            BlockType::Form => serde_json::from_value(value).map(BlockContent::Form),
            BlockType::Divider => serde_json::from_value(value).map(BlockContent::Divider),
            BlockType::Card => serde_json::from_value(value).map(BlockContent::Card),
            BlockType::List => serde_json::from_value(value).map(BlockContent::List),
        };

        decoded.map_err(|e| BlockError::validation(format!("invalid {} content: {}", kind, e)))
    }

    /// Encode to the wire payload
    pub fn to_value(&self) -> Value {
        let encoded = match self {
            BlockContent::Text(c) => serde_json::to_value(c),
            BlockContent::Image(c) => serde_json::to_value(c),
            BlockContent::Button(c) => serde_json::to_value(c),
            BlockContent::Container(c) => serde_json::to_value(c),
            BlockContent::Form(c) => serde_json::to_value(c),
            BlockContent::Divider(c) => serde_json::to_value(c),
            BlockContent::Card(c) => serde_json::to_value(c),
            BlockContent::List(c) => serde_json::to_value(c),
        };
        // Plain structs with string keys always serialize
        encoded.unwrap_or(Value::Null)
    }

    /// Content rules a block must satisfy before it is published
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let blank = |s: &str| s.trim().is_empty();

        match self {
            BlockContent::Text(c) => {
                if blank(&c.text) {
                    problems.push("Text content is required".to_string());
                }
            }
            BlockContent::Image(c) => {
                if blank(&c.src) {
                    problems.push("Image source is required".to_string());
                }
                if blank(&c.alt) {
                    problems.push("Image alt text is required".to_string());
                }
            }
            BlockContent::Button(c) => {
                if blank(&c.text) {
                    problems.push("Button text is required".to_string());
                }
                if blank(&c.link) {
                    problems.push("Button link is required".to_string());
                }
            }
            BlockContent::Form(c) => {
                if blank(&c.action) {
                    problems.push("Form action is required".to_string());
                }
                if c.fields.is_empty() {
                    problems.push("At least one form field is required".to_string());
                }
            }
            BlockContent::List(c) => {
                if c.items.is_empty() {
                    problems.push("At least one list item is required".to_string());
                }
            }
            BlockContent::Card(c) => {
                if blank(&c.title) {
                    problems.push("Card title is required".to_string());
                }
                if blank(&c.description) {
                    problems.push("Card description is required".to_string());
                }
            }
            BlockContent::Container(_) | BlockContent::Divider(_) => {}
        }

        problems
    }
}

/// A single content unit on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub struct Block {
    /// Immutable identifier
    pub id: BlockId,
    /// Type-specific payload; fixes the block's type
    pub content: BlockContent,
    pub styles: Styles,
    /// Owning block, `None` for root blocks
    pub parent: Option<BlockId>,
    /// Ordered child ids (containers only)
    pub children: Vec<BlockId>,
    /// Sort key among siblings
    pub order: f64,
}

impl Block {
    /// Create a block with a fresh id and the type's default content and styles
    pub fn new(kind: BlockType) -> Self {
        Self::with_id(generate_block_id(), kind)
    }

    pub fn with_id(id: impl Into<String>, kind: BlockType) -> Self {
        Self {
            id: id.into(),
            content: BlockContent::default_for(kind),
            styles: kind.default_styles(),
            parent: None,
            children: Vec::new(),
            order: 0.0,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent = Some(parent_id.into());
        self
    }

    pub fn with_order(mut self, order: f64) -> Self {
        self.order = order;
        self
    }

    pub fn kind(&self) -> BlockType {
        self.content.kind()
    }

    pub fn is_container(&self) -> bool {
        self.kind().can_contain_children()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Add a child id (no-op if already present)
    pub fn add_child(&mut self, child_id: impl Into<String>) {
        let child_id = child_id.into();
        if !self.children.contains(&child_id) {
            self.children.push(child_id);
        }
    }

    /// Remove a child id
    pub fn remove_child(&mut self, child_id: &str) -> bool {
        let before = self.children.len();
        self.children.retain(|id| id != child_id);
        self.children.len() < before
    }

    pub fn has_child(&self, child_id: &str) -> bool {
        self.children.iter().any(|id| id == child_id)
    }

    /// Apply a partial update, shallow-merging each namespace.
    ///
    /// The block is left untouched if the merged content does not fit its type.
    pub fn apply_patch(&mut self, patch: &BlockPatch) -> BlockResult<()> {
        let content = match &patch.content {
            Some(Value::Object(changes)) => {
                let mut merged = match self.content.to_value() {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                for (key, value) in changes {
                    merged.insert(key.clone(), value.clone());
                }
                Some(BlockContent::from_value(self.kind(), Value::Object(merged))?)
            }
            Some(_) => return Err(BlockError::validation("content update must be an object")),
            None => None,
        };

        if let Some(content) = content {
            self.content = content;
        }
        if let Some(styles) = &patch.styles {
            for (key, value) in styles {
                self.styles.insert(key.clone(), value.clone());
            }
        }

        Ok(())
    }

    /// Check the content rules for this block's type
    pub fn validate(&self) -> BlockResult<()> {
        let problems = self.content.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(BlockError::Validation(
                problems
                    .into_iter()
                    .map(|p| format!("{}: {}", self.id, p))
                    .collect(),
            ))
        }
    }
}

/// Partial update for a block's content and styles
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<Styles>,
}

impl BlockPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch content fields, e.g. `json!({"text": "Hello"})`
    pub fn content(value: Value) -> Self {
        Self::new().with_content(value)
    }

    /// Patch style properties
    pub fn styles(value: Value) -> Self {
        Self::new().with_styles(value)
    }

    pub fn with_content(mut self, value: Value) -> Self {
        self.content = Some(value);
        self
    }

    pub fn with_styles(mut self, value: Value) -> Self {
        self.styles = match value {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.styles.is_none()
    }
}

/// Flat wire representation of a block
#[derive(Serialize, Deserialize)]
struct RawBlock {
    id: BlockId,
    #[serde(rename = "type")]
    kind: BlockType,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    styles: Styles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<BlockId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<BlockId>,
    #[serde(default)]
    order: f64,
}

impl TryFrom<RawBlock> for Block {
    type Error = BlockError;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        Ok(Block {
            content: BlockContent::from_value(raw.kind, raw.content)?,
            id: raw.id,
            styles: raw.styles,
            parent: raw.parent,
            children: raw.children.unwrap_or_default(),
            order: raw.order,
        })
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        let kind = block.kind();
        let children = if kind.can_contain_children() || !block.children.is_empty() {
            Some(block.children)
        } else {
            None
        };

        RawBlock {
            id: block.id,
            kind,
            content: block.content.to_value(),
            styles: block.styles,
            children,
            parent: block.parent,
            order: block.order,
        }
    }
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Generate a unique block id (`block_<ms>_<suffix>`)
pub fn generate_block_id() -> BlockId {
    format!(
        "block_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        random_suffix(9)
    )
}

/// Generate a unique form field id (`field_<ms>_<suffix>`)
pub fn generate_field_id() -> String {
    format!(
        "field_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        random_suffix(9)
    )
}
