//! Block: a node of a document tree
//!
//! Blocks are stored in the [`Tree`](super::Tree) arena. Parent and child
//! links are ids into that arena and are only changed by the tree itself, so
//! a block can never end up with two parents.

use super::id::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute marking a folded heading or folded list item
pub const ATTR_FOLD: &str = "fold";
/// Attribute marking a block hidden under a folded heading
pub const ATTR_HEADING_FOLD: &str = "heading-fold";
/// Attribute holding the last-modified timestamp
pub const ATTR_UPDATED: &str = "updated";
/// Attribute listing the attribute views a block is bound to
pub const ATTR_BOUND_VIEWS: &str = "custom-avs";

/// Kind of list a list or list item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListKind {
    Bullet,
    Ordered,
    Task,
}

/// Type tag of a block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    Document,
    List(ListKind),
    ListItem(ListKind),
    Blockquote,
    SuperBlock,
    /// Heading with level 1..=6
    Heading(u8),
    /// Block embedding the attribute view with the given id
    AttributeView(String),
    Paragraph,
    CodeBlock,
    MathBlock,
    Table,
    ThematicBreak,
    Html,
    Embed,
    /// Layout marker, always the first child of a super block
    LayoutMarker,
    /// Checkbox marker, always the first child of a task list item
    TaskMarker,
}

impl BlockType {
    /// Whether blocks of this type own child blocks
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BlockType::Document
                | BlockType::List(_)
                | BlockType::ListItem(_)
                | BlockType::Blockquote
                | BlockType::SuperBlock
        )
    }

    /// Structural markers are children that carry no content
    pub fn is_marker(&self) -> bool {
        matches!(self, BlockType::LayoutMarker | BlockType::TaskMarker)
    }

    pub fn heading_level(&self) -> Option<u8> {
        match self {
            BlockType::Heading(level) => Some(*level),
            _ => None,
        }
    }

    pub fn list_kind(&self) -> Option<ListKind> {
        match self {
            BlockType::List(kind) | BlockType::ListItem(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, BlockType::List(_))
    }

    pub fn is_list_item(&self) -> bool {
        matches!(self, BlockType::ListItem(_))
    }

    pub fn is_task_item(&self) -> bool {
        matches!(self, BlockType::ListItem(ListKind::Task))
    }
}

/// How a reference displays its definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefKind {
    /// Anchor text chosen by the author
    Static,
    /// Anchor text mirrors the definition's live content
    Dynamic,
    /// Definition rendered in place
    Embed,
}

/// Inline content of a leaf block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Inline {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Ref {
        def_id: BlockId,
        text: String,
        kind: RefKind,
    },
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text { text: text.into() }
    }

    pub fn reference(def_id: impl Into<BlockId>, text: impl Into<String>, kind: RefKind) -> Self {
        Inline::Ref {
            def_id: def_id.into(),
            text: text.into(),
            kind,
        }
    }

    /// Displayed text of this inline
    pub fn as_str(&self) -> &str {
        match self {
            Inline::Text { text } | Inline::Ref { text, .. } => text,
        }
    }
}

/// A block stored in a tree arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockType,
    pub attrs: BTreeMap<String, String>,
    pub inlines: Vec<Inline>,
    pub(crate) parent: Option<BlockId>,
    pub(crate) children: Vec<BlockId>,
}

impl Block {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        self.attrs.remove(key)
    }

    pub fn parent(&self) -> Option<&BlockId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }

    /// `fold=1` on a heading
    pub fn is_folded_heading(&self) -> bool {
        self.kind.heading_level().is_some() && self.attr(ATTR_FOLD) == Some("1")
    }

    /// Concatenated inline text
    pub fn text(&self) -> String {
        inline_text(&self.inlines)
    }

    /// References made by this block's own inline content
    pub fn references(&self) -> impl Iterator<Item = (&BlockId, RefKind)> {
        self.inlines.iter().filter_map(|inline| match inline {
            Inline::Ref { def_id, kind, .. } => Some((def_id, *kind)),
            Inline::Text { .. } => None,
        })
    }

    /// Attribute views this block is bound to as a row
    pub fn bound_views(&self) -> Vec<String> {
        parse_bound_views(self.attr(ATTR_BOUND_VIEWS))
    }

    pub fn set_bound_views(&mut self, views: &[String]) {
        set_bound_views_attr(&mut self.attrs, views);
    }
}

pub(crate) fn inline_text(inlines: &[Inline]) -> String {
    inlines.iter().map(Inline::as_str).collect()
}

fn parse_bound_views(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn set_bound_views_attr(attrs: &mut BTreeMap<String, String>, views: &[String]) {
    if views.is_empty() {
        attrs.remove(ATTR_BOUND_VIEWS);
    } else {
        attrs.insert(ATTR_BOUND_VIEWS.to_string(), views.join(","));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(inlines: Vec<Inline>) -> Block {
        Block {
            id: "b".into(),
            kind: BlockType::Paragraph,
            attrs: BTreeMap::new(),
            inlines,
            parent: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_block_text_and_references() {
        let block = leaf(vec![
            Inline::text("see "),
            Inline::reference("def-1", "Intro", RefKind::Dynamic),
            Inline::text(" and "),
            Inline::reference("def-2", "", RefKind::Embed),
        ]);
        assert_eq!(block.text(), "see Intro and ");
        let refs: Vec<_> = block.references().collect();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], (&"def-1".to_string(), RefKind::Dynamic));
    }

    #[test]
    fn test_bound_views_roundtrip() {
        let mut block = leaf(Vec::new());
        assert!(block.bound_views().is_empty());
        block.set_bound_views(&["av1".to_string(), "av2".to_string()]);
        assert_eq!(block.attr(ATTR_BOUND_VIEWS), Some("av1,av2"));
        block.set_bound_views(&[]);
        assert_eq!(block.attr(ATTR_BOUND_VIEWS), None);
    }

    #[test]
    fn test_type_serialization_shape() {
        let json = serde_json::to_string(&BlockType::Heading(2)).unwrap();
        assert_eq!(json, r#"{"heading":2}"#);
        let json = serde_json::to_string(&BlockType::Paragraph).unwrap();
        assert_eq!(json, r#""paragraph""#);
        let kind: BlockType = serde_json::from_str(r#"{"listItem":"task"}"#).unwrap();
        assert!(kind.is_task_item());
    }

    #[test]
    fn test_folded_heading() {
        let mut block = leaf(Vec::new());
        block.kind = BlockType::Heading(1);
        assert!(!block.is_folded_heading());
        block.set_attr(ATTR_FOLD, "1");
        assert!(block.is_folded_heading());
    }
}
