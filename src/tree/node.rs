//! BlockNode: a detached, owned subtree
//!
//! This is the shape in which subtrees travel: operation payloads decode into
//! it, blocks detached from a tree come out as it, and persisted trees are
//! stored as the `BlockNode` of their root.

use super::block::{inline_text, BlockType, Inline, RefKind};
use super::id::{new_block_id, BlockId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An owned block together with all of its descendants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockNode {
    /// Empty when the producer left id assignment to the engine
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: BlockId,

    #[serde(rename = "type")]
    pub kind: BlockType,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inlines: Vec<Inline>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BlockNode>,
}

impl BlockNode {
    pub fn new(id: impl Into<BlockId>, kind: BlockType) -> Self {
        Self {
            id: id.into(),
            kind,
            attrs: BTreeMap::new(),
            inlines: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Empty document root
    pub fn document(id: impl Into<BlockId>) -> Self {
        Self::new(id, BlockType::Document)
    }

    /// Paragraph holding plain text
    pub fn paragraph(id: impl Into<BlockId>, text: &str) -> Self {
        let mut node = Self::new(id, BlockType::Paragraph);
        if !text.is_empty() {
            node.inlines.push(Inline::text(text));
        }
        node
    }

    /// Empty paragraph with a fresh id, used to keep list items non-empty
    pub fn placeholder() -> Self {
        Self::paragraph(new_block_id(), "")
    }

    pub fn heading(id: impl Into<BlockId>, level: u8, text: &str) -> Self {
        let mut node = Self::new(id, BlockType::Heading(level));
        node.inlines.push(Inline::text(text));
        node
    }

    pub fn with_child(mut self, child: BlockNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = BlockNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_inline(mut self, inline: Inline) -> Self {
        self.inlines.push(inline);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn text(&self) -> String {
        inline_text(&self.inlines)
    }

    /// Give every node of the subtree lacking an id a fresh one
    pub fn ensure_ids(&mut self) {
        if self.id.is_empty() {
            self.id = new_block_id();
        }
        for child in &mut self.children {
            child.ensure_ids();
        }
    }

    /// All ids of the subtree in pre-order
    pub fn ids(&self) -> Vec<BlockId> {
        let mut ids = Vec::new();
        self.walk(&mut |node| ids.push(node.id.clone()));
        ids
    }

    /// Definition ids referenced anywhere in the subtree
    pub fn referenced_defs(&self) -> Vec<(BlockId, RefKind)> {
        let mut refs = Vec::new();
        self.walk(&mut |node| {
            for inline in &node.inlines {
                if let Inline::Ref { def_id, kind, .. } = inline {
                    refs.push((def_id.clone(), *kind));
                }
            }
        });
        refs
    }

    /// Visit every node in pre-order
    pub fn walk<F: FnMut(&BlockNode)>(&self, f: &mut F) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn walk_mut<F: FnMut(&mut BlockNode)>(&mut self, f: &mut F) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }

    /// Find a node of the subtree by id
    pub fn find_mut(&mut self, id: &str) -> Option<&mut BlockNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    pub fn find(&self, id: &str) -> Option<&BlockNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}
