//! Operations: the records a transaction is made of
//!
//! An operation names an action, a target block and, for placing actions,
//! one anchor. It is immutable once built; handlers read it and record their
//! results in the transaction, never in the operation.

use crate::tree::{BlockId, BlockNode};
use serde::{Deserialize, Serialize};

/// Operation kind
///
/// Tags that this build does not know deserialize to [`Action::Unknown`] and
/// are skipped by the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create,
    Insert,
    PrependInsert,
    AppendInsert,
    Delete,
    Move,
    Append,
    Update,
    FoldHeading,
    UnfoldHeading,
    InsertAttrViewBlock,
    RemoveAttrViewBlock,
    UpdateAttrViewCell,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Actions that add a payload subtree relative to an anchor
    pub fn is_insert(self) -> bool {
        matches!(
            self,
            Action::Insert | Action::PrependInsert | Action::AppendInsert
        )
    }
}

/// Where a placing operation targets
///
/// When several anchor fields are set, previous wins over next, and next
/// over parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor<'a> {
    /// Place right after this block
    Previous(&'a str),
    /// Place right before this block
    Next(&'a str),
    /// Place inside this block (or after it when it is a leaf)
    Parent(&'a str),
}

impl<'a> Anchor<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Anchor::Previous(id) | Anchor::Next(id) | Anchor::Parent(id) => id,
        }
    }
}

/// Side of a parent anchor's children an insert lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Prepend,
    Append,
}

/// One entry of a transaction's operation list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub action: Action,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: BlockId,

    #[serde(rename = "parentID", default, skip_serializing_if = "String::is_empty")]
    pub parent_id: BlockId,

    #[serde(rename = "previousID", default, skip_serializing_if = "String::is_empty")]
    pub previous_id: BlockId,

    #[serde(rename = "nextID", default, skip_serializing_if = "String::is_empty")]
    pub next_id: BlockId,

    /// Attribute view targeted by the attribute-view actions
    #[serde(rename = "avID", default, skip_serializing_if = "String::is_empty")]
    pub av_id: String,

    /// Column targeted by `updateAttrViewCell`
    #[serde(rename = "keyID", default, skip_serializing_if = "String::is_empty")]
    pub key_id: String,

    /// Blocks bound or unbound by the attribute-view row actions
    #[serde(rename = "srcIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub src_ids: Vec<BlockId>,

    /// Storage location of the document made by `create`
    #[serde(rename = "box", default, skip_serializing_if = "String::is_empty")]
    pub box_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Edit time stamped into `updated`; the engine clock is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Operation {
    pub fn new(action: Action, id: impl Into<BlockId>) -> Self {
        Self {
            action,
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn insert_after(previous: impl Into<BlockId>, node: &BlockNode) -> Self {
        Self::new(Action::Insert, node.id.clone())
            .previous(previous)
            .with_node(node)
    }

    pub fn prepend_to(parent: impl Into<BlockId>, node: &BlockNode) -> Self {
        Self::new(Action::PrependInsert, node.id.clone())
            .parent(parent)
            .with_node(node)
    }

    pub fn append_to(parent: impl Into<BlockId>, node: &BlockNode) -> Self {
        Self::new(Action::AppendInsert, node.id.clone())
            .parent(parent)
            .with_node(node)
    }

    pub fn delete(id: impl Into<BlockId>) -> Self {
        Self::new(Action::Delete, id)
    }

    pub fn update(node: &BlockNode) -> Self {
        Self::new(Action::Update, node.id.clone()).with_node(node)
    }

    pub fn previous(mut self, id: impl Into<BlockId>) -> Self {
        self.previous_id = id.into();
        self
    }

    pub fn next(mut self, id: impl Into<BlockId>) -> Self {
        self.next_id = id.into();
        self
    }

    pub fn parent(mut self, id: impl Into<BlockId>) -> Self {
        self.parent_id = id.into();
        self
    }

    pub fn at(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Use `node` as the payload
    ///
    /// A node that cannot be encoded leaves the payload empty, which the
    /// handlers report as an invalid payload.
    pub fn with_node(mut self, node: &BlockNode) -> Self {
        self.data = serde_json::to_value(node).ok();
        self
    }

    /// Anchor of a placing operation, if any field is set
    pub fn anchor(&self) -> Option<Anchor<'_>> {
        if !self.previous_id.is_empty() {
            Some(Anchor::Previous(&self.previous_id))
        } else if !self.next_id.is_empty() {
            Some(Anchor::Next(&self.next_id))
        } else if !self.parent_id.is_empty() {
            Some(Anchor::Parent(&self.parent_id))
        } else {
            None
        }
    }
}
