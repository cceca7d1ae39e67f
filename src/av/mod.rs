//! Attribute views: lightweight databases bound to blocks
//!
//! An [`AttributeView`] is a set of typed columns ([`Key`]s) and rows. Each
//! row is bound to a block by id; the block in turn lists the views it is
//! bound to in its `custom-avs` attribute. Relation columns point at rows of
//! another view, which keeps a paired back-reference column.

mod relation;

pub use relation::{recompute_rollups, sync_back_relation};

use crate::tree::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of an attribute view
pub type ViewId = String;

/// Identifier of a column
pub type KeyId = String;

/// Id of the primary key every view starts with
pub const PRIMARY_KEY_ID: &str = "block";

/// Column type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyType {
    /// Primary column: the bound block itself
    Block,
    Text,
    Number,
    Select,
    /// Rows of another view; `back_key_id` names the paired column there
    #[serde(rename_all = "camelCase")]
    Relation {
        av_id: ViewId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        back_key_id: Option<KeyId>,
    },
    /// Values of `target_key_id` gathered through relation `relation_key_id`
    #[serde(rename_all = "camelCase")]
    Rollup {
        relation_key_id: KeyId,
        target_key_id: KeyId,
    },
}

/// A column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    pub id: KeyId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: KeyType,
}

impl Key {
    pub fn new(id: impl Into<KeyId>, name: impl Into<String>, kind: KeyType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, KeyType::Relation { .. })
    }
}

/// Cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    Text(String),
    Number(f64),
    Select(String),
    /// Block ids of related rows
    Relation(Vec<BlockId>),
    /// Computed by the relation sync
    Rollup(Vec<String>),
}

impl Value {
    /// Plain-text rendering used for grouping and rollups
    pub fn display(&self) -> String {
        match self {
            Value::Text(text) | Value::Select(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Relation(ids) => ids.join(","),
            Value::Rollup(values) => values.join(","),
        }
    }

    pub fn relation_ids(&self) -> &[BlockId] {
        match self {
            Value::Relation(ids) => ids,
            _ => &[],
        }
    }
}

/// A row bound to a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub block_id: BlockId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<KeyId, Value>,
}

/// Rows sharing one value of the group-by key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub value: String,
    pub block_ids: Vec<BlockId>,
}

/// A typed row/column structure bound to blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeView {
    pub id: ViewId,
    pub name: String,
    pub keys: Vec<Key>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<KeyId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
}

impl AttributeView {
    /// Create an empty view with only the primary key
    pub fn new(id: impl Into<ViewId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            keys: vec![Key::new(PRIMARY_KEY_ID, "Block", KeyType::Block)],
            rows: Vec::new(),
            group_by: None,
            groups: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.keys.push(key);
        self
    }

    pub fn key(&self, key_id: &str) -> Option<&Key> {
        self.keys.iter().find(|key| key.id == key_id)
    }

    pub fn row(&self, block_id: &str) -> Option<&Row> {
        self.rows.iter().find(|row| row.block_id == block_id)
    }

    pub fn row_mut(&mut self, block_id: &str) -> Option<&mut Row> {
        self.rows.iter_mut().find(|row| row.block_id == block_id)
    }

    pub fn has_row(&self, block_id: &str) -> bool {
        self.row(block_id).is_some()
    }

    /// Block ids of all rows in row order
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.rows.iter().map(|row| row.block_id.clone()).collect()
    }

    /// Bind `block_id` as a new row; returns false if it was already bound
    pub fn add_row(&mut self, block_id: &str) -> bool {
        if self.has_row(block_id) {
            return false;
        }
        self.rows.push(Row {
            block_id: block_id.to_string(),
            values: BTreeMap::new(),
        });
        true
    }

    pub fn remove_row(&mut self, block_id: &str) -> Option<Row> {
        let index = self.rows.iter().position(|row| row.block_id == block_id)?;
        Some(self.rows.remove(index))
    }

    /// Set a cell; returns false if the row or the key does not exist
    ///
    /// The primary key and rollups are not settable.
    pub fn set_value(&mut self, block_id: &str, key_id: &str, value: Option<Value>) -> bool {
        match self.key(key_id).map(|key| &key.kind) {
            None | Some(KeyType::Block) | Some(KeyType::Rollup { .. }) => return false,
            Some(_) => {}
        }
        let Some(row) = self.row_mut(block_id) else {
            return false;
        };
        match value {
            Some(value) => {
                row.values.insert(key_id.to_string(), value);
            }
            None => {
                row.values.remove(key_id);
            }
        }
        true
    }

    pub fn relation_keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter().filter(|key| key.is_relation())
    }

    /// Rebuild `groups` from the group-by key, keeping first-seen order
    pub fn regenerate_groups(&mut self) {
        self.groups.clear();
        let Some(group_by) = self.group_by.clone() else {
            return;
        };
        for row in &self.rows {
            let value = row
                .values
                .get(&group_by)
                .map(Value::display)
                .unwrap_or_default();
            match self.groups.iter_mut().find(|group| group.value == value) {
                Some(group) => group.block_ids.push(row.block_id.clone()),
                None => self.groups.push(Group {
                    value,
                    block_ids: vec![row.block_id.clone()],
                }),
            }
        }
    }
}
