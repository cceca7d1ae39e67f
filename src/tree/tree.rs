//! Tree: arena of blocks rooted at a document
//!
//! Blocks live in a `HashMap` keyed by id; structure is expressed through
//! parent/children id links that only `attach` and `detach` modify. Subtrees
//! enter and leave the arena as owned [`BlockNode`]s, so a block moved between
//! two trees is removed from the first before the second can accept it.
//!
//! # Example
//!
//! ```rust
//! use blocktx_core::tree::{BlockNode, Tree};
//!
//! let root = BlockNode::document("root").with_child(BlockNode::paragraph("p1", "Hello"));
//! let mut tree = Tree::new("box", "/root.sy", root).unwrap();
//!
//! tree.insert_after("p1", BlockNode::paragraph("p2", "World")).unwrap();
//! assert_eq!(tree.children("root"), ["p1".to_string(), "p2".to_string()]);
//!
//! let detached = tree.detach("p1").unwrap();
//! assert_eq!(detached.text(), "Hello");
//! assert!(!tree.contains("p1"));
//! ```

use super::block::Block;
use super::id::BlockId;
use super::node::BlockNode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Structural violation detected by the arena
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("block [{0}] not found in tree")]
    NotFound(BlockId),

    /// A subtree reused an id that already lives in the tree
    #[error("block [{0}] already exists in tree")]
    DuplicateId(BlockId),

    #[error("block without id")]
    MissingId,

    #[error("root block [{0}] cannot be detached")]
    DetachRoot(BlockId),

    #[error("block [{0}] has no parent")]
    NoParent(BlockId),
}

/// A rooted block graph with its storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    root: BlockId,
    box_id: String,
    path: String,
    nodes: HashMap<BlockId, Block>,
}

impl Tree {
    /// Build a tree from its root node; missing ids are generated
    pub fn new(
        box_id: impl Into<String>,
        path: impl Into<String>,
        mut root: BlockNode,
    ) -> Result<Self, TreeError> {
        root.ensure_ids();
        let mut tree = Self {
            root: root.id.clone(),
            box_id: box_id.into(),
            path: path.into(),
            nodes: HashMap::new(),
        };
        tree.check_ids(&root)?;
        tree.graft(None, root);
        Ok(tree)
    }

    /// Id of the root block; never changes under structural edits
    pub fn root_id(&self) -> &BlockId {
        &self.root
    }

    pub fn box_id(&self) -> &str {
        &self.box_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Block> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.nodes.get_mut(id)
    }

    pub fn root(&self) -> Option<&Block> {
        self.nodes.get(&self.root)
    }

    /// All blocks in arbitrary order
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &BlockId> {
        self.nodes.keys()
    }

    pub fn parent_id(&self, id: &str) -> Option<&BlockId> {
        self.nodes.get(id).and_then(|block| block.parent.as_ref())
    }

    pub fn parent(&self, id: &str) -> Option<&Block> {
        self.parent_id(id).and_then(|parent| self.nodes.get(parent))
    }

    pub fn children(&self, id: &str) -> &[BlockId] {
        self.nodes
            .get(id)
            .map(|block| block.children.as_slice())
            .unwrap_or(&[])
    }

    /// Children that are not structural markers
    pub fn content_children(&self, id: &str) -> Vec<&BlockId> {
        self.children(id)
            .iter()
            .filter(|child| {
                self.nodes
                    .get(child.as_str())
                    .is_some_and(|block| !block.kind.is_marker())
            })
            .collect()
    }

    pub fn index_in_parent(&self, id: &str) -> Option<usize> {
        let parent = self.parent_id(id)?;
        self.children(parent).iter().position(|child| child == id)
    }

    pub fn next_sibling(&self, id: &str) -> Option<&BlockId> {
        let parent = self.parent_id(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1)
    }

    pub fn previous_sibling(&self, id: &str) -> Option<&BlockId> {
        let parent = self.parent_id(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|prev| self.children(parent).get(prev))
    }

    /// Parent chain of `id`, nearest first, ending at the root
    pub fn ancestors(&self, id: &str) -> Vec<BlockId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent_id(id);
        while let Some(parent) = current {
            ancestors.push(parent.clone());
            current = self.parent_id(parent);
        }
        ancestors
    }

    /// `id` and all of its descendants in pre-order
    pub fn descendants(&self, id: &str) -> Vec<BlockId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            for child in self.children(&current).iter().rev() {
                stack.push(child.clone());
            }
            out.push(current);
        }
        out
    }

    /// Whether `ancestor` is `node` itself or one of its ancestors
    pub fn is_self_or_ancestor(&self, ancestor: &str, node: &str) -> bool {
        if ancestor == node {
            return true;
        }
        let mut current = self.parent_id(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_id(parent);
        }
        false
    }

    /// First leaf block below `id`, skipping markers
    pub fn first_leaf(&self, id: &str) -> Option<&Block> {
        let mut block = self.nodes.get(id)?;
        while block.is_container() {
            let first = self.content_children(&block.id).into_iter().next()?;
            block = self.nodes.get(first.as_str())?;
        }
        Some(block)
    }

    /// Attach a detached subtree as the `index`-th child of `parent`
    ///
    /// `index` is clamped to the number of children. Fails without modifying
    /// the tree if the parent is unknown or any id of the subtree is missing
    /// or already present.
    pub fn attach(
        &mut self,
        parent: &str,
        index: usize,
        node: BlockNode,
    ) -> Result<BlockId, TreeError> {
        if !self.contains(parent) {
            return Err(TreeError::NotFound(parent.to_string()));
        }
        self.check_ids(&node)?;
        let parent = parent.to_string();
        let id = self.graft(Some(parent.clone()), node);
        if let Some(block) = self.nodes.get_mut(&parent) {
            let index = index.min(block.children.len());
            block.children.insert(index, id.clone());
        }
        Ok(id)
    }

    pub fn insert_after(&mut self, anchor: &str, node: BlockNode) -> Result<BlockId, TreeError> {
        let (parent, index) = self.slot_of(anchor)?;
        self.attach(&parent, index + 1, node)
    }

    pub fn insert_before(&mut self, anchor: &str, node: BlockNode) -> Result<BlockId, TreeError> {
        let (parent, index) = self.slot_of(anchor)?;
        self.attach(&parent, index, node)
    }

    pub fn prepend_child(&mut self, parent: &str, node: BlockNode) -> Result<BlockId, TreeError> {
        self.attach(parent, 0, node)
    }

    pub fn append_child(&mut self, parent: &str, node: BlockNode) -> Result<BlockId, TreeError> {
        self.attach(parent, usize::MAX, node)
    }

    /// Unlink `id` and return it with its descendants as an owned subtree
    pub fn detach(&mut self, id: &str) -> Result<BlockNode, TreeError> {
        if id == self.root {
            return Err(TreeError::DetachRoot(id.to_string()));
        }
        let parent = self
            .parent_id(id)
            .cloned()
            .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        if let Some(block) = self.nodes.get_mut(&parent) {
            block.children.retain(|child| child != id);
        }
        self.extract(id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))
    }

    /// Owned copy of the subtree rooted at `id`
    pub fn to_node(&self, id: &str) -> Option<BlockNode> {
        let block = self.nodes.get(id)?;
        Some(BlockNode {
            id: block.id.clone(),
            kind: block.kind.clone(),
            attrs: block.attrs.clone(),
            inlines: block.inlines.clone(),
            children: block
                .children
                .iter()
                .filter_map(|child| self.to_node(child))
                .collect(),
        })
    }

    /// Owned copy of the whole tree
    pub fn root_node(&self) -> BlockNode {
        self.to_node(&self.root)
            .unwrap_or_else(|| BlockNode::document(self.root.clone()))
    }

    fn slot_of(&self, anchor: &str) -> Result<(BlockId, usize), TreeError> {
        if !self.contains(anchor) {
            return Err(TreeError::NotFound(anchor.to_string()));
        }
        let parent = self
            .parent_id(anchor)
            .cloned()
            .ok_or_else(|| TreeError::NoParent(anchor.to_string()))?;
        let index = self
            .index_in_parent(anchor)
            .ok_or_else(|| TreeError::NoParent(anchor.to_string()))?;
        Ok((parent, index))
    }

    fn check_ids(&self, node: &BlockNode) -> Result<(), TreeError> {
        let mut seen = HashSet::new();
        let mut result = Ok(());
        node.walk(&mut |n| {
            if result.is_err() {
                return;
            }
            if n.id.is_empty() {
                result = Err(TreeError::MissingId);
            } else if self.nodes.contains_key(&n.id) || !seen.insert(n.id.clone()) {
                result = Err(TreeError::DuplicateId(n.id.clone()));
            }
        });
        result
    }

    fn graft(&mut self, parent: Option<BlockId>, node: BlockNode) -> BlockId {
        let BlockNode {
            id,
            kind,
            attrs,
            inlines,
            children,
        } = node;
        let child_ids = children.iter().map(|child| child.id.clone()).collect();
        self.nodes.insert(
            id.clone(),
            Block {
                id: id.clone(),
                kind,
                attrs,
                inlines,
                parent,
                children: child_ids,
            },
        );
        for child in children {
            self.graft(Some(id.clone()), child);
        }
        id
    }

    fn extract(&mut self, id: &str) -> Option<BlockNode> {
        let block = self.nodes.remove(id)?;
        let children = block
            .children
            .iter()
            .filter_map(|child| self.extract(child))
            .collect();
        Some(BlockNode {
            id: block.id,
            kind: block.kind,
            attrs: block.attrs,
            inlines: block.inlines,
            children,
        })
    }
}

impl Serialize for Tree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Tree", 3)?;
        state.serialize_field("box", &self.box_id)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("root", &self.root_node())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TreeHelper {
            #[serde(rename = "box")]
            box_id: String,
            path: String,
            root: BlockNode,
        }

        let helper = TreeHelper::deserialize(deserializer)?;
        Tree::new(helper.box_id, helper.path, helper.root).map_err(serde::de::Error::custom)
    }
}
