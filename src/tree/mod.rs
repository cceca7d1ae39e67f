//! Block document model
//!
//! A document is a [`Tree`] of [`Block`]s rooted at a `Document` block.
//! Containers (lists, list items, blockquotes, super blocks) own children;
//! leaves carry [`Inline`] content, including references to other blocks.
//!
//! # Architecture
//!
//! ```text
//! Tree {
//!     root: "20240101120000-root000",
//!     nodes: {                              // arena keyed by id
//!         root  => Block { Document, children: [h1, list] }
//!         h1    => Block { Heading(1), parent: root }
//!         list  => Block { List(Bullet), children: [li] }
//!         ...
//!     }
//! }
//! ```
//!
//! Subtrees move in and out of the arena as owned [`BlockNode`]s, which is
//! also the payload format of insert/update operations.

mod block;
pub mod heading;
mod id;
mod node;
#[allow(clippy::module_inception)]
mod tree;

pub use block::{
    Block, BlockType, Inline, ListKind, RefKind, ATTR_BOUND_VIEWS, ATTR_FOLD, ATTR_HEADING_FOLD,
    ATTR_UPDATED,
};
pub use id::{is_valid_block_id, new_block_id, time_from_id, BlockId};
pub use node::BlockNode;
pub use tree::{Tree, TreeError};
