//! blocktx core - transaction engine for block documents
//!
//! Notes are trees of blocks. This crate applies structural edits to them
//! atomically and keeps the derived data consistent:
//! - Block trees with container placement rules and heading folds
//! - Operations (insert, move, update, delete, ...) grouped in transactions
//! - A serialized transaction queue with rollback on failure
//! - Reference counts, dynamic anchor text and attribute-view relations,
//!   refreshed by deduplicated background tasks
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use blocktx_core::{
//!     BlockNode, DelayedTaskQueue, MemoryBackend, Operation, Services, Transaction, Tree,
//! };
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let root = BlockNode::document("20240101000000-aaaaaaa")
//!     .with_child(BlockNode::paragraph("20240101000000-bbbbbbb", "hello"));
//! backend.add_tree(Tree::new("box", "/note.sy", root).unwrap());
//!
//! let services = Services::in_memory(backend.clone(), Arc::new(DelayedTaskQueue::new()));
//! let mut tx = Transaction::new(vec![Operation::insert_after(
//!     "20240101000000-bbbbbbb",
//!     &BlockNode::paragraph("20240101000000-ccccccc", "world"),
//! )]);
//! tx.run(&services).unwrap();
//!
//! let tree = backend.tree("20240101000000-aaaaaaa").unwrap();
//! assert_eq!(tree.children("20240101000000-aaaaaaa").len(), 2);
//! ```

pub mod av;
pub mod clock;
pub mod config;
pub mod error;
mod mutator;
pub mod operation;
pub mod propagate;
pub mod storage;
pub mod task;
pub mod transaction;
pub mod tree;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use av::AttributeView;
pub use config::EngineConfig;
pub use error::{Result, TxError};
pub use operation::{Action, Operation};
pub use propagate::Propagator;
pub use storage::memory::MemoryBackend;
pub use storage::Services;
pub use task::DelayedTaskQueue;
pub use transaction::{Transaction, TransactionQueue, TxHandle, TxState};
pub use tree::{BlockId, BlockNode, Tree};
