//! Delayed, deduplicated background work
//!
//! Consistency work that is too expensive to do inside a transaction is
//! handed to a [`DelayedTaskQueue`] under a key. Scheduling a key that is
//! already pending replaces its payload and re-arms its delay, so a burst of
//! edits touching the same definition or view results in one run.
//!
//! Tasks run either on a background thread started with
//! [`DelayedTaskQueue::spawn`] or synchronously via
//! [`DelayedTaskQueue::run_due`].

mod queue;

pub use queue::{DelayedTaskQueue, TaskRunner};

use crate::tree::BlockId;

/// A unit of deferred consistency work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Recount references to a definition block
    RefCountRefresh { def_id: BlockId },
    /// Rewrite back-reference columns and rollups of an attribute view
    AttributeViewSync { av_id: String },
    /// Tell the UI that persisted data changed
    DataChanged,
}

impl Task {
    /// Deduplication key
    pub fn key(&self) -> String {
        match self {
            Task::RefCountRefresh { def_id } => format!("ref-count:{def_id}"),
            Task::AttributeViewSync { av_id } => format!("av-sync:{av_id}"),
            Task::DataChanged => "data-changed".to_string(),
        }
    }
}

/// Executes tasks once they are due
pub trait TaskHandler: Send + Sync {
    fn handle(&self, task: Task);
}
