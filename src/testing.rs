//! Shared fixture for unit tests

use crate::clock::SteppingClock;
use crate::error::{Result, TxError};
use crate::operation::Operation;
use crate::storage::memory::MemoryBackend;
use crate::storage::Services;
use crate::task::DelayedTaskQueue;
use crate::transaction::Transaction;
use crate::tree::Tree;
use parking_lot::Mutex;
use std::sync::Arc;

/// In-memory backend, a manual task queue and a recording fatal hook
pub(crate) struct Fixture {
    pub backend: Arc<MemoryBackend>,
    pub tasks: Arc<DelayedTaskQueue>,
    pub services: Services,
    fatal: Arc<Mutex<Vec<String>>>,
}

impl Fixture {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let tasks = Arc::new(DelayedTaskQueue::new());
        let fatal = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&fatal);
        let services = Services::in_memory(backend.clone(), tasks.clone())
            .with_clock(Arc::new(SteppingClock::new("20240101000000")))
            .with_fatal_hook(Arc::new(move |err: &TxError| recorded.lock().push(err.to_string())));
        Self {
            backend,
            tasks,
            services,
            fatal,
        }
    }

    pub fn with_tree(self, tree: Tree) -> Self {
        self.backend.add_tree(tree);
        self
    }

    /// Run `ops` as one transaction on the calling thread
    pub fn run(&self, ops: Vec<Operation>) -> Result<Transaction> {
        let mut tx = Transaction::new(ops);
        tx.run(&self.services)?;
        Ok(tx)
    }

    pub fn fatal_calls(&self) -> Vec<String> {
        self.fatal.lock().clone()
    }
}
