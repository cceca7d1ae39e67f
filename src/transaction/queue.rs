//! Serialized transaction queue
//!
//! One worker thread executes transactions strictly in submission order, one
//! at a time. `submit` blocks while the queue holds `queue_capacity`
//! transactions, which throttles producers that outpace the worker.

use super::{Transaction, TxHandle};
use crate::error::TxError;
use crate::storage::Services;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<Transaction>,
    in_flight: bool,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    /// Signaled when work is queued or shutdown is requested
    work: Condvar,
    /// Signaled when a queued transaction is taken
    space: Condvar,
    /// Signaled when the worker goes idle
    idle: Condvar,
    services: Services,
}

/// Single-consumer queue of transactions
#[derive(Debug)]
pub struct TransactionQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl TransactionQueue {
    /// Start the worker thread
    pub fn new(services: Services) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::default()),
            work: Condvar::new(),
            space: Condvar::new(),
            idle: Condvar::new(),
            services,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("blocktx-tx".into())
            .spawn(move || worker_shared.run_loop())?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Enqueue `txs` in order; returns one handle per transaction
    pub fn submit(&self, txs: Vec<Transaction>) -> Vec<TxHandle> {
        let poll = self.shared.services.config.wait_poll();
        let mut handles = Vec::with_capacity(txs.len());
        let capacity = self.shared.services.config.queue_capacity.max(1);
        for tx in txs {
            handles.push(tx.handle(poll));
            let mut inner = self.shared.inner.lock();
            while inner.pending.len() >= capacity && !inner.shutdown {
                self.shared.space.wait_for(&mut inner, poll);
            }
            inner.pending.push_back(tx);
            self.shared.work.notify_one();
        }
        handles
    }

    /// Block until every submitted transaction has finished
    pub fn flush(&self) {
        let poll = self.shared.services.config.wait_poll();
        let mut inner = self.shared.inner.lock();
        while !inner.pending.is_empty() || inner.in_flight {
            self.shared.idle.wait_for(&mut inner, poll);
        }
    }

    /// Transactions waiting to run
    pub fn len(&self) -> usize {
        self.shared.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for TransactionQueue {
    fn drop(&mut self) {
        self.shared.inner.lock().shutdown = true;
        self.shared.work.notify_all();
        self.shared.space.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Shared {
    fn run_loop(&self) {
        loop {
            let mut tx = {
                let mut inner = self.inner.lock();
                loop {
                    if let Some(tx) = inner.pending.pop_front() {
                        inner.in_flight = true;
                        self.space.notify_one();
                        break tx;
                    }
                    if inner.shutdown {
                        return;
                    }
                    self.work.wait(&mut inner);
                }
            };

            self.process(&mut tx);

            let mut inner = self.inner.lock();
            inner.in_flight = false;
            if inner.pending.is_empty() {
                self.idle.notify_all();
            }
        }
    }

    fn process(&self, tx: &mut Transaction) {
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| tx.run(&self.services)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(code = err.code(), "transaction failed"),
            Err(payload) => {
                let err = TxError::Panicked(panic_message(payload.as_ref()));
                error!(error = %err, "transaction panicked");
                if !tx.state().is_final() {
                    tx.rollback();
                    self.services.events.tx_failed(err.code(), &err.to_string());
                }
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= self.services.config.slow_tx_warn() {
            warn!(
                ops = tx.do_operations.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "slow transaction"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::transaction::TxState;
    use crate::operation::{Action, Operation};
    use crate::storage::memory::Event;
    use crate::storage::BlockParser;
    use crate::testing::Fixture;
    use crate::tree::{BlockNode, Tree};

    fn doc() -> Tree {
        let root = BlockNode::document("root")
            .with_child(BlockNode::paragraph("p1", "one"))
            .with_child(BlockNode::paragraph("p2", "two"));
        Tree::new("box", "/doc.sy", root).unwrap()
    }

    struct ExplodingParser;

    impl BlockParser for ExplodingParser {
        fn parse(&self, _data: &serde_json::Value) -> Result<Vec<BlockNode>, StoreError> {
            panic!("parser exploded");
        }
    }

    #[test]
    fn test_runs_in_submission_order() {
        let fx = Fixture::new().with_tree(doc());
        let queue = TransactionQueue::new(fx.services.clone()).unwrap();
        let mut previous = "p2".to_string();
        let txs = (0..20)
            .map(|i| {
                let id = format!("n{i}");
                let op = Operation::insert_after(previous.clone(), &BlockNode::paragraph(id.as_str(), ""));
                previous = id;
                Transaction::new(vec![op])
            })
            .collect();
        let handles = queue.submit(txs);
        queue.flush();

        assert!(queue.is_empty());
        assert!(handles.iter().all(|h| h.state() == TxState::Committed));
        let tree = fx.backend.tree("root").unwrap();
        assert_eq!(tree.children("root").len(), 22);
        assert_eq!(tree.children("root")[21], "n19");
    }

    #[test]
    fn test_panic_rolls_back_and_worker_continues() {
        let fx = Fixture::new().with_tree(doc());
        let services = fx.services.clone().with_parser(std::sync::Arc::new(ExplodingParser));
        let queue = TransactionQueue::new(services).unwrap();

        let handles = queue.submit(vec![
            Transaction::new(vec![
                Operation::delete("p1"),
                Operation::insert_after("p2", &BlockNode::paragraph("x", "")),
            ]),
            Transaction::new(vec![Operation::delete("p2")]),
        ]);
        assert_eq!(handles[0].wait_for_commit(), TxState::RolledBack);
        assert_eq!(handles[1].wait_for_commit(), TxState::Committed);

        let tree = fx.backend.tree("root").unwrap();
        assert!(tree.contains("p1"));
        assert!(!tree.contains("p2"));
        assert!(fx
            .backend
            .events()
            .iter()
            .any(|e| matches!(e, Event::TxFailed { code, message } if *code == crate::error::code::INVALID && message.contains("parser exploded"))));
    }

    #[test]
    fn test_failures_do_not_stop_the_worker() {
        let fx = Fixture::new().with_tree(doc());
        let queue = TransactionQueue::new(fx.services.clone()).unwrap();

        fx.backend.set_fail_writes(true);
        let failed = queue.submit(vec![Transaction::new(vec![Operation::delete("p1")])]);
        queue.flush();
        assert_eq!(failed[0].state(), TxState::RolledBack);
        assert_eq!(fx.fatal_calls().len(), 1);

        fx.backend.set_fail_writes(false);
        let ok = queue.submit(vec![Transaction::new(vec![
            Operation::new(Action::Unknown, "p1"),
            Operation::delete("p1"),
        ])]);
        assert_eq!(ok[0].wait_for_commit(), TxState::Committed);
        assert!(!fx.backend.tree("root").unwrap().contains("p1"));
    }

    #[test]
    fn test_capacity_blocks_without_losing_work() {
        let fx = Fixture::new().with_tree(doc());
        let services = fx.services.clone().with_config(crate::config::EngineConfig {
            queue_capacity: 1,
            ..Default::default()
        });
        let queue = TransactionQueue::new(services).unwrap();
        let txs = (0..10)
            .map(|_| Transaction::new(vec![Operation::new(Action::FoldHeading, "p1")]))
            .collect();
        let handles = queue.submit(txs);
        queue.flush();
        assert_eq!(handles.len(), 10);
        assert!(handles.iter().all(|h| h.state().is_final()));
    }

    #[test]
    fn test_drop_drains_pending_work() {
        let fx = Fixture::new().with_tree(doc());
        let handles = {
            let queue = TransactionQueue::new(fx.services.clone()).unwrap();
            queue.submit(vec![
                Transaction::new(vec![Operation::delete("p1")]),
                Transaction::new(vec![Operation::delete("p2")]),
            ])
        };
        assert!(handles.iter().all(|h| h.state() == TxState::Committed));
        assert!(fx.backend.tree("root").unwrap().children("root").is_empty());
    }
}
