//! Transactions and their execution
//!
//! A [`Transaction`] is applied by the interpreter, which dispatches each
//! operation to its mutator, optionally on the bulk path chosen by the batch
//! planner. [`TransactionQueue`] runs submitted transactions one at a time
//! on a worker thread.

mod batch;
mod interpreter;
mod queue;
#[allow(clippy::module_inception)]
mod transaction;

pub use queue::TransactionQueue;
pub use transaction::{Transaction, TxHandle, TxState};
