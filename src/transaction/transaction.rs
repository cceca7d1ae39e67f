//! Transaction session
//!
//! A transaction owns a private cache of the trees and attribute views its
//! operations touch. Every operation on the same document edits the same
//! cached [`Tree`], so edits compose; nothing reaches the tree store before
//! [`commit`](Transaction::commit). Rolling back drops the cache.
//!
//! ```text
//! Init --begin--> Pending --commit--> Committed
//!                    |
//!                    +----rollback--> RolledBack
//! ```

use super::interpreter;
use crate::av::{AttributeView, ViewId};
use crate::error::{Result, TxError};
use crate::operation::Operation;
use crate::propagate::{self, Effects};
use crate::storage::Services;
use crate::tree::{BlockId, Tree};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
    #[default]
    Init,
    Pending,
    Committed,
    RolledBack,
}

impl TxState {
    /// Whether the transaction has finished, successfully or not
    pub fn is_final(self) -> bool {
        matches!(self, TxState::Committed | TxState::RolledBack)
    }
}

#[derive(Debug, Default)]
struct StateCell {
    state: Mutex<TxState>,
    changed: Condvar,
}

impl StateCell {
    fn get(&self) -> TxState {
        *self.state.lock()
    }

    fn set(&self, state: TxState) {
        *self.state.lock() = state;
        self.changed.notify_all();
    }
}

/// Observer of a transaction that has been handed to a queue
#[derive(Debug, Clone)]
pub struct TxHandle {
    cell: Arc<StateCell>,
    poll: Duration,
}

impl TxHandle {
    pub fn state(&self) -> TxState {
        self.cell.get()
    }

    /// Block until the transaction is committed or rolled back
    pub fn wait_for_commit(&self) -> TxState {
        let mut state = self.cell.state.lock();
        while !state.is_final() {
            self.cell.changed.wait_for(&mut state, self.poll);
        }
        *state
    }
}

/// An ordered list of operations applied atomically
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub do_operations: Vec<Operation>,
    /// Inverse operations kept for the caller's undo stack; never applied here
    #[serde(default)]
    pub undo_operations: Vec<Operation>,

    #[serde(skip)]
    trees: BTreeMap<BlockId, Tree>,
    #[serde(skip)]
    views: BTreeMap<ViewId, AttributeView>,
    #[serde(skip)]
    pub(crate) effects: Effects,
    #[serde(skip)]
    bulk: bool,
    #[serde(skip)]
    cell: Arc<StateCell>,
}

impl Transaction {
    pub fn new(do_operations: Vec<Operation>) -> Self {
        Self {
            do_operations,
            ..Default::default()
        }
    }

    pub fn with_undo(mut self, undo_operations: Vec<Operation>) -> Self {
        self.undo_operations = undo_operations;
        self
    }

    /// Decode `{"doOperations": [...], "undoOperations": [...]}`
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn state(&self) -> TxState {
        self.cell.get()
    }

    /// Handle that observes this transaction from another thread
    pub fn handle(&self, poll: Duration) -> TxHandle {
        TxHandle {
            cell: Arc::clone(&self.cell),
            poll,
        }
    }

    /// Cached tree rooted at `root`, while the transaction is pending
    pub fn tree(&self, root: &str) -> Option<&Tree> {
        self.trees.get(root)
    }

    /// Apply every operation, then commit; roll back on the first failure
    ///
    /// A write failure during commit is handed to the fatal hook.
    pub fn run(&mut self, services: &Services) -> Result<()> {
        self.begin();
        let result = interpreter::apply(self, services).and_then(|()| self.commit(services));
        if let Err(err) = &result {
            error!(code = err.code(), error = %err, "transaction aborted");
            if !self.state().is_final() {
                self.rollback();
            }
            services.events.tx_failed(err.code(), &err.to_string());
            if err.is_fatal() {
                (services.fatal)(err);
            }
        }
        result
    }

    pub(crate) fn begin(&mut self) {
        self.trees.clear();
        self.views.clear();
        self.effects = Effects::default();
        self.bulk = false;
        self.cell.set(TxState::Pending);
    }

    /// Root id of the cached tree containing `id`
    pub(crate) fn cached_root_of(&self, id: &str) -> Option<BlockId> {
        self.trees
            .values()
            .find(|tree| tree.contains(id))
            .map(|tree| tree.root_id().clone())
    }

    /// Make the tree owning `id` available in the cache; returns its root id
    ///
    /// Cached trees are searched first so blocks created or moved by earlier
    /// operations resolve before the block index knows about them.
    pub(crate) fn load_tree(&mut self, services: &Services, id: &str) -> Result<BlockId> {
        if let Some(root) = self.cached_root_of(id) {
            return Ok(root);
        }
        let location = services
            .index
            .locate(id)
            .ok_or_else(|| TxError::not_found(id))?;
        if self.trees.contains_key(&location.root_id) {
            return Ok(location.root_id);
        }
        let tree = services
            .trees
            .load(&location.box_id, &location.path)
            .map_err(|err| TxError::from_load(id, err))?;
        let root = tree.root_id().clone();
        debug!(%root, path = %location.path, "tree loaded");
        self.trees.insert(root.clone(), tree);
        Ok(root)
    }

    pub(crate) fn tree_mut(&mut self, root: &str) -> Result<&mut Tree> {
        self.trees
            .get_mut(root)
            .ok_or_else(|| TxError::not_found(root))
    }

    /// Cached tree together with the effect record
    pub(crate) fn edit(&mut self, root: &str) -> Result<(&mut Tree, &mut Effects)> {
        let tree = self
            .trees
            .get_mut(root)
            .ok_or_else(|| TxError::not_found(root))?;
        Ok((tree, &mut self.effects))
    }

    pub(crate) fn cache_tree(&mut self, tree: Tree) {
        self.trees.insert(tree.root_id().clone(), tree);
    }

    /// Record that the cached tree `root` changed
    ///
    /// Operations resolve blocks through the cache before the block index, so
    /// the index is only brought up to date once the trees are written.
    pub(crate) fn write_tree(&mut self, root: &str) -> Result<()> {
        if !self.trees.contains_key(root) {
            return Err(TxError::not_found(root));
        }
        Ok(())
    }

    /// Record blocks that left their tree
    ///
    /// They are dropped from the block index at commit unless a later
    /// operation placed them in a cached tree again.
    pub(crate) fn forget_blocks(&mut self, ids: Vec<BlockId>) {
        self.effects.removed.extend(ids);
    }

    /// Cached copy of view `av_id`, loaded on first use
    pub(crate) fn load_view(&mut self, services: &Services, av_id: &str) -> Result<&mut AttributeView> {
        match self.views.entry(av_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let view = services
                    .views
                    .load_view(av_id)
                    .map_err(|err| TxError::from_view(av_id, err))?;
                Ok(entry.insert(view))
            }
        }
    }

    pub(crate) fn set_bulk(&mut self, bulk: bool) {
        self.bulk = bulk;
    }

    /// Persist views and trees, then schedule the deferred consistency work
    pub(crate) fn commit(&mut self, services: &Services) -> Result<()> {
        propagate::anchor::resync(services, &mut self.trees, &self.effects.updated);

        for view in self.views.values_mut() {
            view.regenerate_groups();
            services
                .views
                .save_view(view)
                .map_err(|err| TxError::from_view(&view.id, err))?;
        }
        for tree in self.trees.values() {
            services.trees.write(tree).map_err(|err| TxError::WriteFailed {
                id: tree.root_id().clone(),
                reason: err.to_string(),
            })?;
            services.index.reindex(tree);
        }
        let gone: Vec<BlockId> = self
            .effects
            .removed
            .iter()
            .filter(|id| !self.trees.values().any(|tree| tree.contains(id)))
            .cloned()
            .collect();
        if !gone.is_empty() {
            services.index.remove(&gone);
        }

        propagate::after_commit(services, &self.trees, &self.effects);
        info!(
            ops = self.do_operations.len(),
            trees = self.trees.len(),
            views = self.views.len(),
            bulk = self.bulk,
            "transaction committed"
        );
        self.release(TxState::Committed);
        Ok(())
    }

    pub(crate) fn rollback(&mut self) {
        debug!(trees = self.trees.len(), "transaction rolled back");
        self.release(TxState::RolledBack);
    }

    fn release(&mut self, state: TxState) {
        self.trees.clear();
        self.views.clear();
        self.effects = Effects::default();
        self.bulk = false;
        self.cell.set(state);
    }
}
