//! Consistency propagation
//!
//! Mutators do not keep derived data up to date themselves. They record what
//! they changed in the transaction's [`Effects`]; on commit this module
//! resynchronizes dynamic anchor text while the trees are still cached, and
//! hands everything expensive to the task scheduler: reference recounts keyed
//! by definition id, relation syncs keyed by view id, and a debounced
//! data-changed signal. [`Propagator`] executes those tasks when they fall due.

pub(crate) mod anchor;
pub(crate) mod av_sync;
pub(crate) mod refcount;

pub use anchor::truncate_anchor_text;
pub use av_sync::sync_view;

use crate::av::ViewId;
use crate::storage::Services;
use crate::task::{Task, TaskHandler};
use crate::tree::{BlockId, Tree};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Change to the registry of blocks embedding attribute views
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ViewBlockChange {
    Bind { av_id: ViewId, block_id: BlockId },
    Unbind { av_id: ViewId, block_id: BlockId },
}

/// What the operations of one transaction changed
#[derive(Debug, Default)]
pub(crate) struct Effects {
    /// Blocks whose content changed; their dynamic referrers are resynced
    pub updated: BTreeSet<BlockId>,
    /// Definitions whose reference count may have changed
    pub ref_defs: BTreeSet<BlockId>,
    /// Blocks that left every tree
    pub removed: BTreeSet<BlockId>,
    /// Views whose relation columns need a back-reference sync
    pub relation_views: BTreeSet<ViewId>,
    pub view_blocks: Vec<ViewBlockChange>,
}

/// Work that follows a successful write of every cached tree
pub(crate) fn after_commit(services: &Services, trees: &BTreeMap<BlockId, Tree>, effects: &Effects) {
    for change in &effects.view_blocks {
        match change {
            ViewBlockChange::Bind { av_id, block_id } => {
                services.views.bind_view_block(av_id, block_id)
            }
            ViewBlockChange::Unbind { av_id, block_id } => {
                services.views.unbind_view_block(av_id, block_id)
            }
        }
    }

    for tree in trees.values() {
        services.indexer.upsert_tree(tree);
    }
    let removed: Vec<BlockId> = effects
        .removed
        .iter()
        .filter(|id| !trees.values().any(|tree| tree.contains(id)))
        .cloned()
        .collect();
    if !removed.is_empty() {
        services.indexer.remove_blocks(&removed);
    }

    refcount::schedule(services, &effects.ref_defs);
    av_sync::schedule(services, &effects.relation_views);
    services.tasks.schedule(
        Task::DataChanged.key(),
        services.config.data_changed_debounce(),
        Task::DataChanged,
    );
}

/// Runs deferred consistency tasks against the engine's collaborators
#[derive(Debug, Clone)]
pub struct Propagator {
    services: Services,
}

impl Propagator {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

impl TaskHandler for Propagator {
    fn handle(&self, task: Task) {
        match task {
            Task::RefCountRefresh { def_id } => self.services.refs.refresh_ref_count(&def_id),
            Task::AttributeViewSync { av_id } => {
                if let Err(err) = sync_view(&self.services, &av_id) {
                    warn!(%av_id, error = %err, "attribute view sync failed");
                }
            }
            Task::DataChanged => self.services.events.data_changed(),
        }
    }
}
