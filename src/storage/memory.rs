//! In-memory implementation of every storage collaborator
//!
//! Stores trees by (box, path), keeps the block index, attribute views and
//! the view-block registry in maps, scans stored trees for references, and
//! records events and indexer calls so they can be inspected. Two switches
//! simulate failures: `set_syncing` makes tree loads fail as locked, and
//! `set_fail_writes` makes tree writes fail.

use super::{
    AttributeViewStore, BlockIndex, BlockLocation, EventBroadcaster, Indexer, RefIndex, RefSite,
    TreeStore,
};
use crate::av::AttributeView;
use crate::error::StoreError;
use crate::tree::{BlockId, RefKind, Tree};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// Event delivered to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DataChanged,
    TxFailed { code: u8, message: String },
}

/// Call made to the search indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerCall {
    Upsert(BlockId),
    Remove(Vec<BlockId>),
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    trees: RwLock<BTreeMap<(String, String), Tree>>,
    index: RwLock<HashMap<BlockId, BlockLocation>>,
    views: RwLock<BTreeMap<String, AttributeView>>,
    view_blocks: RwLock<BTreeMap<String, Vec<BlockId>>>,
    ref_counts: RwLock<HashMap<BlockId, usize>>,
    refreshes: Mutex<Vec<BlockId>>,
    writes: Mutex<HashMap<BlockId, usize>>,
    events: Mutex<Vec<Event>>,
    indexer: Mutex<Vec<IndexerCall>>,
    syncing: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `tree` and index its blocks without counting a write
    pub fn add_tree(&self, tree: Tree) {
        self.reindex(&tree);
        self.trees
            .write()
            .insert((tree.box_id().to_string(), tree.path().to_string()), tree);
    }

    /// Store `view` and register the blocks that embed it
    pub fn add_view(&self, view: AttributeView, embedded_by: &[&str]) {
        for block_id in embedded_by {
            self.bind_view_block(&view.id, block_id);
        }
        self.views.write().insert(view.id.clone(), view);
    }

    /// Stored copy of the tree rooted at `root_id`
    pub fn tree(&self, root_id: &str) -> Option<Tree> {
        self.trees
            .read()
            .values()
            .find(|tree| tree.root_id() == root_id)
            .cloned()
    }

    pub fn view(&self, av_id: &str) -> Option<AttributeView> {
        self.views.read().get(av_id).cloned()
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of times the tree rooted at `root_id` was written
    pub fn write_count(&self, root_id: &str) -> usize {
        self.writes.lock().get(root_id).copied().unwrap_or(0)
    }

    /// Last computed reference count of `def_id`
    pub fn ref_count(&self, def_id: &str) -> Option<usize> {
        self.ref_counts.read().get(def_id).copied()
    }

    /// Definition ids in the order their counts were refreshed
    pub fn refreshed(&self) -> Vec<BlockId> {
        self.refreshes.lock().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn indexer_calls(&self) -> Vec<IndexerCall> {
        self.indexer.lock().clone()
    }
}

impl BlockIndex for MemoryBackend {
    fn locate(&self, id: &str) -> Option<BlockLocation> {
        self.index.read().get(id).cloned()
    }

    fn reindex(&self, tree: &Tree) {
        let location = BlockLocation {
            root_id: tree.root_id().clone(),
            box_id: tree.box_id().to_string(),
            path: tree.path().to_string(),
        };
        let mut index = self.index.write();
        for id in tree.ids() {
            index.insert(id.clone(), location.clone());
        }
    }

    fn remove(&self, ids: &[BlockId]) {
        let mut index = self.index.write();
        for id in ids {
            index.remove(id);
        }
    }
}

impl TreeStore for MemoryBackend {
    fn load(&self, box_id: &str, path: &str) -> Result<Tree, StoreError> {
        if self.syncing.load(Ordering::SeqCst) {
            return Err(StoreError::Locked(format!("{box_id}{path}")));
        }
        self.trees
            .read()
            .get(&(box_id.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{box_id}{path}")))
    }

    fn write(&self, tree: &Tree) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(format!("write {} refused", tree.path())));
        }
        self.trees.write().insert(
            (tree.box_id().to_string(), tree.path().to_string()),
            tree.clone(),
        );
        *self.writes.lock().entry(tree.root_id().clone()).or_default() += 1;
        Ok(())
    }
}

impl AttributeViewStore for MemoryBackend {
    fn load_view(&self, av_id: &str) -> Result<AttributeView, StoreError> {
        self.views
            .read()
            .get(av_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("attribute view {av_id}")))
    }

    fn save_view(&self, view: &AttributeView) -> Result<(), StoreError> {
        self.views.write().insert(view.id.clone(), view.clone());
        Ok(())
    }

    fn view_blocks(&self, av_id: &str) -> Vec<BlockId> {
        self.view_blocks
            .read()
            .get(av_id)
            .cloned()
            .unwrap_or_default()
    }

    fn bind_view_block(&self, av_id: &str, block_id: &str) {
        let mut registry = self.view_blocks.write();
        let blocks = registry.entry(av_id.to_string()).or_default();
        if !blocks.iter().any(|id| id == block_id) {
            blocks.push(block_id.to_string());
        }
    }

    fn unbind_view_block(&self, av_id: &str, block_id: &str) {
        let mut registry = self.view_blocks.write();
        if let Some(blocks) = registry.get_mut(av_id) {
            blocks.retain(|id| id != block_id);
            if blocks.is_empty() {
                registry.remove(av_id);
            }
        }
    }
}

impl RefIndex for MemoryBackend {
    fn dynamic_referrers(&self, def_id: &str) -> Vec<RefSite> {
        let trees = self.trees.read();
        let mut sites: Vec<RefSite> = trees
            .values()
            .flat_map(|tree| {
                tree.blocks()
                    .filter(move |block| {
                        block
                            .references()
                            .any(|(def, kind)| def == def_id && kind == RefKind::Dynamic)
                    })
                    .map(move |block| RefSite {
                        root_id: tree.root_id().clone(),
                        block_id: block.id.clone(),
                    })
            })
            .collect();
        sites.sort();
        sites
    }

    fn refresh_ref_count(&self, def_id: &str) {
        let count = self
            .trees
            .read()
            .values()
            .flat_map(|tree| tree.blocks())
            .flat_map(|block| block.references())
            .filter(|(def, _)| *def == def_id)
            .count();
        self.ref_counts.write().insert(def_id.to_string(), count);
        self.refreshes.lock().push(def_id.to_string());
    }
}

impl EventBroadcaster for MemoryBackend {
    fn data_changed(&self) {
        self.events.lock().push(Event::DataChanged);
    }

    fn tx_failed(&self, code: u8, message: &str) {
        self.events.lock().push(Event::TxFailed {
            code,
            message: message.to_string(),
        });
    }
}

impl Indexer for MemoryBackend {
    fn upsert_tree(&self, tree: &Tree) {
        self.indexer
            .lock()
            .push(IndexerCall::Upsert(tree.root_id().clone()));
    }

    fn remove_blocks(&self, ids: &[BlockId]) {
        self.indexer.lock().push(IndexerCall::Remove(ids.to_vec()));
    }
}
