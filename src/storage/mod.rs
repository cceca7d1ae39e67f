//! Collaborators the engine consumes
//!
//! The engine owns no storage. Tree persistence, the block index, attribute
//! view files, the reverse-reference cache, the search indexer and UI event
//! delivery are all reached through the traits below, bundled into
//! [`Services`]. [`memory::MemoryBackend`] implements every storage trait in
//! process for tests and embedding.

pub mod memory;

use crate::av::AttributeView;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{StoreError, TxError};
use crate::task::Task;
use crate::tree::{BlockId, BlockNode, Tree};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where a block's tree lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    pub root_id: BlockId,
    pub box_id: String,
    pub path: String,
}

/// Block id to owning tree lookup
pub trait BlockIndex: Send + Sync {
    fn locate(&self, id: &str) -> Option<BlockLocation>;

    /// Point every block of `tree` at it
    fn reindex(&self, tree: &Tree);

    fn remove(&self, ids: &[BlockId]);
}

/// Persistent tree storage addressed by (box, path)
pub trait TreeStore: Send + Sync {
    fn load(&self, box_id: &str, path: &str) -> Result<Tree, StoreError>;

    fn write(&self, tree: &Tree) -> Result<(), StoreError>;
}

/// Attribute view persistence and the registry of blocks embedding views
pub trait AttributeViewStore: Send + Sync {
    fn load_view(&self, av_id: &str) -> Result<AttributeView, StoreError>;

    fn save_view(&self, view: &AttributeView) -> Result<(), StoreError>;

    /// Attribute view blocks that embed `av_id`
    fn view_blocks(&self, av_id: &str) -> Vec<BlockId>;

    fn bind_view_block(&self, av_id: &str, block_id: &str);

    fn unbind_view_block(&self, av_id: &str, block_id: &str);

    /// A view embedded by more than one block is a mirror: its rows are
    /// shared and not owned by any single embedding
    fn is_mirror(&self, av_id: &str) -> bool {
        self.view_blocks(av_id).len() > 1
    }
}

/// A block holding a reference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefSite {
    pub root_id: BlockId,
    pub block_id: BlockId,
}

/// Reverse-reference cache
pub trait RefIndex: Send + Sync {
    /// Blocks that reference `def_id` with dynamic anchor text
    fn dynamic_referrers(&self, def_id: &str) -> Vec<RefSite>;

    /// Recount the references to `def_id`
    fn refresh_ref_count(&self, def_id: &str);
}

/// Deduplicated delayed task sink
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, key: String, delay: Duration, task: Task);
}

/// UI notification channel
pub trait EventBroadcaster: Send + Sync {
    fn data_changed(&self);

    fn tx_failed(&self, code: u8, message: &str);
}

/// Search indexer queue
pub trait Indexer: Send + Sync {
    fn upsert_tree(&self, tree: &Tree);

    fn remove_blocks(&self, ids: &[BlockId]);
}

/// Turns an operation payload into detached subtrees
pub trait BlockParser: Send + Sync {
    fn parse(&self, data: &serde_json::Value) -> Result<Vec<BlockNode>, StoreError>;
}

/// Payloads given as a JSON [`BlockNode`] or an array of them
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBlockParser;

impl BlockParser for JsonBlockParser {
    fn parse(&self, data: &serde_json::Value) -> Result<Vec<BlockNode>, StoreError> {
        match data {
            serde_json::Value::Array(_) => Ok(serde_json::from_value(data.clone())?),
            serde_json::Value::String(raw) => {
                let value: serde_json::Value = serde_json::from_str(raw)?;
                self.parse(&value)
            }
            _ => Ok(vec![serde_json::from_value(data.clone())?]),
        }
    }
}

/// Called with an unrecoverable error; must not return normally in production
pub type FatalHook = Arc<dyn Fn(&TxError) + Send + Sync>;

/// Default [`FatalHook`]: log and terminate the process
pub fn exit_on_fatal() -> FatalHook {
    Arc::new(|err: &TxError| {
        tracing::error!(error = %err, "unrecoverable write failure, exiting");
        std::process::exit(1);
    })
}

/// Everything a transaction needs from the outside world
#[derive(Clone)]
pub struct Services {
    pub index: Arc<dyn BlockIndex>,
    pub trees: Arc<dyn TreeStore>,
    pub views: Arc<dyn AttributeViewStore>,
    pub refs: Arc<dyn RefIndex>,
    pub tasks: Arc<dyn TaskScheduler>,
    pub events: Arc<dyn EventBroadcaster>,
    pub indexer: Arc<dyn Indexer>,
    pub parser: Arc<dyn BlockParser>,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
    pub fatal: FatalHook,
}

impl Services {
    /// Wire every collaborator to one in-memory backend
    pub fn in_memory(backend: Arc<memory::MemoryBackend>, tasks: Arc<dyn TaskScheduler>) -> Self {
        Self {
            index: backend.clone(),
            trees: backend.clone(),
            views: backend.clone(),
            refs: backend.clone(),
            tasks,
            events: backend.clone(),
            indexer: backend,
            parser: Arc::new(JsonBlockParser),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
            fatal: exit_on_fatal(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn BlockParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_fatal_hook(mut self, fatal: FatalHook) -> Self {
        self.fatal = fatal;
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
