//! Engine configuration
//!
//! All knobs have defaults matching the behavior of the desktop kernel, so an
//! empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the queue, the batch optimizer and the consistency propagator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Number of queued transactions before `submit` blocks
    pub queue_capacity: usize,

    /// Minimum operation count before the batch optimizer is considered
    pub batch_threshold: usize,

    /// Delay of a scheduled reference-count refresh
    pub ref_count_delay_ms: u64,

    /// Delay of a deferred attribute-view relation sync
    pub av_sync_delay_ms: u64,

    /// Debounce of the "data changed" signal emitted after commits
    pub data_changed_debounce_ms: u64,

    /// Maximum graphemes of dynamic anchor text before it is cut with `...`
    pub anchor_text_max_len: usize,

    /// Transactions slower than this are logged as warnings
    pub slow_tx_warn_ms: u64,

    /// Poll interval of `flush()` and `wait_for_commit()`
    pub wait_poll_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 7,
            batch_threshold: 32,
            ref_count_delay_ms: 500,
            av_sync_delay_ms: 200,
            data_changed_debounce_ms: 500,
            anchor_text_max_len: 64,
            slow_tx_warn_ms: 2000,
            wait_poll_ms: 5,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn ref_count_delay(&self) -> Duration {
        Duration::from_millis(self.ref_count_delay_ms)
    }

    pub fn av_sync_delay(&self) -> Duration {
        Duration::from_millis(self.av_sync_delay_ms)
    }

    pub fn data_changed_debounce(&self) -> Duration {
        Duration::from_millis(self.data_changed_debounce_ms)
    }

    pub fn slow_tx_warn(&self) -> Duration {
        Duration::from_millis(self.slow_tx_warn_ms)
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms.max(1))
    }
}
