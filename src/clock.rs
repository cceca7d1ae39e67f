//! Timestamp sources for the `updated` attribute
//!
//! Block timestamps are 14-digit local times (`YYYYMMDDhhmmss`). Because the
//! format is fixed-width, lexicographic order equals chronological order,
//! which is what the bottom-up `updated` refresh relies on.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use std::sync::atomic::{AtomicU64, Ordering};

/// Format of block timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Source of the current block timestamp
pub trait Clock: Send + Sync {
    /// Current time as a 14-digit timestamp
    fn now(&self) -> String;
}

/// Wall clock in local time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        Local::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Thread-safe clock that advances one second per reading
///
/// Deterministic replacement for [`SystemClock`] in tests and replays.
#[derive(Debug)]
pub struct SteppingClock {
    base: NaiveDateTime,
    ticks: AtomicU64,
}

impl SteppingClock {
    /// Create a clock whose first reading is `start` (14-digit timestamp)
    ///
    /// Falls back to the Unix epoch if `start` is malformed.
    pub fn new(start: &str) -> Self {
        let base = NaiveDateTime::parse_from_str(start, TIMESTAMP_FORMAT)
            .unwrap_or(NaiveDateTime::UNIX_EPOCH);
        Self {
            base,
            ticks: AtomicU64::new(0),
        }
    }

    /// Number of readings taken so far
    pub fn readings(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Skip ahead so the next reading is at least `seconds` later
    pub fn advance(&self, seconds: u64) {
        self.ticks.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> String {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        let at = self.base + ChronoDuration::seconds(tick as i64);
        at.format(TIMESTAMP_FORMAT).to_string()
    }
}
