//! Time source for terms expiry and lifecycle transitions
//!
//! All timestamps are unix seconds. The substrate's block time is modelled by
//! [`Clock`]; tests drive it explicitly through [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current timestamp
pub trait Clock: Send + Sync {
    /// Current unix time in seconds
    fn now(&self) -> u64;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Manually advanced clock
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self { now: AtomicU64::new(start) }
    }

    /// Set the current time
    pub fn set(&self, now: u64) {
        self.now.store(now, AtomicOrdering::SeqCst);
    }

    /// Move time forward by `seconds`
    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, AtomicOrdering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(AtomicOrdering::SeqCst)
    }
}
