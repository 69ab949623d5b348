//! Time source for entry freshness checks.

use std::sync::{Arc, Mutex};

use time::{Duration, OffsetDateTime};

use super::lock::mutex_lock;

/// Supplies the current instant to cache stores.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Hand-advanced clock for deterministic expiry tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let mut now = mutex_lock(&self.now, "cache::clock", "advance");
        *now += Duration::try_from(by).unwrap_or(Duration::MAX);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(OffsetDateTime::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *mutex_lock(&self.now, "cache::clock", "now")
    }
}

/// Shared handle used by every store of one cache instance.
pub type SharedClock = Arc<dyn Clock>;
