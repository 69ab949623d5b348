//! Per-key serialization of cache fills.
//!
//! Concurrent misses on one key queue behind a single async mutex, so the
//! first caller fetches from the origin and the rest find its result when
//! they re-check the cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::flight";

#[derive(Default)]
pub struct KeyedFlight {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fill` while holding the turn for `key`.
    pub async fn run<F, Fut, T>(&self, key: &str, fill: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = self.lease(key);
        let _turn = lease.slot.lock().await;
        fill().await
    }

    /// Keys with a fill in progress or queued.
    pub fn in_flight(&self) -> usize {
        mutex_lock(&self.slots, SOURCE, "in_flight").len()
    }

    fn lease(&self, key: &str) -> Lease<'_> {
        let slot = {
            let mut slots = mutex_lock(&self.slots, SOURCE, "lease");
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        Lease {
            flight: self,
            key: key.to_string(),
            slot,
        }
    }
}

/// Removes the key's slot once its last holder is gone, including when the
/// holding future is dropped mid-fill.
struct Lease<'a> {
    flight: &'a KeyedFlight,
    key: String,
    slot: Arc<AsyncMutex<()>>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let mut slots = mutex_lock(&self.flight.slots, SOURCE, "release");
        let last_holder = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if last_holder {
            slots.remove(&self.key);
        }
    }
}
