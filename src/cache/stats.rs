//! Content cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::{counter, gauge};
use stratum_types::CacheStats;

use super::lock::mutex_lock;
use super::store::HitCounters;

const SOURCE: &str = "cache::stats";
const METRIC_INVALIDATIONS: &str = "stratum_cache_invalidation_total";
const METRIC_ENTRIES: &str = "stratum_cache_content_entries";

/// Keeps the published [`CacheStats`] snapshot in step with cache activity.
///
/// Hits and misses are tallied by the stores themselves; this type adds the
/// invalidation count and recomputes the derived fields on demand. It never
/// reads through a store, so recomputing cannot itself move the counters.
pub struct StatsTracker {
    counters: Arc<HitCounters>,
    invalidations: AtomicU64,
    snapshot: Mutex<CacheStats>,
}

impl StatsTracker {
    pub fn new(counters: Arc<HitCounters>) -> Self {
        Self {
            counters,
            invalidations: AtomicU64::new(0),
            snapshot: Mutex::new(CacheStats::default()),
        }
    }

    pub fn counters(&self) -> Arc<HitCounters> {
        Arc::clone(&self.counters)
    }

    pub fn record_invalidation(&self, kind: &'static str) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_INVALIDATIONS, "kind" => kind).increment(1);
    }

    /// Refresh the snapshot given the current number of live entries.
    pub fn recompute(&self, size: usize) {
        let hits = self.counters.hits();
        let misses = self.counters.misses();
        let size = u64::try_from(size).unwrap_or(u64::MAX);

        *mutex_lock(&self.snapshot, SOURCE, "recompute") = CacheStats {
            hits,
            misses,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            size,
            hit_ratio: hit_ratio(hits, misses),
        };
        #[allow(clippy::cast_precision_loss)]
        gauge!(METRIC_ENTRIES).set(size as f64);
    }

    pub fn snapshot(&self) -> CacheStats {
        *mutex_lock(&self.snapshot, SOURCE, "snapshot")
    }
}

/// `hits / (hits + misses)`, defined as zero before any lookup.
#[allow(clippy::cast_precision_loss)]
pub fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits.saturating_add(misses);
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
