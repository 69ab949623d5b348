//! TTL storage shared by the content cache and the response cache.
//!
//! Freshness is checked lazily: an expired entry is removed by the read that
//! discovers it, so a lookup can never hand back data past its deadline.
//! `purge_expired` exists for periodic memory reclamation only.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use super::clock::SharedClock;
use super::lock::mutex_lock;

/// Which cache a store belongs to; selects the metric names it reports under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLayer {
    Content,
    Response,
}

impl CacheLayer {
    fn hit_metric(self) -> &'static str {
        match self {
            Self::Content => "stratum_cache_content_hit_total",
            Self::Response => "stratum_cache_response_hit_total",
        }
    }

    fn miss_metric(self) -> &'static str {
        match self {
            Self::Content => "stratum_cache_content_miss_total",
            Self::Response => "stratum_cache_response_miss_total",
        }
    }

    fn evict_metric(self) -> &'static str {
        match self {
            Self::Content => "stratum_cache_content_evict_total",
            Self::Response => "stratum_cache_response_evict_total",
        }
    }
}

/// A cached value with its freshness deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    data: T,
    stored_at: OffsetDateTime,
    ttl: Duration,
    access_count: u64,
}

impl<T> CacheEntry<T> {
    fn new(data: T, stored_at: OffsetDateTime, ttl: Duration) -> Self {
        Self {
            data,
            stored_at,
            ttl,
            access_count: 0,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn stored_at(&self) -> OffsetDateTime {
        self.stored_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// An entry expires once its age reaches the ttl.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now - self.stored_at >= self.ttl
    }
}

impl<T: Clone> CacheEntry<T> {
    fn read(&mut self, now: OffsetDateTime) -> Lookup<T> {
        if self.is_expired(now) {
            return Lookup::Expired;
        }
        self.access_count += 1;
        Lookup::Hit(self.data.clone())
    }
}

enum Lookup<T> {
    Hit(T),
    Miss,
    Expired,
}

impl<T> Lookup<T> {
    fn into_value(self) -> Option<T> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss | Self::Expired => None,
        }
    }
}

/// Hit/miss tallies shared by every store of one cache.
#[derive(Debug, Default)]
pub struct HitCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitCounters {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn record<T>(&self, layer: CacheLayer, store: &'static str, lookup: &Lookup<T>) {
        match lookup {
            Lookup::Hit(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!(layer.hit_metric(), "store" => store).increment(1);
            }
            Lookup::Miss | Lookup::Expired => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!(layer.miss_metric(), "store" => store).increment(1);
            }
        }
    }
}

/// Wiring common to every store of one cache instance.
#[derive(Clone)]
pub struct StoreContext {
    pub layer: CacheLayer,
    pub clock: SharedClock,
    pub counters: Arc<HitCounters>,
}

/// Keyed TTL store.
///
/// Unbounded by default; with a capacity the least recently read entry is
/// evicted to make room.
pub struct TtlStore<T> {
    name: &'static str,
    ctx: StoreContext,
    entries: Mutex<LruCache<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlStore<T> {
    pub fn new(name: &'static str, ctx: StoreContext, capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(limit) => LruCache::new(limit),
            None => LruCache::unbounded(),
        };
        Self {
            name,
            ctx,
            entries: Mutex::new(entries),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert or overwrite `key` with a fresh entry.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        let entry = CacheEntry::new(value, self.ctx.clock.now(), ttl);
        let evicted = mutex_lock(&self.entries, self.name, "set").push(key.clone(), entry);

        if let Some((evicted_key, _)) = evicted.filter(|(evicted_key, _)| *evicted_key != key) {
            counter!(self.ctx.layer.evict_metric(), "store" => self.name).increment(1);
            debug!(
                store = self.name,
                key = %evicted_key,
                "evicted least recently used entry"
            );
        }
    }

    /// Fresh value for `key`, removing the entry if it has expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.ctx.clock.now();
        let lookup = {
            let mut entries = mutex_lock(&self.entries, self.name, "get");
            let lookup = match entries.get_mut(key) {
                Some(entry) => entry.read(now),
                None => Lookup::Miss,
            };
            if matches!(lookup, Lookup::Expired) {
                entries.pop(key);
                debug!(store = self.name, key, "dropped expired entry on read");
            }
            lookup
        };

        self.ctx.counters.record(self.ctx.layer, self.name, &lookup);
        lookup.into_value()
    }

    /// Snapshot of the entry without counting a read.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<T>> {
        mutex_lock(&self.entries, self.name, "peek")
            .peek(key)
            .cloned()
    }

    /// Fresh value for `key` without counting a read or touching recency.
    pub fn peek_fresh(&self, key: &str) -> Option<T> {
        let now = self.ctx.clock.now();
        mutex_lock(&self.entries, self.name, "peek_fresh")
            .peek(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }

    /// Remove `key`; returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        mutex_lock(&self.entries, self.name, "delete")
            .pop(key)
            .is_some()
    }

    /// Remove every entry; returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = mutex_lock(&self.entries, self.name, "clear");
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Remove every entry whose key satisfies `matches`.
    pub fn remove_matching(&self, matches: impl Fn(&str) -> bool) -> usize {
        let mut entries = mutex_lock(&self.entries, self.name, "remove_matching");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key.as_str());
        }
        doomed.len()
    }

    /// Drop every expired entry; returns how many were reclaimed.
    pub fn purge_expired(&self) -> usize {
        let now = self.ctx.clock.now();
        let mut entries = mutex_lock(&self.entries, self.name, "purge_expired");
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key.as_str());
        }
        expired.len()
    }

    /// Number of unexpired entries. Does not touch recency or access counts.
    pub fn live_len(&self) -> usize {
        let now = self.ctx.clock.now();
        mutex_lock(&self.entries, self.name, "live_len")
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, self.name, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-value TTL slot for aggregates such as "all pages".
pub struct TtlSlot<T> {
    name: &'static str,
    ctx: StoreContext,
    entry: Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone> TtlSlot<T> {
    pub fn new(name: &'static str, ctx: StoreContext) -> Self {
        Self {
            name,
            ctx,
            entry: Mutex::new(None),
        }
    }

    pub fn set(&self, value: T, ttl: Duration) {
        let entry = CacheEntry::new(value, self.ctx.clock.now(), ttl);
        *mutex_lock(&self.entry, self.name, "set") = Some(entry);
    }

    pub fn get(&self) -> Option<T> {
        let now = self.ctx.clock.now();
        let lookup = {
            let mut slot = mutex_lock(&self.entry, self.name, "get");
            let lookup = match slot.as_mut() {
                Some(entry) => entry.read(now),
                None => Lookup::Miss,
            };
            if matches!(lookup, Lookup::Expired) {
                *slot = None;
                debug!(store = self.name, "dropped expired aggregate on read");
            }
            lookup
        };

        self.ctx.counters.record(self.ctx.layer, self.name, &lookup);
        lookup.into_value()
    }

    pub fn peek_fresh(&self) -> Option<T> {
        let now = self.ctx.clock.now();
        mutex_lock(&self.entry, self.name, "peek_fresh")
            .as_ref()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }

    /// Empty the slot; returns whether it held a value.
    pub fn clear(&self) -> bool {
        mutex_lock(&self.entry, self.name, "clear").take().is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.ctx.clock.now();
        let mut slot = mutex_lock(&self.entry, self.name, "purge_expired");
        if slot.as_ref().is_some_and(|entry| entry.is_expired(now)) {
            *slot = None;
            1
        } else {
            0
        }
    }

    pub fn live_len(&self) -> usize {
        let now = self.ctx.clock.now();
        let slot = mutex_lock(&self.entry, self.name, "live_len");
        usize::from(slot.as_ref().is_some_and(|entry| !entry.is_expired(now)))
    }
}
