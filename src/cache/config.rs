//! Cache configuration.
//!
//! Read from the `[cache]` table of `stratum.toml`; every field has a default.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_BLOCK_TTL_SECS: u64 = 300;
const DEFAULT_SECTION_TTL_SECS: u64 = 300;
const DEFAULT_PAGE_TTL_SECS: u64 = 600;
const DEFAULT_ALL_BLOCKS_TTL_SECS: u64 = 300;
const DEFAULT_ALL_PAGES_TTL_SECS: u64 = 600;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_RESPONSE_TTL_SECS: u64 = 3600;
const DEFAULT_RESPONSE_CONTENT_TTL_SECS: u64 = 300;
const DEFAULT_RESPONSE_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Cache configuration from `stratum.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a single content unit.
    pub block_ttl_seconds: u64,
    /// Lifetime of a section's unit list.
    pub section_ttl_seconds: u64,
    /// Lifetime of a single page.
    pub page_ttl_seconds: u64,
    /// Lifetime of the "all content units" aggregate.
    pub all_blocks_ttl_seconds: u64,
    /// Lifetime of the "all pages" aggregate.
    pub all_pages_ttl_seconds: u64,
    /// Per-store entry limit; 0 leaves stores unbounded.
    pub max_entries_per_store: usize,
    /// Period of the expired-entry sweep; 0 disables it.
    pub sweep_interval_seconds: u64,
    /// Enable the HTTP response cache.
    pub enable_response_cache: bool,
    /// Response lifetime for routes without their own ttl.
    pub response_default_ttl_seconds: u64,
    /// Response lifetime for the read-through content routes.
    pub response_content_ttl_seconds: u64,
    /// Response cache entry limit; 0 leaves it unbounded.
    pub response_max_entries: usize,
    /// Largest response body the cache will capture.
    pub response_max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_ttl_seconds: DEFAULT_BLOCK_TTL_SECS,
            section_ttl_seconds: DEFAULT_SECTION_TTL_SECS,
            page_ttl_seconds: DEFAULT_PAGE_TTL_SECS,
            all_blocks_ttl_seconds: DEFAULT_ALL_BLOCKS_TTL_SECS,
            all_pages_ttl_seconds: DEFAULT_ALL_PAGES_TTL_SECS,
            max_entries_per_store: 0,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECS,
            enable_response_cache: true,
            response_default_ttl_seconds: DEFAULT_RESPONSE_TTL_SECS,
            response_content_ttl_seconds: DEFAULT_RESPONSE_CONTENT_TTL_SECS,
            response_max_entries: 0,
            response_max_body_bytes: DEFAULT_RESPONSE_MAX_BODY_BYTES,
        }
    }
}

impl CacheConfig {
    pub fn block_ttl(&self) -> Duration {
        Duration::from_secs(self.block_ttl_seconds)
    }

    pub fn section_ttl(&self) -> Duration {
        Duration::from_secs(self.section_ttl_seconds)
    }

    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.page_ttl_seconds)
    }

    pub fn all_blocks_ttl(&self) -> Duration {
        Duration::from_secs(self.all_blocks_ttl_seconds)
    }

    pub fn all_pages_ttl(&self) -> Duration {
        Duration::from_secs(self.all_pages_ttl_seconds)
    }

    pub fn response_default_ttl(&self) -> Duration {
        Duration::from_secs(self.response_default_ttl_seconds)
    }

    pub fn response_content_ttl(&self) -> Duration {
        Duration::from_secs(self.response_content_ttl_seconds)
    }

    /// `None` when the sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }

    /// Store capacity, or `None` for unbounded stores.
    pub fn store_capacity(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.max_entries_per_store)
    }

    pub fn response_capacity(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.response_max_entries)
    }

    /// Name of the first ttl that is zero, if any.
    pub fn zero_ttl_field(&self) -> Option<&'static str> {
        [
            ("cache.block_ttl_seconds", self.block_ttl_seconds),
            ("cache.section_ttl_seconds", self.section_ttl_seconds),
            ("cache.page_ttl_seconds", self.page_ttl_seconds),
            ("cache.all_blocks_ttl_seconds", self.all_blocks_ttl_seconds),
            ("cache.all_pages_ttl_seconds", self.all_pages_ttl_seconds),
            (
                "cache.response_default_ttl_seconds",
                self.response_default_ttl_seconds,
            ),
            (
                "cache.response_content_ttl_seconds",
                self.response_content_ttl_seconds,
            ),
        ]
        .into_iter()
        .find_map(|(key, value)| (value == 0).then_some(key))
    }
}
