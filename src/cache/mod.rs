//! Stratum cache system.
//!
//! Two caches share one TTL store implementation:
//!
//! - **Content cache**: blocks, section lists, pages, and the two
//!   "all" aggregates, with a reverse index so changing a block drops every
//!   section list that contains it.
//! - **Response cache**: whole JSON responses keyed per request and caller,
//!   filled and served by [`response_cache_layer`].
//!
//! Expiry is lazy: a read never returns an entry past its ttl. A periodic
//! sweep only reclaims memory.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! block_ttl_seconds = 300
//! page_ttl_seconds = 600
//! max_entries_per_store = 0
//! sweep_interval_seconds = 60
//! enable_response_cache = true
//! # ... see config.rs for all options
//! ```

mod clock;
mod config;
mod content;
mod flight;
mod index;
mod lock;
mod middleware;
mod prefetch;
mod response;
mod stats;
mod store;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::CacheConfig;
pub use content::{BlockInvalidation, ContentCache};
pub use flight::KeyedFlight;
pub use index::SectionIndex;
pub use middleware::{
    AuthenticatedUser, CacheBypass, ConditionFn, KeyFn, ResponseCachePolicy, ResponseCacheState,
    X_CACHE, default_cache_key, mark_bypass, response_cache_layer,
};
pub use prefetch::{PrefetchError, PrefetchReport, Prefetcher, SectionOutcome};
pub use response::{CachedResponse, CaptureError, DEFAULT_MAX_BODY_BYTES, ResponseCache};
pub use stats::{StatsTracker, hit_ratio};
pub use store::{CacheEntry, CacheLayer, HitCounters, StoreContext, TtlSlot, TtlStore};
