//! Periodic reclamation of expired cache entries.
//!
//! Reads already refuse expired entries; the sweep only frees the memory of
//! entries nobody asked for again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{ContentCache, ResponseCache};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub content: usize,
    pub responses: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    content: Arc<ContentCache>,
    responses: Arc<ResponseCache>,
}

impl Sweeper {
    pub fn new(content: Arc<ContentCache>, responses: Arc<ResponseCache>) -> Self {
        Self { content, responses }
    }

    pub fn sweep(&self) -> SweepOutcome {
        let outcome = SweepOutcome {
            content: self.content.purge_expired(),
            responses: self.responses.purge_expired(),
        };
        if outcome != SweepOutcome::default() {
            debug!(
                target = "stratum::sweeper",
                content = outcome.content,
                responses = outcome.responses,
                "purged expired entries"
            );
        }
        outcome
    }

    /// Sweep every `period` until the returned task is aborted.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                self.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stratum_types::ContentUnit;

    use super::*;
    use crate::cache::{CacheConfig, CachedResponse, ManualClock};

    #[test]
    fn sweep_reclaims_both_caches() {
        let clock = ManualClock::default();
        let config = CacheConfig {
            block_ttl_seconds: 1,
            ..Default::default()
        };
        let content = Arc::new(ContentCache::with_clock(&config, Arc::new(clock.clone())));
        let responses = Arc::new(ResponseCache::with_clock(None, Arc::new(clock.clone())));
        content.set_block(ContentUnit::new("a", "s"));
        responses.set(
            "GET /pages:user:anonymous",
            CachedResponse::from_json(&json!([])),
            Duration::from_secs(1),
        );

        let sweeper = Sweeper::new(Arc::clone(&content), Arc::clone(&responses));
        assert_eq!(sweeper.sweep(), SweepOutcome::default());

        clock.advance(Duration::from_secs(1));
        assert_eq!(
            sweeper.sweep(),
            SweepOutcome {
                content: 1,
                responses: 1
            }
        );
        assert!(responses.is_empty());
    }
}
