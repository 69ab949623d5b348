//! Cache-first content reads.
//!
//! Every lookup consults the content cache, falls back to the origin on a
//! miss, and writes the result back. Misses are serialized per key through
//! [`KeyedFlight`], so a burst of requests for one cold entry costs a single
//! origin fetch; later callers find the entry when they re-check.

use std::future::Future;
use std::sync::Arc;

use stratum_types::{ContentUnit, Page};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::application::origin::{ContentOrigin, OriginError};
use crate::cache::{ContentCache, KeyedFlight};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content not found at `{path}`")]
    NotFound { path: String },
    #[error("origin fetch failed")]
    Origin(#[source] OriginError),
}

impl From<OriginError> for ContentError {
    fn from(error: OriginError) -> Self {
        if error.is_not_found() {
            Self::NotFound {
                path: error.path().to_string(),
            }
        } else {
            Self::Origin(error)
        }
    }
}

pub struct ContentService {
    cache: Arc<ContentCache>,
    origin: Arc<dyn ContentOrigin>,
    flight: KeyedFlight,
}

impl ContentService {
    pub fn new(cache: Arc<ContentCache>, origin: Arc<dyn ContentOrigin>) -> Self {
        Self {
            cache,
            origin,
            flight: KeyedFlight::new(),
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub fn origin(&self) -> &Arc<dyn ContentOrigin> {
        &self.origin
    }

    #[instrument(skip(self))]
    pub async fn block(&self, id: &str) -> Result<ContentUnit, ContentError> {
        self.read_through(
            &format!("block:{id}"),
            |cache| cache.get_block(id),
            |cache| cache.peek_block(id),
            || self.origin.fetch_block(id),
            |cache, unit| cache.set_block(unit),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn section(&self, name: &str) -> Result<Vec<ContentUnit>, ContentError> {
        self.read_through(
            &format!("section:{name}"),
            |cache| cache.get_section(name),
            |cache| cache.peek_section(name),
            || self.origin.fetch_section(name),
            |cache, units| cache.set_section(name, units),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn blocks(&self) -> Result<Vec<ContentUnit>, ContentError> {
        self.read_through(
            "all_blocks",
            ContentCache::get_all_blocks,
            ContentCache::peek_all_blocks,
            || self.origin.fetch_blocks(),
            ContentCache::set_all_blocks,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn page(&self, slug: &str) -> Result<Page, ContentError> {
        self.read_through(
            &format!("page:{slug}"),
            |cache| cache.get_page(slug),
            |cache| cache.peek_page(slug),
            || self.origin.fetch_page(slug),
            ContentCache::set_page,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn pages(&self) -> Result<Vec<Page>, ContentError> {
        self.read_through(
            "all_pages",
            ContentCache::get_all_pages,
            ContentCache::peek_all_pages,
            || self.origin.fetch_pages(),
            ContentCache::set_all_pages,
        )
        .await
    }

    /// `cached` is the counted lookup; `peek` re-checks uncounted once the
    /// caller holds the key's turn.
    async fn read_through<T, Fut>(
        &self,
        key: &str,
        cached: impl FnOnce(&ContentCache) -> Option<T>,
        peek: impl FnOnce(&ContentCache) -> Option<T>,
        fetch: impl FnOnce() -> Fut,
        store: impl FnOnce(&ContentCache, T),
    ) -> Result<T, ContentError>
    where
        T: Clone,
        Fut: Future<Output = Result<T, OriginError>>,
    {
        if let Some(value) = cached(&self.cache) {
            return Ok(value);
        }

        self.flight
            .run(key, || async move {
                if let Some(value) = peek(&self.cache) {
                    debug!(key, "filled by a concurrent caller");
                    return Ok(value);
                }

                let value = fetch().await.map_err(ContentError::from)?;
                store(&self.cache, value.clone());
                debug!(key, "filled from origin");
                Ok::<T, ContentError>(value)
            })
            .await
    }
}
