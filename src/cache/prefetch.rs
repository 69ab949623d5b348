//! Page prefetching.
//!
//! Warms the content cache for one page: the page itself, then every section
//! it lists, then each block of those sections. Sections are fetched
//! concurrently and fail independently of one another.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use metrics::histogram;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::application::origin::{ContentOrigin, OriginError};

use super::content::ContentCache;

const METRIC_PREFETCH_MS: &str = "stratum_cache_prefetch_ms";

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("failed to fetch page `{slug}`")]
    Page {
        slug: String,
        #[source]
        source: OriginError,
    },
    #[error("failed to fetch section `{name}`")]
    Section {
        name: String,
        #[source]
        source: OriginError,
    },
}

/// Result of warming one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub section: String,
    /// Blocks written to the cache; zero when the fetch failed.
    pub blocks: usize,
    pub error: Option<String>,
}

/// Result of warming one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchReport {
    pub slug: String,
    pub sections: Vec<SectionOutcome>,
}

impl PrefetchReport {
    pub fn failed_sections(&self) -> impl Iterator<Item = &SectionOutcome> {
        self.sections.iter().filter(|outcome| outcome.error.is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.failed_sections().next().is_none()
    }

    pub fn blocks_warmed(&self) -> usize {
        self.sections.iter().map(|outcome| outcome.blocks).sum()
    }
}

pub struct Prefetcher {
    cache: Arc<ContentCache>,
    origin: Arc<dyn ContentOrigin>,
}

impl Prefetcher {
    pub fn new(cache: Arc<ContentCache>, origin: Arc<dyn ContentOrigin>) -> Self {
        Self { cache, origin }
    }

    /// Warm a page and everything it references.
    ///
    /// A failed page fetch caches nothing. Section failures are reported in
    /// the returned [`PrefetchReport`] and leave sibling sections untouched.
    #[instrument(skip(self))]
    pub async fn prefetch_page(&self, slug: &str) -> Result<PrefetchReport, PrefetchError> {
        let started_at = Instant::now();

        let page = self.origin.fetch_page(slug).await.map_err(|source| {
            warn!(slug, error = %source, "page prefetch failed; nothing cached");
            PrefetchError::Page {
                slug: slug.to_string(),
                source,
            }
        })?;

        let sections: Vec<String> = {
            let mut seen = HashSet::new();
            page.sections
                .iter()
                .filter(|name| seen.insert(name.as_str()))
                .cloned()
                .collect()
        };
        self.cache.set_page(page);

        let outcomes = join_all(sections.iter().map(|name| async move {
            match self.prefetch_section(name).await {
                Ok(blocks) => SectionOutcome {
                    section: name.clone(),
                    blocks,
                    error: None,
                },
                Err(error) => SectionOutcome {
                    section: name.clone(),
                    blocks: 0,
                    error: Some(error_chain(&error)),
                },
            }
        }))
        .await;

        let report = PrefetchReport {
            slug: slug.to_string(),
            sections: outcomes,
        };

        histogram!(METRIC_PREFETCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            slug,
            sections = report.sections.len(),
            failed = report.failed_sections().count(),
            blocks = report.blocks_warmed(),
            "page prefetched"
        );

        Ok(report)
    }

    /// Warm one section list and each of its blocks; returns the block count.
    #[instrument(skip(self))]
    pub async fn prefetch_section(&self, name: &str) -> Result<usize, PrefetchError> {
        let units = self.origin.fetch_section(name).await.map_err(|source| {
            warn!(section = name, error = %source, "section prefetch failed");
            PrefetchError::Section {
                name: name.to_string(),
                source,
            }
        })?;

        let count = units.len();
        self.cache.set_section(name, units.clone());
        for unit in units {
            self.cache.set_block(unit);
        }

        Ok(count)
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(inner) = current {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        current = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use stratum_types::{ContentUnit, Page};

    use super::*;
    use crate::cache::config::CacheConfig;

    #[derive(Default)]
    struct FixtureOrigin {
        pages: HashMap<String, Page>,
        sections: HashMap<String, Vec<ContentUnit>>,
    }

    fn missing(path: String) -> OriginError {
        OriginError::Status { path, status: 404 }
    }

    #[async_trait]
    impl ContentOrigin for FixtureOrigin {
        async fn fetch_block(&self, id: &str) -> Result<ContentUnit, OriginError> {
            Err(missing(format!("/content-units/{id}")))
        }

        async fn fetch_section(&self, name: &str) -> Result<Vec<ContentUnit>, OriginError> {
            self.sections
                .get(name)
                .cloned()
                .ok_or_else(|| missing(format!("/content-units/section/{name}")))
        }

        async fn fetch_blocks(&self) -> Result<Vec<ContentUnit>, OriginError> {
            Ok(Vec::new())
        }

        async fn fetch_page(&self, slug: &str) -> Result<Page, OriginError> {
            self.pages
                .get(slug)
                .cloned()
                .ok_or_else(|| missing(format!("/pages/{slug}")))
        }

        async fn fetch_pages(&self) -> Result<Vec<Page>, OriginError> {
            Ok(self.pages.values().cloned().collect())
        }
    }

    fn prefetcher(origin: FixtureOrigin) -> (Prefetcher, Arc<ContentCache>) {
        let cache = Arc::new(ContentCache::new(&CacheConfig::default()));
        (
            Prefetcher::new(Arc::clone(&cache), Arc::new(origin)),
            cache,
        )
    }

    #[tokio::test]
    async fn missing_page_caches_nothing() {
        let (prefetcher, cache) = prefetcher(FixtureOrigin::default());

        let error = prefetcher
            .prefetch_page("home")
            .await
            .expect_err("page should be missing");

        assert!(matches!(error, PrefetchError::Page { .. }));
        assert_eq!(cache.stats().size, 0);
    }

    #[tokio::test]
    async fn failing_section_does_not_block_siblings() {
        let mut origin = FixtureOrigin::default();
        origin.pages.insert(
            "home".into(),
            Page::new("home", vec!["hero".into(), "broken".into(), "hero".into()]),
        );
        origin.sections.insert(
            "hero".into(),
            vec![ContentUnit::new("headline", "hero"), ContentUnit::new("cta", "hero")],
        );
        let (prefetcher, cache) = prefetcher(origin);

        let report = prefetcher
            .prefetch_page("home")
            .await
            .expect("page should prefetch");

        assert_eq!(report.sections.len(), 2);
        assert!(!report.is_complete());
        assert_eq!(report.blocks_warmed(), 2);
        assert!(cache.get_page("home").is_some());
        assert_eq!(cache.get_section("hero").map(|units| units.len()), Some(2));
        assert!(cache.get_block("cta").is_some());
        assert!(cache.get_section("broken").is_none());
        assert_eq!(cache.section_members("hero"), vec!["cta", "headline"]);
    }
}
