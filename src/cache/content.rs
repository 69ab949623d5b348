//! Content cache: blocks, sections, pages, and their aggregates.
//!
//! Section lists are derived from blocks, so the cache keeps a
//! [`SectionIndex`] of which blocks each cached list contains. Changing a
//! block drops every list that contains it.

use std::sync::{Arc, Mutex};

use stratum_types::{CacheStats, ContentUnit, Page};
use tracing::{debug, info};

use super::clock::{SharedClock, SystemClock};
use super::config::CacheConfig;
use super::index::SectionIndex;
use super::lock::mutex_lock;
use super::stats::StatsTracker;
use super::store::{CacheLayer, HitCounters, StoreContext, TtlSlot, TtlStore};

const SOURCE: &str = "cache::content";

/// Outcome of [`ContentCache::invalidate_block`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockInvalidation {
    /// Whether the block itself was cached.
    pub removed: bool,
    /// Sections whose cached lists were dropped, in name order.
    pub cascaded: Vec<String>,
}

pub struct ContentCache {
    config: CacheConfig,
    blocks: TtlStore<ContentUnit>,
    sections: TtlStore<Vec<ContentUnit>>,
    pages: TtlStore<Page>,
    all_blocks: TtlSlot<Vec<ContentUnit>>,
    all_pages: TtlSlot<Vec<Page>>,
    /// Held for the whole of every write so store and index changes land together.
    index: Mutex<SectionIndex>,
    stats: StatsTracker,
}

impl ContentCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: SharedClock) -> Self {
        let counters = Arc::new(HitCounters::default());
        let ctx = StoreContext {
            layer: CacheLayer::Content,
            clock,
            counters: Arc::clone(&counters),
        };
        let capacity = config.store_capacity();

        Self {
            config: config.clone(),
            blocks: TtlStore::new("blocks", ctx.clone(), capacity),
            sections: TtlStore::new("sections", ctx.clone(), capacity),
            pages: TtlStore::new("pages", ctx.clone(), capacity),
            all_blocks: TtlSlot::new("all_blocks", ctx.clone()),
            all_pages: TtlSlot::new("all_pages", ctx),
            index: Mutex::new(SectionIndex::new()),
            stats: StatsTracker::new(counters),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    pub fn get_block(&self, id: &str) -> Option<ContentUnit> {
        let value = self.blocks.get(id);
        self.recompute();
        value
    }

    /// Cache a block and record it as a member of its section.
    pub fn set_block(&self, unit: ContentUnit) {
        {
            let mut index = mutex_lock(&self.index, SOURCE, "set_block");
            if let Some(previous) = index.record_block(&unit.id, &unit.section) {
                self.sections.delete(&previous);
                debug!(
                    block = %unit.id,
                    from = %previous,
                    to = %unit.section,
                    "block moved sections; dropped previous section list"
                );
            }
            self.blocks
                .set(unit.id.clone(), unit, self.config.block_ttl());
        }
        self.recompute();
    }

    /// Drop a block, the all-blocks aggregate, and every section list containing it.
    pub fn invalidate_block(&self, id: &str) -> BlockInvalidation {
        let outcome = {
            let mut index = mutex_lock(&self.index, SOURCE, "invalidate_block");
            let removed = self.blocks.delete(id);
            self.all_blocks.clear();

            let cascaded = index.sections_containing(id);
            for section in &cascaded {
                self.sections.delete(section);
                index.remove_section(section);
            }
            index.remove_block(id);
            BlockInvalidation { removed, cascaded }
        };

        self.stats.record_invalidation("block");
        debug!(
            block = id,
            removed = outcome.removed,
            cascaded = ?outcome.cascaded,
            "invalidated block"
        );
        self.recompute();
        outcome
    }

    // ========================================================================
    // Sections
    // ========================================================================

    pub fn get_section(&self, name: &str) -> Option<Vec<ContentUnit>> {
        let value = self.sections.get(name);
        self.recompute();
        value
    }

    /// Cache a section's unit list; every unit becomes a member of `name`.
    pub fn set_section(&self, name: &str, units: Vec<ContentUnit>) {
        {
            let mut index = mutex_lock(&self.index, SOURCE, "set_section");
            let moved_from = index.record_section(
                name,
                units
                    .iter()
                    .map(|unit| (unit.id.as_str(), unit.section.as_str())),
            );
            for previous in &moved_from {
                self.sections.delete(previous);
                debug!(
                    section = name,
                    from = %previous,
                    "section list claimed moved blocks; dropped previous section list"
                );
            }
            self.sections.set(name, units, self.config.section_ttl());
        }
        self.recompute();
    }

    /// Drop a section list and all of its membership.
    ///
    /// Returns whether a list was cached.
    pub fn invalidate_section(&self, name: &str) -> bool {
        let removed = {
            let mut index = mutex_lock(&self.index, SOURCE, "invalidate_section");
            index.remove_section(name);
            self.sections.delete(name)
        };

        self.stats.record_invalidation("section");
        debug!(section = name, removed, "invalidated section");
        self.recompute();
        removed
    }

    /// Current members recorded for `name`, in id order.
    pub fn section_members(&self, name: &str) -> Vec<String> {
        mutex_lock(&self.index, SOURCE, "section_members").members(name)
    }

    // ========================================================================
    // Pages
    // ========================================================================

    pub fn get_page(&self, slug: &str) -> Option<Page> {
        let value = self.pages.get(slug);
        self.recompute();
        value
    }

    pub fn set_page(&self, page: Page) {
        self.pages
            .set(page.slug.clone(), page, self.config.page_ttl());
        self.recompute();
    }

    /// Drop a page and the all-pages aggregate. Returns whether the page was cached.
    pub fn invalidate_page(&self, slug: &str) -> bool {
        let removed = self.pages.delete(slug);
        self.all_pages.clear();

        self.stats.record_invalidation("page");
        debug!(page = slug, removed, "invalidated page");
        self.recompute();
        removed
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    pub fn get_all_blocks(&self) -> Option<Vec<ContentUnit>> {
        let value = self.all_blocks.get();
        self.recompute();
        value
    }

    pub fn set_all_blocks(&self, units: Vec<ContentUnit>) {
        self.all_blocks.set(units, self.config.all_blocks_ttl());
        self.recompute();
    }

    pub fn invalidate_all_blocks(&self) -> bool {
        let removed = self.all_blocks.clear();
        self.stats.record_invalidation("all_blocks");
        self.recompute();
        removed
    }

    pub fn get_all_pages(&self) -> Option<Vec<Page>> {
        let value = self.all_pages.get();
        self.recompute();
        value
    }

    pub fn set_all_pages(&self, pages: Vec<Page>) {
        self.all_pages.set(pages, self.config.all_pages_ttl());
        self.recompute();
    }

    pub fn invalidate_all_pages(&self) -> bool {
        let removed = self.all_pages.clear();
        self.stats.record_invalidation("all_pages");
        self.recompute();
        removed
    }

    // ========================================================================
    // Uncounted re-checks for fills that waited behind another caller
    // ========================================================================

    pub fn peek_block(&self, id: &str) -> Option<ContentUnit> {
        self.blocks.peek_fresh(id)
    }

    pub fn peek_section(&self, name: &str) -> Option<Vec<ContentUnit>> {
        self.sections.peek_fresh(name)
    }

    pub fn peek_page(&self, slug: &str) -> Option<Page> {
        self.pages.peek_fresh(slug)
    }

    pub fn peek_all_blocks(&self) -> Option<Vec<ContentUnit>> {
        self.all_blocks.peek_fresh()
    }

    pub fn peek_all_pages(&self) -> Option<Vec<Page>> {
        self.all_pages.peek_fresh()
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Clear every store and the reverse index. Counts as one invalidation.
    ///
    /// Returns the number of entries dropped.
    pub fn invalidate_all(&self) -> usize {
        let removed = {
            let mut index = mutex_lock(&self.index, SOURCE, "invalidate_all");
            let removed = self.blocks.clear()
                + self.sections.clear()
                + self.pages.clear()
                + usize::from(self.all_blocks.clear())
                + usize::from(self.all_pages.clear());
            index.clear();
            removed
        };

        self.stats.record_invalidation("all");
        info!(removed, "content cache cleared");
        self.recompute();
        removed
    }

    /// Reclaim expired entries without waiting for a read to find them.
    pub fn purge_expired(&self) -> usize {
        let purged = self.blocks.purge_expired()
            + self.sections.purge_expired()
            + self.pages.purge_expired()
            + self.all_blocks.purge_expired()
            + self.all_pages.purge_expired();
        self.recompute();
        purged
    }

    /// Statistics snapshot with the size counted over unexpired entries.
    pub fn stats(&self) -> CacheStats {
        self.stats.recompute(self.live_size());
        self.stats.snapshot()
    }

    fn live_size(&self) -> usize {
        self.blocks.live_len()
            + self.sections.live_len()
            + self.pages.live_len()
            + self.all_blocks.live_len()
            + self.all_pages.live_len()
    }

    /// Cheap refresh after each operation; expired entries still resident
    /// count until a read or the sweep removes them.
    fn recompute(&self) {
        let resident = self.blocks.len()
            + self.sections.len()
            + self.pages.len()
            + self.all_blocks.live_len()
            + self.all_pages.live_len();
        self.stats.recompute(resident);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::clock::ManualClock;

    fn cache_with_clock() -> (ContentCache, ManualClock) {
        let clock = ManualClock::default();
        let config = CacheConfig {
            block_ttl_seconds: 5,
            ..Default::default()
        };
        (ContentCache::with_clock(&config, Arc::new(clock.clone())), clock)
    }

    fn unit(id: &str, section: &str) -> ContentUnit {
        ContentUnit::new(id, section).with_content(format!("{id} body"))
    }

    #[test]
    fn block_roundtrip_and_expiry() {
        let (cache, clock) = cache_with_clock();
        cache.set_block(unit("hero-headline", "hero"));

        clock.advance(Duration::from_secs(2));
        assert!(cache.get_block("hero-headline").is_some());
        let before = cache.stats();

        clock.advance(Duration::from_secs(4));
        assert!(cache.get_block("hero-headline").is_none());

        let after = cache.stats();
        assert_eq!(after.misses, before.misses + 1);
        assert_eq!(after.size, 0);
    }

    #[test]
    fn invalidating_block_drops_containing_sections() {
        let (cache, _clock) = cache_with_clock();
        cache.set_block(unit("headline", "hero"));
        cache.set_section("hero", vec![unit("headline", "hero")]);

        let outcome = cache.invalidate_block("headline");

        assert!(outcome.removed);
        assert_eq!(outcome.cascaded, vec!["hero"]);
        assert!(cache.get_section("hero").is_none());
        assert!(cache.get_block("headline").is_none());
        assert!(cache.section_members("hero").is_empty());
    }

    #[test]
    fn invalidating_block_drops_all_blocks_aggregate() {
        let (cache, _clock) = cache_with_clock();
        cache.set_all_blocks(vec![unit("a", "s")]);

        let outcome = cache.invalidate_block("a");

        assert_eq!(outcome, BlockInvalidation::default());
        assert!(cache.get_all_blocks().is_none());
    }

    #[test]
    fn invalidating_page_drops_all_pages_aggregate() {
        let (cache, _clock) = cache_with_clock();
        cache.set_page(Page::new("home", vec!["hero".into()]));
        cache.set_all_pages(vec![Page::new("home", vec![])]);

        assert!(cache.invalidate_page("home"));
        assert!(cache.get_page("home").is_none());
        assert!(cache.get_all_pages().is_none());
        assert!(!cache.invalidate_page("home"));
    }

    #[test]
    fn moving_block_drops_previous_section_list() {
        let (cache, _clock) = cache_with_clock();
        cache.set_block(unit("b1", "hero"));
        cache.set_section("hero", vec![unit("b1", "hero")]);

        cache.set_block(unit("b1", "footer"));

        assert!(cache.get_section("hero").is_none());
        assert_eq!(cache.section_members("footer"), vec!["b1"]);
    }

    #[test]
    fn invalidate_all_counts_once() {
        let (cache, _clock) = cache_with_clock();
        cache.set_block(unit("a", "s"));
        cache.set_section("s", vec![unit("a", "s")]);
        cache.set_page(Page::new("home", vec!["s".into()]));
        cache.set_all_pages(vec![]);

        assert_eq!(cache.invalidate_all(), 4);

        let stats = cache.stats();
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.size, 0);
        assert!(cache.section_members("s").is_empty());
    }

    #[test]
    fn purge_reclaims_expired_blocks() {
        let (cache, clock) = cache_with_clock();
        cache.set_block(unit("a", "s"));
        cache.set_page(Page::new("home", vec![]));

        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().size, 1);
    }
}
