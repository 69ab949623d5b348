//! Reverse index from sections to the blocks they contain.
//!
//! The index answers one question: which cached section lists must be
//! dropped when a block changes. It holds membership, never content, and has
//! no expiry; entries leave only through explicit pruning.

use std::collections::{HashMap, HashSet};

/// Bidirectional section ↔ block membership.
#[derive(Debug, Default)]
pub struct SectionIndex {
    /// Section name → ids of the blocks cached under it.
    members: HashMap<String, HashSet<String>>,
    /// Block id → sections whose membership lists it.
    containing: HashMap<String, HashSet<String>>,
    /// Block id → the section named by the block itself on its last write.
    home: HashMap<String, String>,
}

impl SectionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single-block write.
    ///
    /// When the block previously declared a different section, that
    /// section's membership is dropped and its name returned so the caller
    /// can discard the now-inaccurate cached list.
    pub fn record_block(&mut self, id: &str, section: &str) -> Option<String> {
        let moved_from = self.rehome(id, section);
        self.link(section, id);
        moved_from
    }

    /// Record a section-list write from `(id, declared section)` pairs.
    ///
    /// Every id becomes a member of `section`. A unit that declares `section`
    /// itself is homed there, so any previous home is pruned as in
    /// [`record_block`](Self::record_block); those previous sections are
    /// returned in name order.
    pub fn record_section<'a>(
        &mut self,
        section: &str,
        units: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Vec<String> {
        let mut moved_from = Vec::new();
        for (id, declared) in units {
            if declared == section {
                moved_from.extend(self.rehome(id, section));
            }
            self.link(section, id);
        }
        moved_from.sort();
        moved_from.dedup();
        moved_from
    }

    /// Sections whose cached list includes `id`, in name order.
    pub fn sections_containing(&self, id: &str) -> Vec<String> {
        let mut sections: Vec<String> = self
            .containing
            .get(id)
            .map(|sections| sections.iter().cloned().collect())
            .unwrap_or_default();
        sections.sort();
        sections
    }

    /// Member ids of `section`, in id order.
    pub fn members(&self, section: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .members
            .get(section)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Drop all membership for `section`. Returns whether any existed.
    pub fn remove_section(&mut self, section: &str) -> bool {
        let Some(ids) = self.members.remove(section) else {
            return false;
        };

        for id in &ids {
            if let Some(sections) = self.containing.get_mut(id) {
                sections.remove(section);
                if sections.is_empty() {
                    self.containing.remove(id);
                }
            }
            if self.home.get(id).is_some_and(|home| home == section) {
                self.home.remove(id);
            }
        }
        true
    }

    /// Forget a block everywhere it appears.
    pub fn remove_block(&mut self, id: &str) {
        self.home.remove(id);
        let Some(sections) = self.containing.remove(id) else {
            return;
        };
        for section in sections {
            if let Some(ids) = self.members.get_mut(&section) {
                ids.remove(id);
                if ids.is_empty() {
                    self.members.remove(&section);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.containing.clear();
        self.home.clear();
    }

    pub fn section_count(&self) -> usize {
        self.members.len()
    }

    fn rehome(&mut self, id: &str, section: &str) -> Option<String> {
        let moved_from = self
            .home
            .get(id)
            .filter(|previous| previous.as_str() != section)
            .cloned();
        if let Some(previous) = &moved_from {
            self.remove_section(previous);
        }
        self.home.insert(id.to_string(), section.to_string());
        moved_from
    }

    fn link(&mut self, section: &str, id: &str) {
        self.members
            .entry(section.to_string())
            .or_default()
            .insert(id.to_string());
        self.containing
            .entry(id.to_string())
            .or_default()
            .insert(section.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_write_links_every_member() {
        let mut index = SectionIndex::new();
        let moved = index.record_section("events", [("e1", "events"), ("e2", "events")]);

        assert!(moved.is_empty());
        assert_eq!(index.members("events"), vec!["e1", "e2"]);
        assert_eq!(index.sections_containing("e1"), vec!["events"]);
    }

    #[test]
    fn block_may_be_listed_by_several_sections() {
        let mut index = SectionIndex::new();
        index.record_block("headline", "hero");
        index.record_section("featured", [("headline", "hero")]);

        assert_eq!(
            index.sections_containing("headline"),
            vec!["featured", "hero"]
        );
    }

    #[test]
    fn remove_section_cleans_both_directions() {
        let mut index = SectionIndex::new();
        index.record_section("events", [("e1", "events")]);
        index.record_section("archive", [("e1", "events")]);

        assert!(index.remove_section("events"));
        assert!(!index.remove_section("events"));
        assert!(index.members("events").is_empty());
        assert_eq!(index.sections_containing("e1"), vec!["archive"]);
    }

    #[test]
    fn moving_a_block_drops_its_previous_section() {
        let mut index = SectionIndex::new();
        index.record_block("b1", "hero");
        index.record_block("b2", "hero");

        assert_eq!(index.record_block("b1", "footer"), Some("hero".to_string()));
        assert!(index.members("hero").is_empty());
        assert_eq!(index.members("footer"), vec!["b1"]);
        assert_eq!(index.record_block("b1", "footer"), None);
    }

    #[test]
    fn remove_block_prunes_empty_sections() {
        let mut index = SectionIndex::new();
        index.record_block("b1", "hero");
        index.record_section("hero", [("b2", "hero")]);

        index.remove_block("b1");

        assert_eq!(index.members("hero"), vec!["b2"]);
        assert!(index.sections_containing("b1").is_empty());

        index.remove_block("b2");
        assert_eq!(index.section_count(), 0);
    }

    #[test]
    fn section_write_rehomes_blocks_that_declare_it() {
        let mut index = SectionIndex::new();
        index.record_section("hero", [("b1", "hero"), ("b2", "hero")]);

        let moved = index.record_section("footer", [("b1", "footer")]);

        assert_eq!(moved, vec!["hero"]);
        assert!(index.members("hero").is_empty());
        assert_eq!(index.sections_containing("b1"), vec!["footer"]);
        assert_eq!(index.record_block("b1", "footer"), None);
    }

    #[test]
    fn listing_under_a_foreign_section_keeps_home() {
        let mut index = SectionIndex::new();
        index.record_block("headline", "hero");

        let moved = index.record_section("featured", [("headline", "hero")]);

        assert!(moved.is_empty());
        assert_eq!(index.record_block("headline", "footer"), Some("hero".to_string()));
        assert_eq!(index.sections_containing("headline"), vec!["featured", "footer"]);
    }
}
