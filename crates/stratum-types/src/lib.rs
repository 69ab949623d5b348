//! Wire types shared between the Stratum service, its origin, and its clients.
//!
//! Every entity keeps unknown JSON fields in `extra` so a cache round trip
//! never drops data the origin added.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Smallest addressable piece of managed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: String,
    pub section: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentUnit {
    pub fn new(id: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            section: section.into(),
            content: String::new(),
            format: default_format(),
            extra: Map::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

fn default_format() -> String {
    "text".to_string()
}

/// Top-level routable entity referencing the sections it renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Page {
    pub fn new(slug: impl Into<String>, sections: Vec<String>) -> Self {
        Self {
            slug: slug.into(),
            title: String::new(),
            sections,
            extra: Map::new(),
        }
    }
}

/// Point-in-time view of content cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    /// Live (unexpired) entries across every content store.
    pub size: u64,
    /// `hits / (hits + misses)`, or `0.0` before the first lookup.
    pub hit_ratio: f64,
}
