//! Contract for the authoritative content store behind the cache.

use async_trait::async_trait;
use stratum_types::{ContentUnit, Page};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin request for `{path}` failed: {message}")]
    Transport { path: String, message: String },
    #[error("origin answered `{path}` with status {status}")]
    Status { path: String, status: u16 },
    #[error("origin response for `{path}` could not be decoded: {message}")]
    Decode { path: String, message: String },
}

impl OriginError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Transport { path, .. } | Self::Status { path, .. } | Self::Decode { path, .. } => {
                path
            }
        }
    }
}

/// Read access to the origin, one call per entity family.
#[async_trait]
pub trait ContentOrigin: Send + Sync {
    /// `GET /content-units/{id}`
    async fn fetch_block(&self, id: &str) -> Result<ContentUnit, OriginError>;

    /// `GET /content-units/section/{name}`
    async fn fetch_section(&self, name: &str) -> Result<Vec<ContentUnit>, OriginError>;

    /// `GET /content-units`
    async fn fetch_blocks(&self) -> Result<Vec<ContentUnit>, OriginError>;

    /// `GET /pages/{slug}`
    async fn fetch_page(&self, slug: &str) -> Result<Page, OriginError>;

    /// `GET /pages`
    async fn fetch_pages(&self) -> Result<Vec<Page>, OriginError>;
}
