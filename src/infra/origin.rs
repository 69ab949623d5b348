//! HTTP client for the origin content store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use stratum_types::{ContentUnit, Page};
use tracing::{debug, instrument};

use crate::application::origin::{ContentOrigin, OriginError};

use super::error::InfraError;

#[derive(Clone, Debug)]
pub struct HttpOrigin {
    client: Client,
    base: Url,
}

impl HttpOrigin {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        let base = Url::parse(base_url)
            .map_err(|err| InfraError::origin(format!("invalid base url `{base_url}`: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(InfraError::origin(format!(
                "base url `{base_url}` cannot carry a path"
            )));
        }

        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::origin(format!("failed to build http client: {err}")))?;

        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("stratum/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Append `segments` to the base path; each segment is percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    #[instrument(skip(self), fields(origin = %self.base))]
    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, OriginError> {
        let url = self.url(segments);
        let path = url.path().to_string();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| OriginError::Transport {
                path: path.clone(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(path, status = status.as_u16(), "origin rejected request");
            return Err(OriginError::Status {
                path,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| OriginError::Transport {
                path: path.clone(),
                message: err.to_string(),
            })?;

        serde_json::from_slice(&bytes).map_err(|err| OriginError::Decode {
            path,
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl ContentOrigin for HttpOrigin {
    async fn fetch_block(&self, id: &str) -> Result<ContentUnit, OriginError> {
        self.get_json(&["content-units", id]).await
    }

    async fn fetch_section(&self, name: &str) -> Result<Vec<ContentUnit>, OriginError> {
        self.get_json(&["content-units", "section", name]).await
    }

    async fn fetch_blocks(&self) -> Result<Vec<ContentUnit>, OriginError> {
        self.get_json(&["content-units"]).await
    }

    async fn fetch_page(&self, slug: &str) -> Result<Page, OriginError> {
        self.get_json(&["pages", slug]).await
    }

    async fn fetch_pages(&self) -> Result<Vec<Page>, OriginError> {
        self.get_json(&["pages"]).await
    }
}
