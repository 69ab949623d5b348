//! Client for the cache administration routes of a running server.

use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use crate::cache::PrefetchReport;

use super::error::InfraError;

#[derive(Clone, Debug)]
pub struct AdminClient {
    client: Client,
    base: Url,
}

impl AdminClient {
    pub fn new(server_url: &str) -> Result<Self, InfraError> {
        let base = Url::parse(server_url)
            .and_then(|url| url.join("/admin/cache/"))
            .map_err(|err| InfraError::origin(format!("invalid server url `{server_url}`: {err}")))?;
        let client = Client::builder()
            .user_agent(concat!("stratum-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InfraError::origin(format!("failed to build http client: {err}")))?;
        Ok(Self { client, base })
    }

    /// `POST /admin/cache/prefetch/{slug}`
    pub async fn prefetch(&self, slug: &str) -> Result<PrefetchReport, InfraError> {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["prefetch", slug]);
        }

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|err| InfraError::origin(format!("prefetch `{slug}` failed: {err}")))?;
        Self::handle(response).await
    }

    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, InfraError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| InfraError::origin(format!("failed to read body: {err}")))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(InfraError::origin(format!("status {status} body {text}")));
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| InfraError::origin(format!("failed to parse body: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_points_at_admin_routes() {
        let client = AdminClient::new("http://127.0.0.1:3000").expect("valid url");
        assert_eq!(client.base.as_str(), "http://127.0.0.1:3000/admin/cache/");
    }

    #[test]
    fn rejects_invalid_server_url() {
        assert!(AdminClient::new("127.0.0.1:3000 nope").is_err());
    }
}
