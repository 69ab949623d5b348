//! Storage behind the HTTP response cache.
//!
//! Entries are the captured JSON bytes of a handler response, keyed by the
//! request key the middleware builds, so a hit is replayed byte for byte
//! without touching the handler.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use http_body_util::BodyExt;
use serde::de::IgnoredAny;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use super::clock::{SharedClock, SystemClock};
use super::store::{CacheLayer, HitCounters, StoreContext, TtlStore};

/// Largest body captured by default.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// A captured response body and the content type it was served with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: Bytes,
    pub content_type: HeaderValue,
}

impl CachedResponse {
    pub fn new(body: Bytes, content_type: Option<&HeaderValue>) -> Self {
        Self {
            body,
            content_type: content_type
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("application/json")),
        }
    }

    /// Serialize `value` the way a `Json` handler would.
    pub fn from_json(value: &Value) -> Self {
        Self::new(Bytes::from(value.to_string()), None)
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

pub struct ResponseCache {
    store: TtlStore<CachedResponse>,
    counters: Arc<HitCounters>,
}

impl ResponseCache {
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: Option<NonZeroUsize>, clock: SharedClock) -> Self {
        let counters = Arc::new(HitCounters::default());
        let ctx = StoreContext {
            layer: CacheLayer::Response,
            clock,
            counters: Arc::clone(&counters),
        };
        Self {
            store: TtlStore::new("responses", ctx, capacity),
            counters,
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        self.store.get(key)
    }

    pub fn set(&self, key: impl Into<String>, response: CachedResponse, ttl: Duration) {
        self.store.set(key, response, ttl);
    }

    /// Drop every entry whose key contains `pattern`; returns how many went.
    pub fn clear_matching(&self, pattern: &str) -> usize {
        let removed = self.store.remove_matching(|key| key.contains(pattern));
        info!(pattern, removed, "cleared matching responses");
        removed
    }

    pub fn clear(&self) -> usize {
        self.store.clear()
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.counters.hits()
    }

    pub fn misses(&self) -> u64 {
        self.counters.misses()
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to buffer response body: {0}")]
    Buffer(String),
    #[error("response body exceeds the {limit} byte capture limit")]
    TooLarge { limit: usize },
    #[error("response body is not json: {0}")]
    NotJson(#[from] serde_json::Error),
}

/// Whether a handler's response may be captured at all.
pub fn should_store_response(response: &Response) -> bool {
    if !response.status().is_success() {
        return false;
    }

    // Cookies are per client and must never be replayed to another caller.
    !response.headers().contains_key(header::SET_COOKIE)
}

/// Collect up to `limit` bytes of the body so it can be both cached and
/// forwarded.
///
/// Past the limit, capture stops and the returned response streams the bytes
/// read so far followed by the rest of the original body. On a read error the
/// returned response carries the bytes read before it.
pub async fn buffer_response(
    response: Response,
    limit: usize,
) -> Result<(Response, Bytes), (Response, CaptureError)> {
    let declared = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length > limit) {
        return Err((response, CaptureError::TooLarge { limit }));
    }

    let (parts, mut body) = response.into_parts();
    let mut buffered = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => {
                let partial = Response::from_parts(parts, Body::from(buffered.freeze()));
                return Err((partial, CaptureError::Buffer(error.to_string())));
            }
        };
        let Ok(data) = frame.into_data() else {
            continue;
        };
        buffered.extend_from_slice(&data);

        if buffered.len() > limit {
            let head = stream::once(async move { Ok::<_, axum::Error>(buffered.freeze()) });
            let rest = head.chain(body.into_data_stream());
            let forwarded = Response::from_parts(parts, Body::from_stream(rest));
            return Err((forwarded, CaptureError::TooLarge { limit }));
        }
    }

    let bytes = buffered.freeze();
    let rebuilt = Response::from_parts(parts, Body::from(bytes.clone()));
    Ok((rebuilt, bytes))
}

/// Fail unless `bytes` hold one well-formed JSON document.
pub fn ensure_json(bytes: &[u8]) -> Result<(), CaptureError> {
    serde_json::from_slice::<IgnoredAny>(bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::clock::ManualClock;

    #[test]
    fn clear_matching_uses_substring_match() {
        let cache = ResponseCache::new(None);
        let ttl = Duration::from_secs(60);
        let body = CachedResponse::from_json(&json!([]));
        cache.set("GET /api/blog-posts:user:anonymous", body.clone(), ttl);
        cache.set("GET /api/blog-posts/7:user:anonymous", body.clone(), ttl);
        cache.set("GET /api/events:user:anonymous", body, ttl);

        assert_eq!(cache.clear_matching("/api/blog-posts"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear_matching("/api/blog-posts"), 0);
    }

    #[test]
    fn entries_expire_with_their_ttl() {
        let clock = ManualClock::default();
        let cache = ResponseCache::with_clock(None, Arc::new(clock.clone()));
        let body = CachedResponse::from_json(&json!({"ok": true}));
        cache.set("k", body.clone(), Duration::from_secs(10));

        assert_eq!(cache.get("k"), Some(body));
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("k"), None);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn only_successful_cookieless_responses_are_stored() {
        let ok = Response::new(Body::empty());
        assert!(should_store_response(&ok));

        let mut failed = Response::new(Body::empty());
        *failed.status_mut() = StatusCode::NOT_FOUND;
        assert!(!should_store_response(&failed));

        let mut with_cookie = Response::new(Body::empty());
        with_cookie
            .headers_mut()
            .insert(header::SET_COOKIE, "session=1".parse().expect("header value"));
        assert!(!should_store_response(&with_cookie));
    }

    #[tokio::test]
    async fn buffered_body_is_forwarded_unchanged() {
        let response = Response::new(Body::from("{\"a\":1}"));

        let (rebuilt, bytes) = buffer_response(response, DEFAULT_MAX_BODY_BYTES)
            .await
            .expect("buffer body");
        let forwarded = rebuilt
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();

        assert_eq!(bytes, forwarded);
        assert!(ensure_json(&bytes).is_ok());
        assert!(ensure_json(b"<html>").is_err());
    }

    #[tokio::test]
    async fn oversized_body_is_forwarded_whole() {
        let chunks = ["{\"a\":", "\"0123456789\"", "}"]
            .map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes())));
        let response = Response::new(Body::from_stream(stream::iter(chunks)));

        let (forwarded, error) = buffer_response(response, 8)
            .await
            .expect_err("body is over the limit");
        let body = forwarded
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();

        assert!(matches!(error, CaptureError::TooLarge { limit: 8 }));
        assert_eq!(body, Bytes::from_static(b"{\"a\":\"0123456789\"}"));
    }

    #[tokio::test]
    async fn declared_length_over_limit_skips_buffering() {
        let response = Response::builder()
            .header(header::CONTENT_LENGTH, "64")
            .body(Body::from(vec![b' '; 64]))
            .expect("response");

        let (forwarded, error) = buffer_response(response, 16)
            .await
            .expect_err("body is over the limit");

        assert!(matches!(error, CaptureError::TooLarge { limit: 16 }));
        assert_eq!(
            forwarded.headers().get(header::CONTENT_LENGTH),
            Some(&HeaderValue::from_static("64"))
        );
    }

    #[test]
    fn replay_keeps_bytes_and_content_type() {
        let cached = CachedResponse::new(
            Bytes::from_static(b"{\"z\":1,\"a\":2}"),
            Some(&HeaderValue::from_static("application/vnd.api+json")),
        );

        let response = cached.clone().into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE),
            Some(&cached.content_type)
        );
        assert_eq!(cached.json().expect("json")["z"], 1);
    }
}
