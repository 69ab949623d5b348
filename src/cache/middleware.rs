//! Response cache middleware.
//!
//! Only GET requests take part, further narrowed by an optional per-route
//! condition. They are looked up by a key built from the method, path, sorted
//! query and caller. A hit replays the stored JSON bytes without running the
//! handler; a miss runs it and captures a successful JSON response of bounded
//! size under the route's ttl.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};
use url::form_urlencoded;

use super::response::{
    CachedResponse, DEFAULT_MAX_BODY_BYTES, ResponseCache, buffer_response, ensure_json,
    should_store_response,
};

pub const X_CACHE: &str = "x-cache";
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub type KeyFn = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;
pub type ConditionFn = Arc<dyn Fn(&Request<Body>) -> bool + Send + Sync>;

/// Request extension that forces the request past the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheBypass(pub bool);

/// Request extension carrying the caller's id, placed by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// How one group of routes is cached.
#[derive(Clone)]
pub struct ResponseCachePolicy {
    pub ttl: Duration,
    /// Bodies larger than this are forwarded but never stored.
    pub max_body_bytes: usize,
    key_fn: Option<KeyFn>,
    condition: Option<ConditionFn>,
}

impl Default for ResponseCachePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ResponseCachePolicy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            key_fn: None,
            condition: None,
        }
    }

    pub fn with_key_fn(
        mut self,
        key_fn: impl Fn(&Request<Body>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_condition(
        mut self,
        condition: impl Fn(&Request<Body>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn key(&self, request: &Request<Body>) -> String {
        match &self.key_fn {
            Some(key_fn) => key_fn(request),
            None => default_cache_key(request),
        }
    }

    /// Whether the request takes part in caching.
    ///
    /// Non-GET requests never do; a condition can only exclude more.
    pub fn admits(&self, request: &Request<Body>) -> bool {
        if request.method() != Method::GET {
            return false;
        }
        self.condition
            .as_ref()
            .is_none_or(|condition| condition(request))
    }
}

/// Shared state for [`response_cache_layer`].
#[derive(Clone)]
pub struct ResponseCacheState {
    pub cache: Arc<ResponseCache>,
    pub policy: ResponseCachePolicy,
    pub enabled: bool,
}

impl ResponseCacheState {
    /// Same cache and policy, with routes stored under `ttl`.
    pub fn with_ttl(&self, ttl: Duration) -> Self {
        let mut state = self.clone();
        state.policy.ttl = ttl;
        state
    }
}

/// `METHOD path[?sorted query]:user:<id|anonymous>`.
///
/// Query pairs are decoded and sorted so parameter order does not split
/// entries.
pub fn default_cache_key(request: &Request<Body>) -> String {
    let uri = request.uri();
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map_or("anonymous", |user| user.0.as_str());

    let mut pairs: Vec<(String, String)> = uri
        .query()
        .map(|query| form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    pairs.sort();

    let mut key = format!("{} {}", request.method(), uri.path());
    if !pairs.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        key.push('?');
        key.push_str(&query);
    }
    key.push_str(":user:");
    key.push_str(user);
    key
}

/// Set [`CacheBypass`] when the caller sends `Cache-Control: no-cache`.
pub async fn mark_bypass(mut request: Request<Body>, next: Next) -> Response {
    let no_cache = request
        .headers()
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"));

    if no_cache {
        request.extensions_mut().insert(CacheBypass(true));
    }

    next.run(request).await
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<ResponseCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let bypass = request
        .extensions()
        .get::<CacheBypass>()
        .is_some_and(|bypass| bypass.0);
    if bypass || !state.policy.admits(&request) {
        debug!(cache = "response", outcome = "passthrough");
        return next.run(request).await;
    }

    let key = state.policy.key(&request);
    if let Some(cached) = state.cache.get(&key) {
        debug!(cache = "response", outcome = "hit", key);
        return with_cache_header(cached.into_response(), "HIT");
    }

    debug!(cache = "response", outcome = "miss", key);
    let response = next.run(request).await;
    if !should_store_response(&response) {
        return with_cache_header(response, "MISS");
    }

    let response = match buffer_response(response, state.policy.max_body_bytes).await {
        Ok((rebuilt, bytes)) => {
            match ensure_json(&bytes) {
                Ok(()) => {
                    let content_type = rebuilt.headers().get(header::CONTENT_TYPE);
                    let cached = CachedResponse::new(bytes, content_type);
                    state.cache.set(key, cached, state.policy.ttl);
                }
                Err(error) => warn!(key, error = %error, "skipping response capture"),
            }
            rebuilt
        }
        Err((rebuilt, error)) => {
            warn!(key, error = %error, "skipping response capture");
            rebuilt
        }
    };

    with_cache_header(response, "MISS")
}

fn with_cache_header(mut response: Response, outcome: &'static str) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(outcome));
    response
}
