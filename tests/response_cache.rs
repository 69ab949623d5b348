use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::Query,
    http::{Method, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use stratum::cache::{
    AuthenticatedUser, CachedResponse, ManualClock, ResponseCache, ResponseCachePolicy,
    ResponseCacheState, X_CACHE, mark_bypass, response_cache_layer,
};
use time::OffsetDateTime;
use tower::ServiceExt;

struct Harness {
    app: Router,
    cache: Arc<ResponseCache>,
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
}

/// Stands in for the auth layer: `x-user` becomes the authenticated caller.
async fn fake_auth(mut request: Request<Body>, next: Next) -> Response {
    let user = request
        .headers()
        .get("x-user")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if let Some(user) = user {
        request.extensions_mut().insert(AuthenticatedUser(user));
    }
    next.run(request).await
}

fn harness(policy: ResponseCachePolicy) -> Harness {
    let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);
    let cache = Arc::new(ResponseCache::with_clock(None, Arc::new(clock.clone())));
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    };

    let on_items = counted(&calls);
    let on_text = counted(&calls);
    let on_missing = counted(&calls);
    let on_post = counted(&calls);
    let on_ordered = counted(&calls);

    let state = ResponseCacheState {
        cache: Arc::clone(&cache),
        policy,
        enabled: true,
    };

    let app = Router::new()
        .route(
            "/items",
            get(move |Query(query): Query<BTreeMap<String, String>>| {
                let on_items = on_items.clone();
                async move {
                    on_items();
                    Json(json!({ "items": ["a", "b"], "query": query }))
                }
            })
            .post(move || {
                let on_post = on_post.clone();
                async move {
                    on_post();
                    Json(json!({ "created": true }))
                }
            }),
        )
        .route(
            "/text",
            get(move || {
                let on_text = on_text.clone();
                async move {
                    on_text();
                    "plain words"
                }
            }),
        )
        .route(
            "/ordered",
            get(move || {
                let on_ordered = on_ordered.clone();
                async move {
                    on_ordered();
                    (
                        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
                        r#"{"zeta":1,"alpha":[3,2,1]}"#,
                    )
                }
            }),
        )
        .route(
            "/missing",
            get(move || {
                let on_missing = on_missing.clone();
                async move {
                    on_missing();
                    (StatusCode::NOT_FOUND, Json(json!({ "error": "gone" })))
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state, response_cache_layer))
        .layer(middleware::from_fn(mark_bypass))
        .layer(middleware::from_fn(fake_auth));

    Harness {
        app,
        cache,
        calls,
        clock,
    }
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let outcome = response
            .headers()
            .get(X_CACHE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        (status, outcome, body.to_vec())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

#[tokio::test]
async fn second_get_is_served_from_cache() {
    let harness = harness(ResponseCachePolicy::default());

    let (status, outcome, first) = harness.send(get_request("/items")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome.as_deref(), Some("MISS"));

    let (status, outcome, second) = harness.send(get_request("/items")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome.as_deref(), Some("HIT"));

    let first: Value = serde_json::from_slice(&first).expect("json body");
    let second: Value = serde_json::from_slice(&second).expect("json body");
    assert_eq!(first, second);
    assert_eq!(harness.calls(), 1);
    assert_eq!(harness.cache.hits(), 1);
}

#[tokio::test]
async fn query_order_does_not_split_entries() {
    let harness = harness(ResponseCachePolicy::default());

    harness.send(get_request("/items?b=2&a=1")).await;
    let (_, outcome, _) = harness.send(get_request("/items?a=1&b=2")).await;

    assert_eq!(outcome.as_deref(), Some("HIT"));
    assert_eq!(harness.calls(), 1);
}

#[tokio::test]
async fn entries_are_scoped_per_user() {
    let harness = harness(ResponseCachePolicy::default());

    let as_user = |user: &str| {
        Request::builder()
            .method(Method::GET)
            .uri("/items")
            .header("x-user", user)
            .body(Body::empty())
            .expect("request should build")
    };

    harness.send(as_user("alice")).await;
    let (_, outcome, _) = harness.send(as_user("bob")).await;
    assert_eq!(outcome.as_deref(), Some("MISS"));

    let (_, outcome, _) = harness.send(as_user("alice")).await;
    assert_eq!(outcome.as_deref(), Some("HIT"));

    let (_, outcome, _) = harness.send(get_request("/items")).await;
    assert_eq!(outcome.as_deref(), Some("MISS"));
    assert_eq!(harness.calls(), 3);
    assert_eq!(harness.cache.len(), 3);
}

#[tokio::test]
async fn post_is_never_stored() {
    let harness = harness(ResponseCachePolicy::default());

    for _ in 0..2 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/items")
            .body(Body::empty())
            .expect("request should build");
        let (status, outcome, _) = harness.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome, None);
    }

    assert_eq!(harness.calls(), 2);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn no_cache_header_always_runs_handler() {
    let harness = harness(ResponseCachePolicy::default());
    harness.send(get_request("/items")).await;

    let bypass = Request::builder()
        .method(Method::GET)
        .uri("/items")
        .header(header::CACHE_CONTROL, "max-age=0, no-cache")
        .body(Body::empty())
        .expect("request should build");
    let (status, outcome, _) = harness.send(bypass).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, None);
    assert_eq!(harness.calls(), 2);
}

#[tokio::test]
async fn error_responses_are_not_stored() {
    let harness = harness(ResponseCachePolicy::default());

    for _ in 0..2 {
        let (status, outcome, _) = harness.send(get_request("/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(outcome.as_deref(), Some("MISS"));
    }

    assert_eq!(harness.calls(), 2);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn non_json_body_is_delivered_but_not_captured() {
    let harness = harness(ResponseCachePolicy::default());

    let (status, outcome, body) = harness.send(get_request("/text")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome.as_deref(), Some("MISS"));
    assert_eq!(body, b"plain words");

    let (_, outcome, _) = harness.send(get_request("/text")).await;
    assert_eq!(outcome.as_deref(), Some("MISS"));
    assert_eq!(harness.calls(), 2);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn stored_response_expires_with_policy_ttl() {
    let harness = harness(ResponseCachePolicy::new(Duration::from_secs(30)));

    harness.send(get_request("/items")).await;
    harness.clock.advance(Duration::from_secs(29));
    let (_, outcome, _) = harness.send(get_request("/items")).await;
    assert_eq!(outcome.as_deref(), Some("HIT"));

    harness.clock.advance(Duration::from_secs(1));
    let (_, outcome, _) = harness.send(get_request("/items")).await;
    assert_eq!(outcome.as_deref(), Some("MISS"));
    assert_eq!(harness.calls(), 2);
}

#[tokio::test]
async fn clear_matching_drops_only_matching_keys() {
    let harness = harness(ResponseCachePolicy::default());

    harness.send(get_request("/items")).await;
    harness.send(get_request("/items?page=2")).await;
    harness
        .cache
        .set(
            "GET /other:user:anonymous",
            CachedResponse::from_json(&json!({ "other": true })),
            Duration::from_secs(60),
        );

    assert_eq!(harness.cache.clear_matching("/items"), 2);
    assert_eq!(harness.cache.len(), 1);

    let (_, outcome, _) = harness.send(get_request("/items")).await;
    assert_eq!(outcome.as_deref(), Some("MISS"));
}

#[tokio::test]
async fn custom_condition_and_key_are_honoured() {
    let policy = ResponseCachePolicy::new(Duration::from_secs(60))
        .with_condition(|request| request.uri().path() == "/items")
        .with_key_fn(|request| format!("items:{}", request.method()));
    let harness = harness(policy);

    harness.send(get_request("/items?x=1")).await;
    let (_, outcome, _) = harness.send(get_request("/items?x=2")).await;
    assert_eq!(outcome.as_deref(), Some("HIT"));

    let (_, outcome, _) = harness.send(get_request("/text")).await;
    assert_eq!(outcome, None);
    assert!(harness.cache.get("items:GET").is_some());
}

#[tokio::test]
async fn disabled_cache_passes_everything_through() {
    let cache = Arc::new(ResponseCache::new(None));
    let state = ResponseCacheState {
        cache: Arc::clone(&cache),
        policy: ResponseCachePolicy::default(),
        enabled: false,
    };
    let app = Router::new()
        .route("/items", get(|| async { Json(json!({ "ok": true })) }))
        .layer(middleware::from_fn_with_state(state, response_cache_layer));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get_request("/items"))
            .await
            .expect("router should respond")
            .into_response();
        assert!(response.headers().get(X_CACHE).is_none());
    }
    assert!(cache.is_empty());
}

#[tokio::test]
async fn path_condition_never_admits_post() {
    let policy = ResponseCachePolicy::new(Duration::from_secs(60))
        .with_condition(|request| request.uri().path().starts_with("/items"));
    let harness = harness(policy);

    for _ in 0..2 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/items")
            .body(Body::empty())
            .expect("request should build");
        let (status, outcome, body) = harness.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome, None);
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body, json!({ "created": true }));
    }

    assert_eq!(harness.calls(), 2);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn oversized_body_is_delivered_but_not_stored() {
    let harness = harness(ResponseCachePolicy::default().with_max_body_bytes(16));

    for _ in 0..2 {
        let (status, outcome, body) = harness.send(get_request("/items")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome.as_deref(), Some("MISS"));
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["items"], json!(["a", "b"]));
    }

    assert_eq!(harness.calls(), 2);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn hit_replays_the_captured_bytes() {
    let harness = harness(ResponseCachePolicy::default());

    let (_, _, first) = harness.send(get_request("/ordered")).await;
    let response = harness
        .app
        .clone()
        .oneshot(get_request("/ordered"))
        .await
        .expect("router should respond");

    assert_eq!(
        response.headers().get(X_CACHE).and_then(|v| v.to_str().ok()),
        Some("HIT")
    );
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/json; charset=utf-8")
    );
    let second = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect");
    assert_eq!(first, br#"{"zeta":1,"alpha":[3,2,1]}"#);
    assert_eq!(second.as_ref(), first.as_slice());
    assert_eq!(harness.calls(), 1);
}
