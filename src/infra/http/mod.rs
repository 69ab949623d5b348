mod admin;
mod middleware;
mod public;

pub use admin::{InvalidateKind, InvalidateRequest, build_admin_router};
pub use middleware::RequestContext;
pub use public::build_public_router;

use std::{sync::Arc, time::Duration};

use axum::{Router, middleware as axum_middleware};

use crate::{
    application::content::ContentService,
    cache::{Prefetcher, ResponseCache, ResponseCacheState},
};

use middleware::{log_responses, set_request_context};

/// Services shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub content: Arc<ContentService>,
    pub prefetcher: Arc<Prefetcher>,
    pub responses: Arc<ResponseCache>,
}

/// Public routes at the root and cache administration under `/admin/cache`.
pub fn build_router(state: AppState, responses: ResponseCacheState, page_ttl: Duration) -> Router {
    Router::new()
        .merge(build_public_router(responses, page_ttl))
        .nest("/admin/cache", build_admin_router())
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
