use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use crate::{
    application::error::HttpError,
    cache::{ResponseCacheState, mark_bypass, response_cache_layer},
};

use super::AppState;

/// Read-through content routes behind the response cache, plus `/health`.
///
/// Content-unit routes use the ttl carried by `responses`; page routes use
/// `page_ttl`.
pub fn build_public_router(responses: ResponseCacheState, page_ttl: Duration) -> Router<AppState> {
    let unit_routes = Router::new()
        .route("/content-units", get(all_blocks))
        .route("/content-units/{id}", get(block))
        .route("/content-units/section/{name}", get(section))
        .layer(middleware::from_fn_with_state(
            responses.clone(),
            response_cache_layer,
        ));

    let page_routes = Router::new()
        .route("/pages", get(all_pages))
        .route("/pages/{slug}", get(page))
        .layer(middleware::from_fn_with_state(
            responses.with_ttl(page_ttl),
            response_cache_layer,
        ));

    unit_routes
        .merge(page_routes)
        .layer(middleware::from_fn(mark_bypass))
        .route("/health", get(health))
}

async fn block(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.content.block(&id).await {
        Ok(unit) => Json(unit).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn section(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.content.section(&name).await {
        Ok(units) => Json(units).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn all_blocks(State(state): State<AppState>) -> Response {
    match state.content.blocks().await {
        Ok(units) => Json(units).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn page(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    match state.content.page(&slug).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn all_pages(State(state): State<AppState>) -> Response {
    match state.content.pages().await {
        Ok(pages) => Json(pages).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}
