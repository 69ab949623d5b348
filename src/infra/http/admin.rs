//! Cache administration routes, nested under `/admin/cache`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use stratum_types::CacheStats;
use tracing::info;

use crate::application::error::HttpError;

use super::AppState;

const SOURCE: &str = "infra::http::admin";

pub fn build_admin_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/invalidate", post(invalidate))
        .route("/prefetch/{slug}", post(prefetch))
        .route("/responses", delete(clear_responses))
}

#[derive(Debug, Serialize)]
struct ResponseCacheStats {
    entries: usize,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Serialize)]
struct StatsBody {
    content: CacheStats,
    responses: ResponseCacheStats,
}

async fn stats(State(state): State<AppState>) -> Response {
    let body = StatsBody {
        content: state.content.cache().stats(),
        responses: ResponseCacheStats {
            entries: state.responses.len(),
            hits: state.responses.hits(),
            misses: state.responses.misses(),
        },
    };
    Json(body).into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidateKind {
    Block,
    Section,
    Page,
    AllBlocks,
    AllPages,
    All,
}

impl InvalidateKind {
    fn needs_key(self) -> bool {
        matches!(self, Self::Block | Self::Section | Self::Page)
    }

    /// Response-cache key fragment covering the routes that render this kind.
    fn response_pattern(self) -> Option<&'static str> {
        match self {
            Self::Block | Self::Section | Self::AllBlocks => Some("/content-units"),
            Self::Page | Self::AllPages => Some("/pages"),
            Self::All => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub kind: InvalidateKind,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
struct InvalidateBody {
    kind: InvalidateKind,
    key: Option<String>,
    removed: usize,
    cascaded_sections: Vec<String>,
    responses_cleared: usize,
}

async fn invalidate(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> Response {
    let InvalidateRequest { kind, key } = request;
    let key = key.filter(|key| !key.trim().is_empty());

    let target = match (kind.needs_key(), key.as_deref()) {
        (true, None) => {
            return HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalidation key required",
                format!("`{kind:?}` invalidation needs a non-empty `key`"),
            )
            .into_response();
        }
        (_, target) => target.unwrap_or_default(),
    };

    let cache = state.content.cache();
    let mut cascaded_sections = Vec::new();
    let removed = match kind {
        InvalidateKind::Block => {
            let outcome = cache.invalidate_block(target);
            cascaded_sections = outcome.cascaded;
            usize::from(outcome.removed) + cascaded_sections.len()
        }
        InvalidateKind::Section => usize::from(cache.invalidate_section(target)),
        InvalidateKind::Page => usize::from(cache.invalidate_page(target)),
        InvalidateKind::AllBlocks => usize::from(cache.invalidate_all_blocks()),
        InvalidateKind::AllPages => usize::from(cache.invalidate_all_pages()),
        InvalidateKind::All => cache.invalidate_all(),
    };

    let responses_cleared = match kind.response_pattern() {
        Some(pattern) => state.responses.clear_matching(pattern),
        None => state.responses.clear(),
    };

    info!(
        target = "stratum::http::admin",
        kind = ?kind,
        key = key.as_deref().unwrap_or(""),
        removed,
        responses_cleared,
        "cache invalidated"
    );

    Json(InvalidateBody {
        kind,
        key,
        removed,
        cascaded_sections,
        responses_cleared,
    })
    .into_response()
}

async fn prefetch(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    match state.prefetcher.prefetch_page(&slug).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClearQuery {
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClearBody {
    removed: usize,
}

async fn clear_responses(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Response {
    let removed = match query.pattern.as_deref() {
        Some(pattern) if !pattern.is_empty() => state.responses.clear_matching(pattern),
        _ => state.responses.clear(),
    };
    Json(ClearBody { removed }).into_response()
}
