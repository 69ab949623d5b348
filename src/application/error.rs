use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{
    application::content::ContentError, cache::PrefetchError, config::LoadError,
    infra::error::InfraError,
};

/// Error details attached to a response for `log_responses` to report.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Handler error: a public message for the caller, a report for the logs.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.public_message }));
        let mut response = (self.status, body).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<ContentError> for HttpError {
    fn from(error: ContentError) -> Self {
        match &error {
            ContentError::NotFound { .. } => HttpError::from_error(
                "infra::http::content_error_to_http_error",
                StatusCode::NOT_FOUND,
                "Content not found",
                &error,
            ),
            ContentError::Origin(_) => HttpError::from_error(
                "infra::http::content_error_to_http_error",
                StatusCode::BAD_GATEWAY,
                "Origin unavailable",
                &error,
            ),
        }
    }
}

impl From<PrefetchError> for HttpError {
    fn from(error: PrefetchError) -> Self {
        let not_found = match &error {
            PrefetchError::Page { source, .. } | PrefetchError::Section { source, .. } => {
                source.is_not_found()
            }
        };
        if not_found {
            HttpError::from_error(
                "infra::http::prefetch_error_to_http_error",
                StatusCode::NOT_FOUND,
                "Page not found",
                &error,
            )
        } else {
            HttpError::from_error(
                "infra::http::prefetch_error_to_http_error",
                StatusCode::BAD_GATEWAY,
                "Prefetch failed",
                &error,
            )
        }
    }
}

/// Top-level error of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Prefetch(#[from] PrefetchError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
