use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// BootError
///
/// Every way the service can fail before it accepts its first request.
/// There is no partial-startup mode: `main` reports the error and exits.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("missing required configuration `{0}`")]
    MissingConfig(&'static str),

    #[error("invalid value `{value}` for configuration `{key}`")]
    InvalidConfig { key: &'static str, value: String },

    #[error("route definitions for group `{group}` could not be read from {}: {source}", path.display())]
    SourceUnreadable {
        group: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("route definitions for group `{group}` in {} are malformed: {source}", path.display())]
    SourceMalformed {
        group: String,
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("route `{path}` in group `{group}` uses unsupported method `{method}`")]
    UnsupportedMethod {
        group: String,
        path: String,
        method: String,
    },

    #[error("route `{path}` in group `{group}` references unknown handler `{handler}`")]
    UnknownHandler {
        group: String,
        path: String,
        handler: String,
    },

    #[error("group `{group}` references unknown middleware `{middleware}`")]
    UnknownMiddleware { group: String, middleware: String },

    #[error("middleware alias `{0}` is not recognised")]
    InvalidFilter(String),

    #[error("middleware group `{middleware}` throttles with undefined rate limiter `{bucket}`")]
    UndefinedLimiter { middleware: String, bucket: String },

    #[error("route {method} {path} is registered more than once")]
    DuplicateRoute { method: String, path: String },

    #[error("route `{path}` in group `{group}` is not a valid path: {reason}")]
    InvalidPath {
        group: String,
        path: String,
        reason: String,
    },

    #[error("route `{path}` in group `{group}` conflicts with `{existing}`")]
    ConflictingRoute {
        group: String,
        path: String,
        existing: String,
    },
}

/// AppError
///
/// Request-time failures that are the server's fault. Client-side outcomes
/// (401, 403, 404, 429) are produced directly by the filters and fallback.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("view `{0}` is not registered")]
    ViewNotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");

        let body = ErrorResponse::new("internal_error", self.to_string());
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
