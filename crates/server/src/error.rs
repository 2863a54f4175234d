use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use logscope_core::QueryError;
use logscope_store::StoreError;

/// Errors that can occur when running the logscope server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A store-level error surfaced through the API.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The request could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The store did not answer within the request timeout.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<QueryError> for ServerError {
    fn from(e: QueryError) -> Self {
        Self::Store(StoreError::InvalidQuery(e))
    }
}

impl From<QueryRejection> for ServerError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(e: PathRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<JsonRejection> for ServerError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            Self::Store(StoreError::InvalidQuery(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Store(StoreError::Storage { .. } | StoreError::Serialization(_))
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Store(StoreError::Storage { operation, source }) => {
                tracing::error!(operation, error = %source, "storage failure");
            }
            Self::Timeout(after) => {
                tracing::warn!(timeout_secs = after.as_secs(), "request timed out");
            }
            _ if status.is_server_error() => {
                tracing::error!(error = %self, "request failed");
            }
            _ => {}
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
