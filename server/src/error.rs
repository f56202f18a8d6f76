use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ppi_core::error::{ErrorCode, PpiError};
use ppi_core::metrics::RequestOutcome;
use query::QueryError;
use serde_json::json;
use storage::ArtifactError;
use thiserror::Error;

pub const CONTACT_NOT_FOUND: &str = "Contact data not found";
pub const CONTACT_NOT_GENERATED: &str =
    "PAE contact data has not been generated for this interaction yet.";
pub const CONTACT_LOAD_FAILED: &str = "Failed to load contact data";

/// Failures at the HTTP boundary. Only a short message ever reaches the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("malformed interaction id {0:?}")]
    InvalidId(String),
    /// Carries the id as the client sent it, e.g. `0042`.
    #[error("no contact artifact for interaction {0}")]
    ContactNotFound(String),
    #[error("contact artifact load failed: {0}")]
    ContactLoad(#[source] ArtifactError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl PpiError for ApiError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::InvalidId(_) => ErrorCode::InvalidArgument,
            ApiError::ContactNotFound(_) => ErrorCode::NotFound,
            // A stored artifact that cannot be served is always our fault.
            ApiError::ContactLoad(_) => ErrorCode::Internal,
            ApiError::Query(err) => err.error_code(),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.error_code().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn outcome(&self) -> RequestOutcome {
        match self.error_code() {
            ErrorCode::NotFound => RequestOutcome::NotFound,
            ErrorCode::InvalidArgument | ErrorCode::Conflict => RequestOutcome::ClientError,
            ErrorCode::ResourceExhausted | ErrorCode::Internal => RequestOutcome::ServerError,
        }
    }

    /// Emit one event at the level the category deserves.
    pub fn log(&self) {
        match self.outcome() {
            RequestOutcome::NotFound => tracing::debug!(error = %self, "not found"),
            RequestOutcome::ClientError => tracing::warn!(error = %self, "rejected request"),
            _ => tracing::error!(error = %self, code = %self.error_code(), "request failed"),
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            ApiError::InvalidId(id) => json!({
                "error": "Invalid interaction id",
                "id": id,
                "message": "Interaction ids are non-negative integers.",
            }),
            ApiError::ContactNotFound(id) => json!({
                "error": CONTACT_NOT_FOUND,
                "id": id,
                "message": CONTACT_NOT_GENERATED,
            }),
            ApiError::ContactLoad(_) => json!({
                "error": CONTACT_LOAD_FAILED,
                "message": "The contact artifact could not be read.",
            }),
            ApiError::Query(err) => {
                let code = err.error_code();
                let message = match err {
                    QueryError::InvalidQuery(reason) => reason.to_string(),
                    QueryError::Pool(_) => "Store temporarily unavailable, retry later.".to_string(),
                    QueryError::Repository(_) if code == ErrorCode::Internal => {
                        "Internal error.".to_string()
                    }
                    QueryError::Repository(reason) => reason.to_string(),
                };
                json!({
                    "error": "Failed to fetch data",
                    "code": code,
                    "message": message,
                })
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
