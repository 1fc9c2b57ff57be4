//! API error surface: every failure renders as `{"error": "..."}` with a
//! status code matching the error kind. Transient storage failures never
//! leak detail; callers just see a retryable 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use assignment_engine::AssignmentError;
use fleet_gateway::FleetError;
use ingest_pipeline::IngestError;
use registry_metadata::RegistryError;
use target_lifecycle::LifecycleError;

#[derive(Debug)]
pub enum ApiError {
    /// Malformed input or unknown reference (400)
    Validation(String),
    /// Credential verification failed (401)
    Unauthorized(String),
    /// Entity does not exist (404)
    NotFound(String),
    /// Request conflicts with current state (409)
    Conflict(String),
    /// Body exceeded the admission bound (413)
    PayloadTooLarge(String),
    /// Pipeline saturated; the caller should back off (429)
    SlowDown,
    /// Transient internal failure; retry later (500)
    Internal,
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            Self::SlowDown => (
                StatusCode::TOO_MANY_REQUESTS,
                "ingest saturated, slow down".to_string(),
            ),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error, try again".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(msg) => Self::NotFound(msg),
            RegistryError::Conflict(msg) => Self::Conflict(msg),
            RegistryError::Validation(msg) => Self::Validation(msg),
            RegistryError::Database(err) => {
                error!(error = %err, "registry failure");
                Self::Internal
            }
            RegistryError::Serialization(err) => {
                error!(error = %err, "stored document failure");
                Self::Internal
            }
        }
    }
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::Registry(err) => err.into(),
            FleetError::Validation(msg) => Self::Validation(msg),
            FleetError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Registry(err) => err.into(),
            IngestError::Lifecycle(LifecycleError::Registry(err)) => err.into(),
            IngestError::BatchTooLarge { count, bytes } => Self::PayloadTooLarge(format!(
                "batch too large ({count} results, {bytes} bytes); retry with smaller batches"
            )),
            IngestError::Saturated => Self::SlowDown,
            IngestError::Decode(msg) => Self::Validation(msg),
        }
    }
}

impl From<AssignmentError> for ApiError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::Registry(err) => err.into(),
            AssignmentError::Busy => Self::Conflict("busy".to_string()),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Registry(err) => err.into(),
        }
    }
}

impl From<alert_pipeline::AlertError> for ApiError {
    fn from(err: alert_pipeline::AlertError) -> Self {
        match err {
            alert_pipeline::AlertError::Registry(err) => err.into(),
        }
    }
}

/// Convenience result alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;
