//! Response mapping.
//!
//! # Responsibilities
//! - Map saga and validation failures to status codes and JSON bodies
//! - Relay dependency responses verbatim
//!
//! # Design Decisions
//! - Error bodies are `{"message": ...}`; validation adds `errors: [{field, error}]`
//! - Internal details are logged, not returned

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::saga::{FieldError, SagaError};
use crate::services::RawResponse;

pub const QUEUED_MESSAGE: &str = "Reservation request queued for processing";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("X-User-Name header is required")]
    MissingUser,

    #[error("validation error")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingUser | Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::Validation(errors) => Self::Validation(errors),
            SagaError::BookNotFound
            | SagaError::BookNotAvailable
            | SagaError::RatingLimitReached
            | SagaError::InvalidCondition
            | SagaError::InvalidDate => Self::BadRequest(err.to_string()),
            SagaError::ReservationNotFound => Self::NotFound(err.to_string()),
            SagaError::CorruptReservation | SagaError::UndecodableResponse => Self::Internal(err.to_string()),
            SagaError::Upstream(e) => {
                tracing::error!(error = %e, "Saga aborted by dependency error");
                Self::BadGateway("dependency error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(errors) => json!({ "message": self.to_string(), "errors": errors }),
            _ => json!({ "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Relay a dependency's answer, defaulting the content type to JSON.
pub fn relay(raw: RawResponse) -> Response {
    let content_type = raw
        .content_type
        .unwrap_or_else(|| "application/json".to_string());
    (raw.status, [(header::CONTENT_TYPE, content_type)], raw.body).into_response()
}

/// Optimistic answer for a reservation whose work was deferred.
pub fn queued() -> Response {
    (StatusCode::OK, Json(json!({ "message": QUEUED_MESSAGE }))).into_response()
}
