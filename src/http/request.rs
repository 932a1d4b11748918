//! Request-side helpers.
//!
//! # Responsibilities
//! - Extract the calling user from `X-User-Name`
//! - Turn malformed JSON bodies into validation errors

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::Json;

use crate::http::response::ApiError;
use crate::saga::FieldError;

pub const X_USER_NAME: &str = "x-user-name";

/// The user a request acts for. Rejects with 400 when the header is missing or blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserName(pub String);

impl<S> FromRequestParts<S> for UserName
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(X_USER_NAME)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserName(v.to_string()))
            .ok_or(ApiError::MissingUser)
    }
}

/// Unwrap a JSON body, reporting parse failures in the validation format.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::Validation(vec![FieldError::new(
            "request",
            rejection.body_text(),
        )])),
    }
}
