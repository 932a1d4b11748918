//! Public API handlers.

use std::future::Future;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::aggregation::ReservationView;
use crate::http::request::{json_body, UserName};
use crate::http::response::{queued, relay, ApiError};
use crate::http::server::AppState;
use crate::saga::{CreateReservationRequest, ReturnBookRequest, SagaError, SagaOutcome};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}

pub async fn list_libraries(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    relay(state.aggregator.libraries(query.as_deref()).await)
}

pub async fn list_library_books(
    State(state): State<AppState>,
    Path(library_uid): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    relay(state.aggregator.library_books(&library_uid, query.as_deref()).await)
}

pub async fn list_reservations(
    State(state): State<AppState>,
    UserName(username): UserName,
) -> Json<Vec<ReservationView>> {
    Json(state.aggregator.reservations(&username).await)
}

pub async fn get_rating(State(state): State<AppState>, UserName(username): UserName) -> Response {
    relay(state.aggregator.rating(&username).await)
}

pub async fn create_reservation(
    State(state): State<AppState>,
    UserName(username): UserName,
    payload: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let orchestrator = state.orchestrator.clone();
    let outcome = detached(async move { orchestrator.create_reservation(&username, request).await }).await?;
    Ok(match outcome {
        SagaOutcome::Completed(reservation) => (StatusCode::OK, Json(reservation)).into_response(),
        SagaOutcome::Queued => queued(),
        SagaOutcome::Passthrough(raw) => relay(raw),
    })
}

pub async fn return_book(
    State(state): State<AppState>,
    UserName(username): UserName,
    Path(reservation_uid): Path<String>,
    payload: Result<Json<ReturnBookRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let orchestrator = state.orchestrator.clone();
    let outcome = detached(async move {
        orchestrator
            .return_book(&username, &reservation_uid, request)
            .await
    })
    .await?;
    Ok(match outcome {
        SagaOutcome::Completed(()) | SagaOutcome::Queued => StatusCode::NO_CONTENT.into_response(),
        SagaOutcome::Passthrough(raw) => relay(raw),
    })
}

/// Run a saga on its own task.
///
/// Dropping the request future (client disconnect, request timeout) leaves
/// the saga running to completion or compensation.
async fn detached<T, F>(saga: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, SagaError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(saga).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            tracing::error!(error = %e, "Saga task failed");
            Err(ApiError::Internal("saga aborted".to_string()))
        }
    }
}
