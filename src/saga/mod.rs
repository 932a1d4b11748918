//! Multi-service write workflows.
//!
//! # Data Flow
//! ```text
//! create reservation:
//!     validate availability (catalog) → validate eligibility (ledger, reputation)
//!     → commit (ledger) → decrement availability (catalog) → respond
//!
//! return book:
//!     look up reservation (ledger) → commit return (ledger)
//!     → increment availability (catalog) → adjust rating (reputation)
//! ```
//!
//! A transport failure on the commit step parks the identical request in the
//! retry queue. A failure after the commit parks the compensation together
//! with a replay of the commit. Either way the client gets an optimistic
//! response.

pub mod rating;
pub mod reservation;
pub mod return_book;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::aggregation::Aggregator;
use crate::config::SagaConfig;
use crate::observability::metrics;
use crate::resilience::{RetryPolicy, RetryQueue, TaskKind};
use crate::services::{OutboundRequest, RawResponse, Services, UpstreamError};

pub use reservation::{CreateReservationRequest, CreatedReservation};
pub use return_book::ReturnBookRequest;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// How a saga ended, from the client's point of view.
#[derive(Debug)]
pub enum SagaOutcome<T> {
    /// Every step succeeded.
    Completed(T),
    /// Work was deferred to the retry queue; respond optimistically.
    Queued,
    /// The ledger gave a definite non-success answer; relay it.
    Passthrough(RawResponse),
}

impl<T> SagaOutcome<T> {
    fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Queued => "queued",
            Self::Passthrough(_) => "passthrough",
        }
    }
}

/// One invalid field in a client payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl FieldError {
    pub fn new(field: &str, error: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            error: error.into(),
        }
    }
}

pub(crate) fn require(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    }
}

#[derive(Debug, Error)]
pub enum SagaError {
    #[error("validation error")]
    Validation(Vec<FieldError>),

    #[error("failed to find the book in the library")]
    BookNotFound,

    #[error("book not available")]
    BookNotAvailable,

    #[error("User has reached the maximum number of books allowed by rating")]
    RatingLimitReached,

    #[error("Condition must be EXCELLENT, GOOD, or BAD")]
    InvalidCondition,

    #[error("Invalid date format. Use YYYY-MM-DD")]
    InvalidDate,

    #[error("Reservation not found")]
    ReservationNotFound,

    #[error("Failed to parse reservation date")]
    CorruptReservation,

    #[error("failed to decode the response")]
    UndecodableResponse,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Runs the write sagas against injected clients, breakers and queue.
pub struct Orchestrator {
    services: Services,
    aggregator: Arc<Aggregator>,
    queue: Arc<RetryQueue>,
    policy: RetryPolicy,
    idempotency_keys: bool,
}

impl Orchestrator {
    pub fn new(
        services: Services,
        aggregator: Arc<Aggregator>,
        queue: Arc<RetryQueue>,
        policy: RetryPolicy,
        config: &SagaConfig,
    ) -> Self {
        Self {
            services,
            aggregator,
            queue,
            policy,
            idempotency_keys: config.idempotency_keys,
        }
    }

    /// A fresh key shared by a saga's commit call and all of its replays.
    fn saga_key(&self) -> Option<String> {
        self.idempotency_keys.then(|| Uuid::new_v4().to_string())
    }

    fn defer(&self, kind: TaskKind, request: OutboundRequest) {
        let task = request.into_task(kind, &self.policy);
        tracing::info!(
            task_id = %task.id,
            kind = %kind,
            method = %task.method,
            target = %task.target_url,
            not_before = %task.not_before,
            "Request queued for retry"
        );
        metrics::record_retry_enqueued(kind.as_str());
        self.queue.enqueue(task);
    }
}

fn record_outcome<T>(saga: &'static str, result: &Result<SagaOutcome<T>, SagaError>) {
    let outcome = match result {
        Ok(outcome) => outcome.label(),
        Err(SagaError::Upstream(_) | SagaError::UndecodableResponse) => "error",
        Err(_) => "rejected",
    };
    metrics::record_saga_outcome(saga, outcome);
}
