//! Create-reservation saga.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::aggregation::BookSummary;
use crate::resilience::TaskKind;
use crate::saga::{record_outcome, require, Orchestrator, SagaError, SagaOutcome};
use crate::services::types::{BookInfo, LibraryInfo, NewReservation, RatingInfo, Reservation};
use crate::services::RawResponse;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    #[serde(default)]
    pub book_uid: String,
    #[serde(default)]
    pub library_uid: String,
    #[serde(default)]
    pub till_date: String,
}

impl CreateReservationRequest {
    pub fn validate(&self) -> Result<(), SagaError> {
        let mut errors = Vec::new();
        require(&mut errors, "bookUid", &self.book_uid);
        require(&mut errors, "libraryUid", &self.library_uid);
        require(&mut errors, "tillDate", &self.till_date);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SagaError::Validation(errors))
        }
    }
}

/// The committed reservation with catalog and rating data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedReservation {
    pub reservation_uid: String,
    pub status: String,
    pub start_date: String,
    pub till_date: String,
    pub book: BookSummary,
    pub library: LibraryInfo,
    pub rating: RatingInfo,
}

impl Orchestrator {
    pub async fn create_reservation(
        &self,
        username: &str,
        request: CreateReservationRequest,
    ) -> Result<SagaOutcome<CreatedReservation>, SagaError> {
        let result = self.run_create(username, &request).await;
        record_outcome("create_reservation", &result);
        result
    }

    async fn run_create(
        &self,
        username: &str,
        request: &CreateReservationRequest,
    ) -> Result<SagaOutcome<CreatedReservation>, SagaError> {
        request.validate()?;

        // Availability. An unreachable catalog reads as "nothing available".
        let book = match self.aggregator.book(&request.library_uid, &request.book_uid).await {
            Ok(Some(book)) => book,
            Ok(None) => return Err(SagaError::BookNotFound),
            Err(e) => {
                tracing::warn!(book_uid = %request.book_uid, error = %e, "Book lookup degraded");
                BookInfo::unknown(&request.book_uid)
            }
        };
        if book.available_count <= 0 {
            return Err(SagaError::BookNotAvailable);
        }

        // Eligibility.
        let active = self.aggregator.active_count_or_zero(username).await;
        let rating = self.aggregator.rating_or_zero(username).await;
        if active >= rating.stars {
            tracing::debug!(active, stars = rating.stars, "Reservation limit reached");
            return Err(SagaError::RatingLimitReached);
        }

        // Commit.
        let saga_key = self.saga_key();
        let commit = self.services.ledger.create_request(
            username,
            &NewReservation {
                book_uid: request.book_uid.clone(),
                library_uid: request.library_uid.clone(),
                till_date: request.till_date.clone(),
                book_condition: book.condition(),
            },
            saga_key.as_deref(),
        )?;

        let response = match commit.send(&self.services.http).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Ledger unreachable, deferring reservation");
                self.defer(TaskKind::CreateReservation, commit);
                return Ok(SagaOutcome::Queued);
            }
        };
        if response.status() != StatusCode::OK {
            return Ok(SagaOutcome::Passthrough(RawResponse::read(response).await?));
        }
        let reservation: Reservation = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Ledger returned an undecodable reservation");
            SagaError::UndecodableResponse
        })?;

        // Decrement availability, or compensate.
        let decrement = self
            .services
            .catalog
            .decrease_request(&request.library_uid, &request.book_uid)?;
        if let Err(e) = decrement
            .send_expecting(&self.services.http, StatusCode::OK)
            .await
        {
            tracing::warn!(
                reservation_uid = %reservation.reservation_uid,
                error = %e,
                "Availability decrement failed, rolling back reservation"
            );
            let rollback = self
                .services
                .ledger
                .rollback_create_request(username, &reservation.reservation_uid)?;
            self.defer(TaskKind::RollbackReservation, rollback);
            self.defer(TaskKind::CreateReservation, commit);
            return Ok(SagaOutcome::Queued);
        }

        tracing::info!(reservation_uid = %reservation.reservation_uid, "Reservation created");

        let library = self.aggregator.library_or_unknown(&request.library_uid).await;
        let rating = self.aggregator.rating_or_zero(username).await;
        Ok(SagaOutcome::Completed(CreatedReservation {
            reservation_uid: reservation.reservation_uid,
            status: reservation.status,
            start_date: reservation.start_date,
            till_date: reservation.till_date,
            book: BookSummary::from(&book),
            library,
            rating,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_are_all_reported() {
        let request: CreateReservationRequest = serde_json::from_str(r#"{"bookUid":"b1"}"#).unwrap();
        match request.validate() {
            Err(SagaError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["libraryUid", "tillDate"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_created_view_shape() {
        let view = CreatedReservation {
            reservation_uid: "r1".to_string(),
            status: "RENTED".to_string(),
            start_date: "2024-01-01".to_string(),
            till_date: "2024-01-10".to_string(),
            book: BookSummary::from(&BookInfo::unknown("b1")),
            library: LibraryInfo::unknown("l1"),
            rating: RatingInfo { stars: 5 },
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["reservationUid"], "r1");
        assert_eq!(json["book"]["bookUid"], "b1");
        assert_eq!(json["library"]["libraryUid"], "l1");
        assert_eq!(json["rating"]["stars"], 5);
    }
}
