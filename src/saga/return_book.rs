//! Return-book saga.

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::observability::metrics;
use crate::resilience::TaskKind;
use crate::saga::rating::rating_delta;
use crate::saga::{record_outcome, require, Orchestrator, SagaError, SagaOutcome, DATE_FORMAT};
use crate::services::types::{BookCondition, ReservationStatus, ReturnSubmission};
use crate::services::RawResponse;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnBookRequest {
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub date: String,
}

impl ReturnBookRequest {
    /// Check required fields, then parse the condition.
    pub fn condition(&self) -> Result<BookCondition, SagaError> {
        let mut errors = Vec::new();
        require(&mut errors, "condition", &self.condition);
        require(&mut errors, "date", &self.date);
        if !errors.is_empty() {
            return Err(SagaError::Validation(errors));
        }

        self.condition
            .parse::<BookCondition>()
            .map_err(|_| SagaError::InvalidCondition)
    }

    pub fn returned_on(&self) -> Result<NaiveDate, SagaError> {
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|_| SagaError::InvalidDate)
    }
}

impl Orchestrator {
    pub async fn return_book(
        &self,
        username: &str,
        reservation_uid: &str,
        request: ReturnBookRequest,
    ) -> Result<SagaOutcome<()>, SagaError> {
        let result = self.run_return(username, reservation_uid, &request).await;
        record_outcome("return_book", &result);
        result
    }

    async fn run_return(
        &self,
        username: &str,
        reservation_uid: &str,
        request: &ReturnBookRequest,
    ) -> Result<SagaOutcome<()>, SagaError> {
        let condition = request.condition()?;

        // An unavailable ledger is indistinguishable from a missing reservation here.
        let reservation = match self.aggregator.find_reservation(username, reservation_uid).await {
            Ok(Some(reservation)) => reservation,
            Ok(None) => return Err(SagaError::ReservationNotFound),
            Err(e) => {
                tracing::warn!(reservation_uid, error = %e, "Reservation lookup unavailable");
                return Err(SagaError::ReservationNotFound);
            }
        };

        let returned_on = request.returned_on()?;

        let due = NaiveDate::parse_from_str(&reservation.till_date, DATE_FORMAT).map_err(|_| {
            tracing::error!(reservation_uid, till_date = %reservation.till_date, "Unparseable due date");
            SagaError::CorruptReservation
        })?;
        let late = returned_on > due;

        // Commit.
        let saga_key = self.saga_key();
        let commit = self.services.ledger.return_request(
            username,
            reservation_uid,
            &ReturnSubmission {
                condition,
                date: request.date.clone(),
                status: if late {
                    ReservationStatus::Expired
                } else {
                    ReservationStatus::Returned
                },
            },
            saga_key.as_deref(),
        )?;

        let response = match commit.send(&self.services.http).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(reservation_uid, error = %e, "Ledger unreachable, deferring return");
                self.defer(TaskKind::ReturnBook, commit);
                return Ok(SagaOutcome::Queued);
            }
        };
        if response.status() != StatusCode::NO_CONTENT {
            return Ok(SagaOutcome::Passthrough(RawResponse::read(response).await?));
        }

        // Increment availability, or compensate.
        let increment = self
            .services
            .catalog
            .increase_request(&reservation.library_uid, &reservation.book_uid)?;
        if let Err(e) = increment
            .send_expecting(&self.services.http, StatusCode::OK)
            .await
        {
            tracing::warn!(reservation_uid, error = %e, "Availability increment failed, rolling back return");
            let rollback = self
                .services
                .ledger
                .rollback_return_request(username, reservation_uid)?;
            self.defer(TaskKind::RollbackReturn, rollback);
            self.defer(TaskKind::ReturnBook, commit);
            return Ok(SagaOutcome::Queued);
        }

        // Best effort: a lost adjustment is logged and counted, never retried.
        let delta = rating_delta(reservation.condition_at_checkout(), condition, late);
        if delta != 0 {
            if let Err(e) = self.services.reputation.adjust(username, delta).await {
                tracing::warn!(reservation_uid, delta, error = %e, "Failed to update user rating");
                metrics::record_rating_update_failure();
            }
        }

        tracing::info!(reservation_uid, late, delta, "Book returned");
        Ok(SagaOutcome::Completed(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(condition: &str, date: &str) -> ReturnBookRequest {
        ReturnBookRequest {
            condition: condition.to_string(),
            date: date.to_string(),
        }
    }

    #[test]
    fn test_accepts_valid_payload() {
        let req = request("BAD", "2024-01-11");
        assert_eq!(req.condition().unwrap(), BookCondition::Bad);
        assert_eq!(req.returned_on().unwrap(), NaiveDate::from_ymd_opt(2024, 1, 11).unwrap());
    }

    #[test]
    fn test_rejects_unknown_condition() {
        assert!(matches!(
            request("SHINY", "2024-01-11").condition(),
            Err(SagaError::InvalidCondition)
        ));
    }

    #[test]
    fn test_bad_date_is_only_caught_by_returned_on() {
        let req = request("GOOD", "11.01.2024");
        assert!(req.condition().is_ok());
        assert!(matches!(req.returned_on(), Err(SagaError::InvalidDate)));
    }

    #[test]
    fn test_reports_missing_fields() {
        match request("", "").condition() {
            Err(SagaError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
