//! Ledger service client: reservations and their compensations.
//!
//! The write operations are returned as [`OutboundRequest`] values so the
//! saga can send them and, if needed, hand the identical request to the
//! retry queue.

use reqwest::Method;

use crate::services::client::{ServiceEndpoint, UpstreamError};
use crate::services::outbound::OutboundRequest;
use crate::services::types::{ActiveCount, NewReservation, Reservation, ReturnSubmission};

#[derive(Debug, Clone)]
pub struct LedgerClient {
    endpoint: ServiceEndpoint,
}

impl LedgerClient {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        Self { endpoint }
    }

    pub async fn reservations(&self, username: &str) -> Result<Vec<Reservation>, UpstreamError> {
        let url = self.endpoint.url(&["api", "v1", "reservations"])?;
        self.endpoint
            .fetch(&OutboundRequest::new(Method::GET, url).user(username))
            .await
    }

    /// Look a reservation up among the user's own reservations.
    pub async fn find_reservation(
        &self,
        username: &str,
        reservation_uid: &str,
    ) -> Result<Option<Reservation>, UpstreamError> {
        let reservations = self.reservations(username).await?;
        Ok(reservations
            .into_iter()
            .find(|r| r.reservation_uid == reservation_uid))
    }

    pub async fn active_count(&self, username: &str) -> Result<i64, UpstreamError> {
        let url = self.endpoint.url(&["api", "v1", "reservations", "active", "count"])?;
        let count: ActiveCount = self
            .endpoint
            .fetch(&OutboundRequest::new(Method::GET, url).user(username))
            .await?;
        Ok(count.count)
    }

    /// `POST /api/v1/reservations`; the ledger answers 200 with the new row.
    pub fn create_request(
        &self,
        username: &str,
        reservation: &NewReservation,
        idempotency_key: Option<&str>,
    ) -> Result<OutboundRequest, UpstreamError> {
        let url = self.endpoint.url(&["api", "v1", "reservations"])?;
        OutboundRequest::new(Method::POST, url)
            .user(username)
            .idempotency_key(idempotency_key)
            .json(reservation)
    }

    /// `POST /api/v1/reservations/{uid}/return`; the ledger answers 204.
    pub fn return_request(
        &self,
        username: &str,
        reservation_uid: &str,
        submission: &ReturnSubmission,
        idempotency_key: Option<&str>,
    ) -> Result<OutboundRequest, UpstreamError> {
        let url = self
            .endpoint
            .url(&["api", "v1", "reservations", reservation_uid, "return"])?;
        OutboundRequest::new(Method::POST, url)
            .user(username)
            .idempotency_key(idempotency_key)
            .json(submission)
    }

    /// Undo a created reservation.
    pub fn rollback_create_request(&self, username: &str, reservation_uid: &str) -> Result<OutboundRequest, UpstreamError> {
        let url = self
            .endpoint
            .url(&["api", "v1", "reservations", reservation_uid, "rollback"])?;
        Ok(OutboundRequest::new(Method::DELETE, url).user(username))
    }

    /// Undo a recorded return.
    pub fn rollback_return_request(&self, username: &str, reservation_uid: &str) -> Result<OutboundRequest, UpstreamError> {
        let url = self
            .endpoint
            .url(&["api", "v1", "reservations", reservation_uid, "rollback-return"])?;
        Ok(OutboundRequest::new(Method::POST, url).user(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::outbound::{IDEMPOTENCY_KEY, USER_HEADER};
    use crate::services::types::BookCondition;

    fn ledger() -> LedgerClient {
        LedgerClient::new(ServiceEndpoint::new(reqwest::Client::new(), "http://ledger:8070").unwrap())
    }

    #[test]
    fn test_compensation_targets() {
        let rollback = ledger().rollback_create_request("alice", "r-1").unwrap();
        assert_eq!(rollback.method, Method::DELETE);
        assert_eq!(rollback.url.as_str(), "http://ledger:8070/api/v1/reservations/r-1/rollback");
        assert_eq!(rollback.headers.get(USER_HEADER).map(String::as_str), Some("alice"));
        assert!(rollback.body.is_none());

        let rollback = ledger().rollback_return_request("alice", "r-1").unwrap();
        assert_eq!(rollback.method, Method::POST);
        assert_eq!(
            rollback.url.as_str(),
            "http://ledger:8070/api/v1/reservations/r-1/rollback-return"
        );
    }

    #[test]
    fn test_create_request_carries_key_when_given() {
        let body = NewReservation {
            book_uid: "b1".to_string(),
            library_uid: "l1".to_string(),
            till_date: "2024-01-10".to_string(),
            book_condition: BookCondition::Excellent,
        };
        let request = ledger().create_request("alice", &body, Some("k-1")).unwrap();
        assert_eq!(request.headers.get(IDEMPOTENCY_KEY).map(String::as_str), Some("k-1"));
        let sent: serde_json::Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["bookCondition"], "EXCELLENT");
    }
}
