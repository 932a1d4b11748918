//! Read-path composition.
//!
//! Every dependency read goes through that dependency's breaker. When the
//! breaker denies the call, or the call fails with a transport error or an
//! unexpected status, the caller gets a zero-valued default instead of an
//! error. One dependency degrading only blanks the fields it owns.

use futures_util::future::join_all;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::resilience::{BreakerError, Breakers};
use crate::services::types::{BookInfo, LibraryInfo, RatingInfo, Reservation};
use crate::services::{RawResponse, Services, UpstreamError};

/// Book fields shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub book_uid: String,
    pub name: String,
    pub author: String,
    pub genre: String,
}

impl From<&BookInfo> for BookSummary {
    fn from(book: &BookInfo) -> Self {
        Self {
            book_uid: book.book_uid.clone(),
            name: book.name.clone(),
            author: book.author.clone(),
            genre: book.genre.clone(),
        }
    }
}

/// A ledger reservation decorated with catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub reservation_uid: String,
    pub status: String,
    pub start_date: String,
    pub till_date: String,
    pub book: BookSummary,
    pub library: LibraryInfo,
}

pub fn empty_page() -> RawResponse {
    RawResponse::json(
        StatusCode::OK,
        &json!({ "page": 1, "pageSize": 10, "totalElements": 0, "items": [] }),
    )
}

fn degraded(dependency: &str, error: &BreakerError<UpstreamError>) {
    match error {
        BreakerError::Open(_) => {
            tracing::debug!(dependency, "Breaker open, serving default");
        }
        BreakerError::Inner(e) => {
            tracing::warn!(dependency, error = %e, "Dependency read failed, serving default");
        }
    }
}

pub struct Aggregator {
    services: Services,
    breakers: Breakers,
}

impl Aggregator {
    pub fn new(services: Services, breakers: Breakers) -> Self {
        Self { services, breakers }
    }

    pub async fn libraries(&self, query: Option<&str>) -> RawResponse {
        let catalog = &self.services.catalog;
        match self
            .breakers
            .catalog
            .execute_classified(|| catalog.libraries(query), UpstreamError::trips_breaker)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                degraded("catalog", &e);
                empty_page()
            }
        }
    }

    pub async fn library_books(&self, library_uid: &str, query: Option<&str>) -> RawResponse {
        let catalog = &self.services.catalog;
        match self
            .breakers
            .catalog
            .execute_classified(|| catalog.library_books(library_uid, query), UpstreamError::trips_breaker)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                degraded("catalog", &e);
                empty_page()
            }
        }
    }

    pub async fn rating(&self, username: &str) -> RawResponse {
        let reputation = &self.services.reputation;
        match self
            .breakers
            .reputation
            .execute_classified(|| reputation.rating_raw(username), UpstreamError::trips_breaker)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                degraded("reputation", &e);
                RawResponse::json(StatusCode::OK, &json!({ "stars": 0 }))
            }
        }
    }

    /// Book lookup for decisions: `Ok(None)` means the catalog has no such book.
    pub async fn book(&self, library_uid: &str, book_uid: &str) -> Result<Option<BookInfo>, BreakerError<UpstreamError>> {
        let catalog = &self.services.catalog;
        self.breakers
            .catalog
            .execute_classified(|| catalog.book(library_uid, book_uid), UpstreamError::trips_breaker)
            .await
    }

    pub async fn book_or_unknown(&self, library_uid: &str, book_uid: &str) -> BookInfo {
        match self.book(library_uid, book_uid).await {
            Ok(Some(book)) => book,
            Ok(None) => BookInfo::unknown(book_uid),
            Err(e) => {
                degraded("catalog", &e);
                BookInfo::unknown(book_uid)
            }
        }
    }

    pub async fn library_or_unknown(&self, library_uid: &str) -> LibraryInfo {
        let catalog = &self.services.catalog;
        match self
            .breakers
            .catalog
            .execute_classified(|| catalog.library(library_uid), UpstreamError::trips_breaker)
            .await
        {
            Ok(Some(library)) => library,
            Ok(None) => LibraryInfo::unknown(library_uid),
            Err(e) => {
                degraded("catalog", &e);
                LibraryInfo::unknown(library_uid)
            }
        }
    }

    pub async fn rating_or_zero(&self, username: &str) -> RatingInfo {
        let reputation = &self.services.reputation;
        match self
            .breakers
            .reputation
            .execute_classified(|| reputation.rating(username), UpstreamError::trips_breaker)
            .await
        {
            Ok(rating) => rating,
            Err(e) => {
                degraded("reputation", &e);
                RatingInfo::default()
            }
        }
    }

    pub async fn active_count_or_zero(&self, username: &str) -> i64 {
        let ledger = &self.services.ledger;
        match self
            .breakers
            .ledger
            .execute_classified(|| ledger.active_count(username), UpstreamError::trips_breaker)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                degraded("ledger", &e);
                0
            }
        }
    }

    pub async fn find_reservation(
        &self,
        username: &str,
        reservation_uid: &str,
    ) -> Result<Option<Reservation>, BreakerError<UpstreamError>> {
        let ledger = &self.services.ledger;
        self.breakers
            .ledger
            .execute_classified(|| ledger.find_reservation(username, reservation_uid), UpstreamError::trips_breaker)
            .await
    }

    /// The user's reservations, each decorated with book and library data.
    ///
    /// Rows are enriched concurrently; an unavailable ledger yields an empty list.
    pub async fn reservations(&self, username: &str) -> Vec<ReservationView> {
        let ledger = &self.services.ledger;
        let rows = match self
            .breakers
            .ledger
            .execute_classified(|| ledger.reservations(username), UpstreamError::trips_breaker)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                degraded("ledger", &e);
                return Vec::new();
            }
        };

        join_all(rows.into_iter().map(|row| self.enrich(row))).await
    }

    async fn enrich(&self, row: Reservation) -> ReservationView {
        let (book, library) = tokio::join!(
            self.book_or_unknown(&row.library_uid, &row.book_uid),
            self.library_or_unknown(&row.library_uid),
        );
        ReservationView {
            reservation_uid: row.reservation_uid,
            status: row.status,
            start_date: row.start_date,
            till_date: row.till_date,
            book: BookSummary::from(&book),
            library,
        }
    }
}
