//! Wire types exchanged with the catalog, reputation and ledger services.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Physical condition of a book copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookCondition {
    Excellent,
    Good,
    Bad,
}

impl BookCondition {
    /// Higher is better.
    pub fn rank(self) -> u8 {
        match self {
            Self::Excellent => 3,
            Self::Good => 2,
            Self::Bad => 1,
        }
    }

    pub fn is_worse_than(self, other: BookCondition) -> bool {
        self.rank() < other.rank()
    }

    /// Parse a stored condition, treating absent or unknown values as excellent.
    pub fn or_excellent(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or(Self::Excellent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Bad => "BAD",
        }
    }
}

impl fmt::Display for BookCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCondition(pub String);

impl FromStr for BookCondition {
    type Err = UnknownCondition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXCELLENT" => Ok(Self::Excellent),
            "GOOD" => Ok(Self::Good),
            "BAD" => Ok(Self::Bad),
            other => Err(UnknownCondition(other.to_string())),
        }
    }
}

/// Reservation lifecycle status as the ledger stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Rented,
    Returned,
    Expired,
}

/// `GET /api/v1/libraries/{libraryUid}/books/{bookUid}` on the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInfo {
    pub book_uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub available_count: i64,
}

impl BookInfo {
    /// Placeholder for a book the catalog could not describe.
    pub fn unknown(book_uid: &str) -> Self {
        Self {
            book_uid: book_uid.to_string(),
            name: String::new(),
            author: String::new(),
            genre: String::new(),
            condition: None,
            available_count: 0,
        }
    }

    pub fn condition(&self) -> BookCondition {
        BookCondition::or_excellent(self.condition.as_deref())
    }
}

/// `GET /api/v1/libraries/{libraryUid}` on the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryInfo {
    pub library_uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
}

impl LibraryInfo {
    pub fn unknown(library_uid: &str) -> Self {
        Self {
            library_uid: library_uid.to_string(),
            name: String::new(),
            address: String::new(),
            city: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingInfo {
    #[serde(default)]
    pub stars: i64,
}

/// A reservation row from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub reservation_uid: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub till_date: String,
    #[serde(default)]
    pub book_uid: String,
    #[serde(default)]
    pub library_uid: String,
    #[serde(default)]
    pub book_condition: Option<String>,
}

impl Reservation {
    /// Condition recorded when the book was checked out.
    pub fn condition_at_checkout(&self) -> BookCondition {
        BookCondition::or_excellent(self.book_condition.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ActiveCount {
    #[serde(default)]
    pub count: i64,
}

/// Body of `POST /api/v1/reservations` on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReservation {
    pub book_uid: String,
    pub library_uid: String,
    pub till_date: String,
    pub book_condition: BookCondition,
}

/// Body of `POST /api/v1/reservations/{uid}/return` on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnSubmission {
    pub condition: BookCondition,
    pub date: String,
    pub status: ReservationStatus,
}

/// Body of `POST /api/v1/rating/adjust` on the reputation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatingAdjustment {
    pub username: String,
    pub delta: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_ordering() {
        assert!(BookCondition::Bad.is_worse_than(BookCondition::Good));
        assert!(BookCondition::Good.is_worse_than(BookCondition::Excellent));
        assert!(!BookCondition::Excellent.is_worse_than(BookCondition::Bad));
        assert!(!BookCondition::Good.is_worse_than(BookCondition::Good));
    }

    #[test]
    fn test_condition_parsing_is_case_sensitive() {
        assert_eq!("GOOD".parse::<BookCondition>(), Ok(BookCondition::Good));
        assert!("good".parse::<BookCondition>().is_err());
        assert_eq!(BookCondition::or_excellent(Some("")), BookCondition::Excellent);
        assert_eq!(BookCondition::or_excellent(None), BookCondition::Excellent);
    }

    #[test]
    fn test_reservation_tolerates_missing_condition() {
        let reservation: Reservation = serde_json::from_str(
            r#"{"reservationUid":"r1","status":"RENTED","startDate":"2024-01-01",
                "tillDate":"2024-01-10","bookUid":"b1","libraryUid":"l1"}"#,
        )
        .unwrap();
        assert_eq!(reservation.condition_at_checkout(), BookCondition::Excellent);
    }

    #[test]
    fn test_outbound_payload_shapes() {
        let body = serde_json::to_value(ReturnSubmission {
            condition: BookCondition::Bad,
            date: "2024-01-11".to_string(),
            status: ReservationStatus::Expired,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "condition": "BAD", "date": "2024-01-11", "status": "EXPIRED" })
        );

        let body = serde_json::to_value(NewReservation {
            book_uid: "b1".to_string(),
            library_uid: "l1".to_string(),
            till_date: "2024-01-10".to_string(),
            book_condition: BookCondition::Good,
        })
        .unwrap();
        assert_eq!(body["bookCondition"], "GOOD");
        assert_eq!(body["libraryUid"], "l1");
    }
}
