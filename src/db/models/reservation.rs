//! Reservation models and DTOs.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::ledger::window::format_timestamp;

/// A stored booking of one slot for `[start_at, end_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: String,
    pub account_id: String,
    pub slot: String,
    /// `YYYY-MM-DD HH:MM`, naive local time
    pub start_at: String,
    pub end_at: String,
    pub created_at: String,
}

/// Lifecycle position of a reservation relative to "now". Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Upcoming,
    Active,
    Ended,
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upcoming => write!(f, "upcoming"),
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

impl Reservation {
    /// Derive the status at `now`. The stored text format sorts as time.
    pub fn status_at(&self, now: NaiveDateTime) -> ReservationStatus {
        let now = format_timestamp(now);
        if now < self.start_at {
            ReservationStatus::Upcoming
        } else if now < self.end_at {
            ReservationStatus::Active
        } else {
            ReservationStatus::Ended
        }
    }

    pub fn to_response(&self, now: NaiveDateTime) -> ReservationResponse {
        ReservationResponse {
            id: self.id.clone(),
            slot: self.slot.clone(),
            start_at: self.start_at.clone(),
            end_at: self.end_at.clone(),
            status: self.status_at(now),
            created_at: self.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationResponse {
    pub id: String,
    pub slot: String,
    pub start_at: String,
    pub end_at: String,
    pub status: ReservationStatus,
    pub created_at: String,
}

/// Booking form: a date plus entry/exit times of day.
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub slot: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub entry: String,
    /// `HH:MM`; at or before `entry` means the next day
    pub exit: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::window::parse_timestamp;

    fn reservation(start: &str, end: &str) -> Reservation {
        Reservation {
            id: "r1".to_string(),
            account_id: "a1".to_string(),
            slot: "A1".to_string(),
            start_at: start.to_string(),
            end_at: end.to_string(),
            created_at: "2024-05-01 08:00:00".to_string(),
        }
    }

    #[test]
    fn test_status_boundaries() {
        let r = reservation("2024-05-01 10:00", "2024-05-01 12:00");
        let at = |s: &str| parse_timestamp(s).unwrap();

        assert_eq!(r.status_at(at("2024-05-01 09:59")), ReservationStatus::Upcoming);
        assert_eq!(r.status_at(at("2024-05-01 10:00")), ReservationStatus::Active);
        assert_eq!(r.status_at(at("2024-05-01 11:59")), ReservationStatus::Active);
        assert_eq!(r.status_at(at("2024-05-01 12:00")), ReservationStatus::Ended);
    }

    #[test]
    fn test_response_carries_status() {
        let r = reservation("2024-05-01 10:00", "2024-05-01 12:00");
        let response = r.to_response(parse_timestamp("2024-05-02 00:00").unwrap());
        assert_eq!(response.status, ReservationStatus::Ended);
        assert_eq!(
            serde_json::to_value(&response).unwrap()["status"],
            serde_json::json!("ended")
        );
    }
}
