//! Input validation for API requests.
//!
//! Field checks return `Result<(), String>` so they can be collected with
//! `ValidationErrorBuilder`. The booking form is parsed here into a `Window`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::ledger::window::{parse_date, parse_time_of_day, parse_timestamp};
use crate::ledger::Window;

lazy_static! {
    /// Usernames: 3-32 chars of letters, digits, underscore, dot, dash
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap();

    /// Vehicle registrations after normalization: 4-16 chars of A-Z, 0-9, space, dash
    static ref VEHICLE_REGEX: Regex = Regex::new(r"^[A-Z0-9][A-Z0-9 -]{2,14}[A-Z0-9]$").unwrap();
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let username = username.trim();
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".to_string(),
        );
    }
    Ok(())
}

pub fn validate_password(password: &str, min_length: usize) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    if password.chars().count() < min_length {
        return Err(format!("Password must be at least {} characters", min_length));
    }
    if password.len() > 256 {
        return Err("Password is too long (max 256 characters)".to_string());
    }
    Ok(())
}

/// Expects the normalized (trimmed, upper-case) form.
pub fn validate_vehicle_number(vehicle: &str) -> Result<(), String> {
    if vehicle.is_empty() {
        return Err("Vehicle number is required".to_string());
    }
    if !VEHICLE_REGEX.is_match(vehicle) {
        return Err(
            "Vehicle number must be 4-16 characters of letters, digits, spaces or dashes"
                .to_string(),
        );
    }
    Ok(())
}

/// Validate a date/entry/exit triple and build the window it describes.
///
/// `today` is the lot-local date; earlier booking dates are rejected.
pub fn parse_booking_window(
    date: &str,
    entry: &str,
    exit: &str,
    today: NaiveDate,
) -> Result<Window, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let date = parse_date(date);
    match date {
        None => {
            errors.add("date", "Date must be in YYYY-MM-DD format");
        }
        Some(d) if d < today => {
            errors.add("date", "Date cannot be in the past");
        }
        Some(_) => {}
    }

    let entry = parse_field_time("entry", entry, &mut errors);
    let exit = parse_field_time("exit", exit, &mut errors);

    errors.finish()?;

    match (date, entry, exit) {
        (Some(date), Some(entry), Some(exit)) => Ok(Window::from_entry_exit(date, entry, exit)?),
        _ => Err(ApiError::bad_request("Invalid booking window")),
    }
}

fn parse_field_time(
    field: &str,
    value: &str,
    errors: &mut ValidationErrorBuilder,
) -> Option<NaiveTime> {
    let parsed = parse_time_of_day(value);
    if parsed.is_none() {
        errors.add(field, format!("{} must be a time in HH:MM format", capitalize(field)));
    }
    parsed
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parse an optional `at` query value, defaulting to `now`.
pub fn parse_instant(at: Option<&str>, now: NaiveDateTime) -> Result<NaiveDateTime, ApiError> {
    match at.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(now),
        Some(raw) => parse_timestamp(raw).ok_or_else(|| {
            ApiError::validation_field("at", "Time must be in 'YYYY-MM-DD HH:MM' format")
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("j.doe-99_x").is_ok());
        assert!(validate_username("  bob  ").is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("semi;colon").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345678", 8).is_ok());
        assert!(validate_password("1234567", 8).is_err());
        assert!(validate_password("", 8).is_err());
        assert!(validate_password(&"x".repeat(300), 8).is_err());
    }

    #[test]
    fn test_validate_vehicle_number() {
        assert!(validate_vehicle_number("KA01 AB 1234").is_ok());
        assert!(validate_vehicle_number("MH-12-X").is_ok());
        assert!(validate_vehicle_number("AB12").is_ok());

        assert!(validate_vehicle_number("").is_err());
        assert!(validate_vehicle_number("AB1").is_err());
        assert!(validate_vehicle_number("ka01ab1234").is_err());
        assert!(validate_vehicle_number("KA01/AB").is_err());
        assert!(validate_vehicle_number(&"A".repeat(17)).is_err());
    }

    #[test]
    fn test_booking_window_same_day() {
        let w = parse_booking_window("2024-05-01", "10:00", "12:30", day("2024-05-01")).unwrap();
        assert_eq!(w.start_text(), "2024-05-01 10:00");
        assert_eq!(w.end_text(), "2024-05-01 12:30");
    }

    #[test]
    fn test_booking_window_overnight() {
        let w = parse_booking_window("2024-05-01", "22:00", "06:00", day("2024-04-30")).unwrap();
        assert_eq!(w.end_text(), "2024-05-02 06:00");
    }

    #[test]
    fn test_booking_window_rejects_past_and_malformed() {
        let err = parse_booking_window("2024-04-30", "10:00", "12:00", day("2024-05-01"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.message(), "Date cannot be in the past");

        let err = parse_booking_window("01/05/2024", "25:00", "x", day("2024-05-01")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.message().contains("3 fields"));
    }

    #[test]
    fn test_booking_window_rejects_years_beyond_four_digits() {
        let err = parse_booking_window("9999-12-31", "22:00", "06:00", day("2024-05-01"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.message(), "Date must fall between years 1000 and 9999");

        let err = parse_booking_window("10000-01-01", "10:00", "12:00", day("2024-05-01"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.message(), "Date must be in YYYY-MM-DD format");

        let w = parse_booking_window("9999-12-31", "10:00", "12:00", day("2024-05-01")).unwrap();
        assert_eq!(w.end_text(), "9999-12-31 12:00");
    }

    #[test]
    fn test_parse_instant() {
        let now = parse_timestamp("2024-05-01 09:00").unwrap();
        assert_eq!(parse_instant(None, now).unwrap(), now);
        assert_eq!(parse_instant(Some(""), now).unwrap(), now);
        assert_eq!(
            parse_instant(Some("2024-05-01T10:15"), now).unwrap(),
            parse_timestamp("2024-05-01 10:15").unwrap()
        );
        assert!(parse_instant(Some("tomorrow"), now).is_err());
    }
}
