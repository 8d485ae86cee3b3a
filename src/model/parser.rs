// Handles date/time values arriving from tool calls and the CLI
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse a caller-supplied timestamp.
///
/// Accepted forms, tried in order:
/// - RFC 3339 (`2025-01-01T12:00:00Z`, offsets allowed)
/// - compact iCalendar (`20250101T120000Z` or floating `20250101T120000`)
/// - date-only (`2025-01-01` or `20250101`), read as midnight UTC
pub fn parse_datetime_arg(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ") {
        return Ok(Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Ok(Utc.from_utc_datetime(&dt));
    }
    for fmt in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt)
            && let Some(dt) = date.and_hms_opt(0, 0, 0)
        {
            return Ok(dt.and_utc());
        }
    }

    Err(Error::InvalidDateTime(value.to_string()))
}

/// Whether a timestamp argument carries no time-of-day component.
pub fn is_date_only(value: &str) -> bool {
    let value = value.trim();
    !value.contains('T') && !value.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parses_rfc3339() {
        let dt = parse_datetime_arg("2025-01-01T12:00:00Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());

        let offset = parse_datetime_arg("2025-01-01T12:00:00+02:00").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parses_compact_ical() {
        let dt = parse_datetime_arg("20250101T120000Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());

        let floating = parse_datetime_arg("20250101T120000").unwrap();
        assert_eq!(floating, dt);
    }

    #[test]
    fn test_parses_date_only_as_midnight() {
        let dt = parse_datetime_arg("2025-01-01").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(parse_datetime_arg("20250101").unwrap(), dt);
    }

    #[test]
    fn test_is_date_only() {
        assert!(is_date_only("2025-01-01"));
        assert!(is_date_only("20250101"));
        assert!(!is_date_only("2025-01-01T12:00:00Z"));
        assert!(!is_date_only("20250101T120000"));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = parse_datetime_arg("next tuesday");
        assert!(matches!(err, Err(Error::InvalidDateTime(_))));
    }
}
