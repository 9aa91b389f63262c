//! Calendar-date normalization.
//!
//! Every stored date (event date, payment date) is the UTC midnight of the
//! calendar day the caller meant, so day-range queries are exact.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Truncate an instant to the UTC midnight of its UTC calendar day.
pub fn normalize_instant(instant: DateTime<Utc>) -> DateTime<Utc> {
    utc_midnight(instant.date_naive())
}

/// Parse `YYYY-MM-DD`, `DD/MM/YYYY` or an RFC 3339 timestamp.
///
/// For timestamps the calendar day is taken in the timestamp's own offset,
/// i.e. the day as the caller wrote it.
pub fn parse_calendar_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(utc_midnight(date));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Some(utc_midnight(date));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| utc_midnight(dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_date_is_utc_midnight() {
        let dt = parse_calendar_date("2025-06-14").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-06-14T00:00:00+00:00");
    }

    #[test]
    fn legacy_day_first_format() {
        let dt = parse_calendar_date("03/07/2024").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-07-03T00:00:00+00:00");
    }

    #[test]
    fn timestamp_keeps_the_written_calendar_day() {
        // 23:30 in UTC+7 is still the 14th for the caller.
        let dt = parse_calendar_date("2025-06-14T23:30:00+07:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-06-14T00:00:00+00:00");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_calendar_date("").is_none());
        assert!(parse_calendar_date("next friday").is_none());
        assert!(parse_calendar_date("2025-13-01").is_none());
    }

    #[test]
    fn instant_truncates_to_midnight() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 30, 18, 45, 12).unwrap();
        assert_eq!(
            normalize_instant(instant),
            Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap()
        );
    }
}
