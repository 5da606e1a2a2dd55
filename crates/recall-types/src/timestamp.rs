//! Canonical timestamp text form.
//!
//! RFC 3339 in UTC with a fixed six-digit fraction and a `Z` suffix, so that
//! lexical order of the stored strings equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp in the canonical stored form.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse any RFC 3339 timestamp into UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Truncate to the stored precision, so in-memory values compare equal to
/// values read back from storage.
pub fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(dt.timestamp_micros()).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_width_format() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(&dt), "2026-01-02T03:04:05.000000Z");
    }

    #[test]
    fn test_lexical_order_matches_time_order() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let c = a + chrono::Duration::seconds(10);
        assert!(format_timestamp(&a) < format_timestamp(&b));
        assert!(format_timestamp(&b) < format_timestamp(&c));
    }

    #[test]
    fn test_parse_roundtrip_after_truncation() {
        let now = truncate_to_micros(Utc::now());
        let parsed = parse_timestamp(&format_timestamp(&now)).unwrap();
        assert_eq!(parsed, now);
    }
}
