//! Fixed-layout timestamp codec for artifact keys.
//!
//! Every backup run is identified by the instant it started, rendered as
//! `DD-MM-YYYY-HH:MM:SS` in UTC. The rendered form is the first path segment
//! of every artifact key, and the retention sweeper parses it back out of the
//! key to decide an object's age. Both directions share one layout so the
//! codec round-trips at second precision.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Layout shared by [`render`] and [`parse`]. Second precision, UTC.
const TIMESTAMP_LAYOUT: &str = "%d-%m-%Y-%H:%M:%S";

#[derive(Debug, Error)]
pub enum TimestampError {
    /// The text does not match the fixed layout. Callers must treat this as
    /// "age cannot be determined", never as "age is zero".
    #[error("malformed timestamp {0:?}: expected DD-MM-YYYY-HH:MM:SS")]
    Malformed(String),
}

/// Render an instant in the fixed layout, dropping sub-second components.
pub fn render(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_LAYOUT).to_string()
}

/// Parse a timestamp previously produced by [`render`].
pub fn parse(text: &str) -> Result<DateTime<Utc>, TimestampError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_LAYOUT)
        .map(|naive| naive.and_utc())
        .map_err(|_| TimestampError::Malformed(text.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{SubsecRound, TimeZone};
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_round_trip_at_second_precision() {
        let instant = Utc.with_ymd_and_hms(2024, 2, 29, 13, 5, 7).unwrap();
        assert_eq!(parse(&render(instant)).unwrap(), instant);
    }

    #[test]
    fn test_round_trip_drops_subseconds() {
        let now = Utc::now();
        assert_eq!(parse(&render(now)).unwrap(), now.trunc_subsecs(0));
    }

    #[test]
    fn test_render_layout() {
        let instant = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(render(instant), "31-12-2023-23:59:59");
    }

    #[rstest]
    #[case("")]
    #[case("not-a-timestamp")]
    #[case("2023-12-31-23:59:59")] // year-first ordering
    #[case("01-13-2023-00:00:00")] // month out of range
    #[case("31-12-2023")] // time component missing
    #[case("31-12-2023-23:59")] // seconds missing
    fn test_parse_rejects_malformed(#[case] text: &str) {
        assert!(matches!(parse(text), Err(TimestampError::Malformed(_))));
    }
}
