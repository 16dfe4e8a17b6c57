//! Timestamps in the authority's local time (fixed GMT+3).
use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc,
};
use thiserror::Error;
use tracing::warn;

const LOCAL_OFFSET_SECS: i32 = 3 * 3600;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MIDNIGHT: &str = "00:00:00";

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("invalid issue date '{value}': {source}")]
    Date {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid issue time '{value}': {source}")]
    Time {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("timestamp out of range: {value}")]
    OutOfRange { value: String },
}

/// Source of "now"; injectable so signing output is reproducible in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(LOCAL_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// `instant` rendered as `yyyy-MM-ddTHH:mm:ss` in GMT+3.
pub fn format_local(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&local_offset())
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// `yyyy-MM-dd` of `instant` in GMT+3.
pub fn local_date(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&local_offset())
        .format("%Y-%m-%d")
        .to_string()
}

/// Turns an invoice's `IssueDate`/`IssueTime` pair into the QR timestamp.
///
/// A time ending in `Z` is UTC and is shifted into GMT+3; anything else is taken to be local
/// already and only reformatted.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampNormalizer;

impl TimestampNormalizer {
    pub fn normalize(&self, date: &str, time: Option<&str>) -> Result<String, TimestampError> {
        let date = date.trim();
        let time = match time.map(str::trim).filter(|t| !t.is_empty()) {
            Some(time) => time,
            None => {
                warn!(date, "issue time missing; using midnight");
                MIDNIGHT
            }
        };

        let parsed_date =
            NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|source| TimestampError::Date {
                value: date.to_string(),
                source,
            })?;

        let (clock_time, utc) = match time.strip_suffix('Z') {
            Some(stripped) => (stripped, true),
            None => (time, false),
        };
        let parsed_time = parse_time(clock_time).map_err(|source| TimestampError::Time {
            value: time.to_string(),
            source,
        })?;

        let mut instant = NaiveDateTime::new(parsed_date, parsed_time);
        if utc {
            instant = instant
                .checked_add_signed(Duration::seconds(i64::from(LOCAL_OFFSET_SECS)))
                .ok_or_else(|| TimestampError::OutOfRange {
                    value: format!("{date}T{time}"),
                })?;
        }
        Ok(instant.format(TIMESTAMP_FORMAT).to_string())
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S%.f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_time_is_shifted_three_hours() {
        let normalizer = TimestampNormalizer;
        assert_eq!(
            normalizer.normalize("2024-03-01", Some("10:00:00Z")).unwrap(),
            "2024-03-01T13:00:00"
        );
        assert_eq!(
            normalizer.normalize("2024-03-01", Some("22:30:15Z")).unwrap(),
            "2024-03-02T01:30:15"
        );
    }

    #[test]
    fn local_time_is_only_reformatted() {
        assert_eq!(
            TimestampNormalizer
                .normalize("2024-03-01", Some("10:00:00"))
                .unwrap(),
            "2024-03-01T10:00:00"
        );
    }

    #[test]
    fn missing_time_means_midnight() {
        assert_eq!(
            TimestampNormalizer.normalize("2024-03-01", None).unwrap(),
            "2024-03-01T00:00:00"
        );
        assert_eq!(
            TimestampNormalizer.normalize("2024-03-01", Some("  ")).unwrap(),
            "2024-03-01T00:00:00"
        );
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            TimestampNormalizer.normalize("01/03/2024", Some("10:00:00")),
            Err(TimestampError::Date { .. })
        ));
        assert!(matches!(
            TimestampNormalizer.normalize("2024-03-01", Some("25:00")),
            Err(TimestampError::Time { .. })
        ));
    }

    #[test]
    fn local_rendering_uses_gmt_plus_three() {
        let instant = Utc.with_ymd_and_hms(2024, 12, 31, 22, 0, 0).unwrap();
        assert_eq!(format_local(instant), "2025-01-01T01:00:00");
        assert_eq!(local_date(instant), "2025-01-01");
    }
}
