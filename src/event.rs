use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Status string marking a failed access attempt.
pub const STATUS_FAILED: &str = "FAILED";

/// One access-log event as it arrives from the log store.
///
/// The timestamp is kept as the raw string from the wire; parsing happens
/// inside the pipeline so that a record with a broken timestamp can be
/// dropped and counted rather than failing the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLogEvent {
    /// RFC 3339 timestamp, e.g. `2024-03-01T09:12:00Z`.
    pub timestamp: String,
    pub user_id: String,
    pub resource_id: String,
    /// `"OK"`, `"FAILED"`, or any other collector-specific status.
    pub status: String,
    #[serde(default)]
    pub source_ip: String,
}

impl RawLogEvent {
    /// Parse the timestamp, returning `None` for anything that is not
    /// valid RFC 3339.
    pub fn parse_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// A record without a user id cannot be attributed to anyone and is
    /// treated as malformed.
    pub fn is_malformed(&self) -> bool {
        self.user_id.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        self.status == STATUS_FAILED
    }
}

/// Hour-of-day (0-23) of an instant in the configured timezone.
pub(crate) fn local_hour(instant: DateTime<Utc>, offset: FixedOffset) -> u8 {
    instant.with_timezone(&offset).hour() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(timestamp: &str) -> RawLogEvent {
        RawLogEvent {
            timestamp: timestamp.to_string(),
            user_id: "u1".to_string(),
            resource_id: "r1".to_string(),
            status: "OK".to_string(),
            source_ip: "10.0.0.1".to_string(),
        }
    }

    #[test]
    fn parses_rfc3339_timestamps() {
        assert!(event("2024-03-01T09:12:00Z").parse_timestamp().is_some());
        assert!(event("2024-03-01T09:12:00+02:00").parse_timestamp().is_some());
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert!(event("yesterday-ish").parse_timestamp().is_none());
        assert!(event("").parse_timestamp().is_none());
        assert!(event("2024-13-40T99:00:00Z").parse_timestamp().is_none());
    }

    #[test]
    fn hour_extraction_honors_offset() {
        let instant = event("2024-03-01T23:30:00Z").parse_timestamp().unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(local_hour(instant, utc), 23);
        // 23:30 UTC is 01:30 the next day at UTC+2.
        assert_eq!(local_hour(instant, plus_two), 1);
    }

    #[test]
    fn failed_status_is_exact_match() {
        let mut ev = event("2024-03-01T09:12:00Z");
        assert!(!ev.is_failed());
        ev.status = "FAILED".to_string();
        assert!(ev.is_failed());
        ev.status = "failed".to_string();
        assert!(!ev.is_failed());
    }
}
