use chrono::Local;
use serde::{Deserialize, Serialize};

/// Wire and storage format for every timestamp in the system.
/// Fixed width, so text ordering matches chronological ordering.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current server-local time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// A monitored device, keyed by its number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub device_number: i64,
    pub last_update: Option<String>,
}

/// One free-space measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reading {
    pub id: i64,
    pub device_number: i64,
    pub free_space: i64,
    pub created_at: String,
}

/// Most recent reading of a device, as used by export and report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LatestReading {
    pub device_number: i64,
    pub free_space: i64,
    pub created_at: String,
}

/// Validated ingestion payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingPayload {
    pub device_number: i64,
    pub free_space: i64,
}

/// `data` member of a successful ingestion response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReceipt {
    pub device_number: i64,
    pub free_space_gb: f64,
    pub recorded_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Report {
    pub id: i64,
    pub generated_at: String,
    pub total_devices: i64,
    pub report_data: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_now_timestamp_round_trips_through_format() {
        let ts = now_timestamp();
        assert_eq!(ts.len(), 19);
        assert!(NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_receipt_serializes_expected_keys() {
        let receipt = IngestReceipt {
            device_number: 7,
            free_space_gb: 5.0,
            recorded_at: "2026-10-16 09:30:00".to_string(),
        };
        let json = serde_json::to_string(&receipt).unwrap();
        assert_eq!(
            json,
            r#"{"device_number":7,"free_space_gb":5.0,"recorded_at":"2026-10-16 09:30:00"}"#
        );
    }
}
