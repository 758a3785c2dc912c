use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Uniform response body: `{"status", "message", "data"?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self::new(Status::Success, message, data)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Error, message, Value::Null)
    }

    pub fn error_with(message: impl Into<String>, data: Value) -> Self {
        Self::new(Status::Error, message, data)
    }

    fn new(status: Status, message: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Null => None,
            Value::Object(ref map) if map.is_empty() => None,
            Value::Array(ref items) if items.is_empty() => None,
            other => Some(other),
        };
        Self {
            status,
            message: message.into(),
            data,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.status {
            Status::Success => StatusCode::OK,
            Status::Error => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Bytes to gigabytes (2^30), rounded to two decimals.
pub fn bytes_to_gb(bytes: i64) -> f64 {
    (bytes as f64 / BYTES_PER_GB * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let envelope = Envelope::success("Data received and saved", json!({"device_number": 7}));
        assert_eq!(envelope.status_code(), StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"status": "success", "message": "Data received and saved", "data": {"device_number": 7}})
        );
    }

    #[test]
    fn test_error_omits_data() {
        let envelope = Envelope::error("Invalid JSON data");
        assert_eq!(envelope.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::to_string(&envelope).unwrap(),
            r#"{"status":"error","message":"Invalid JSON data"}"#
        );
    }

    #[test]
    fn test_empty_data_is_dropped() {
        assert_eq!(Envelope::error_with("x", json!({})).data, None);
        assert_eq!(Envelope::success("x", json!([])).data, None);
        assert_eq!(
            Envelope::error_with("Method not allowed", json!({"allowed": "POST"})).data,
            Some(json!({"allowed": "POST"}))
        );
    }

    #[test]
    fn test_bytes_to_gb() {
        assert_eq!(bytes_to_gb(5_368_709_120), 5.0);
        assert_eq!(bytes_to_gb(1_073_741_824 + 536_870_912), 1.5);
        assert_eq!(bytes_to_gb(0), 0.0);
        // 123456789012 / 2^30 = 114.978...
        assert_eq!(bytes_to_gb(123_456_789_012), 114.98);
    }
}
