//! Classification of raw HTTP results into [`QueryError`] variants.
//!
//! This is the only place that inspects response text. Everything downstream
//! matches on the error tag.

use std::time::Duration;

use crate::error::QueryError;

use super::http::{RawResponse, TransportFailure};

/// Case-insensitive markers the server uses to say "no data for this query".
pub const NO_DATA_MARKERS: &[&str] = &[
    "no data",
    "no satellite",
    "no scenes",
    "no products",
    "no sentinel",
    "no valid",
    "no pixels",
    "insufficient",
    "not found",
    "unavailable",
];

/// Whether `text` contains any no-data marker.
pub fn contains_no_data_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    NO_DATA_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Extract a human-readable message from an error body.
///
/// JSON bodies of the form `{"detail": "..."}` or `{"message": "..."}` are
/// unwrapped; anything else is returned trimmed.
pub fn error_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for field in ["detail", "message", "error"] {
            match value.get(field) {
                Some(serde_json::Value::String(s)) => return s.trim().to_string(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
        if let serde_json::Value::String(s) = value {
            return s.trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Classify a received response.
///
/// Returns `Ok(())` for 2xx. Non-2xx responses become `NoData` (400 or 404
/// carrying a no-data marker) or `Api`.
pub fn classify_response(response: &RawResponse) -> Result<(), QueryError> {
    if response.is_success() {
        return Ok(());
    }

    let message = error_message(&response.body);

    if matches!(response.status, 400 | 404) && contains_no_data_marker(&message) {
        return Err(QueryError::no_data(message));
    }

    let message = if message.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        message
    };
    Err(QueryError::api(response.status, message))
}

/// Classify a 2xx body whose `status` field reports an error.
///
/// A no-data message is still a soft empty state; anything else breaks the
/// response contract.
pub fn classify_error_status(message: &str) -> QueryError {
    if contains_no_data_marker(message) {
        QueryError::no_data(message)
    } else {
        QueryError::InvalidResponse(message.to_string())
    }
}

/// Classify a failure to receive any response.
pub fn classify_transport(url: &str, failure: TransportFailure, timeout: Duration) -> QueryError {
    match failure {
        TransportFailure::Timeout => QueryError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        },
        TransportFailure::Connect(msg) | TransportFailure::Other(msg) => {
            QueryError::Network(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_case_insensitive() {
        assert!(contains_no_data_marker("No satellite data found"));
        assert!(contains_no_data_marker("NO SCENES in range"));
        assert!(contains_no_data_marker("Insufficient valid pixels"));
        assert!(!contains_no_data_marker("bbox must have 4 values"));
    }

    #[test]
    fn test_error_message_unwraps_json_detail() {
        assert_eq!(
            error_message(br#"{"detail": "No Sentinel-2 scenes found"}"#),
            "No Sentinel-2 scenes found"
        );
        assert_eq!(error_message(br#"{"message": "busy"}"#), "busy");
        assert_eq!(error_message(b"  plain text \n"), "plain text");
        assert_eq!(error_message(b""), "");
    }

    #[test]
    fn test_success_passes() {
        assert!(classify_response(&RawResponse::new(200, "{}")).is_ok());
    }

    #[test]
    fn test_400_with_marker_is_no_data() {
        let err = classify_response(&RawResponse::new(400, "No satellite data found"))
            .unwrap_err();
        assert_eq!(err, QueryError::no_data("No satellite data found"));
    }

    #[test]
    fn test_404_with_marker_is_no_data() {
        let body = r#"{"detail": "No data available for the selected period"}"#;
        let err = classify_response(&RawResponse::new(404, body)).unwrap_err();
        assert!(err.is_no_data());
    }

    #[test]
    fn test_report_404_unavailable_is_no_data() {
        let body = r#"{"detail": "Cannot generate report: Sentinel Hub data unavailable"}"#;
        let err = classify_response(&RawResponse::new(404, body)).unwrap_err();
        assert_eq!(
            err,
            QueryError::no_data("Cannot generate report: Sentinel Hub data unavailable")
        );

        let body = r#"{"detail": "Cannot generate report: scene not found"}"#;
        assert!(classify_response(&RawResponse::new(404, body))
            .unwrap_err()
            .is_no_data());
    }

    #[test]
    fn test_error_status_classification() {
        assert!(classify_error_status("No Sentinel products").is_no_data());
        assert_eq!(
            classify_error_status("mask evaluation failed"),
            QueryError::InvalidResponse("mask evaluation failed".into())
        );
    }

    #[test]
    fn test_400_without_marker_is_api() {
        let err = classify_response(&RawResponse::new(400, "start must be <= end")).unwrap_err();
        assert_eq!(err, QueryError::api(400, "start must be <= end"));
    }

    #[test]
    fn test_5xx_without_body_gets_status_message() {
        let err = classify_response(&RawResponse::new(503, "")).unwrap_err();
        assert_eq!(err, QueryError::api(503, "HTTP 503"));
    }

    #[test]
    fn test_5xx_with_marker_stays_api() {
        let err = classify_response(&RawResponse::new(500, "no data")).unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_transport_classification() {
        let err = classify_transport(
            "http://x/ndvi",
            TransportFailure::Timeout,
            Duration::from_secs(30),
        );
        assert_eq!(
            err,
            QueryError::Timeout {
                url: "http://x/ndvi".into(),
                timeout_ms: 30_000
            }
        );

        let err = classify_transport(
            "http://x",
            TransportFailure::Connect("refused".into()),
            Duration::from_secs(1),
        );
        assert_eq!(err, QueryError::Network("refused".into()));
    }
}
