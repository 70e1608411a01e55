//! Error categorization for better diagnostics and reporting.
//!
//! This module provides classification of HTTP status codes into meaningful
//! categories for better analysis of load test failures, plus the top-level
//! `LoadtestError` carried through every `Result`-returning operation.

use thiserror::Error;

use crate::model::WireError;

/// Errors surfaced by the coordinator, catalog, aggregator, and control
/// surface. Per-call and per-node HTTP failures are not represented here —
/// they are counted in `responses_status_map` and never halt a run (see §7).
#[derive(Debug, Error)]
pub enum LoadtestError {
    #[error("coordinator store error: {0}")]
    Coordinator(#[from] crate::coordinator::CoordinatorError),

    #[error("results aggregation timed out after {0} seconds")]
    ResultsTimeout(u64),

    #[error("request body is not valid gzip: {0}")]
    InvalidGzipBody(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<&LoadtestError> for WireError {
    fn from(error: &LoadtestError) -> Self {
        match error {
            LoadtestError::Coordinator(inner) => {
                WireError::new("CoordinatorError", vec![inner.to_string()])
            }
            LoadtestError::ResultsTimeout(seconds) => {
                WireError::new("ResultsTimeoutError", vec![seconds.to_string()])
            }
            LoadtestError::InvalidGzipBody(message) => {
                WireError::new("InvalidGzipBody", vec![message.clone()])
            }
            LoadtestError::BadRequest(message) => {
                WireError::new("BadRequest", vec![message.clone()])
            }
        }
    }
}

/// Categories of errors that can occur during load testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP 4xx errors (client errors)
    ClientError,

    /// HTTP 5xx errors (server errors)
    ServerError,

    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// Request timeout errors
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize an HTTP status code.
    ///
    /// # Arguments
    /// * `status_code` - HTTP status code (200, 404, 500, etc.)
    ///
    /// # Returns
    /// The appropriate error category, or None if status is success (2xx/3xx)
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200..=399 => None, // Success responses
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_success_codes() {
        assert_eq!(ErrorCategory::from_status_code(200), None);
        assert_eq!(ErrorCategory::from_status_code(201), None);
        assert_eq!(ErrorCategory::from_status_code(204), None);
        assert_eq!(ErrorCategory::from_status_code(301), None);
        assert_eq!(ErrorCategory::from_status_code(302), None);
    }

    #[test]
    fn test_categorize_4xx_errors() {
        assert_eq!(
            ErrorCategory::from_status_code(400),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(404),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(429),
            Some(ErrorCategory::ClientError)
        );
    }

    #[test]
    fn test_categorize_5xx_errors() {
        assert_eq!(
            ErrorCategory::from_status_code(500),
            Some(ErrorCategory::ServerError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(502),
            Some(ErrorCategory::ServerError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(503),
            Some(ErrorCategory::ServerError)
        );
    }

    #[test]
    fn test_error_category_labels() {
        assert_eq!(ErrorCategory::ClientError.label(), "client_error");
        assert_eq!(ErrorCategory::ServerError.label(), "server_error");
        assert_eq!(ErrorCategory::NetworkError.label(), "network_error");
        assert_eq!(ErrorCategory::TimeoutError.label(), "timeout_error");
        assert_eq!(ErrorCategory::TlsError.label(), "tls_error");
    }

    #[test]
    fn wire_error_maps_results_timeout_to_named_args() {
        let error = LoadtestError::ResultsTimeout(2);
        let wire = WireError::from(&error);
        assert_eq!(wire.name, "ResultsTimeoutError");
        assert_eq!(wire.args, vec!["2".to_string()]);
    }

    #[test]
    fn wire_error_maps_bad_request() {
        let error = LoadtestError::BadRequest("missing duration query parameter".into());
        let wire = WireError::from(&error);
        assert_eq!(wire.name, "BadRequest");
    }
}
