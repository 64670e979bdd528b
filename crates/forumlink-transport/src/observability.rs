//! Structured logging for outbound requests
//!
//! Per-attempt outcomes (success, retry, final failure) are logged by the
//! retry observer in `forumlink-core`. This module covers what happens inside
//! a single attempt: dispatch and non-2xx / unparseable responses.

use crate::error::ApiError;
use std::time::Duration;
use tracing::{debug, warn};

/// Request metadata for structured logging
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path
    pub path: String,
    /// Request body size in bytes
    pub body_size: Option<usize>,
    /// 0-based attempt number
    pub attempt: u32,
}

impl RequestMetadata {
    /// Create new request metadata
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            body_size: None,
            attempt: 0,
        }
    }

    /// Set the request body size
    pub fn with_body_size(mut self, size: Option<usize>) -> Self {
        self.body_size = size;
        self
    }

    /// Set the attempt number
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Log request being sent
    pub fn log_request(&self) {
        debug!(
            method = %self.method,
            path = %self.path,
            body_size = self.body_size,
            attempt = self.attempt,
            "Sending HTTP request"
        );
    }

    /// Log a non-2xx response
    pub fn log_http_error(&self, error: &ApiError, elapsed: Duration) {
        warn!(
            method = %self.method,
            path = %self.path,
            status = error.status(),
            request_id = error.request_id(),
            retry_after_ms = error.retry_after().map(|d| d.as_millis() as u64),
            elapsed_ms = elapsed.as_millis() as u64,
            body = %error.snippet(),
            "HTTP error response"
        );
    }

    /// Log a success response whose JSON body failed to parse
    pub fn log_parse_error(&self, status: u16, message: &str, snippet: &str) {
        warn!(
            method = %self.method,
            path = %self.path,
            status = status,
            error = %message,
            body = %snippet,
            "Failed to parse JSON response"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metadata_builder() {
        let meta = RequestMetadata::new("POST", "/posts.json")
            .with_body_size(Some(42))
            .with_attempt(2);

        assert_eq!(meta.method, "POST");
        assert_eq!(meta.path, "/posts.json");
        assert_eq!(meta.body_size, Some(42));
        assert_eq!(meta.attempt, 2);
    }

    #[test]
    fn test_logging_does_not_panic_without_subscriber() {
        let meta = RequestMetadata::new("GET", "/latest.json");
        meta.log_request();
        meta.log_http_error(
            &ApiError::new(503, "GET", "/latest.json", "busy"),
            Duration::from_millis(12),
        );
        meta.log_parse_error(200, "expected value", "<html>");
    }
}
