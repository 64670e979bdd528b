//! Transport error types
//!
//! Every non-2xx response becomes an [`ApiError`], built the same way for all
//! status codes. Callers that need a coarse category (for example to map a
//! failure onto their own HTTP response) use [`ApiError::kind`].

use forumlink_core::retry::RetryFailure;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Status codes conventionally worth retrying.
pub const TRANSIENT_STATUSES: [u16; 7] = [408, 425, 429, 499, 502, 503, 504];

/// True for the transient set and every 5xx.
pub fn is_transient_status(status: u16) -> bool {
    TRANSIENT_STATUSES.contains(&status) || status >= 500
}

/// Errors that can occur while executing a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The request or the body read exceeded its deadline.
    #[error("{method} {path} timed out after {after:?} during {phase}")]
    Timeout {
        /// HTTP method
        method: String,
        /// Request path
        path: String,
        /// Which deadline expired
        phase: TimeoutPhase,
        /// The deadline
        after: Duration,
    },

    /// Connection-level failure (DNS, refused, reset).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Any other failure while sending the request or reading the body.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// A JSON response body could not be parsed.
    #[error("Invalid JSON response from {method} {path}: {message} (body: {snippet})")]
    Parse {
        /// HTTP method
        method: String,
        /// Request path
        path: String,
        /// Parser message
        message: String,
        /// Sanitized excerpt of the offending body
        snippet: String,
    },

    /// The request could not be built (bad header, URL or method).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request body serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client configuration or initialization error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl TransportError {
    /// Check if this error is retryable.
    ///
    /// API errors are retryable for transient statuses and 5xx; network
    /// failures and timeouts always are. Validation, serialization and parse
    /// errors never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Api(err) => err.is_retryable(),
            TransportError::Timeout { .. } => true,
            TransportError::Connection(_) => true,
            TransportError::Request(_) => true,
            TransportError::Parse { .. } => false,
            TransportError::InvalidRequest(_) => false,
            TransportError::Serialization(_) => false,
            TransportError::HttpClient(_) => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::Api(err) => err.retry_after(),
            _ => None,
        }
    }

    /// The API error, when this is one.
    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            TransportError::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Map a `reqwest` send/read failure.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

impl RetryFailure for TransportError {
    fn retry_after(&self) -> Option<Duration> {
        TransportError::retry_after(self)
    }

    fn status(&self) -> Option<u16> {
        self.as_api_error().map(ApiError::status)
    }
}

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Connecting, sending and waiting for response headers.
    Request,
    /// Reading the response body.
    BodyRead,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Request => f.write_str("request"),
            TimeoutPhase::BodyRead => f.write_str("body read"),
        }
    }
}

/// Coarse category of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 400 or 422.
    BadRequest,
    /// 401.
    Unauthorized,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// 429 and the other transient statuses.
    TooManyRequests,
    /// Remaining 5xx.
    ServiceUnavailable,
    /// Anything else.
    Other,
}

impl ApiErrorKind {
    /// Categorize a status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            404 => ApiErrorKind::NotFound,
            400 | 422 => ApiErrorKind::BadRequest,
            s if TRANSIENT_STATUSES.contains(&s) => ApiErrorKind::TooManyRequests,
            s if s >= 500 => ApiErrorKind::ServiceUnavailable,
            _ => ApiErrorKind::Other,
        }
    }
}

/// A non-2xx response.
///
/// `body_snippet` holds up to the configured error body budget, already
/// whitespace-normalized; [`ApiError::snippet`] truncates it to
/// `body_snippet_max_length` for display and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    status: u16,
    path: String,
    method: String,
    body_snippet: String,
    body_snippet_max_length: usize,
    retry_after: Option<Duration>,
    request_id: Option<String>,
    context: Option<String>,
}

impl ApiError {
    /// Default display length of the body snippet.
    pub const DEFAULT_SNIPPET_LENGTH: usize = 300;

    /// Build an error for `status` on `method path`.
    pub fn new(
        status: u16,
        method: impl Into<String>,
        path: impl Into<String>,
        body: &str,
    ) -> Self {
        Self {
            status,
            path: path.into(),
            method: method.into(),
            body_snippet: collapse_whitespace(body),
            body_snippet_max_length: Self::DEFAULT_SNIPPET_LENGTH,
            retry_after: None,
            request_id: None,
            context: None,
        }
    }

    /// Set the display length of the snippet.
    pub fn with_snippet_max_length(mut self, max_length: usize) -> Self {
        self.body_snippet_max_length = max_length;
        self
    }

    /// Attach a retry hint.
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Attach the server request id.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Attach caller context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Uppercased HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The whole captured body excerpt (up to the read budget).
    pub fn body_snippet(&self) -> &str {
        &self.body_snippet
    }

    /// Display length of the snippet.
    pub fn body_snippet_max_length(&self) -> usize {
        self.body_snippet_max_length
    }

    /// Snippet truncated to `body_snippet_max_length`.
    pub fn snippet(&self) -> String {
        truncate_with_ellipsis(&self.body_snippet, self.body_snippet_max_length)
    }

    /// Delay requested by the server via `Retry-After`.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Value of the `x-request-id` response header.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Caller context.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Coarse category.
    pub fn kind(&self) -> ApiErrorKind {
        ApiErrorKind::from_status(self.status)
    }

    /// Transient statuses and 5xx are retryable.
    pub fn is_retryable(&self) -> bool {
        is_transient_status(self.status)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{}: ", context)?;
        }
        write!(
            f,
            "{} {} failed with status {}",
            self.method, self.path, self.status
        )?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id {})", request_id)?;
        }
        let snippet = self.snippet();
        if !snippet.is_empty() {
            write!(f, ": {}", snippet)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to `max_chars` characters, marking the cut with `…`.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Whitespace-collapse then truncate.
pub fn sanitize_snippet(text: &str, max_chars: usize) -> String {
    truncate_with_ellipsis(&collapse_whitespace(text), max_chars)
}
