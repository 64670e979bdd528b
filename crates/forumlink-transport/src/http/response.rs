//! Response parsing and HTTP error classification

use crate::error::{ApiError, Result, TimeoutPhase, TransportError, sanitize_snippet};
use crate::observability::RequestMetadata;
use chrono::{DateTime, NaiveDateTime, Utc};
use forumlink_core::retry::RetryOutcome;
use http::HeaderMap;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Placeholder snippet when a non-2xx body cannot be read.
pub const UNREADABLE_BODY: &str = "[unreadable body]";

/// Parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No body (`content-length: 0` or blank text).
    Empty,
    /// Parsed JSON.
    Json(serde_json::Value),
    /// Raw text for non-JSON content types.
    Text(String),
}

impl ResponseBody {
    /// True for [`ResponseBody::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    /// The JSON value, if any.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The raw text, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// `x-request-id`, when the server sent one
    pub request_id: Option<String>,
    /// Parsed body
    pub body: ResponseBody,
}

impl Response {
    /// Deserialize the body.
    ///
    /// An empty body deserializes from `null`, so `Option<T>` and `()` work
    /// for endpoints that answer without content.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            ResponseBody::Json(value) => Ok(T::deserialize(value)?),
            ResponseBody::Empty => Ok(serde_json::from_value(serde_json::Value::Null)?),
            ResponseBody::Text(text) => Ok(serde_json::from_str(text)?),
        }
    }
}

impl RetryOutcome for Response {
    fn status(&self) -> Option<u16> {
        Some(self.status)
    }
}

/// Case-insensitive header lookup as an owned string.
pub fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// `application/json` or any `*+json` media type.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Parse a `Retry-After` value relative to `now`.
///
/// Accepts non-negative integer seconds or an HTTP-date; a date in the past
/// yields zero. Anything else yields `None`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<u64>().ok().map(Duration::from_secs);
    }

    let date = parse_http_date(value)?;
    let millis = (date - now).num_milliseconds().max(0);
    Some(Duration::from_millis(millis as u64))
}

/// IMF-fixdate, then the obsolete RFC 850 and asctime forms.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    let compact = value.split_whitespace().collect::<Vec<_>>().join(" ");
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %d %H:%M:%S %Y"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&compact, format).ok())
        .map(|naive| naive.and_utc())
}

/// Turn a 2xx response into a [`Response`].
pub(crate) async fn parse_success(
    response: reqwest::Response,
    meta: &RequestMetadata,
    read_timeout: Duration,
    snippet_max_length: usize,
) -> Result<Response> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let request_id = header_str(&headers, "x-request-id");

    let empty = Response {
        status,
        headers: headers.clone(),
        request_id: request_id.clone(),
        body: ResponseBody::Empty,
    };

    if header_str(&headers, CONTENT_LENGTH.as_str()).as_deref() == Some("0") {
        return Ok(empty);
    }

    let text = match tokio::time::timeout(read_timeout, response.text()).await {
        Ok(Ok(text)) => text,
        Ok(Err(err)) => return Err(TransportError::from_reqwest(err)),
        Err(_) => {
            return Err(TransportError::Timeout {
                method: meta.method.clone(),
                path: meta.path.clone(),
                phase: TimeoutPhase::BodyRead,
                after: read_timeout,
            });
        }
    };

    if text.trim().is_empty() {
        return Ok(empty);
    }

    let is_json = header_str(&headers, CONTENT_TYPE.as_str())
        .map(|ct| is_json_content_type(&ct))
        .unwrap_or(false);

    let body = if is_json {
        match serde_json::from_str(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(err) => {
                let snippet = sanitize_snippet(&text, snippet_max_length);
                meta.log_parse_error(status, &err.to_string(), &snippet);
                return Err(TransportError::Parse {
                    method: meta.method.clone(),
                    path: meta.path.clone(),
                    message: err.to_string(),
                    snippet,
                });
            }
        }
    } else {
        ResponseBody::Text(text)
    };

    Ok(Response {
        status,
        headers,
        request_id,
        body,
    })
}

/// Turn a non-2xx response into an [`ApiError`].
///
/// The body is read up to `budget` bytes within `read_timeout`; any read
/// failure substitutes [`UNREADABLE_BODY`].
pub(crate) async fn classify_error(
    mut response: reqwest::Response,
    meta: &RequestMetadata,
    read_timeout: Duration,
    budget: usize,
    snippet_max_length: usize,
) -> ApiError {
    let status = response.status().as_u16();
    let request_id = header_str(response.headers(), "x-request-id");
    let retry_after = header_str(response.headers(), RETRY_AFTER.as_str())
        .and_then(|v| parse_retry_after(&v, Utc::now()));

    let body = match tokio::time::timeout(read_timeout, read_limited(&mut response, budget)).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => UNREADABLE_BODY.to_string(),
    };

    ApiError::new(status, meta.method.clone(), meta.path.clone(), &body)
        .with_snippet_max_length(snippet_max_length)
        .with_retry_after(retry_after)
        .with_request_id(request_id)
}

async fn read_limited(
    response: &mut reqwest::Response,
    budget: usize,
) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let mut buf = Vec::new();
    while buf.len() < budget {
        match response.chunk().await? {
            Some(chunk) => {
                let take = chunk.len().min(budget - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }
    Ok(buf)
}
