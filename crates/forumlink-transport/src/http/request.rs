//! Per-call options and request preparation
//!
//! [`RequestOptions`] describes one call. [`prepare`] turns it into a
//! [`PreparedRequest`] exactly once per `fetch`; every retry attempt reuses
//! the same method, URL, headers and body.

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use bytes::Bytes;
use forumlink_core::retry::RetryOverrides;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use http::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// `Api-Key` header (system credentials).
pub const API_KEY: HeaderName = HeaderName::from_static("api-key");
/// `Api-Username` header (system credentials).
pub const API_USERNAME: HeaderName = HeaderName::from_static("api-username");
/// `User-Api-Key` header (per-user credentials).
pub const USER_API_KEY: HeaderName = HeaderName::from_static("user-api-key");
/// `User-Api-Client-Id` header (per-user credentials).
pub const USER_API_CLIENT_ID: HeaderName = HeaderName::from_static("user-api-client-id");

const APPLICATION_JSON: &str = "application/json";

/// Custom body serializer; receives the JSON value and returns raw bytes.
pub type BodySerializer =
    Arc<dyn Fn(&serde_json::Value) -> std::result::Result<Bytes, String> + Send + Sync>;

/// Request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// Structured value, serialized as JSON unless a serializer is set.
    Json(serde_json::Value),
    /// Raw text, sent untouched.
    Text(String),
    /// Raw bytes (uploads, multipart payloads built by the caller), sent untouched.
    Bytes(Bytes),
}

/// Whether to send the default `Accept: application/json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AcceptHeader {
    /// Send `Accept: application/json` unless the caller set one.
    #[default]
    Json,
    /// Send no default `Accept` header.
    None,
}

/// Options for a single call.
#[derive(Clone, Default)]
pub struct RequestOptions {
    method: Option<String>,
    headers: Vec<(String, String)>,
    body: RequestBody,
    serializer: Option<BodySerializer>,
    accept: AcceptHeader,
    timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    retry: Option<RetryOverrides>,
    user_api_key: Option<SecretString>,
    user_api_client_id: Option<String>,
    act_as: Option<String>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("headers", &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("body", &self.body)
            .field("serializer", &self.serializer.is_some())
            .field("accept", &self.accept)
            .field("timeout", &self.timeout)
            .field("read_timeout", &self.read_timeout)
            .field("retry", &self.retry)
            .field("user_api_key", &self.user_api_key.is_some())
            .field("user_api_client_id", &self.user_api_client_id)
            .field("act_as", &self.act_as)
            .finish()
    }
}

impl RequestOptions {
    /// Empty options (`GET`, no body).
    pub fn new() -> Self {
        Self::default()
    }

    /// `GET` request.
    pub fn get() -> Self {
        Self::new().method("GET")
    }

    /// `POST` request.
    pub fn post() -> Self {
        Self::new().method("POST")
    }

    /// `PUT` request.
    pub fn put() -> Self {
        Self::new().method("PUT")
    }

    /// `DELETE` request.
    pub fn delete() -> Self {
        Self::new().method("DELETE")
    }

    /// Set the method (case-insensitive).
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header. Later values for the same name replace earlier ones.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a JSON body from any serializable value.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Set a raw text body.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Text(body.into());
        self
    }

    /// Set a raw byte body.
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    /// Set the body directly.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Serialize structured bodies with `serializer` instead of JSON.
    pub fn serializer(mut self, serializer: BodySerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Suppress the default `Accept` header.
    pub fn without_accept(mut self) -> Self {
        self.accept = AcceptHeader::None;
        self
    }

    /// Override the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the body read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Per-call retry overrides, applied after the method class.
    pub fn retry(mut self, overrides: RetryOverrides) -> Self {
        self.retry = Some(overrides);
        self
    }

    /// Authenticate as a user with their user API key.
    pub fn user_api_key(mut self, key: SecretString) -> Self {
        self.user_api_key = Some(key);
        self
    }

    /// Client id sent alongside the user API key.
    pub fn user_api_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.user_api_client_id = Some(client_id.into());
        self
    }

    /// Act as `username` with the system API key.
    pub fn act_as(mut self, username: impl Into<String>) -> Self {
        self.act_as = Some(username.into());
        self
    }

    /// The body.
    pub fn request_body(&self) -> &RequestBody {
        &self.body
    }

    /// Per-call retry overrides.
    pub fn retry_overrides(&self) -> Option<&RetryOverrides> {
        self.retry.as_ref()
    }

    /// Per-call request timeout.
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Per-call read timeout.
    pub fn read_timeout_override(&self) -> Option<Duration> {
        self.read_timeout
    }
}

/// A fully built request, reused by every attempt.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Uppercased method
    pub method: Method,
    /// Absolute URL
    pub url: Url,
    /// Headers after defaults and auth
    pub headers: HeaderMap,
    /// Serialized body
    pub body: Option<Bytes>,
    /// The path as the caller passed it, for logs and errors
    pub path: String,
}

/// Resolve `path` against `base_url`.
///
/// Absolute `http://` or `https://` paths pass through; anything else is
/// joined under the base with exactly one `/` between them.
pub fn resolve_url(base_url: &str, path: &str) -> Result<Url> {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    let raw = if lower.starts_with("http://") || lower.starts_with("https://") {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };

    Url::parse(&raw).map_err(|e| TransportError::InvalidRequest(format!("invalid URL '{}': {}", raw, e)))
}

/// Parse and uppercase a method name; only standard methods are accepted.
pub fn parse_method(method: &str) -> Result<Method> {
    match method.trim().to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        "OPTIONS" => Ok(Method::OPTIONS),
        _ => Err(TransportError::InvalidRequest(format!(
            "unsupported HTTP method: {}",
            method
        ))),
    }
}

/// Build the request for `path` from `options` and `config`.
pub fn prepare(config: &TransportConfig, path: &str, options: &RequestOptions) -> Result<PreparedRequest> {
    let method = parse_method(options.method.as_deref().unwrap_or("GET"))?;
    let url = resolve_url(&config.base_url, path)?;

    let mut headers = HeaderMap::new();
    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("invalid header name '{}': {}", name, e)))?;
        headers.insert(name, header_value(value)?);
    }

    if options.accept == AcceptHeader::Json && !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
    }

    if !headers.contains_key(USER_AGENT) && !config.user_agent.is_empty() {
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
    }

    apply_auth(config, options, &mut headers)?;

    let (body, auto_json) = serialize_body(options)?;
    if auto_json && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }

    Ok(PreparedRequest {
        method,
        url,
        headers,
        body,
        path: path.to_string(),
    })
}

fn apply_auth(config: &TransportConfig, options: &RequestOptions, headers: &mut HeaderMap) -> Result<()> {
    if let Some(key) = &options.user_api_key {
        if !headers.contains_key(USER_API_KEY) {
            let mut value = header_value(key.expose_secret())?;
            value.set_sensitive(true);
            headers.insert(USER_API_KEY, value);
        }
    }

    if headers.contains_key(USER_API_KEY) {
        // A user key never travels with system credentials.
        headers.remove(API_KEY);
        headers.remove(API_USERNAME);

        let client_id = options
            .user_api_client_id
            .as_deref()
            .or(config.user_api_client_id.as_deref());
        if let Some(client_id) = client_id
            && !headers.contains_key(USER_API_CLIENT_ID)
        {
            headers.insert(USER_API_CLIENT_ID, header_value(client_id)?);
        }
        return Ok(());
    }

    if let Some(key) = &config.api_key
        && !headers.contains_key(API_KEY)
    {
        let mut value = header_value(key.expose_secret())?;
        value.set_sensitive(true);
        headers.insert(API_KEY, value);
    }

    let username = options.act_as.as_deref().or(config.api_username.as_deref());
    if let Some(username) = username
        && headers.contains_key(API_KEY)
        && !headers.contains_key(API_USERNAME)
    {
        headers.insert(API_USERNAME, header_value(username)?);
    }

    Ok(())
}

/// Returns the body bytes and whether they were auto-serialized as JSON.
fn serialize_body(options: &RequestOptions) -> Result<(Option<Bytes>, bool)> {
    match &options.body {
        RequestBody::Empty => Ok((None, false)),
        RequestBody::Json(value) => match &options.serializer {
            Some(serializer) => serializer(value)
                .map(|bytes| (Some(bytes), false))
                .map_err(|e| TransportError::InvalidRequest(format!("body serializer failed: {}", e))),
            None => Ok((Some(Bytes::from(serde_json::to_vec(value)?)), true)),
        },
        RequestBody::Text(text) => Ok((Some(Bytes::from(text.clone())), false)),
        RequestBody::Bytes(bytes) => Ok((Some(bytes.clone()), false)),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidRequest(format!("invalid header value: {}", e)))
}
