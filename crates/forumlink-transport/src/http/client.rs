//! HTTP transport client implementation
//!
//! Wires request preparation, the retry executor and response parsing into a
//! single `fetch` call.

use super::request::{PreparedRequest, RequestOptions, prepare};
use super::response::{Response, classify_error, parse_success};
use crate::config::TransportConfig;
use crate::error::{Result, TimeoutPhase, TransportError};
use crate::observability::RequestMetadata;
use async_trait::async_trait;
use forumlink_core::retry::{
    RetryClass, RetryExecutor, RetryObserver, RetryPolicy, TracingObserver,
};
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Executes forum API calls.
///
/// Resource operations depend on this trait rather than on
/// [`HttpTransport`], so they can be exercised against a fake.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a call with retries and return the parsed 2xx response.
    async fn fetch(&self, path: &str, options: RequestOptions) -> Result<Response>;
}

/// Deserialize the JSON body of a call made through any [`Transport`].
pub async fn fetch_json<T, X>(transport: &X, path: &str, options: RequestOptions) -> Result<T>
where
    T: DeserializeOwned,
    X: Transport + ?Sized,
{
    transport.fetch(path, options).await?.json()
}

/// HTTP transport over `reqwest`.
///
/// Holds immutable configuration and a cloneable client; cloning the
/// transport shares the connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    config: Arc<TransportConfig>,
    observer: Arc<dyn RetryObserver>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport from validated configuration.
    pub fn new(config: TransportConfig) -> Result<Self> {
        config.validate()?;

        let client = ReqwestClient::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            config: Arc::new(config),
            observer: Arc::new(TracingObserver),
        })
    }

    /// Replace the retry observer (defaults to [`TracingObserver`]).
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The configuration in effect.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Build the request for `path` without sending it.
    pub fn prepare(&self, path: &str, options: &RequestOptions) -> Result<PreparedRequest> {
        prepare(&self.config, path, options)
    }

    /// Resolve the retry policy for a call.
    pub fn policy_for(&self, request: &PreparedRequest, options: &RequestOptions) -> RetryPolicy {
        let policy = self
            .config
            .retry
            .resolve(RetryClass::for_method(request.method.as_str()));
        match options.retry_overrides() {
            Some(overrides) => policy.apply(overrides),
            None => policy,
        }
    }

    /// Execute a call and deserialize its JSON body.
    pub async fn fetch_json<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        fetch_json(self, path, options).await
    }

    async fn attempt(
        &self,
        request: &PreparedRequest,
        attempt: u32,
        timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Response> {
        let meta = RequestMetadata::new(request.method.as_str(), request.path.clone())
            .with_body_size(request.body.as_ref().map(|b| b.len()))
            .with_attempt(attempt);
        meta.log_request();

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        // Dropping the send future on timeout aborts the request.
        let response = match tokio::time::timeout(timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) if err.is_timeout() => {
                return Err(self.timeout_error(request, TimeoutPhase::Request, timeout));
            }
            Ok(Err(err)) => return Err(TransportError::from_reqwest(err)),
            Err(_) => return Err(self.timeout_error(request, TimeoutPhase::Request, timeout)),
        };

        if response.status().is_success() {
            return parse_success(response, &meta, read_timeout, self.config.body_snippet_max_length).await;
        }

        let error = classify_error(
            response,
            &meta,
            read_timeout,
            self.config.error_body_budget,
            self.config.body_snippet_max_length,
        )
        .await;
        meta.log_http_error(&error, started.elapsed());
        Err(TransportError::Api(error))
    }

    fn timeout_error(&self, request: &PreparedRequest, phase: TimeoutPhase, after: Duration) -> TransportError {
        TransportError::Timeout {
            method: request.method.to_string(),
            path: request.path.clone(),
            phase,
            after,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let request = self.prepare(path, &options)?;
        let policy = self.policy_for(&request, &options);
        let timeout = options.timeout_override().unwrap_or(self.config.timeout);
        let read_timeout = options
            .read_timeout_override()
            .unwrap_or(self.config.read_timeout);

        RetryExecutor::new(policy)
            .with_observer(self.observer.clone())
            .with_label(request.method.as_str(), request.path.clone())
            .run(
                |attempt| self.attempt(&request, attempt, timeout, read_timeout),
                TransportError::is_retryable,
            )
            .await
    }
}
