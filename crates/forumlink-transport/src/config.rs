//! Transport configuration

use crate::error::{Result, TransportError};
use forumlink_core::retry::RetryPolicies;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// Default User-Agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("forumlink-rust/", env!("CARGO_PKG_VERSION"));

/// Default request timeout (connect, send, headers).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default body read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default display length of error body snippets.
pub const DEFAULT_SNIPPET_LENGTH: usize = 300;

/// Default byte budget for reading non-2xx bodies.
pub const DEFAULT_ERROR_BODY_BUDGET: usize = 8 * 1024;

/// Configuration for [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Forum base URL, e.g. `https://forum.example.com`
    pub base_url: String,

    /// User-Agent header value
    pub user_agent: String,

    /// System API key, sent as `Api-Key`
    pub api_key: Option<SecretString>,

    /// Username the system key acts as, sent as `Api-Username`
    pub api_username: Option<String>,

    /// Default `User-Api-Client-Id` for user-key requests
    pub user_api_client_id: Option<String>,

    /// Deadline for connect, send and response headers
    pub timeout: Duration,

    /// Connect timeout for the underlying client
    pub connect_timeout: Duration,

    /// Deadline for reading the response body
    pub read_timeout: Duration,

    /// Retry overrides per method class
    pub retry: RetryPolicies,

    /// Display length of error body snippets
    pub body_snippet_max_length: usize,

    /// Bytes read from a non-2xx body before giving up
    pub error_body_budget: usize,
}

impl TransportConfig {
    /// Configuration with defaults for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_key: None,
            api_username: None,
            user_api_client_id: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry: RetryPolicies::default(),
            body_snippet_max_length: DEFAULT_SNIPPET_LENGTH,
            error_body_budget: DEFAULT_ERROR_BODY_BUDGET,
        }
    }

    /// Start a builder for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> TransportConfigBuilder {
        TransportConfigBuilder {
            config: Self::new(base_url),
        }
    }

    /// Check the base URL parses as http(s) and the timeouts are non-zero.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            TransportError::InvalidRequest(format!("invalid base URL '{}': {}", self.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TransportError::InvalidRequest(format!(
                "base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(TransportError::InvalidRequest(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Set the User-Agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the system API key and the username it acts as.
    pub fn api_key(mut self, api_key: SecretString, api_username: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key);
        self.config.api_username = Some(api_username.into());
        self
    }

    /// Set the default user API client id.
    pub fn user_api_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.user_api_client_id = Some(client_id.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the body read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the retry overrides.
    pub fn retry(mut self, retry: RetryPolicies) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the snippet display length.
    pub fn body_snippet_max_length(mut self, max_length: usize) -> Self {
        self.config.body_snippet_max_length = max_length;
        self
    }

    /// Set the error body read budget.
    pub fn error_body_budget(mut self, budget: usize) -> Self {
        self.config.error_body_budget = budget;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<TransportConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
