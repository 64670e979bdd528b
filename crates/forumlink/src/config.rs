//! Configuration for the forumlink client

use crate::crypto::CipherConfig;
use crate::error::{Error, Result};
use crate::link::LinkSettings;
use crate::nonce::{CapacityPolicy, CapacityStrategy, NonceStoreConfig};
use forumlink_core::retry::{RetryOverrides, RetryPolicies};
use forumlink_transport::TransportConfig;
use secrecy::SecretString;
use std::time::Duration;

/// Configuration for [`ForumClient`](crate::ForumClient).
#[derive(Debug, Clone)]
pub struct ForumConfig {
    /// HTTP transport settings (base URL, credentials, timeouts, retries)
    pub transport: TransportConfig,

    /// Nonce TTL and capacity limits
    pub nonce: NonceStoreConfig,

    /// Ciphertext bounds for handshake payloads
    pub cipher: CipherConfig,

    /// Authorization page settings
    pub link: LinkSettings,
}

impl ForumConfig {
    /// Start a builder for the forum at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ForumConfigBuilder {
        ForumConfigBuilder {
            transport: TransportConfig::new(base_url),
            nonce: NonceStoreConfig::default(),
            cipher: CipherConfig::default(),
            link: LinkSettings::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first; variables
    /// already set take precedence. This will look for:
    /// - `FORUM_BASE_URL` (required)
    /// - `FORUM_API_KEY` and `FORUM_API_USERNAME` for system credentials
    /// - `FORUM_USER_AGENT`
    /// - `FORUM_TIMEOUT_MS` and `FORUM_READ_TIMEOUT_MS`
    /// - `FORUM_MAX_RETRIES`, `FORUM_RETRY_BASE_DELAY_MS`,
    ///   `FORUM_RETRY_MAX_DELAY_MS` and `FORUM_RETRY_JITTER`
    /// - `FORUM_NONCE_TTL_SECS`, `FORUM_NONCE_MAX_PER_CLIENT`,
    ///   `FORUM_NONCE_MAX_TOTAL` and `FORUM_NONCE_STRATEGY`
    /// - `FORUM_NONCE_CLIENT_STRATEGY` and `FORUM_NONCE_GLOBAL_STRATEGY`,
    ///   each falling back to `FORUM_NONCE_STRATEGY`
    /// - `FORUM_APPLICATION_NAME`, `FORUM_USER_API_CLIENT_ID` and
    ///   `FORUM_USER_API_SCOPES` (comma-separated)
    ///
    /// Values that do not parse are ignored and the default is kept.
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build configuration from a variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |name: &str| var(name).and_then(|v| v.parse::<f64>().ok());

        let base_url = var("FORUM_BASE_URL")
            .ok_or_else(|| Error::Config("FORUM_BASE_URL is not set".to_string()))?;
        let mut builder = Self::builder(base_url);

        if let Some(api_key) = var("FORUM_API_KEY") {
            let username = var("FORUM_API_USERNAME").unwrap_or_else(|| "system".to_string());
            builder = builder.api_key(api_key, username);
        }
        if let Some(user_agent) = var("FORUM_USER_AGENT") {
            builder = builder.user_agent(user_agent);
        }
        if let Some(ms) = parsed("FORUM_TIMEOUT_MS").and_then(positive_millis) {
            builder = builder.timeout(ms);
        }
        if let Some(ms) = parsed("FORUM_READ_TIMEOUT_MS").and_then(positive_millis) {
            builder = builder.read_timeout(ms);
        }

        let retry = RetryOverrides {
            max_retries: var("FORUM_MAX_RETRIES").and_then(|v| v.parse().ok()),
            base_delay_ms: parsed("FORUM_RETRY_BASE_DELAY_MS"),
            max_delay_ms: parsed("FORUM_RETRY_MAX_DELAY_MS"),
            jitter_ratio: parsed("FORUM_RETRY_JITTER"),
        };
        builder = builder.retry(RetryPolicies {
            default: retry,
            ..RetryPolicies::default()
        });

        if let Some(ttl) = parsed("FORUM_NONCE_TTL_SECS").and_then(positive_secs) {
            builder = builder.nonce_ttl(ttl);
        }
        let strategy = |name: &str| var(name).and_then(|v| v.parse::<CapacityStrategy>().ok());
        let shared = strategy("FORUM_NONCE_STRATEGY").unwrap_or_default();
        let client_strategy = strategy("FORUM_NONCE_CLIENT_STRATEGY").unwrap_or(shared);
        let global_strategy = strategy("FORUM_NONCE_GLOBAL_STRATEGY").unwrap_or(shared);
        let per_client = var("FORUM_NONCE_MAX_PER_CLIENT").and_then(|v| v.parse::<i64>().ok());
        let total = var("FORUM_NONCE_MAX_TOTAL").and_then(|v| v.parse::<i64>().ok());
        builder = builder.nonce_capacity(
            CapacityPolicy::unlimited()
                .per_client(per_client.unwrap_or(0), client_strategy)
                .total(total.unwrap_or(0), global_strategy),
        );

        if let Some(name) = var("FORUM_APPLICATION_NAME") {
            builder = builder.application_name(name);
        }
        if let Some(client_id) = var("FORUM_USER_API_CLIENT_ID") {
            builder = builder.user_api_client_id(client_id);
        }
        if let Some(scopes) = var("FORUM_USER_API_SCOPES") {
            builder = builder.scopes(scopes.split(',').map(str::trim).filter(|s| !s.is_empty()));
        }

        builder.build()
    }

    /// Forum base URL.
    pub fn base_url(&self) -> &str {
        &self.transport.base_url
    }
}

fn positive_millis(ms: f64) -> Option<Duration> {
    positive_secs(ms / 1000.0)
}

/// Positive seconds that fit in a [`Duration`].
fn positive_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

/// Builder for [`ForumConfig`].
#[derive(Debug, Clone)]
pub struct ForumConfigBuilder {
    transport: TransportConfig,
    nonce: NonceStoreConfig,
    cipher: CipherConfig,
    link: LinkSettings,
}

impl ForumConfigBuilder {
    /// System API key and the username it acts as.
    pub fn api_key(mut self, api_key: impl Into<String>, api_username: impl Into<String>) -> Self {
        self.transport.api_key = Some(SecretString::from(api_key.into()));
        self.transport.api_username = Some(api_username.into());
        self
    }

    /// User-Agent header value.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.transport.user_agent = user_agent.into();
        self
    }

    /// Request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = timeout;
        self
    }

    /// Body read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.transport.read_timeout = timeout;
        self
    }

    /// Retry overrides per method class.
    pub fn retry(mut self, retry: RetryPolicies) -> Self {
        self.transport.retry = retry;
        self
    }

    /// Nonce lifetime.
    pub fn nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce.ttl = ttl;
        self
    }

    /// Nonce capacity limits.
    pub fn nonce_capacity(mut self, capacity: CapacityPolicy) -> Self {
        self.nonce.capacity = capacity;
        self
    }

    /// Ciphertext bounds.
    pub fn cipher(mut self, cipher: CipherConfig) -> Self {
        self.cipher = cipher;
        self
    }

    /// Application name on the authorization page.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.link.application_name = name.into();
        self
    }

    /// Client id registered with the forum, also sent as `User-Api-Client-Id`.
    pub fn user_api_client_id(mut self, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        self.transport.user_api_client_id = Some(client_id.clone());
        self.link.client_id = Some(client_id);
        self
    }

    /// Requested scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.link.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Redirect after approval.
    pub fn auth_redirect(mut self, redirect: impl Into<String>) -> Self {
        self.link.auth_redirect = Some(redirect.into());
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ForumConfig> {
        self.transport
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        if self.cipher.min_ciphertext_bytes > self.cipher.max_ciphertext_bytes {
            return Err(Error::Config(
                "min_ciphertext_bytes must not exceed max_ciphertext_bytes".to_string(),
            ));
        }

        Ok(ForumConfig {
            transport: self.transport,
            nonce: self.nonce,
            cipher: self.cipher,
            link: self.link,
        })
    }
}
