//! Identity link handshake
//!
//! 1. [`LinkService::begin`] generates a key pair, binds a nonce to the
//!    caller's client id and the private key, and returns the authorization
//!    URL carrying the public key and nonce.
//! 2. The forum user approves; the forum encrypts a user API key with the
//!    public key and hands the payload back to the caller.
//! 3. [`LinkService::complete`] checks the binding, decrypts the payload,
//!    looks up the account the key belongs to and consumes the nonce,
//!    whatever the outcome.

use crate::auth_url::AuthorizationRequest;
use crate::crypto::EnvelopeCipher;
use crate::error::{Error, Result};
use crate::nonce::NonceStore;
use crate::resources::{ForumUser, Users};
use chrono::{DateTime, Utc};
use forumlink_transport::Transport;
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default application name on the authorization page.
pub const DEFAULT_APPLICATION_NAME: &str = "forumlink";

/// Authorization page settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Application name shown to the user
    pub application_name: String,
    /// Client id registered with the forum; the requesting client id is used
    /// when unset
    pub client_id: Option<String>,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Redirect after approval
    pub auth_redirect: Option<String>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            client_id: None,
            scopes: vec!["read".to_string()],
            auth_redirect: None,
        }
    }
}

/// What the caller hands to the user to start linking.
#[derive(Debug, Clone)]
pub struct LinkChallenge {
    /// Single-use nonce
    pub nonce: String,
    /// Forum authorization page
    pub authorization_url: String,
    /// PEM public key embedded in the URL
    pub public_key: String,
    /// When the nonce stops being accepted
    pub expires_at: DateTime<Utc>,
}

/// A successfully linked forum account.
#[derive(Debug, Clone)]
pub struct LinkedAccount {
    /// The forum user
    pub user: ForumUser,
    /// The user API key the forum issued
    pub user_api_key: SecretString,
}

/// Runs the link handshake.
#[derive(Clone)]
pub struct LinkService {
    base_url: String,
    settings: LinkSettings,
    store: Arc<NonceStore>,
    cipher: EnvelopeCipher,
    users: Users,
}

impl fmt::Debug for LinkService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkService")
            .field("base_url", &self.base_url)
            .field("settings", &self.settings)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl LinkService {
    /// Create a link service for the forum at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        settings: LinkSettings,
        store: Arc<NonceStore>,
        cipher: EnvelopeCipher,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            settings,
            store,
            cipher,
            users: Users::new(transport),
        }
    }

    /// The nonce store backing the handshake.
    pub fn store(&self) -> &Arc<NonceStore> {
        &self.store
    }

    /// Start linking for `client_id`.
    ///
    /// Capacity limits surface as [`Error::Capacity`] with a retry hint.
    pub async fn begin(&self, client_id: &str) -> Result<LinkChallenge> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(Error::Validation("client_id must not be empty".to_string()));
        }

        let keys = self.cipher.generate_key_pair().await?;
        let nonce = self.store.create(client_id, keys.private_key)?;

        let request = AuthorizationRequest {
            base_url: self.base_url.clone(),
            application_name: self.settings.application_name.clone(),
            client_id: self.forum_client_id(client_id).to_string(),
            scopes: self.settings.scopes.clone(),
            public_key: keys.public_key.clone(),
            nonce: nonce.clone(),
            auth_redirect: self.settings.auth_redirect.clone(),
        };
        let (authorization_url, expires_at) = match (request.url(), self.store.expiration(&nonce)) {
            (Ok(url), Some(expires_at)) => (url, expires_at),
            (Err(err), _) => {
                self.store.consume(&nonce);
                return Err(err);
            }
            (Ok(_), None) => {
                self.store.consume(&nonce);
                return Err(Error::Unexpected("nonce expired before it was returned".to_string()));
            }
        };

        debug!(client_id = %client_id, expires_at = %expires_at, "Link handshake started");

        Ok(LinkChallenge {
            nonce,
            authorization_url: authorization_url.into(),
            public_key: keys.public_key,
            expires_at,
        })
    }

    /// Finish linking with the encrypted `payload` the forum returned.
    ///
    /// The nonce is claimed atomically before the account lookup, so at
    /// most one completion per nonce succeeds; every other path, including
    /// cancellation, consumes it on the way out. Any problem with the nonce or the payload is reported
    /// as [`Error::InvalidPayload`]; transport failures keep their detail.
    pub async fn complete(&self, client_id: &str, nonce: &str, payload: &str) -> Result<LinkedAccount> {
        let _guard = ConsumeOnDrop {
            store: &self.store,
            nonce,
        };

        if !self.store.verify(nonce, client_id) {
            debug!(client_id = %client_id.trim(), "Unknown, expired or mismatched nonce");
            return Err(Error::InvalidPayload);
        }
        let private_key = self.store.private_key(nonce).ok_or(Error::InvalidPayload)?;

        let envelope = match self.cipher.open_envelope(payload, &private_key).await {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(client_id = %client_id.trim(), error = %err, "Failed to open link payload");
                return Err(Error::InvalidPayload);
            }
        };

        if let Some(echo) = &envelope.nonce
            && echo != nonce
        {
            warn!(client_id = %client_id.trim(), "Link payload nonce does not match");
            return Err(Error::InvalidPayload);
        }

        // Claim the nonce before the lookup; a concurrent completion that
        // got here first leaves nothing to take.
        if self.store.take(nonce, client_id).is_none() {
            debug!(client_id = %client_id.trim(), "Nonce claimed or expired during decryption");
            return Err(Error::InvalidPayload);
        }

        let user = self
            .users
            .current_for_client(&envelope.key, Some(self.forum_client_id(client_id.trim())))
            .await?;

        info!(
            client_id = %client_id.trim(),
            user_id = user.id,
            username = %user.username,
            "Linked forum account"
        );

        Ok(LinkedAccount {
            user,
            user_api_key: envelope.key,
        })
    }

    fn forum_client_id<'a>(&'a self, client_id: &'a str) -> &'a str {
        self.settings.client_id.as_deref().unwrap_or(client_id)
    }
}

/// Consumes the nonce when the handshake scope ends.
struct ConsumeOnDrop<'a> {
    store: &'a NonceStore,
    nonce: &'a str,
}

impl Drop for ConsumeOnDrop<'_> {
    fn drop(&mut self) {
        self.store.consume(self.nonce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::{CapacityPolicy, CapacityStrategy, NonceStoreConfig};
    use async_trait::async_trait;
    use forumlink_transport::{RequestOptions, Response};
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn fetch(&self, path: &str, _options: RequestOptions) -> forumlink_transport::Result<Response> {
            panic!("unexpected call to {}", path);
        }
    }

    fn service(capacity: CapacityPolicy) -> LinkService {
        let store = Arc::new(NonceStore::new(NonceStoreConfig {
            ttl: Duration::from_secs(600),
            capacity,
        }));
        LinkService::new(
            "https://forum.example.com",
            LinkSettings {
                client_id: Some("bridge".into()),
                ..LinkSettings::default()
            },
            store,
            EnvelopeCipher::default(),
            Arc::new(Unreachable),
        )
    }

    #[tokio::test]
    async fn test_begin_binds_nonce_and_builds_url() {
        let service = service(CapacityPolicy::unlimited());

        let challenge = service.begin(" wallet-1 ").await.unwrap();

        assert!(service.store().verify(&challenge.nonce, "wallet-1"));
        assert!(challenge.authorization_url.starts_with("https://forum.example.com/user-api-key/new?"));
        assert!(challenge.authorization_url.contains("client_id=bridge"));
        assert!(challenge.public_key.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(
            Some(challenge.expires_at),
            service.store().expiration(&challenge.nonce)
        );
    }

    #[tokio::test]
    async fn test_begin_rejects_blank_client() {
        let err = service(CapacityPolicy::unlimited()).begin("  ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_begin_surfaces_capacity_with_hint() {
        let service = service(CapacityPolicy::unlimited().per_client(1, CapacityStrategy::RejectNew));
        service.begin("wallet-1").await.unwrap();

        let err = service.begin("wallet-1").await.unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
        assert!(err.is_retryable());
        assert!(err.retry_after().is_some());
    }

    #[tokio::test]
    async fn test_complete_with_garbage_consumes_nonce() {
        let service = service(CapacityPolicy::unlimited());
        let challenge = service.begin("wallet-1").await.unwrap();

        let err = service
            .complete("wallet-1", &challenge.nonce, "definitely not a payload")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidPayload));
        assert!(!service.store().verify(&challenge.nonce, "wallet-1"));
    }

    #[tokio::test]
    async fn test_complete_with_wrong_client_consumes_nonce() {
        let service = service(CapacityPolicy::unlimited());
        let challenge = service.begin("wallet-1").await.unwrap();

        let err = service
            .complete("wallet-2", &challenge.nonce, "payload")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "invalid or expired payload");
        assert!(!service.store().verify(&challenge.nonce, "wallet-1"));
    }

    #[tokio::test]
    async fn test_complete_with_unknown_nonce() {
        let err = service(CapacityPolicy::unlimited())
            .complete("wallet-1", "missing", "payload")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload));
    }

    /// Jumps past any TTL on every reading.
    #[derive(Debug)]
    struct RunawayClock(std::sync::Mutex<DateTime<Utc>>);

    impl crate::nonce::Clock for RunawayClock {
        fn now(&self) -> DateTime<Utc> {
            let mut now = self.0.lock().unwrap();
            *now += chrono::TimeDelta::hours(1);
            *now
        }
    }

    #[tokio::test]
    async fn test_begin_cleans_up_when_nonce_expires_immediately() {
        let store = NonceStore::new(NonceStoreConfig {
            ttl: Duration::from_secs(60),
            capacity: CapacityPolicy::unlimited(),
        })
        .with_clock(Arc::new(RunawayClock(std::sync::Mutex::new(Utc::now()))));
        let store = Arc::new(store);
        let service = LinkService::new(
            "https://forum.example.com",
            LinkSettings::default(),
            Arc::clone(&store),
            EnvelopeCipher::default(),
            Arc::new(Unreachable),
        );

        let err = service.begin("wallet-1").await.unwrap_err();

        assert!(matches!(err, Error::Unexpected(_)));
        assert_eq!(store.cleanup(), 0);
    }

    #[test]
    fn test_default_settings() {
        let settings = LinkSettings::default();
        assert_eq!(settings.application_name, "forumlink");
        assert_eq!(settings.scopes, vec!["read".to_string()]);
    }
}
