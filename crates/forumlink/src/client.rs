//! Main client for a single forum

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use forumlink_transport::{HttpTransport, Transport};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    config::ForumConfig,
    crypto::EnvelopeCipher,
    error::{Error, Result},
    link::LinkService,
    nonce::NonceStore,
    resources::Users,
};

/// Client for one forum: owns the transport, the nonce store and the
/// resources built on them.
///
/// Cloning is cheap; clones share all state.
///
/// # Example
///
/// ```rust,no_run
/// use forumlink::{ForumClient, ForumConfig};
///
/// # async fn example() -> forumlink::Result<()> {
/// let config = ForumConfig::builder("https://forum.example.com")
///     .user_api_client_id("bridge")
///     .build()?;
/// let client = ForumClient::new(config)?;
///
/// let challenge = client.link().begin("wallet-1").await?;
/// println!("send the user to {}", challenge.authorization_url);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ForumClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ForumConfig,
    transport: Arc<dyn Transport>,
    store: Arc<NonceStore>,
    cipher: EnvelopeCipher,

    users: OnceLock<Users>,
    link: OnceLock<LinkService>,
}

impl ForumClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the HTTP client cannot be built.
    pub fn new(config: ForumConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.transport.clone())?);
        let store = NonceStore::new(config.nonce);
        Ok(Self::from_parts(config, transport, store))
    }

    /// Create a client from environment variables.
    ///
    /// See [`ForumConfig::from_env`] for the variables read.
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        Self::new(ForumConfig::from_env()?)
    }

    /// Create a client with a custom transport and nonce store.
    ///
    /// The store's own settings win over `config.nonce`.
    pub fn from_parts(config: ForumConfig, transport: Arc<dyn Transport>, store: NonceStore) -> Self {
        let cipher = EnvelopeCipher::new(config.cipher);
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                store: Arc::new(store),
                cipher,
                users: OnceLock::new(),
                link: OnceLock::new(),
            }),
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ForumConfig {
        &self.inner.config
    }

    /// The transport every resource shares.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// The nonce store backing link handshakes.
    pub fn nonce_store(&self) -> &Arc<NonceStore> {
        &self.inner.store
    }

    /// Access the Users resource.
    pub fn users(&self) -> &Users {
        self.inner
            .users
            .get_or_init(|| Users::new(Arc::clone(&self.inner.transport)))
    }

    /// Access the link handshake.
    pub fn link(&self) -> &LinkService {
        self.inner.link.get_or_init(|| {
            LinkService::new(
                self.inner.config.base_url(),
                self.inner.config.link.clone(),
                Arc::clone(&self.inner.store),
                self.inner.cipher,
                Arc::clone(&self.inner.transport),
            )
        })
    }

    /// Sweep expired nonces every `interval` until the store is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_nonce_cleanup(&self, interval: Duration) -> Result<JoinHandle<()>> {
        if interval.is_zero() {
            return Err(Error::Config("cleanup interval must be greater than zero".to_string()));
        }
        debug!(interval_ms = interval.as_millis() as u64, "Starting nonce cleanup");
        Ok(self.inner.store.spawn_cleanup(interval))
    }
}

impl std::fmt::Debug for ForumClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForumClient")
            .field("base_url", &self.inner.config.base_url())
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::NonceStoreConfig;

    fn config() -> ForumConfig {
        ForumConfig::builder("https://forum.example.com")
            .user_api_client_id("bridge")
            .build()
            .unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = ForumClient::new(config()).unwrap();
        assert_eq!(client.config().base_url(), "https://forum.example.com");
        assert!(client.nonce_store().is_empty());
    }

    #[test]
    fn test_resources_are_cached() {
        let client = ForumClient::new(config()).unwrap();
        assert!(std::ptr::eq(client.users(), client.users()));
        assert!(std::ptr::eq(client.link(), client.link()));
    }

    #[tokio::test]
    async fn test_clones_share_the_store() {
        let client = ForumClient::new(config()).unwrap();
        let clone = client.clone();

        let challenge = client.link().begin("wallet-1").await.unwrap();

        assert!(clone.nonce_store().verify(&challenge.nonce, "wallet-1"));
        assert!(Arc::ptr_eq(client.nonce_store(), clone.link().store()));
    }

    #[test]
    fn test_from_parts_keeps_custom_store() {
        let config = config();
        let transport = Arc::new(HttpTransport::new(config.transport.clone()).unwrap());
        let store = NonceStore::new(NonceStoreConfig {
            ttl: Duration::from_secs(5),
            ..NonceStoreConfig::default()
        });

        let client = ForumClient::from_parts(config, transport, store);
        assert_eq!(client.nonce_store().ttl(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_spawn_cleanup_rejects_zero_interval() {
        let client = ForumClient::new(config()).unwrap();
        assert!(matches!(
            client.spawn_nonce_cleanup(Duration::ZERO),
            Err(Error::Config(_))
        ));
        client
            .spawn_nonce_cleanup(Duration::from_secs(60))
            .unwrap()
            .abort();
    }
}
