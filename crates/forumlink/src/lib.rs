//! # forumlink
//!
//! Links external identities (wallets, chat accounts, app users) to accounts
//! on a Discourse-compatible forum through the user API key handshake:
//! - Single-use nonces bound to a client and an ephemeral RSA key pair, with
//!   TTL expiry and per-client and global capacity limits
//! - Authorization URL construction
//! - RSA envelope decryption of the forum's reply
//! - Account lookup over a retrying HTTP transport
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forumlink::ForumClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ForumClient::from_env()?;
//!
//!     let challenge = client.link().begin("wallet-1").await?;
//!     println!("approve at {}", challenge.authorization_url);
//!
//!     // ...the forum hands an encrypted payload back to the user...
//!     # let payload = String::new();
//!     let linked = client
//!         .link()
//!         .complete("wallet-1", &challenge.nonce, &payload)
//!         .await?;
//!     println!("linked {}", linked.user.username);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use auth_url::{AuthorizationRequest, normalize_scopes};
pub use client::ForumClient;
pub use config::{ForumConfig, ForumConfigBuilder};
pub use crypto::{CipherConfig, CryptoError, Envelope, EnvelopeCipher, KeyPair};
pub use error::{Error, Result};
pub use link::{LinkChallenge, LinkService, LinkSettings, LinkedAccount};
pub use nonce::{CapacityError, CapacityPolicy, CapacityStrategy, NonceStore, NonceStoreConfig};
pub use resources::{ForumUser, Users};

pub mod auth_url;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod link;
pub mod nonce;
pub mod resources;

// Re-export key dependencies for convenience
pub use forumlink_transport::{Transport, TransportError};
pub use secrecy::{ExposeSecret, SecretString};

/// Prelude module for common imports
///
/// # Examples
///
/// ```rust
/// use forumlink::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Error, ExposeSecret, ForumClient, ForumConfig, ForumUser, LinkChallenge, LinkService,
        LinkedAccount, Result, SecretString,
        nonce::{CapacityPolicy, CapacityStrategy, NonceStore},
    };
}

/// Crate version, from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
