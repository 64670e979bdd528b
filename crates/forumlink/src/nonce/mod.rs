//! Ephemeral key-exchange store
//!
//! Each nonce binds a requesting client to a freshly generated private key
//! for the duration of one link handshake.

pub mod capacity;
pub mod clock;
pub mod store;

pub use capacity::{
    CapacityError, CapacityLimit, CapacityPolicy, CapacityStrategy, EvictionEvent,
    EvictionReason, EvictionScope, LimitType, NonceStoreObserver, NoopNonceObserver,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{DEFAULT_TTL, MAX_TTL, NonceRecord, NonceStore, NonceStoreConfig};

use thiserror::Error;

/// Errors returned by [`NonceStore::create`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonceStoreError {
    /// Empty client id or key material.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A capacity limit refused the new nonce.
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}
