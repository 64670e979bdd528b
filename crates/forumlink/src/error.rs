//! Error types for the forumlink client
//!
//! Transport failures keep their full structure. Envelope failures collapse
//! to [`Error::InvalidPayload`] at the handshake boundary; the detailed
//! [`CryptoError`] is only logged.

use crate::crypto::CryptoError;
use crate::nonce::{CapacityError, NonceStoreError};
use forumlink_transport::{ApiError, TransportError};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for forumlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, Error)]
pub enum Error {
    /// An outbound call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed caller input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A nonce limit refused the request.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Key generation or decryption failed outside the handshake.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The handshake payload could not be used.
    #[error("invalid or expired payload")]
    InvalidPayload,

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The forum answered with something we cannot use.
    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl Error {
    /// Check if this error is retryable.
    ///
    /// Capacity errors are: the caller can try again once a nonce expires.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(err) => err.is_retryable(),
            Error::Capacity(_) => true,
            _ => false,
        }
    }

    /// Suggested wait before retrying, if known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Transport(err) => err.retry_after(),
            Error::Capacity(err) => err.retry_after,
            _ => None,
        }
    }

    /// The API error behind a transport failure.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Transport(err) => err.as_api_error(),
            _ => None,
        }
    }
}

impl From<NonceStoreError> for Error {
    fn from(err: NonceStoreError) -> Self {
        match err {
            NonceStoreError::Validation(message) => Error::Validation(message),
            NonceStoreError::Capacity(err) => Error::Capacity(err),
        }
    }
}
