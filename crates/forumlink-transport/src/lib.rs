#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Resilient HTTP transport for forum REST APIs.
//!
//! Every outbound call goes through [`HttpTransport::fetch`]:
//!
//! 1. [`RequestOptions`] are turned into a [`PreparedRequest`] once (URL
//!    resolution, default headers, system or per-user credentials, body
//!    serialization)
//! 2. the retry policy is resolved from the method class and the per-call
//!    override
//! 3. each attempt sends the request under a request timeout and reads the
//!    body under an independent read timeout
//! 4. non-2xx responses become an [`ApiError`] carrying status, a body
//!    snippet, `Retry-After` and `x-request-id`
//!
//! # Example
//!
//! ```rust,no_run
//! use forumlink_transport::{HttpTransport, RequestOptions, TransportConfig};
//!
//! # async fn example() -> forumlink_transport::Result<()> {
//! let config = TransportConfig::builder("https://forum.example.com").build()?;
//! let transport = HttpTransport::new(config)?;
//!
//! let latest: serde_json::Value = transport
//!     .fetch_json("/latest.json", RequestOptions::get())
//!     .await?;
//! # let _ = latest;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod observability;

pub use config::{TransportConfig, TransportConfigBuilder};
pub use error::{ApiError, ApiErrorKind, Result, TRANSIENT_STATUSES, TimeoutPhase, TransportError};
pub use http::{
    AcceptHeader, HttpTransport, PreparedRequest, RequestBody, RequestOptions, Response,
    ResponseBody, Transport, fetch_json,
};

/// Re-exported so callers can build per-user credentials without a direct
/// `secrecy` dependency.
pub use secrecy::{ExposeSecret, SecretString};
