//! Retry policies, policy resolution and the retry executor.
//!
//! # Key Types
//!
//! - [`RetryPolicy`] - concrete numbers for one call (max retries, backoff shape)
//! - [`RetryPolicies`] - the `default`/`reads`/`writes` override sets
//! - [`RetryExecutor`] - runs an attempt function until success or give-up
//! - [`RetryObserver`] - receives success/retry/failure events
//!
//! # Examples
//!
//! ```rust
//! use forumlink_core::retry::{RetryClass, RetryOverrides, RetryPolicies};
//!
//! let policies = RetryPolicies {
//!     writes: RetryOverrides::new().max_retries(0),
//!     ..Default::default()
//! };
//!
//! assert_eq!(policies.resolve(RetryClass::Writes).max_retries, 0);
//! assert_eq!(policies.resolve(RetryClass::Reads).max_retries, 2);
//! ```

mod executor;
mod observer;
mod policy;

pub use executor::{RetryExecutor, RetryFailure, RetryOutcome};
pub use observer::{NoopObserver, RetryEvent, RetryObserver, TracingObserver};
pub use policy::{RetryClass, RetryOverrides, RetryPolicies, RetryPolicy};
