#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core abstractions for the forumlink crates.
//!
//! This crate holds the pieces of the outbound-call pipeline that do not
//! depend on HTTP:
//!
//! - **Retry policies** (`RetryPolicy`) and the resolver that merges
//!   default/read/write overrides field by field (`RetryPolicies`)
//! - **The retry executor** (`RetryExecutor`) that runs an attempt function,
//!   classifies failures with a caller-supplied predicate and backs off
//! - **Retry observers** (`RetryObserver`) that receive one event per
//!   attempt outcome; the default observer logs through `tracing`
//!
//! # Examples
//!
//! ```rust
//! use forumlink_core::prelude::*;
//! # async fn example() {
//! let policy = RetryPolicy::default().apply(&RetryOverrides::new().max_retries(3));
//!
//! let status: Result<u16, std::io::Error> = RetryExecutor::new(policy)
//!     .with_label("GET", "/latest.json")
//!     .run(|_attempt| async { Ok(200) }, |_err| true)
//!     .await;
//! # assert_eq!(status.unwrap(), 200);
//! # }
//! ```

pub mod retry;

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use forumlink_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::retry::{
        NoopObserver, RetryClass, RetryEvent, RetryExecutor, RetryFailure, RetryObserver,
        RetryOutcome, RetryOverrides, RetryPolicies, RetryPolicy, TracingObserver,
    };
}
