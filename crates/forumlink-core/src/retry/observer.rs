//! Attempt events and the observers that receive them.

use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// One attempt outcome reported by the [`RetryExecutor`](super::RetryExecutor).
#[derive(Clone, Copy)]
pub enum RetryEvent<'a> {
    /// An attempt succeeded and its value is being returned.
    Succeeded {
        /// HTTP method or operation kind.
        method: &'a str,
        /// Request path or operation name.
        path: &'a str,
        /// 0-based attempt that succeeded.
        attempt: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
        /// Status reported by the value, when it has one.
        status: Option<u16>,
    },
    /// An attempt failed and another one is scheduled.
    Retrying {
        /// HTTP method or operation kind.
        method: &'a str,
        /// Request path or operation name.
        path: &'a str,
        /// 0-based attempt that failed.
        attempt: u32,
        /// Sleep before the next attempt.
        delay: Duration,
        /// Status reported by the error, when it has one.
        status: Option<u16>,
        /// The failure.
        error: &'a dyn fmt::Display,
    },
    /// An attempt failed and the error is being returned to the caller.
    Failed {
        /// HTTP method or operation kind.
        method: &'a str,
        /// Request path or operation name.
        path: &'a str,
        /// 0-based attempt that failed.
        attempt: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
        /// Status reported by the error, when it has one.
        status: Option<u16>,
        /// The failure.
        error: &'a dyn fmt::Display,
    },
}

/// Receives every attempt outcome.
///
/// Observers must not block. A panicking observer is contained by the
/// executor and never replaces the attempt's own result.
pub trait RetryObserver: Send + Sync {
    /// Called once per attempt outcome.
    fn on_event(&self, event: &RetryEvent<'_>);
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RetryObserver for NoopObserver {
    fn on_event(&self, _event: &RetryEvent<'_>) {}
}

/// Observer that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_event(&self, event: &RetryEvent<'_>) {
        match *event {
            RetryEvent::Succeeded {
                method,
                path,
                attempt,
                elapsed,
                status,
            } => info!(
                method = %method,
                path = %path,
                status = status,
                attempt = attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "HTTP request succeeded"
            ),
            RetryEvent::Retrying {
                method,
                path,
                attempt,
                delay,
                status,
                error,
            } => warn!(
                method = %method,
                path = %path,
                status = status,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "HTTP request failed, retrying"
            ),
            RetryEvent::Failed {
                method,
                path,
                attempt,
                elapsed,
                status,
                error,
            } => warn!(
                method = %method,
                path = %path,
                status = status,
                attempt = attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %error,
                "HTTP request failed"
            ),
        }
    }
}
