//! The retry loop.

use super::observer::{RetryEvent, RetryObserver, TracingObserver};
use super::policy::RetryPolicy;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Metadata a successful attempt exposes to the success event.
pub trait RetryOutcome {
    /// Status code of the value, if it has one.
    fn status(&self) -> Option<u16> {
        None
    }
}

impl RetryOutcome for () {}
impl RetryOutcome for u16 {
    fn status(&self) -> Option<u16> {
        Some(*self)
    }
}

/// Metadata a failed attempt exposes to the delay computation and events.
pub trait RetryFailure: fmt::Display {
    /// Server-provided delay hint; replaces exponential backoff when present.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Status code of the failure, if it has one.
    fn status(&self) -> Option<u16> {
        None
    }
}

impl RetryFailure for std::io::Error {}

/// Runs an attempt function until it succeeds or the policy gives up.
///
/// Whether an error is worth retrying is decided by the caller's predicate,
/// never by the executor; the executor only enforces `max_retries` and
/// computes delays.
///
/// # Examples
///
/// ```rust
/// use forumlink_core::retry::{RetryExecutor, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() {
/// let policy = RetryPolicy {
///     max_retries: 3,
///     base_delay: Duration::from_millis(1),
///     ..RetryPolicy::default()
/// };
///
/// let result = RetryExecutor::new(policy)
///     .with_label("GET", "/site.json")
///     .run(
///         |attempt| async move {
///             if attempt < 2 {
///                 Err(std::io::Error::other("connection reset"))
///             } else {
///                 Ok(())
///             }
///         },
///         |_err| true,
///     )
///     .await;
/// # assert!(result.is_ok());
/// # }
/// ```
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
    method: String,
    path: String,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Executor logging through [`TracingObserver`].
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            observer: Arc::new(TracingObserver),
            method: String::new(),
            path: String::new(),
        }
    }

    /// Replace the observer.
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Method and path reported with every event.
    pub fn with_label(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = method.into();
        self.path = path.into();
        self
    }

    /// The policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` with retries.
    ///
    /// `operation` receives the 0-based attempt number. A failure is retried
    /// only while `attempt < max_retries` and `is_retryable` returns `true`;
    /// otherwise the original error is returned unchanged.
    pub async fn run<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        T: RetryOutcome,
        E: RetryFailure,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    self.emit(&RetryEvent::Succeeded {
                        method: &self.method,
                        path: &self.path,
                        attempt,
                        elapsed: started.elapsed(),
                        status: value.status(),
                    });
                    return Ok(value);
                }
                Err(err) if attempt < self.policy.max_retries && is_retryable(&err) => {
                    let delay = self.policy.delay_for(attempt, err.retry_after());
                    self.emit(&RetryEvent::Retrying {
                        method: &self.method,
                        path: &self.path,
                        attempt,
                        delay,
                        status: err.status(),
                        error: &err,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.emit(&RetryEvent::Failed {
                        method: &self.method,
                        path: &self.path,
                        attempt,
                        elapsed: started.elapsed(),
                        status: err.status(),
                        error: &err,
                    });
                    return Err(err);
                }
            }
        }
    }

    fn emit(&self, event: &RetryEvent<'_>) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.observer.on_event(event)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Transient {
        status: u16,
        retry_after: Option<Duration>,
    }

    impl fmt::Display for Transient {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "status {}", self.status)
        }
    }

    impl RetryFailure for Transient {
        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }

        fn status(&self) -> Option<u16> {
            Some(self.status)
        }
    }

    #[derive(Debug, PartialEq)]
    enum Recorded {
        Succeeded { attempt: u32, status: Option<u16> },
        Retrying { attempt: u32, delay: Duration },
        Failed { attempt: u32, status: Option<u16> },
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<Recorded>>,
    }

    impl RetryObserver for RecordingObserver {
        fn on_event(&self, event: &RetryEvent<'_>) {
            let recorded = match *event {
                RetryEvent::Succeeded {
                    attempt, status, ..
                } => Recorded::Succeeded { attempt, status },
                RetryEvent::Retrying { attempt, delay, .. } => {
                    Recorded::Retrying { attempt, delay }
                }
                RetryEvent::Failed {
                    attempt, status, ..
                } => Recorded::Failed { attempt, status },
            };
            self.events.lock().unwrap().push(recorded);
        }
    }

    struct PanickingObserver;

    impl RetryObserver for PanickingObserver {
        fn on_event(&self, _event: &RetryEvent<'_>) {
            panic!("logger is broken");
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter_ratio: 0.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = RetryExecutor::new(fast_policy(2))
            .with_observer(observer.clone())
            .with_label("GET", "/latest.json");

        let result = executor
            .run(
                |attempt| async move {
                    if attempt < 2 {
                        Err(Transient {
                            status: 503,
                            retry_after: None,
                        })
                    } else {
                        Ok(200u16)
                    }
                },
                |_err| true,
            )
            .await;

        assert_eq!(result.unwrap(), 200);
        let events = observer.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                Recorded::Retrying {
                    attempt: 0,
                    delay: Duration::from_millis(100)
                },
                Recorded::Retrying {
                    attempt: 1,
                    delay: Duration::from_millis(200)
                },
                Recorded::Succeeded {
                    attempt: 2,
                    status: Some(200)
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error_and_log_one_failure() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = RetryExecutor::new(fast_policy(2)).with_observer(observer.clone());

        let result: Result<(), Transient> = executor
            .run(
                |attempt| async move {
                    Err(Transient {
                        status: 500 + attempt as u16,
                        retry_after: None,
                    })
                },
                |_err| true,
            )
            .await;

        assert_eq!(result.unwrap_err().status, 502);
        let events = observer.events.lock().unwrap();
        let failures = events
            .iter()
            .filter(|e| matches!(e, Recorded::Failed { .. }))
            .count();
        assert_eq!(failures, 1);
        assert_eq!(
            events.last(),
            Some(&Recorded::Failed {
                attempt: 2,
                status: Some(502)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = RetryExecutor::new(fast_policy(5)).with_observer(observer.clone());
        let mut calls = 0;

        let result: Result<(), Transient> = executor
            .run(
                |_attempt| {
                    calls += 1;
                    async {
                        Err(Transient {
                            status: 400,
                            retry_after: None,
                        })
                    }
                },
                |err: &Transient| err.status != 400,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
        assert_eq!(observer.events.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_capped_at_max_delay() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = RetryExecutor::new(fast_policy(1)).with_observer(observer.clone());

        let started = Instant::now();
        let _ = executor
            .run(
                |attempt| async move {
                    if attempt == 0 {
                        Err(Transient {
                            status: 429,
                            retry_after: Some(Duration::from_millis(5_000)),
                        })
                    } else {
                        Ok(())
                    }
                },
                |_err| true,
            )
            .await;

        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(
            observer.events.lock().unwrap()[0],
            Recorded::Retrying {
                attempt: 0,
                delay: Duration::from_secs(2)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_observer_does_not_mask_result() {
        let executor = RetryExecutor::new(fast_policy(1)).with_observer(Arc::new(PanickingObserver));

        let ok: Result<u16, Transient> = executor.run(|_| async { Ok(204u16) }, |_| true).await;
        assert_eq!(tokio_test::assert_ok!(ok), 204);

        let err: Result<(), Transient> = executor
            .run(
                |_| async {
                    Err(Transient {
                        status: 404,
                        retry_after: None,
                    })
                },
                |_| false,
            )
            .await;
        assert_eq!(tokio_test::assert_err!(err).status, 404);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let executor = RetryExecutor::new(RetryPolicy::none());
        let mut calls = 0;

        let result: Result<(), std::io::Error> = executor
            .run(
                |_| {
                    calls += 1;
                    async { Err(std::io::Error::other("connection reset")) }
                },
                |_| true,
            )
            .await;

        tokio_test::assert_err!(result);
        assert_eq!(calls, 1);
    }
}
