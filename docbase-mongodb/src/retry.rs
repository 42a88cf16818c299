//! Bounded retry of idempotent reads.
//!
//! Only reads go through [`with_retry`]. Writes are never retried: a `put` whose outcome is
//! unknown must surface to the caller instead of being replayed.

use std::{fmt::Display, future::Future, time::Duration};

use docbase_core::error::{ContentError, ContentResult};
use mongodb::error::{Error as MongoError, ErrorKind};
use tracing::warn;

/// How many times a read is attempted, and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// A policy that makes exactly one attempt.
    pub fn never() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

/// Returns `true` for connection-level failures that a fresh attempt may not hit.
pub(crate) fn is_transient(err: &MongoError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. }
    )
}

/// Runs `call` until it succeeds, fails permanently, or the policy's attempts are spent.
///
/// Every failure that escapes is reported as [`ContentError::BackendUnavailable`].
pub(crate) async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    is_transient: impl Fn(&E) -> bool,
    mut call: F,
) -> ContentResult<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_transient(&err) => {
                warn!(operation, attempt, error = %err, "transient backend failure, retrying");
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(ContentError::BackendUnavailable(format!("{operation}: {err}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fmt,
        sync::atomic::{AtomicU32, Ordering},
    };

    #[derive(Debug)]
    struct FakeError {
        transient: bool,
    }

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(if self.transient { "reset" } else { "denied" })
        }
    }

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn gives_up_after_the_bound() {
        let calls = AtomicU32::new(0);

        let result: ContentResult<()> = with_retry(&quick(3), "get", |e: &FakeError| e.transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError { transient: true }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ContentError::BackendUnavailable(ref msg)) if msg == "get: reset"));
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: ContentResult<()> = with_retry(&quick(3), "get", |e: &FakeError| e.transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError { transient: false }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn recovers_after_a_transient_failure() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&quick(3), "get", |e: &FakeError| e.transient, || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(FakeError { transient: true })
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);

        let _ = with_retry(&quick(0), "get", |_: &FakeError| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(FakeError { transient: true }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classifies_driver_errors() {
        assert!(is_transient(&MongoError::from(std::io::ErrorKind::ConnectionReset)));
        assert!(!is_transient(&MongoError::custom("not a connection problem")));
    }
}
