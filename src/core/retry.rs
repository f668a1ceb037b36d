//! Bounded retry of collaborator calls
//!
//! Only transient errors ([`EscrowError::is_transient`]) are retried. Business
//! rule violations are returned verbatim on the first attempt. Once attempts are
//! exhausted the call surfaces as [`EscrowError::Timeout`].

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::types::EscrowError;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one, at least 1
    pub max_attempts: u32,

    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `call` until it succeeds, fails definitively, or runs out of attempts
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, EscrowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EscrowError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Err(e) if e.is_transient() => {
                    debug!(operation, attempt, error = %e, "transient failure");
                    if attempt >= attempts {
                        return Err(EscrowError::timeout(operation));
                    }
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = fast(3)
            .run("lookup", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EscrowError::unavailable("lookup", "blip"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_surface_as_timeout() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = fast(2)
            .run("lookup", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EscrowError::unavailable("lookup", "down"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = fast(5)
            .run("lookup", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EscrowError::auth_failed("alice"))
            })
            .await;

        assert_eq!(result.unwrap_err(), EscrowError::auth_failed("alice"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        assert_eq!(fast(0).max_attempts, 1);
    }
}
