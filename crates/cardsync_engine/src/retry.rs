//! Bounded retry with exponential backoff.

use crate::config::RetryConfig;
use crate::error::SyncResult;
use std::time::Duration;

/// Runs single remote calls, retrying transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from its configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The underlying configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calls `op` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts. The last error is returned.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> SyncResult<T>
    where
        F: FnMut() -> SyncResult<T>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    attempt += 1;
                    let delay = self.config.delay_for_attempt(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying remote call"
                    );
                    if delay > Duration::ZERO {
                        std::thread::sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::cell::Cell;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::new(attempts)
                .with_initial_delay(Duration::ZERO)
                .with_jitter(false),
        )
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = fast(3).run("list", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(SyncError::transient("503"))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: SyncResult<()> = fast(3).run("list", || {
            calls.set(calls.get() + 1);
            Err(SyncError::Timeout)
        });
        assert!(matches!(result, Err(SyncError::Timeout)));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: SyncResult<()> = fast(5).run("put", || {
            calls.set(calls.get() + 1);
            Err(SyncError::AuthenticationFailed("401".into()))
        });
        assert!(matches!(result, Err(SyncError::AuthenticationFailed(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let calls = Cell::new(0);
        let _ = fast(0).run("get", || {
            calls.set(calls.get() + 1);
            Err::<(), _>(SyncError::transient("reset"))
        });
        assert_eq!(calls.get(), 1);
    }
}
