//! Bounded retry with fixed or exponential backoff.

use crate::config::RetryConfig;
use crate::error::{RemoteResult, SessionError, SessionResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Longest uninterrupted sleep while a cancel token is attached.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Acquisition progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireState {
    /// Nothing attempted yet.
    Idle,
    /// Remote calls in flight or backing off.
    Attempting,
    /// A handle was obtained.
    Acquired,
    /// Attempts ran out, or a non-retryable error or cancellation ended them.
    Exhausted,
}

impl AcquireState {
    /// Returns true for `Acquired` and `Exhausted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AcquireState::Acquired | AcquireState::Exhausted)
    }
}

/// Shared flag that stops retry loops between attempts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs a remote call under a [`RetryConfig`].
///
/// The one wrapper every session RPC goes through. A retryable failure waits
/// and tries again until attempts run out; a non-retryable failure ends the
/// loop at once. Either way the last error is surfaced as
/// `SessionUnavailable`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    cancel: Option<CancelToken>,
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Attaches a cancel token, checked before each attempt and during waits.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calls `call` until it succeeds or the policy gives up.
    pub fn run<T, F>(&self, operation: &str, mut call: F) -> SessionResult<T>
    where
        F: FnMut() -> RemoteResult<T>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            self.check_cancelled()?;

            let err = match call() {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempts = attempt + 1, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let made = attempt + 1;
            if !err.is_retryable() {
                warn!(operation, attempt = made, error = %err, "remote call failed and is not retryable");
                return Err(SessionError::unavailable(operation, made, err));
            }
            if made >= max_attempts {
                error!(operation, attempts = made, error = %err, "remote call failed, attempts exhausted");
                return Err(SessionError::unavailable(operation, made, err));
            }

            let delay = self.config.delay_for_attempt(attempt);
            warn!(
                operation,
                attempt = made,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "remote call failed, retrying"
            );
            self.sleep(delay)?;
            attempt = made;
        }
    }

    fn check_cancelled(&self) -> SessionResult<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(SessionError::Cancelled),
            _ => Ok(()),
        }
    }

    fn sleep(&self, delay: Duration) -> SessionResult<()> {
        let Some(token) = &self.cancel else {
            std::thread::sleep(delay);
            return Ok(());
        };

        let deadline = Instant::now() + delay;
        loop {
            if token.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
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
    use crate::error::RemoteError;
    use std::cell::Cell;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::new(attempts)
                .with_interval(Duration::from_millis(1))
                .with_exponential(false),
        )
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = fast(3).run("create session", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(RemoteError::Transient("flaky".into()))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhaustion_calls_exactly_max_attempts() {
        let calls = Cell::new(0);
        let result: SessionResult<()> = fast(4).run("create session", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::Timeout)
        });
        match result {
            Err(SessionError::SessionUnavailable {
                attempts, source, ..
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source, RemoteError::Timeout);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn non_retryable_stops_immediately() {
        let calls = Cell::new(0);
        let result: SessionResult<()> = fast(5).run("get session", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::Unauthorized("bad key".into()))
        });
        assert!(matches!(
            result,
            Err(SessionError::SessionUnavailable { attempts: 1, .. })
        ));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let calls = Cell::new(0);
        let result: SessionResult<()> = fast(0).run("get session", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::Timeout)
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cancelled_token_prevents_any_call() {
        let token = CancelToken::new();
        token.cancel();
        let calls = Cell::new(0);
        let result: SessionResult<()> = fast(3).with_cancel(token).run("create session", || {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn cancel_during_backoff_interrupts_wait() {
        let token = CancelToken::new();
        let policy = RetryPolicy::new(RetryConfig::new(3).with_interval(Duration::from_secs(30)))
            .with_cancel(token.clone());

        let started = Instant::now();
        let result: SessionResult<()> = policy.run("create session", || {
            token.cancel();
            Err(RemoteError::Timeout)
        });
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn terminal_states() {
        assert!(AcquireState::Acquired.is_terminal());
        assert!(AcquireState::Exhausted.is_terminal());
        assert!(!AcquireState::Attempting.is_terminal());
        assert!(!AcquireState::Idle.is_terminal());
    }
}
