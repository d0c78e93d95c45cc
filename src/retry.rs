//! Bounded retry and polling primitives.
//!
//! Implemented once and parameterized by `(attempts, interval, op)`;
//! resources never roll their own loops. Two built-in policies exist:
//! [`RetryPolicy::transient`] for retryable remote failures and
//! [`RetryPolicy::state_poll`] for asynchronous state transitions
//! (suspend/resume, promote-to-primary).
//!
//! Every loop honours the host's cancellation token between attempts; on
//! cancel it returns without a further attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ServiceError;

/// Backoff shape between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same interval between every attempt.
    Fixed,
    /// The interval doubles after each attempt.
    Exponential,
}

/// A bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub attempts: u32,
    /// Base interval between attempts.
    pub interval: Duration,
    /// Backoff shape.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// The default policy for transient remote failures: 3 × 2 s, fixed.
    pub fn transient() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(2),
            backoff: Backoff::Fixed,
        }
    }

    /// The default policy for asynchronous state transitions: 5 × 10 s,
    /// fixed.
    pub fn state_poll() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(10),
            backoff: Backoff::Fixed,
        }
    }

    /// The pause after a given zero-based attempt.
    fn pause_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential => self.interval.saturating_mul(1 << attempt.min(16)),
        }
    }
}

/// Run `op` up to `policy.attempts` times, re-attempting only after
/// retryable errors. A non-retryable error returns immediately; exhausting
/// the bound returns the last error. Cancellation between attempts returns
/// the last observed error wrapped as [`ServiceError::Cancelled`].
pub async fn retry<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut last_message = String::new();
    for attempt in 0..policy.attempts {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled(last_message));
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.attempts => {
                debug!(attempt = attempt + 1, error = %err, "retrying transient failure");
                last_message = err.message();
                if !pause(policy.pause_after(attempt), cancel).await {
                    return Err(ServiceError::Cancelled(last_message));
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(ServiceError::Transient(last_message))
}

/// Poll `probe` until it reports done, up to `policy.attempts` times.
/// Returns `Ok(true)` on convergence and `Ok(false)` when the bound is
/// exhausted without it; the caller decides whether exhaustion is a
/// warning. Probe errors propagate; cancellation returns
/// [`ServiceError::Cancelled`].
pub async fn poll_until<F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<bool, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ServiceError>>,
{
    for attempt in 0..policy.attempts {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled("polling cancelled".to_string()));
        }
        if probe().await? {
            return Ok(true);
        }
        debug!(attempt = attempt + 1, "polled state not yet converged");
        if attempt + 1 < policy.attempts && !pause(policy.pause_after(attempt), cancel).await {
            return Err(ServiceError::Cancelled("polling cancelled".to_string()));
        }
    }
    Ok(false)
}

/// Sleep for `duration`, returning false if cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
