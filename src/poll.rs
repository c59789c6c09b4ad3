//! Condition polling and retry primitives.
//!
//! Everything that waits on the outside world goes through here:
//! - [`wait_for_condition`]: poll a predicate until it holds or a timeout elapses
//! - [`retry_on_exception`]: linear-backoff retry of a fallible operation
//! - [`RetryPolicy`]: exponential-backoff retry used by the node client

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of a single predicate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The condition holds.
    Ready,
    /// The condition does not hold yet.
    NotReady,
    /// The predicate could not be evaluated (e.g. the service is not reachable
    /// yet). Treated as [`Probe::NotReady`] by the poller.
    TransientError(String),
}

impl Probe {
    /// Fold a fallible boolean check into a probe.
    pub fn from_result<E: fmt::Display>(result: Result<bool, E>) -> Self {
        match result {
            Ok(ready) => Self::from(ready),
            Err(e) => Self::TransientError(e.to_string()),
        }
    }

    /// Whether this probe satisfies the wait.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl From<bool> for Probe {
    fn from(ready: bool) -> Self {
        if ready {
            Self::Ready
        } else {
            Self::NotReady
        }
    }
}

/// Poll `predicate` every `interval` until it reports [`Probe::Ready`] or
/// `timeout` elapses.
///
/// The predicate is always evaluated at least once. No evaluation starts after
/// the deadline, and a single evaluation is cut off after
/// `max(remaining, interval)`, so the call returns at most one interval past
/// `timeout`. Returns `false` on timeout rather than an error.
pub async fn wait_for_condition<F, Fut>(
    description: &str,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let budget = deadline.saturating_duration_since(Instant::now()).max(interval);
        let probe = tokio::time::timeout(budget, predicate())
            .await
            .unwrap_or_else(|_| {
                Probe::TransientError(format!("evaluation exceeded {}ms", budget.as_millis()))
            });

        match probe {
            Probe::Ready => {
                info!("Condition met: {} (attempt {})", description, attempt);
                return true;
            }
            Probe::NotReady => {}
            Probe::TransientError(e) => {
                debug!("Error checking condition '{}': {}", description, e);
            }
        }

        if Instant::now() + interval >= deadline {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    error!(
        "Timeout waiting for condition: {} ({} attempts)",
        description, attempt
    );
    false
}

/// [`wait_for_condition`] for predicates returning `Result<bool, E>`; errors
/// count as "not yet".
pub async fn wait_until<F, Fut, E>(
    description: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: fmt::Display,
{
    wait_for_condition(description, timeout, interval, || {
        let fut = check();
        async move { Probe::from_result(fut.await) }
    })
    .await
}

/// Invoke `operation` up to `max_attempts` times.
///
/// A failure accepted by `is_retryable` sleeps `base_delay * attempt` before
/// the next attempt. The last attempt's error, or the first non-retryable
/// error, is returned unchanged.
///
/// # Errors
///
/// Returns the operation's error as described above.
pub async fn retry_on_exception<T, E, F, Fut, R>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                warn!("Attempt {} failed: {}. Retrying...", attempt, e);
                tokio::time::sleep(base_delay * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff retry policy.
///
/// The delay after failed attempt `n` (1-based) is
/// `unit * multiplier * 2^(n-1)` clamped to `[min_delay, max_delay]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Scale applied to the exponential term.
    pub multiplier: u32,
    /// Time unit of the exponential term.
    pub unit: Duration,
    /// Lower bound for any delay.
    pub min_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy for a node reporting its own identity: 3 attempts, 2s..10s.
    #[must_use]
    pub const fn node_info() -> Self {
        Self {
            max_attempts: 3,
            multiplier: 1,
            unit: Duration::from_secs(1),
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }

    /// Policy for peer listing, which converges slowly: 10 attempts, 5s..30s.
    #[must_use]
    pub const fn peers() -> Self {
        Self {
            max_attempts: 10,
            multiplier: 2,
            unit: Duration::from_secs(1),
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Single attempt, no retry.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            multiplier: 1,
            unit: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to sleep after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.unit
            .saturating_mul(self.multiplier.saturating_mul(exp))
            .max(self.min_delay)
            .min(self.max_delay)
    }

    /// Run `operation`, retrying every error until attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub async fn run<T, E, F, Fut>(&self, description: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        description, attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "{} failed after {} attempts: {}",
                        description, max_attempts, e
                    );
                    return Err(e);
                }
            }
        }
    }
}
