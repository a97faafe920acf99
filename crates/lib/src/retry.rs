//! # Bounded Retry with Exponential Backoff
//!
//! Operations report each attempt as an [`Attempt`], which separates retryable
//! failures (rate limits, transient I/O) from terminal ones. The retry loop only
//! ever re-runs the former.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Outcome of a single attempt of a retried operation.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    Retryable(E),
    Terminal(E),
}

/// Why a retried operation gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryFailure<E> {
    /// Every allowed attempt failed with a retryable error; holds the last one.
    Exhausted { attempts: u32, last: E },
    /// An attempt failed in a way that retrying cannot fix.
    Terminal(E),
}

impl<E> RetryFailure<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryFailure::Exhausted { last, .. } => last,
            RetryFailure::Terminal(e) => e,
        }
    }
}

/// Total attempt budget and backoff base. The delay doubles after every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails terminally, or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryFailure<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Terminal(e) => return Err(RetryFailure::Terminal(e)),
                Attempt::Retryable(e) => {
                    if attempt >= max_attempts {
                        return Err(RetryFailure::Exhausted { attempts: attempt, last: e });
                    }
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{label}: attempt {attempt}/{max_attempts} failed ({e}), retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
