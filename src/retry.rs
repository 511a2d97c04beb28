use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_JITTER: f64 = 0.2;

/// Returned by the executor when the surrounding work has been cancelled.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Exponential backoff with proportional jitter for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 },
        }
    }

    /// Delay before retrying after the 1-based `attempt` failed:
    /// `min(base * 2^(attempt-1) * (1 + jitter), max_delay)`.
    pub fn next_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(31) as u32;
        let delay = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_delay);
        let delay = if self.jitter > 0.0 {
            let factor = rand::rng().random_range(0.0..=self.jitter);
            delay.mul_f64(1.0 + factor)
        } else {
            delay
        };
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with an error `should_retry` rejects, or the
    /// attempts run out. The last error is returned. A cancelled token aborts before
    /// the next invocation and interrupts a pending backoff.
    pub async fn retry_async<F, Fut, T, E, P>(
        &self,
        cancel: &CancellationToken,
        should_retry: P,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: From<Cancelled> + std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled.into());
            }
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts || !should_retry(&err) {
                        return Err(err);
                    }
                    let delay = self.next_delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying after transient failure");
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(Cancelled.into()),
                            _ = sleep(delay) => {}
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_JITTER)
    }
}
