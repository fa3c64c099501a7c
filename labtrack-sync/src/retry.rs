//! Bounded retry with exponential backoff.
//!
//! Only classified-retryable remote failures are retried (throttling and
//! transient transport errors). Workflow signals like `Conflict` and
//! `NotFound` return immediately; the synchronizer handles those itself.
//! A service-supplied retry-after is honored as a floor on the computed
//! delay.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::SyncError;

/// Backoff shape for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Relative jitter applied to each delay, `0.2` means +/-20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let exponential = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);

        let jittered = if self.jitter > 0.0 {
            let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            exponential.mul_f64(factor.max(0.0))
        } else {
            exponential
        };

        match retry_after {
            Some(floor) => jittered.max(floor),
            None => jittered,
        }
    }

    /// Run `call` until it succeeds, fails non-retryably, or attempts run
    /// out. `sleep` is injected so tests can observe delays without waiting.
    pub fn run<T>(
        &self,
        operation: &str,
        mut sleep: impl FnMut(Duration),
        mut call: impl FnMut() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let retry_after = match &err {
                        SyncError::Remote(remote) => remote.retry_after(),
                        _ => None,
                    };
                    let delay = self.delay_for(attempt, retry_after);
                    warn!(
                        "{operation}: attempt {attempt}/{attempts} failed ({err}); retrying in {delay:?}"
                    );
                    sleep(delay);
                }
                Err(SyncError::Remote(remote)) if remote.is_retryable() => {
                    return Err(SyncError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts,
                        source: remote,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("loop returns on the final attempt");
    }

    /// `run` with real sleeping.
    pub fn run_blocking<T>(
        &self,
        operation: &str,
        call: impl FnMut() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        self.run(operation, std::thread::sleep, call)
    }
}
