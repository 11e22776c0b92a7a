//! Bounded exponential backoff for Gmail calls
//!
//! Transient errors (rate limit, quota, 5xx, network) are retried until
//! `max_attempts` calls have been made; everything else returns on first
//! occurrence. Once the attached cancellation token fires, no further attempt
//! is made and the last error is returned.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    cancel: CancellationToken,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop retrying as soon as `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff(),
            config.max_backoff(),
        )
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.1)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut schedule = self.schedule();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempts < self.max_attempts => {
                    if self.cancel.is_cancelled() {
                        debug!("{} not retried: run cancelled", operation_name);
                        return Err(e);
                    }

                    let computed = schedule.next_backoff().unwrap_or(self.max_delay);
                    // Server-provided Retry-After wins, capped like everything else
                    let delay = e
                        .retry_after()
                        .map_or(computed, |hint| hint.max(computed))
                        .min(self.max_delay);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, self.max_attempts, e, delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            debug!("{} retry abandoned: run cancelled", operation_name);
                            return Err(e);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
