//! Quota-aware rate limiter for Gmail API
//!
//! Gmail meters each user at 250 quota units per second. The calls an import
//! run makes cost:
//! - `messages.list` (duplicate search): 5 units
//! - `labels.list`: 1 unit
//! - `labels.create`: 5 units
//! - `messages.import`: 25 units
//!
//! Token bucket: units refill continuously at `refill_rate`, up to `max_units`
//! of burst, and callers wait when the bucket cannot cover their cost.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::RateLimitConfig;

/// Gmail API quota costs for the operations this tool performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCost {
    /// messages.list with an `rfc822msgid:` query
    Search,
    /// labels.list
    ListLabels,
    /// labels.create
    CreateLabel,
    /// messages.import
    Import,
}

impl QuotaCost {
    pub fn units(&self) -> u32 {
        match self {
            QuotaCost::Search => 5,
            QuotaCost::ListLabels => 1,
            QuotaCost::CreateLabel => 5,
            QuotaCost::Import => 25,
        }
    }
}

#[derive(Debug)]
pub struct QuotaRateLimiter {
    inner: Arc<Mutex<RateLimiterState>>,
}

#[derive(Debug)]
struct RateLimiterState {
    available_units: f64,
    max_units: f64,
    refill_rate: f64,
    last_refill: Instant,
    total_consumed: u64,
    total_operations: u64,
}

impl RateLimiterState {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.available_units = (self.available_units + elapsed * self.refill_rate).min(self.max_units);
        self.last_refill = now;
    }
}

impl QuotaRateLimiter {
    pub fn with_config(refill_rate: f64, max_units: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiterState {
                available_units: max_units,
                max_units,
                refill_rate,
                last_refill: Instant::now(),
                total_consumed: 0,
                total_operations: 0,
            })),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_config(config.quota_units_per_second, config.burst_units)
    }

    /// Acquire quota units for an operation, waiting if necessary
    pub async fn acquire(&self, cost: QuotaCost) -> QuotaPermit {
        let units_needed = cost.units() as f64;

        loop {
            let wait_time = {
                let mut state = self.inner.lock().await;
                state.refill();

                trace!(
                    "Quota state: {:.1}/{:.1} units available, requesting {:.0}",
                    state.available_units,
                    state.max_units,
                    units_needed
                );

                if state.available_units >= units_needed {
                    state.available_units -= units_needed;
                    state.total_consumed += units_needed as u64;
                    state.total_operations += 1;
                    return QuotaPermit { _private: () };
                }

                let units_deficit = units_needed - state.available_units;
                Duration::from_secs_f64(units_deficit / state.refill_rate)
            };

            // Sleep outside the lock
            debug!(
                "Quota exhausted, waiting {:.2}s for {} units",
                wait_time.as_secs_f64(),
                units_needed
            );
            tokio::time::sleep(wait_time).await;
        }
    }

    pub async fn stats(&self) -> QuotaStats {
        let state = self.inner.lock().await;
        QuotaStats {
            available_units: state.available_units as u32,
            max_units: state.max_units as u32,
            total_consumed: state.total_consumed,
            total_operations: state.total_operations,
        }
    }
}

impl Clone for QuotaRateLimiter {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Marker returned once quota has been reserved
#[derive(Debug)]
pub struct QuotaPermit {
    _private: (),
}

#[derive(Debug, Clone)]
pub struct QuotaStats {
    pub available_units: u32,
    pub max_units: u32,
    pub total_consumed: u64,
    pub total_operations: u64,
}
