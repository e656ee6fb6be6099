//! Bounded retry for transient store contention.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use stockledger_core::{StockError, StockResult};

use crate::store::StoreError;

/// How many times a busy store operation is re-run, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Calculate delay for a given retry number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op`, re-running it while the store reports `Busy`.
    ///
    /// Every other error is final. Once retries are exhausted the caller gets
    /// `StockError::StoreBusy` carrying the total number of tries.
    pub fn run<T, F>(&self, operation: &'static str, mut op: F) -> StockResult<T>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let mut retries = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(StoreError::Busy(reason)) if retries < self.max_attempts => {
                    retries += 1;
                    let delay = self.delay_for_attempt(retries);
                    debug!(operation, retry = retries, delay_ms = delay.as_millis() as u64, %reason, "store busy, retrying");
                    thread::sleep(delay);
                }
                Err(StoreError::Busy(reason)) => {
                    let attempts = retries + 1;
                    warn!(operation, attempts, %reason, "store still busy, giving up");
                    return Err(StockError::StoreBusy { attempts });
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::exponential(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn delay_doubles_up_to_cap() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(50), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(300));
    }

    #[test]
    fn busy_then_success_is_retried() {
        let calls = Cell::new(0);
        let result = quick(3).run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(StoreError::Busy("locked".into()))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhausted_retries_report_total_attempts() {
        let calls = Cell::new(0);
        let result: StockResult<()> = quick(2).run("test", || {
            calls.set(calls.get() + 1);
            Err(StoreError::Busy("locked".into()))
        });

        assert_eq!(result, Err(StockError::StoreBusy { attempts: 3 }));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: StockResult<()> = quick(5).run("test", || {
            calls.set(calls.get() + 1);
            Err(StoreError::UniqueViolation("10001".into()))
        });

        assert_eq!(result, Err(StockError::DuplicateCode("10001".into())));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn no_retry_fails_on_first_busy() {
        let result: StockResult<()> = RetryPolicy::no_retry().run("test", || Err(StoreError::Busy("x".into())));
        assert_eq!(result, Err(StockError::StoreBusy { attempts: 1 }));
    }
}
