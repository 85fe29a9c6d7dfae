//! Bounded retry loop as an explicit per-attempt state machine.
//!
//! Attempt count and the chosen backoff are explicit state rather than
//! control-flow side effects: `Throttled` failures back off exponentially
//! with jitter, `Transient` failures linearly, and everything else is
//! terminal. `InvalidData` in particular is never retried; bad data is not
//! a transient condition.

use std::future::Future;
use std::time::Duration;

use crate::provider_policy::BackoffPolicy;
use crate::FetchError;

/// Retry bookkeeping for one logical fetch.
#[derive(Debug)]
pub struct RetrySchedule<'a> {
    backoff: &'a BackoffPolicy,
    attempt: u32,
}

impl<'a> RetrySchedule<'a> {
    pub fn new(backoff: &'a BackoffPolicy) -> Self {
        Self {
            backoff,
            attempt: 0,
        }
    }

    /// Zero-based index of the attempt about to run.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Classify a failure: `Some(delay)` to sleep and retry, `None` when the
    /// error is terminal or the attempt budget is spent.
    ///
    /// With `max_retries = 3` a call runs at most 3 attempts (2 retries).
    pub fn next_delay(&mut self, error: &FetchError) -> Option<Duration> {
        if !error.retryable() {
            return None;
        }
        if self.attempt + 1 >= self.backoff.max_retries.max(1) {
            return None;
        }

        let delay = match error.kind() {
            crate::FetchErrorKind::Throttled => self.backoff.throttle_delay(self.attempt),
            _ => self.backoff.transient_delay(self.attempt),
        };
        self.attempt += 1;
        Some(delay)
    }
}

/// Drive `attempt_fn` through the retry state machine, sleeping between
/// retryable failures. Returns the last error when the budget is exhausted.
pub async fn run_with_retries<T, F, Fut>(
    backoff: &BackoffPolicy,
    mut attempt_fn: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut schedule = RetrySchedule::new(backoff);
    loop {
        match attempt_fn(schedule.attempt()).await {
            Ok(value) => return Ok(value),
            Err(error) => match schedule.next_delay(&error) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(error),
            },
        }
    }
}
