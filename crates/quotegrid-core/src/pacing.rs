//! Per-provider rate limiting: a pacing gate enforcing a minimum
//! inter-call interval, layered over a quota window check.
//!
//! The pacing gate's "last call" timestamp is the one piece of mutable
//! shared state that must be synchronized explicitly; it is shared by all
//! tasks, across all batches, for the process lifetime.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

use crate::provider_policy::{BackoffPolicy, ProviderPolicy};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

impl BackoffPolicy {
    /// Exponential backoff with uniform jitter for throttling errors:
    /// `base * factor^attempt + uniform(0, jitter_max)`.
    pub fn throttle_delay(&self, attempt: u32) -> Duration {
        let scale = self.factor.powi(attempt as i32);
        let seconds = self.base.as_secs_f64() * scale;
        let jitter_ms = if self.jitter_max.is_zero() {
            0
        } else {
            fastrand::u64(0..=self.jitter_max.as_millis() as u64)
        };
        Duration::from_secs_f64(seconds) + Duration::from_millis(jitter_ms)
    }

    /// Shorter linear backoff for transient network errors.
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt) + 1)
    }
}

/// Mutex-guarded "last call" gate: before any call, block until
/// `now - last_call >= min_delay`, then record `now`.
#[derive(Debug)]
pub struct PacingGate {
    min_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl PacingGate {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until the minimum inter-call interval has elapsed, then claim
    /// the slot. Safe under concurrent callers: each loop iteration
    /// re-checks after sleeping, so two waiters cannot claim the same slot.
    pub async fn wait(&self) {
        loop {
            let sleep_for = {
                let mut last = self
                    .last_call
                    .lock()
                    .expect("pacing gate lock is not poisoned");
                let now = Instant::now();
                match *last {
                    Some(prev) if now.duration_since(prev) < self.min_delay => {
                        self.min_delay - now.duration_since(prev)
                    }
                    _ => {
                        *last = Some(now);
                        return;
                    }
                }
            };
            tokio::time::sleep(sleep_for).await;
        }
    }
}

/// Pacing plus quota budget for one provider, shared across all concurrent
/// callers of that provider.
pub struct RateGate {
    pacing: PacingGate,
    quota: Arc<DirectRateLimiter>,
    backoff: BackoffPolicy,
}

impl RateGate {
    pub fn new(
        min_delay: Duration,
        quota_window: Duration,
        quota_limit: u32,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            pacing: PacingGate::new(min_delay),
            quota: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
            backoff,
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(
            policy.min_delay,
            policy.quota_window,
            policy.quota_limit,
            policy.backoff.clone(),
        )
    }

    /// Block for pacing, then check the quota window. When the window is
    /// exhausted the recommended retry delay is returned and the caller
    /// should surface a throttling error.
    pub async fn acquire(&self) -> Result<(), Duration> {
        self.pacing.wait().await;

        if self.quota.check().is_ok() {
            return Ok(());
        }

        Err(self.backoff.throttle_delay(0))
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).expect("safe limit must be non-zero");

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_delay_grows_exponentially() {
        let backoff = BackoffPolicy {
            base: Duration::from_secs(2),
            factor: 2.0,
            jitter_max: Duration::ZERO,
            max_retries: 3,
        };

        assert_eq!(backoff.throttle_delay(0), Duration::from_secs(2));
        assert_eq!(backoff.throttle_delay(1), Duration::from_secs(4));
        assert_eq!(backoff.throttle_delay(2), Duration::from_secs(8));
    }

    #[test]
    fn throttle_jitter_stays_within_bound() {
        let backoff = BackoffPolicy {
            base: Duration::from_secs(1),
            factor: 2.0,
            jitter_max: Duration::from_millis(500),
            max_retries: 3,
        };

        for _ in 0..50 {
            let delay = backoff.throttle_delay(0);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1_500));
        }
    }

    #[test]
    fn transient_delay_is_linear() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.transient_delay(0), Duration::from_secs(1));
        assert_eq!(backoff.transient_delay(1), Duration::from_secs(2));
        assert_eq!(backoff.transient_delay(2), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_gate_separates_sequential_calls() {
        let gate = PacingGate::new(Duration::from_millis(1_500));

        let start = Instant::now();
        gate.wait().await;
        let first = Instant::now();
        gate.wait().await;
        let second = Instant::now();

        assert!(first.duration_since(start) < Duration::from_millis(10));
        assert!(second.duration_since(first) >= Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_gate_separates_concurrent_callers() {
        let gate = Arc::new(PacingGate::new(Duration::from_millis(200)));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.wait().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.expect("pacing task completes"));
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_gate_reports_exhausted_quota() {
        let gate = RateGate::new(
            Duration::ZERO,
            Duration::from_secs(60),
            2,
            BackoffPolicy {
                base: Duration::from_secs(1),
                factor: 2.0,
                jitter_max: Duration::ZERO,
                max_retries: 3,
            },
        );

        assert!(gate.acquire().await.is_ok());
        assert!(gate.acquire().await.is_ok());
        let delay = gate.acquire().await.expect_err("quota should be spent");
        assert_eq!(delay, Duration::from_secs(1));
    }
}
