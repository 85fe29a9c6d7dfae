use std::env;
use std::time::Duration;

use crate::ProviderId;

/// Backoff parameters for retrying a throttled or flaky provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Initial delay for throttling backoff.
    pub base: Duration,
    /// Multiplicative factor per attempt.
    pub factor: f64,
    /// Upper bound for the uniform jitter added to each throttle delay.
    pub jitter_max: Duration,
    /// Total attempts = `max_retries`; with 3, a call is retried twice.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            factor: 2.0,
            jitter_max: Duration::from_millis(500),
            max_retries: 3,
        }
    }
}

/// Static, process-lifetime configuration for one provider.
///
/// Immutable after load. A missing API key disables the provider; it is
/// skipped by the fallback chain, never treated as an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider: ProviderId,
    pub api_key: Option<String>,
    /// Minimum interval between two calls to this provider.
    pub min_delay: Duration,
    /// How long a cached record is trusted.
    pub cache_ttl: Duration,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub backoff: BackoffPolicy,
}

impl ProviderPolicy {
    pub fn yahoo_default() -> Self {
        Self {
            provider: ProviderId::Yahoo,
            api_key: None,
            min_delay: Duration::from_millis(1_500),
            cache_ttl: Duration::from_secs(3_600),
            quota_window: Duration::from_secs(60),
            quota_limit: 30,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Finnhub free tier: 60 calls/minute, real-time quotes cached briefly.
    pub fn finnhub_default() -> Self {
        Self {
            provider: ProviderId::Finnhub,
            api_key: None,
            min_delay: Duration::from_secs(1),
            cache_ttl: Duration::from_secs(300),
            quota_window: Duration::from_secs(60),
            quota_limit: 60,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn marketstack_default() -> Self {
        Self {
            provider: ProviderId::Marketstack,
            api_key: None,
            min_delay: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(3_600),
            quota_window: Duration::from_secs(60),
            quota_limit: 5,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Alpha Vantage free tier allows 25 calls/day, so pacing is very
    /// conservative: one call per 13 seconds.
    pub fn alphavantage_default() -> Self {
        Self {
            provider: ProviderId::Alphavantage,
            api_key: None,
            min_delay: Duration::from_secs(13),
            cache_ttl: Duration::from_secs(3_600),
            quota_window: Duration::from_secs(60),
            quota_limit: 4,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn default_for(provider: ProviderId) -> Self {
        match provider {
            ProviderId::Yahoo => Self::yahoo_default(),
            ProviderId::Finnhub => Self::finnhub_default(),
            ProviderId::Marketstack => Self::marketstack_default(),
            ProviderId::Alphavantage => Self::alphavantage_default(),
        }
    }

    /// Defaults plus the API key from the environment.
    ///
    /// Reads `QUOTEGRID_<PROVIDER>_API_KEY` first, then the bare vendor
    /// variable (`FINNHUB_API_KEY`, `MARKETSTACK_API_KEY`,
    /// `ALPHA_VANTAGE_API_KEY`).
    pub fn from_env(provider: ProviderId) -> Self {
        let mut policy = Self::default_for(provider);
        policy.api_key = match provider {
            ProviderId::Yahoo => None,
            ProviderId::Finnhub => env_key("QUOTEGRID_FINNHUB_API_KEY", "FINNHUB_API_KEY"),
            ProviderId::Marketstack => {
                env_key("QUOTEGRID_MARKETSTACK_API_KEY", "MARKETSTACK_API_KEY")
            }
            ProviderId::Alphavantage => {
                env_key("QUOTEGRID_ALPHAVANTAGE_API_KEY", "ALPHA_VANTAGE_API_KEY")
            }
        };
        policy
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// A provider without a required credential is skipped, not failed.
    pub fn is_configured(&self) -> bool {
        !self.provider.requires_key() || self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

fn env_key(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary)
        .or_else(|_| env::var(fallback))
        .ok()
        .filter(|value| !value.trim().is_empty())
}
