//! Provider adapters: each one normalizes a single upstream source into
//! the canonical record.
//!
//! An adapter never lets an upstream condition escape as anything other
//! than a `FetchError`; transport failures, malformed JSON, and missing
//! fields are all caught at this boundary. Each adapter owns its own rate
//! gate and consults the cache before touching the network.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{QuoteCache, KIND_QUOTE};
use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::pacing::RateGate;
use crate::provider_policy::ProviderPolicy;
use crate::retrying::run_with_retries;
use crate::{FetchError, ProviderId, StockRecord, Symbol, ValidationError};

mod alphavantage;
mod finnhub;
mod marketstack;
mod yahoo;

pub use alphavantage::AlphavantageFeed;
pub use finnhub::FinnhubFeed;
pub use marketstack::MarketstackFeed;
pub use yahoo::YahooFeed;

/// One upstream quote source.
pub trait QuoteFeed: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Whether the required credential is present. Unconfigured feeds are
    /// skipped by the fallback chain, never treated as failures.
    fn is_configured(&self) -> bool;

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<StockRecord, FetchError>> + Send + 'a>>;
}

/// Shared plumbing for every adapter: policy, rate gate, cache, transport.
pub(crate) struct ProviderCore {
    pub policy: ProviderPolicy,
    pub gate: RateGate,
    pub cache: Arc<dyn QuoteCache>,
    pub http: Arc<dyn HttpClient>,
}

impl ProviderCore {
    pub fn new(policy: ProviderPolicy, cache: Arc<dyn QuoteCache>, http: Arc<dyn HttpClient>) -> Self {
        let gate = RateGate::from_policy(&policy);
        Self {
            policy,
            gate,
            cache,
            http,
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.policy.provider
    }

    /// Fresh cached record for this provider, if any.
    pub async fn cached(&self, symbol: &Symbol) -> Option<StockRecord> {
        let hit = self
            .cache
            .get(self.provider(), symbol, KIND_QUOTE, self.policy.cache_ttl)
            .await;
        if hit.is_some() {
            debug!(provider = %self.provider(), symbol = %symbol, "serving cached record");
        }
        hit
    }

    /// Store a freshly normalized record. Failures are never cached.
    pub async fn store(&self, symbol: &Symbol, record: &StockRecord) {
        if record.success {
            self.cache
                .put(self.provider(), symbol, KIND_QUOTE, record)
                .await;
        }
    }

    /// Rate-gated single request: pacing wait, quota check, transport call,
    /// status classification. Returns the body on 2xx.
    pub async fn issue(&self, request: HttpRequest) -> Result<String, FetchError> {
        if let Err(retry_after) = self.gate.acquire().await {
            return Err(FetchError::throttled(format!(
                "{} quota window exhausted, retry in {:.1}s",
                self.provider(),
                retry_after.as_secs_f64()
            )));
        }

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|error| classify_transport(self.provider(), &error))?;

        classify_status(self.provider(), &response)?;
        Ok(response.body)
    }

    /// Drive a single-attempt closure through the retry schedule, then
    /// cache the result on success.
    pub async fn fetch_with_retries<F, Fut>(
        &self,
        symbol: &Symbol,
        attempt_fn: F,
    ) -> Result<StockRecord, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<StockRecord, FetchError>>,
    {
        if !self.policy.is_configured() {
            return Err(FetchError::unconfigured(format!(
                "{} API key not set",
                self.provider()
            )));
        }

        if let Some(hit) = self.cached(symbol).await {
            return Ok(hit);
        }

        let record = run_with_retries(&self.policy.backoff, attempt_fn).await?;
        self.store(symbol, &record).await;
        Ok(record)
    }
}

fn classify_transport(provider: ProviderId, error: &HttpError) -> FetchError {
    if error.timed_out() {
        FetchError::transient(format!("{provider} request timed out: {}", error.message()))
    } else {
        FetchError::transient(format!("{provider} transport error: {}", error.message()))
    }
}

/// Map a non-2xx response onto the error taxonomy. 429 and vendor
/// throttling phrases are retryable with backoff; 5xx is a transient
/// upstream fault; remaining 4xx responses are not worth retrying.
fn classify_status(provider: ProviderId, response: &HttpResponse) -> Result<(), FetchError> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 429 || is_throttling_body(&response.body) {
        return Err(FetchError::throttled(format!(
            "{provider} returned status {}",
            response.status
        )));
    }
    if response.status >= 500 {
        return Err(FetchError::transient(format!(
            "{provider} returned status {}",
            response.status
        )));
    }
    Err(FetchError::invalid_data(format!(
        "{provider} returned status {}",
        response.status
    )))
}

/// Vendor throttling signatures that arrive without a 429 status.
pub(crate) fn is_throttling_body(body: &str) -> bool {
    ["Rate", "rate limit", "Too Many", "call frequency", "limit"]
        .iter()
        .any(|needle| body.contains(needle))
}

pub(crate) fn validation_to_invalid(error: ValidationError) -> FetchError {
    FetchError::invalid_data(error.to_string())
}

pub(crate) fn parse_to_invalid(provider: ProviderId, error: serde_json::Error) -> FetchError {
    FetchError::invalid_data(format!("{provider} payload unparsable: {error}"))
}

/// 14-period RSI from trailing closes using rolling mean gains/losses.
/// Falls back to the neutral 50.0 when the history is too short.
pub fn rsi14(closes: &[f64]) -> f64 {
    const PERIOD: usize = 14;
    if closes.len() <= PERIOD {
        return 50.0;
    }

    let window = &closes[closes.len() - PERIOD - 1..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let avg_gain = gains / PERIOD as f64;
    let avg_loss = losses / PERIOD as f64;
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);
    if rsi.is_finite() {
        rsi
    } else {
        50.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_defaults_to_neutral_on_short_history() {
        assert_eq!(rsi14(&[]), 50.0);
        assert_eq!(rsi14(&[100.0; 14]), 50.0);
    }

    #[test]
    fn rsi_is_high_for_monotonic_gains() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + f64::from(i)).collect();
        assert_eq!(rsi14(&closes), 100.0);
    }

    #[test]
    fn rsi_is_low_for_monotonic_losses() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - f64::from(i)).collect();
        assert!(rsi14(&closes) < 1.0);
    }

    #[test]
    fn rsi_is_balanced_for_alternating_moves() {
        let mut closes = vec![100.0];
        for i in 1..30 {
            let last = closes[i - 1];
            closes.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let rsi = rsi14(&closes);
        assert!((40.0..=60.0).contains(&rsi), "rsi was {rsi}");
    }

    #[test]
    fn throttling_bodies_are_recognized() {
        assert!(is_throttling_body("Too Many Requests"));
        assert!(is_throttling_body(
            "{\"Note\": \"API call frequency is 5 calls per minute\"}"
        ));
        assert!(!is_throttling_body("{\"c\": 190.5}"));
    }

    #[test]
    fn status_classification_follows_the_taxonomy() {
        let throttled = HttpResponse::with_status(429, "");
        let upstream = HttpResponse::with_status(502, "bad gateway");
        let rejected = HttpResponse::with_status(404, "no such symbol");

        assert_eq!(
            classify_status(ProviderId::Finnhub, &throttled)
                .unwrap_err()
                .kind(),
            crate::FetchErrorKind::Throttled
        );
        assert_eq!(
            classify_status(ProviderId::Finnhub, &upstream)
                .unwrap_err()
                .kind(),
            crate::FetchErrorKind::Transient
        );
        assert_eq!(
            classify_status(ProviderId::Finnhub, &rejected)
                .unwrap_err()
                .kind(),
            crate::FetchErrorKind::InvalidData
        );
    }
}
