//! Marketstack adapter: end-of-day closes, keyed, tight free-tier quota.
//!
//! A single EOD request returns the trailing closes newest-first, which is
//! enough to derive the latest price, the day change, and the RSI.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::QuoteCache;
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{FetchError, ProviderId, StockRecord, Symbol};

use super::{parse_to_invalid, rsi14, validation_to_invalid, ProviderCore, QuoteFeed};

const EOD_URL: &str = "http://api.marketstack.com/v1/eod";

/// Enough history for RSI-14 plus the day-change pair.
const EOD_LIMIT: u32 = 30;

pub struct MarketstackFeed {
    core: ProviderCore,
}

impl MarketstackFeed {
    pub fn new(policy: ProviderPolicy, cache: Arc<dyn QuoteCache>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            core: ProviderCore::new(policy, cache, http),
        }
    }

    fn eod_request(&self, symbol: &Symbol) -> HttpRequest {
        let key = self.core.policy.api_key.as_deref().unwrap_or_default();
        HttpRequest::get(format!(
            "{EOD_URL}?access_key={}&symbols={}&limit={EOD_LIMIT}",
            urlencoding::encode(key),
            urlencoding::encode(symbol.as_str())
        ))
    }

    async fn attempt(&self, symbol: &Symbol) -> Result<StockRecord, FetchError> {
        let body = self.core.issue(self.eod_request(symbol)).await?;
        let response: EodResponse =
            serde_json::from_str(&body).map_err(|e| parse_to_invalid(ProviderId::Marketstack, e))?;

        if let Some(error) = response.error {
            return Err(FetchError::invalid_data(format!(
                "marketstack API error: {}",
                error.code
            )));
        }

        // Newest-first in the payload; reverse into chronological order.
        let mut closes: Vec<f64> = response.data.iter().map(|bar| bar.close).collect();
        closes.reverse();

        let latest = response
            .data
            .first()
            .ok_or_else(|| FetchError::invalid_data("marketstack returned no EOD bars"))?;

        if !latest.close.is_finite() || latest.close <= 0.0 {
            return Err(FetchError::invalid_data(
                "marketstack reported a zero or absent close",
            ));
        }

        let change_pct = match response.data.get(1) {
            Some(previous) if previous.close > 0.0 => {
                (latest.close - previous.close) / previous.close * 100.0
            }
            _ => 0.0,
        };

        StockRecord::live(
            symbol.clone(),
            symbol.as_str(),
            latest.close,
            change_pct,
            None,
            0.0,
            0.0,
            rsi14(&closes),
            latest.volume.map(|v| v.max(0.0) as u64).unwrap_or(0),
            "Unknown",
        )
        .map_err(validation_to_invalid)
    }
}

impl QuoteFeed for MarketstackFeed {
    fn id(&self) -> ProviderId {
        ProviderId::Marketstack
    }

    fn is_configured(&self) -> bool {
        self.core.policy.is_configured()
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<StockRecord, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            self.core
                .fetch_with_retries(symbol, |_| self.attempt(symbol))
                .await
        })
    }
}

#[derive(Debug, Deserialize)]
struct EodResponse {
    #[serde(default)]
    data: Vec<EodBar>,
    #[serde(default)]
    error: Option<EodError>,
}

#[derive(Debug, Deserialize)]
struct EodBar {
    #[serde(default)]
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EodError {
    #[serde(default)]
    code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryQuoteCache;
    use crate::http_client::{HttpError, HttpResponse};

    struct FixedBodyClient(String);

    impl HttpClient for FixedBodyClient {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            let body = self.0.clone();
            Box::pin(async move { Ok(HttpResponse::ok_json(body)) })
        }
    }

    fn feed(body: &str) -> MarketstackFeed {
        let mut policy = ProviderPolicy::marketstack_default().with_api_key("demo");
        policy.min_delay = std::time::Duration::ZERO;
        MarketstackFeed::new(
            policy,
            Arc::new(MemoryQuoteCache::new()),
            Arc::new(FixedBodyClient(body.to_owned())),
        )
    }

    #[tokio::test]
    async fn derives_change_from_the_last_two_closes() {
        let body = r#"{"data":[
            {"close":105.0,"volume":1200000.0},
            {"close":100.0,"volume":1100000.0}
        ]}"#;
        let record = feed(body)
            .fetch(&Symbol::parse("AAPL").expect("valid symbol"))
            .await
            .expect("valid payload");

        assert_eq!(record.price, 105.0);
        assert!((record.change_pct - 5.0).abs() < 1e-9);
        assert_eq!(record.volume, 1_200_000);
        // Too few closes for RSI, neutral default applies.
        assert_eq!(record.rsi, 50.0);
    }

    #[tokio::test]
    async fn empty_data_is_invalid() {
        let error = feed(r#"{"data":[]}"#)
            .fetch(&Symbol::parse("NOSUCH").expect("valid symbol"))
            .await
            .expect_err("no bars");
        assert_eq!(error.kind(), crate::FetchErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn api_error_object_is_invalid() {
        let body = r#"{"data":[],"error":{"code":"invalid_access_key"}}"#;
        let error = feed(body)
            .fetch(&Symbol::parse("AAPL").expect("valid symbol"))
            .await
            .expect_err("error payload");
        assert_eq!(error.kind(), crate::FetchErrorKind::InvalidData);
        assert!(error.message().contains("invalid_access_key"));
    }
}
