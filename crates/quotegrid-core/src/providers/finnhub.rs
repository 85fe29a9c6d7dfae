//! Finnhub adapter: real-time quote endpoint, keyed, short cache TTL.
//!
//! The quote payload carries price and day-change only; fundamentals stay
//! at their defaults and the record leans on the richer tiers for those.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::QuoteCache;
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{FetchError, ProviderId, StockRecord, Symbol};

use super::{parse_to_invalid, validation_to_invalid, ProviderCore, QuoteFeed};

const QUOTE_URL: &str = "https://finnhub.io/api/v1/quote";

pub struct FinnhubFeed {
    core: ProviderCore,
}

impl FinnhubFeed {
    pub fn new(policy: ProviderPolicy, cache: Arc<dyn QuoteCache>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            core: ProviderCore::new(policy, cache, http),
        }
    }

    fn quote_request(&self, symbol: &Symbol) -> HttpRequest {
        let url = format!(
            "{QUOTE_URL}?symbol={}",
            urlencoding::encode(symbol.as_str())
        );
        let token = self.core.policy.api_key.clone().unwrap_or_default();
        HttpRequest::get(url).with_header("x-finnhub-token", token)
    }

    async fn attempt(&self, symbol: &Symbol) -> Result<StockRecord, FetchError> {
        let body = self.core.issue(self.quote_request(symbol)).await?;
        let quote: FinnhubQuote =
            serde_json::from_str(&body).map_err(|e| parse_to_invalid(ProviderId::Finnhub, e))?;

        // Finnhub answers unknown symbols with an all-zero quote.
        let price = quote.current;
        if !price.is_finite() || price <= 0.0 {
            return Err(FetchError::invalid_data(
                "finnhub reported a zero or absent price",
            ));
        }

        StockRecord::live(
            symbol.clone(),
            symbol.as_str(),
            price,
            quote.percent_change.unwrap_or(0.0),
            None,
            0.0,
            0.0,
            50.0,
            0,
            "Unknown",
        )
        .map_err(validation_to_invalid)
    }
}

impl QuoteFeed for FinnhubFeed {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
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
struct FinnhubQuote {
    #[serde(rename = "c", default)]
    current: f64,
    #[serde(rename = "dp", default)]
    percent_change: Option<f64>,
}
