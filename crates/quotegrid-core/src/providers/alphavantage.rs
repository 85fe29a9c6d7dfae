//! Alpha Vantage adapter: last in the chain, 25 calls/day on the free
//! tier, so pacing is very conservative and it is only consulted after
//! every richer source has failed.
//!
//! Alpha Vantage signals throttling inside a 200 response as a `Note`
//! payload, so the body is inspected before the quote is trusted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::QuoteCache;
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{FetchError, ProviderId, StockRecord, Symbol};

use super::{parse_to_invalid, validation_to_invalid, ProviderCore, QuoteFeed};

const QUERY_URL: &str = "https://www.alphavantage.co/query";

pub struct AlphavantageFeed {
    core: ProviderCore,
}

impl AlphavantageFeed {
    pub fn new(policy: ProviderPolicy, cache: Arc<dyn QuoteCache>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            core: ProviderCore::new(policy, cache, http),
        }
    }

    fn quote_request(&self, symbol: &Symbol) -> HttpRequest {
        let key = self.core.policy.api_key.as_deref().unwrap_or_default();
        HttpRequest::get(format!(
            "{QUERY_URL}?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            urlencoding::encode(symbol.as_str()),
            urlencoding::encode(key)
        ))
    }

    async fn attempt(&self, symbol: &Symbol) -> Result<StockRecord, FetchError> {
        let body = self.core.issue(self.quote_request(symbol)).await?;
        let response: GlobalQuoteResponse = serde_json::from_str(&body)
            .map_err(|e| parse_to_invalid(ProviderId::Alphavantage, e))?;

        if let Some(note) = response.note.or(response.information) {
            return Err(FetchError::throttled(format!(
                "alphavantage quota note: {note}"
            )));
        }

        let quote = response
            .global_quote
            .ok_or_else(|| FetchError::invalid_data("alphavantage returned no Global Quote"))?;

        let price = parse_field(&quote.price)?;
        if price <= 0.0 {
            return Err(FetchError::invalid_data(
                "alphavantage reported a zero or absent price",
            ));
        }

        let change_pct = quote
            .change_percent
            .as_deref()
            .and_then(parse_percent)
            .unwrap_or(0.0);
        let volume = quote
            .volume
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        StockRecord::live(
            symbol.clone(),
            symbol.as_str(),
            price,
            change_pct,
            None,
            0.0,
            0.0,
            50.0,
            volume,
            "Unknown",
        )
        .map_err(validation_to_invalid)
    }
}

impl QuoteFeed for AlphavantageFeed {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
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

/// Every numeric field arrives as a string.
fn parse_field(value: &Option<String>) -> Result<f64, FetchError> {
    value
        .as_deref()
        .and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| FetchError::invalid_data("alphavantage quote field is not numeric"))
}

/// "1.2345%" -> 1.2345
fn parse_percent(text: &str) -> Option<f64> {
    text.trim().trim_end_matches('%').parse::<f64>().ok()
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price", default)]
    price: Option<String>,
    #[serde(rename = "06. volume", default)]
    volume: Option<String>,
    #[serde(rename = "10. change percent", default)]
    change_percent: Option<String>,
}
