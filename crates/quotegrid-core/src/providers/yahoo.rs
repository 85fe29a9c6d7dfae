//! Yahoo Finance adapter: the richest free source, first in the fallback
//! order. One quoteSummary call for the quote and fundamentals, plus a
//! best-effort chart call for the RSI history.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::cache::QuoteCache;
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{FetchError, ProviderId, StockRecord, Symbol};

use super::{parse_to_invalid, rsi14, validation_to_invalid, ProviderCore, QuoteFeed};

const QUOTE_SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

pub struct YahooFeed {
    core: ProviderCore,
}

impl YahooFeed {
    pub fn new(policy: ProviderPolicy, cache: Arc<dyn QuoteCache>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            core: ProviderCore::new(policy, cache, http),
        }
    }

    fn summary_request(symbol: &Symbol) -> HttpRequest {
        let url = format!(
            "{QUOTE_SUMMARY_URL}/{}?modules=price,summaryDetail,assetProfile",
            urlencoding::encode(symbol.as_str())
        );
        HttpRequest::get(url).with_header("referer", "https://finance.yahoo.com/")
    }

    fn chart_request(symbol: &Symbol) -> HttpRequest {
        let url = format!(
            "{CHART_URL}/{}?range=3mo&interval=1d",
            urlencoding::encode(symbol.as_str())
        );
        HttpRequest::get(url).with_header("referer", "https://finance.yahoo.com/")
    }

    async fn attempt(&self, symbol: &Symbol) -> Result<StockRecord, FetchError> {
        let body = self.core.issue(Self::summary_request(symbol)).await?;
        let summary = parse_summary(symbol, &body)?;

        // RSI needs the trailing closes; a chart failure degrades to the
        // neutral default instead of failing the whole fetch.
        let rsi = match self.core.issue(Self::chart_request(symbol)).await {
            Ok(chart_body) => parse_chart_closes(&chart_body)
                .map(|closes| rsi14(&closes))
                .unwrap_or(50.0),
            Err(error) => {
                debug!(symbol = %symbol, %error, "yahoo chart fetch failed, using neutral rsi");
                50.0
            }
        };

        StockRecord::live(
            symbol.clone(),
            summary.name,
            summary.price,
            summary.change_pct,
            summary.pe,
            summary.market_cap / 1e9,
            summary.dividend_yield_pct,
            rsi,
            summary.volume,
            summary.sector,
        )
        .map_err(validation_to_invalid)
    }
}

impl QuoteFeed for YahooFeed {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
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

#[derive(Debug)]
struct NormalizedSummary {
    name: String,
    price: f64,
    change_pct: f64,
    pe: Option<f64>,
    market_cap: f64,
    dividend_yield_pct: f64,
    volume: u64,
    sector: String,
}

fn parse_summary(symbol: &Symbol, body: &str) -> Result<NormalizedSummary, FetchError> {
    let response: QuoteSummaryResponse =
        serde_json::from_str(body).map_err(|e| parse_to_invalid(ProviderId::Yahoo, e))?;

    if let Some(error) = response.quote_summary.error {
        return Err(FetchError::invalid_data(format!("yahoo API error: {error}")));
    }

    let result = response
        .quote_summary
        .result
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::invalid_data("yahoo returned no quoteSummary result"))?;

    let price_module = result
        .price
        .ok_or_else(|| FetchError::invalid_data("yahoo response is missing the price module"))?;

    let price = price_module
        .regular_market_price
        .and_then(RawValue::into_option)
        .ok_or_else(|| FetchError::invalid_data("yahoo reported a zero or absent price"))?;

    let detail = result.summary_detail.unwrap_or_default();

    Ok(NormalizedSummary {
        name: price_module
            .long_name
            .or(price_module.short_name)
            .unwrap_or_else(|| symbol.as_str().to_owned()),
        price,
        change_pct: price_module
            .regular_market_change_percent
            .and_then(RawValue::into_option)
            .unwrap_or(0.0)
            * 100.0,
        pe: detail.trailing_pe.and_then(RawValue::into_option),
        market_cap: price_module
            .market_cap
            .and_then(RawValue::into_option)
            .unwrap_or(0.0),
        dividend_yield_pct: detail
            .dividend_yield
            .and_then(RawValue::into_option)
            .unwrap_or(0.0)
            * 100.0,
        volume: price_module
            .regular_market_volume
            .and_then(RawValue::into_option)
            .map(|v| v.max(0.0) as u64)
            .unwrap_or(0),
        sector: result
            .asset_profile
            .and_then(|profile| profile.sector)
            .unwrap_or_else(|| String::from("Unknown")),
    })
}

fn parse_chart_closes(body: &str) -> Option<Vec<f64>> {
    let response: ChartResponse = serde_json::from_str(body).ok()?;
    let result = response.chart.result.into_iter().next()?;
    let quote = result.indicators.quote.into_iter().next()?;
    Some(quote.close.into_iter().flatten().collect())
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryData,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryData {
    #[serde(default)]
    result: Vec<QuoteSummaryResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(rename = "summaryDetail", default)]
    summary_detail: Option<SummaryDetailModule>,
    #[serde(rename = "assetProfile", default)]
    asset_profile: Option<AssetProfileModule>,
}

#[derive(Debug, Deserialize)]
struct PriceModule {
    #[serde(rename = "longName", default)]
    long_name: Option<String>,
    #[serde(rename = "shortName", default)]
    short_name: Option<String>,
    #[serde(rename = "regularMarketPrice", default)]
    regular_market_price: Option<RawValue>,
    #[serde(rename = "regularMarketChangePercent", default)]
    regular_market_change_percent: Option<RawValue>,
    #[serde(rename = "regularMarketVolume", default)]
    regular_market_volume: Option<RawValue>,
    #[serde(rename = "marketCap", default)]
    market_cap: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryDetailModule {
    #[serde(rename = "trailingPE", default)]
    trailing_pe: Option<RawValue>,
    #[serde(rename = "dividendYield", default)]
    dividend_yield: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct AssetProfileModule {
    #[serde(default)]
    sector: Option<String>,
}

/// Yahoo wraps numeric values in `{raw, fmt}` objects.
#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

impl RawValue {
    fn into_option(self) -> Option<f64> {
        self.raw.filter(|v| v.is_finite() && *v != 0.0)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Vec<ChartResult>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}
