//! Contract tests shared by every provider adapter: canned payloads parse
//! into usable records, zero prices are rejected as invalid data, fresh
//! cache entries suppress network calls, and throttling retries stay
//! bounded.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quotegrid_core::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use quotegrid_core::providers::{AlphavantageFeed, FinnhubFeed, MarketstackFeed, YahooFeed};
use quotegrid_core::{
    DataOrigin, FetchErrorKind, MemoryQuoteCache, ProviderPolicy, QuoteFeed, Symbol,
};

/// Scripted transport: answers by URL substring, counting every call.
struct ScriptedHttp {
    routes: Vec<(&'static str, HttpResponse)>,
    fallback: HttpResponse,
    calls: AtomicU32,
}

impl ScriptedHttp {
    fn new(fallback: HttpResponse) -> Self {
        Self {
            routes: Vec::new(),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    fn with_route(mut self, needle: &'static str, response: HttpResponse) -> Self {
        self.routes.push((needle, response));
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for ScriptedHttp {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .routes
            .iter()
            .find(|(needle, _)| request.url.contains(needle))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move { Ok(response) })
    }
}

fn symbol(text: &str) -> Symbol {
    Symbol::parse(text).expect("valid symbol")
}

/// Policy tuned for tests: no pacing delay, no jitter, tiny backoff.
fn test_policy(base: ProviderPolicy) -> ProviderPolicy {
    let mut policy = base;
    policy.min_delay = Duration::ZERO;
    policy.backoff.base = Duration::from_millis(10);
    policy.backoff.jitter_max = Duration::ZERO;
    policy
}

fn yahoo_summary(price: f64) -> String {
    format!(
        r#"{{"quoteSummary":{{"result":[{{
            "price":{{
                "longName":"Apple Inc.",
                "regularMarketPrice":{{"raw":{price}}},
                "regularMarketChangePercent":{{"raw":0.0123}},
                "regularMarketVolume":{{"raw":48000000}},
                "marketCap":{{"raw":2900000000000.0}}
            }},
            "summaryDetail":{{
                "trailingPE":{{"raw":29.4}},
                "dividendYield":{{"raw":0.0044}}
            }},
            "assetProfile":{{"sector":"Technology"}}
        }}],"error":null}}}}"#
    )
}

const YAHOO_CHART: &str = r#"{"chart":{"result":[{"indicators":{"quote":[
    {"close":[100.0,101.0,102.0,101.5,103.0,104.0,103.5,105.0,106.0,105.5,
              107.0,108.0,107.5,109.0,110.0,109.5,111.0,112.0]}
]}}]}}"#;

fn yahoo_feed(http: Arc<ScriptedHttp>, cache: Arc<MemoryQuoteCache>) -> YahooFeed {
    YahooFeed::new(test_policy(ProviderPolicy::yahoo_default()), cache, http)
}

#[tokio::test]
async fn yahoo_parses_canned_payload_into_usable_record() {
    let http = Arc::new(
        ScriptedHttp::new(HttpResponse::ok_json(yahoo_summary(189.5)))
            .with_route("/v8/finance/chart", HttpResponse::ok_json(YAHOO_CHART)),
    );
    let feed = yahoo_feed(Arc::clone(&http), Arc::new(MemoryQuoteCache::new()));

    let record = feed.fetch(&symbol("AAPL")).await.expect("valid payload");

    assert!(record.is_usable());
    assert_eq!(record.source, DataOrigin::LiveApi);
    assert_eq!(record.name, "Apple Inc.");
    assert_eq!(record.price, 189.5);
    assert_eq!(record.sector, "Technology");
    assert!(record.rsi > 50.0, "rising closes must push rsi up");
    // Quote summary plus one chart call.
    assert_eq!(http.calls(), 2);
}

#[tokio::test]
async fn every_feed_rejects_zero_price_without_retrying() {
    let cases: Vec<(Arc<ScriptedHttp>, Box<dyn QuoteFeed>)> = vec![
        {
            let http = Arc::new(ScriptedHttp::new(HttpResponse::ok_json(yahoo_summary(0.0))));
            let feed = yahoo_feed(Arc::clone(&http), Arc::new(MemoryQuoteCache::new()));
            (http, Box::new(feed))
        },
        {
            let http = Arc::new(ScriptedHttp::new(HttpResponse::ok_json(
                r#"{"c":0,"dp":0}"#,
            )));
            let feed = FinnhubFeed::new(
                test_policy(ProviderPolicy::finnhub_default().with_api_key("k")),
                Arc::new(MemoryQuoteCache::new()),
                Arc::clone(&http) as Arc<dyn HttpClient>,
            );
            (http, Box::new(feed))
        },
        {
            let http = Arc::new(ScriptedHttp::new(HttpResponse::ok_json(
                r#"{"data":[{"close":0.0}]}"#,
            )));
            let feed = MarketstackFeed::new(
                test_policy(ProviderPolicy::marketstack_default().with_api_key("k")),
                Arc::new(MemoryQuoteCache::new()),
                Arc::clone(&http) as Arc<dyn HttpClient>,
            );
            (http, Box::new(feed))
        },
        {
            let http = Arc::new(ScriptedHttp::new(HttpResponse::ok_json(
                r#"{"Global Quote":{"05. price":"0.0000"}}"#,
            )));
            let feed = AlphavantageFeed::new(
                test_policy(ProviderPolicy::alphavantage_default().with_api_key("k")),
                Arc::new(MemoryQuoteCache::new()),
                Arc::clone(&http) as Arc<dyn HttpClient>,
            );
            (http, Box::new(feed))
        },
    ];

    for (http, feed) in cases {
        let error = feed
            .fetch(&symbol("AAPL"))
            .await
            .expect_err("zero price must fail");
        assert_eq!(
            error.kind(),
            FetchErrorKind::InvalidData,
            "provider {}",
            feed.id()
        );
        // Bad data is not transient: exactly one attempt per request in
        // the payload (yahoo never reaches its chart call).
        assert_eq!(http.calls(), 1, "provider {}", feed.id());
    }
}

#[tokio::test]
async fn fresh_cache_entry_suppresses_network_calls() {
    let http = Arc::new(
        ScriptedHttp::new(HttpResponse::ok_json(yahoo_summary(189.5)))
            .with_route("/v8/finance/chart", HttpResponse::ok_json(YAHOO_CHART)),
    );
    let cache = Arc::new(MemoryQuoteCache::new());
    let feed = yahoo_feed(Arc::clone(&http), Arc::clone(&cache));
    let aapl = symbol("AAPL");

    let first = feed.fetch(&aapl).await.expect("first fetch succeeds");
    let after_priming = http.calls();

    let second = feed.fetch(&aapl).await.expect("cache hit succeeds");

    assert_eq!(first, second);
    assert_eq!(http.calls(), after_priming, "cache hit must not touch the network");
}

#[tokio::test]
async fn stale_cache_entry_triggers_one_refetch_and_overwrite() {
    let http = Arc::new(
        ScriptedHttp::new(HttpResponse::ok_json(yahoo_summary(189.5)))
            .with_route("/v8/finance/chart", HttpResponse::ok_json(YAHOO_CHART)),
    );
    let cache = Arc::new(MemoryQuoteCache::new());
    let mut policy = test_policy(ProviderPolicy::yahoo_default());
    // Everything is immediately stale.
    policy.cache_ttl = Duration::ZERO;
    let feed = YahooFeed::new(
        policy,
        Arc::clone(&cache) as Arc<dyn quotegrid_core::QuoteCache>,
        Arc::clone(&http) as Arc<dyn HttpClient>,
    );
    let aapl = symbol("AAPL");

    feed.fetch(&aapl).await.expect("first fetch succeeds");
    let first_stamp = cache
        .cached_at(quotegrid_core::ProviderId::Yahoo, &aapl, "quote")
        .await
        .expect("first write present");
    let after_first = http.calls();

    tokio::time::sleep(Duration::from_millis(5)).await;
    feed.fetch(&aapl).await.expect("refetch succeeds");
    let second_stamp = cache
        .cached_at(quotegrid_core::ProviderId::Yahoo, &aapl, "quote")
        .await
        .expect("second write present");

    assert_eq!(http.calls(), after_first * 2, "exactly one fresh resolution");
    assert!(second_stamp >= first_stamp, "cache entry must be overwritten");
}

#[tokio::test(start_paused = true)]
async fn persistent_throttling_exhausts_bounded_retries() {
    let http = Arc::new(ScriptedHttp::new(HttpResponse::with_status(
        429,
        "Too Many Requests",
    )));
    let feed = FinnhubFeed::new(
        test_policy(ProviderPolicy::finnhub_default().with_api_key("k")),
        Arc::new(MemoryQuoteCache::new()),
        Arc::clone(&http) as Arc<dyn HttpClient>,
    );

    let error = feed
        .fetch(&symbol("AAPL"))
        .await
        .expect_err("throttling never clears");

    // max_retries = 3 means 3 attempts total: the first call plus 2 retries.
    assert_eq!(error.kind(), FetchErrorKind::Throttled);
    assert_eq!(http.calls(), 3);
}

#[tokio::test]
async fn failures_are_never_cached() {
    let http = Arc::new(ScriptedHttp::new(HttpResponse::ok_json(
        r#"{"c":0,"dp":0}"#,
    )));
    let cache = Arc::new(MemoryQuoteCache::new());
    let feed = FinnhubFeed::new(
        test_policy(ProviderPolicy::finnhub_default().with_api_key("k")),
        Arc::clone(&cache) as Arc<dyn quotegrid_core::QuoteCache>,
        Arc::clone(&http) as Arc<dyn HttpClient>,
    );

    let _ = feed.fetch(&symbol("AAPL")).await;

    assert!(cache.is_empty().await, "invalid data must not be cached");
}
