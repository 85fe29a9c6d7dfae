//! Bounded-concurrency batch fetching and the end-to-end resolution order
//! for a single symbol: live providers (cache-first inside each adapter),
//! then the daily snapshot, then the static dataset, then the synthetic
//! placeholder.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{FileQuoteCache, QuoteCache};
use crate::fallback::{FallbackChain, ProviderStatus};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::local_data::{demo_record, SnapshotStore, StaticDataset};
use crate::provider_policy::ProviderPolicy;
use crate::providers::{AlphavantageFeed, FinnhubFeed, MarketstackFeed, QuoteFeed, YahooFeed};
use crate::{DataOrigin, FetchError, ProviderId, StockRecord, Symbol, ValidationError};

/// Batch pacing knobs. The concurrency cap is deliberately conservative,
/// tuned to the tightest provider quota, and not configurable per call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub batch_pause: Duration,
    pub symbol_timeout: Duration,
    /// When false, symbols with no data in any tier keep their failure
    /// record instead of a synthetic placeholder.
    pub use_demo: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            max_workers: 2,
            batch_pause: Duration::from_secs(2),
            symbol_timeout: Duration::from_secs(30),
            use_demo: true,
        }
    }
}

/// The outward collaborator interface: `fetch_all` in, flat records out.
/// Callers own no knowledge of providers, caching, or retries.
#[derive(Clone)]
pub struct BatchFetcher {
    chain: Arc<FallbackChain>,
    snapshot: Arc<SnapshotStore>,
    static_data: Arc<StaticDataset>,
    config: BatchConfig,
}

impl BatchFetcher {
    pub fn new(
        chain: Arc<FallbackChain>,
        snapshot: Arc<SnapshotStore>,
        static_data: Arc<StaticDataset>,
        config: BatchConfig,
    ) -> Self {
        Self {
            chain,
            snapshot,
            static_data,
            config,
        }
    }

    /// Production composition root: all four providers in priority order,
    /// keys from the environment, file cache and snapshot under
    /// `cache_dir`, static dataset from `static_csv`.
    pub fn from_env(cache_dir: &Path, static_csv: &Path, config: BatchConfig) -> Self {
        let cache: Arc<dyn QuoteCache> = Arc::new(FileQuoteCache::new(cache_dir));
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

        let feeds: Vec<Arc<dyn QuoteFeed>> = ProviderId::PRIORITY
            .iter()
            .map(|&provider| {
                let policy = ProviderPolicy::from_env(provider);
                let feed: Arc<dyn QuoteFeed> = match provider {
                    ProviderId::Yahoo => {
                        Arc::new(YahooFeed::new(policy, Arc::clone(&cache), Arc::clone(&http)))
                    }
                    ProviderId::Finnhub => {
                        Arc::new(FinnhubFeed::new(policy, Arc::clone(&cache), Arc::clone(&http)))
                    }
                    ProviderId::Marketstack => Arc::new(MarketstackFeed::new(
                        policy,
                        Arc::clone(&cache),
                        Arc::clone(&http),
                    )),
                    ProviderId::Alphavantage => Arc::new(AlphavantageFeed::new(
                        policy,
                        Arc::clone(&cache),
                        Arc::clone(&http),
                    )),
                };
                feed
            })
            .collect();

        Self::new(
            Arc::new(FallbackChain::new(feeds)),
            Arc::new(SnapshotStore::new(cache_dir)),
            Arc::new(StaticDataset::load(static_csv)),
            config,
        )
    }

    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.chain.provider_status()
    }

    /// Fetch every requested ticker, returning one record per input entry
    /// in input order. Duplicates are processed once and duplicated in the
    /// output. Only ticker validation can fail; per-symbol data problems
    /// surface as failure records, never as errors.
    pub async fn fetch_all<I, S>(&self, tickers: I) -> Result<Vec<StockRecord>, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: Vec<Symbol> = tickers
            .into_iter()
            .map(|ticker| Symbol::parse(ticker.as_ref()))
            .collect::<Result<_, _>>()?;

        // Process each unique symbol once, keeping first-seen order.
        let mut unique: Vec<Symbol> = Vec::new();
        for symbol in &requested {
            if !unique.contains(symbol) {
                unique.push(symbol.clone());
            }
        }

        let mut resolved: HashMap<Symbol, StockRecord> = HashMap::with_capacity(unique.len());
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let batch_size = self.config.batch_size.max(1);

        let batch_count = unique.chunks(batch_size).count();
        for (index, batch) in unique.chunks(batch_size).enumerate() {
            debug!(batch = index + 1, of = batch_count, symbols = batch.len(), "processing batch");
            let mut tasks: JoinSet<(Symbol, StockRecord)> = JoinSet::new();

            for symbol in batch {
                let fetcher = self.clone();
                let semaphore = Arc::clone(&semaphore);
                let symbol = symbol.clone();
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("batch semaphore is never closed");

                    // The deadline is enforced here by observing elapsed
                    // time, not by the adapter self-terminating.
                    let record = match tokio::time::timeout(
                        fetcher.config.symbol_timeout,
                        fetcher.resolve(&symbol),
                    )
                    .await
                    {
                        Ok(record) => record,
                        Err(_) => {
                            warn!(symbol = %symbol, "per-symbol deadline exceeded");
                            StockRecord::failure(
                                symbol.clone(),
                                &FetchError::timeout("per-symbol deadline exceeded"),
                            )
                        }
                    };
                    (symbol, record)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((symbol, record)) => {
                        resolved.insert(symbol, record);
                    }
                    Err(error) => warn!(%error, "batch task aborted"),
                }
            }

            if index + 1 < batch_count {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        // A task that panicked leaves its symbol unresolved; backfill so
        // the output length always matches the input.
        for symbol in &unique {
            if !resolved.contains_key(symbol) {
                resolved.insert(
                    symbol.clone(),
                    StockRecord::failure(symbol.clone(), &FetchError::transient("worker aborted")),
                );
            }
        }

        let live: Vec<StockRecord> = resolved
            .values()
            .filter(|record| record.is_usable() && record.source == DataOrigin::LiveApi)
            .cloned()
            .collect();
        if !live.is_empty() {
            self.snapshot.merge(&live).await;
        }

        Ok(requested
            .iter()
            .map(|symbol| {
                resolved
                    .get(symbol)
                    .cloned()
                    .expect("every requested symbol was resolved or backfilled")
            })
            .collect())
    }

    /// Tiered resolution for one symbol. Each tier is consulted only when
    /// the previous one produced nothing usable.
    async fn resolve(&self, symbol: &Symbol) -> StockRecord {
        let live = self.chain.resolve(symbol).await;
        if live.is_usable() {
            return live;
        }

        if let Some(hit) = self.snapshot.lookup(symbol).await {
            debug!(symbol = %symbol, "serving daily snapshot");
            return hit;
        }

        if let Some(hit) = self.static_data.lookup(symbol) {
            debug!(symbol = %symbol, "serving static dataset");
            return hit;
        }

        if self.config.use_demo {
            debug!(symbol = %symbol, "serving demo placeholder");
            return demo_record(symbol);
        }

        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_free_tier_pacing() {
        let config = BatchConfig::default();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.batch_pause, Duration::from_secs(2));
        assert_eq!(config.symbol_timeout, Duration::from_secs(30));
        assert!(config.use_demo);
    }
}
