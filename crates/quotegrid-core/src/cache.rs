//! Persistent per-(provider, symbol, kind) cache with TTL semantics.
//!
//! The store is an injected interface rather than a module-level singleton
//! so tests can substitute an in-memory implementation. Writes are always
//! whole-record replacements; a record is never partially updated.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ProviderId, StockRecord, Symbol, UtcDateTime};

/// Data kind for the canonical quote record. Kept as an explicit key
/// component so richer kinds (history, overview) can share the store.
pub const KIND_QUOTE: &str = "quote";

/// On-disk cache document: `{cached_at, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub cached_at: UtcDateTime,
    pub data: StockRecord,
}

/// Key/value persistence with TTL semantics, one record per
/// (provider, symbol, data-kind).
pub trait QuoteCache: Send + Sync {
    /// Return the cached record if present and younger than `ttl`.
    fn get<'a>(
        &'a self,
        provider: ProviderId,
        symbol: &'a Symbol,
        kind: &'a str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Option<StockRecord>> + Send + 'a>>;

    /// Overwrite the record for this key with the current timestamp.
    fn put<'a>(
        &'a self,
        provider: ProviderId,
        symbol: &'a Symbol,
        kind: &'a str,
        record: &'a StockRecord,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Cache usage summary for maintenance tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub by_provider: BTreeMap<String, usize>,
}

/// One JSON document per key under a cache directory.
///
/// Mutation is serialized behind a store-wide async mutex so concurrent
/// tasks resolving the same symbol cannot interleave a read-modify-write.
pub struct FileQuoteCache {
    dir: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileQuoteCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, provider: ProviderId, symbol: &Symbol, kind: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{kind}.json", provider.as_str(), symbol.file_stem()))
    }

    async fn read_document(&self, path: &Path) -> Option<CachedRecord> {
        let body = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str(&body) {
            Ok(document) => Some(document),
            Err(error) => {
                warn!("discarding unreadable cache file {}: {error}", path.display());
                None
            }
        }
    }

    /// File count, total bytes, and per-provider counts.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            total_files: 0,
            total_bytes: 0,
            by_provider: BTreeMap::new(),
        };

        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return stats;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") {
                continue;
            }
            stats.total_files += 1;
            if let Ok(metadata) = entry.metadata().await {
                stats.total_bytes += metadata.len();
            }
            if let Some(provider) = name.split('_').next() {
                *stats.by_provider.entry(provider.to_owned()).or_insert(0) += 1;
            }
        }

        stats
    }

    /// Remove cache files, optionally filtered by provider and/or symbol.
    /// Returns the number of files removed.
    pub async fn clear(&self, provider: Option<ProviderId>, symbol: Option<&Symbol>) -> usize {
        let _guard = self.lock.lock().await;

        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") || !name.contains('_') {
                continue;
            }
            if let Some(provider) = provider {
                if !name.starts_with(&format!("{}_", provider.as_str())) {
                    continue;
                }
            }
            if let Some(symbol) = symbol {
                if !name.contains(&format!("_{}_", symbol.file_stem())) {
                    continue;
                }
            }
            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        removed
    }
}

impl QuoteCache for FileQuoteCache {
    fn get<'a>(
        &'a self,
        provider: ProviderId,
        symbol: &'a Symbol,
        kind: &'a str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Option<StockRecord>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.path_for(provider, symbol, kind);
            let document = self.read_document(&path).await?;
            if !document.cached_at.is_fresh(ttl) {
                return None;
            }
            Some(document.data)
        })
    }

    fn put<'a>(
        &'a self,
        provider: ProviderId,
        symbol: &'a Symbol,
        kind: &'a str,
        record: &'a StockRecord,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;

            if let Err(error) = tokio::fs::create_dir_all(&self.dir).await {
                warn!("cache directory unavailable: {error}");
                return;
            }

            let document = CachedRecord {
                cached_at: UtcDateTime::now(),
                data: record.clone(),
            };
            let path = self.path_for(provider, symbol, kind);
            match serde_json::to_vec(&document) {
                Ok(body) => {
                    if let Err(error) = tokio::fs::write(&path, body).await {
                        warn!("cache write failed for {}: {error}", path.display());
                    }
                }
                Err(error) => warn!("cache serialization failed: {error}"),
            }
        })
    }
}

/// In-memory store for tests and cache-less runs.
#[derive(Default)]
pub struct MemoryQuoteCache {
    inner: Arc<tokio::sync::RwLock<HashMap<String, CachedRecord>>>,
}

impl MemoryQuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(provider: ProviderId, symbol: &Symbol, kind: &str) -> String {
        format!("{}:{}:{kind}", provider.as_str(), symbol.as_str())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Timestamp of a stored entry, for overwrite assertions.
    pub async fn cached_at(
        &self,
        provider: ProviderId,
        symbol: &Symbol,
        kind: &str,
    ) -> Option<UtcDateTime> {
        self.inner
            .read()
            .await
            .get(&Self::key(provider, symbol, kind))
            .map(|entry| entry.cached_at)
    }
}

impl QuoteCache for MemoryQuoteCache {
    fn get<'a>(
        &'a self,
        provider: ProviderId,
        symbol: &'a Symbol,
        kind: &'a str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Option<StockRecord>> + Send + 'a>> {
        Box::pin(async move {
            let store = self.inner.read().await;
            let entry = store.get(&Self::key(provider, symbol, kind))?;
            if !entry.cached_at.is_fresh(ttl) {
                return None;
            }
            Some(entry.data.clone())
        })
    }

    fn put<'a>(
        &'a self,
        provider: ProviderId,
        symbol: &'a Symbol,
        kind: &'a str,
        record: &'a StockRecord,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let mut store = self.inner.write().await;
            store.insert(
                Self::key(provider, symbol, kind),
                CachedRecord {
                    cached_at: UtcDateTime::now(),
                    data: record.clone(),
                },
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchError;

    fn record(ticker: &str, price: f64) -> StockRecord {
        StockRecord::live(
            Symbol::parse(ticker).expect("valid symbol"),
            format!("{ticker} Corp."),
            price,
            0.4,
            Some(21.0),
            150.0,
            1.1,
            52.0,
            9_000_000,
            "Technology",
        )
        .expect("valid record")
    }

    fn symbol(text: &str) -> Symbol {
        Symbol::parse(text).expect("valid symbol")
    }

    #[tokio::test]
    async fn file_cache_round_trips_and_respects_ttl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileQuoteCache::new(dir.path());
        let aapl = symbol("AAPL");

        assert!(cache
            .get(ProviderId::Yahoo, &aapl, KIND_QUOTE, Duration::from_secs(60))
            .await
            .is_none());

        cache
            .put(ProviderId::Yahoo, &aapl, KIND_QUOTE, &record("AAPL", 189.5))
            .await;

        let hit = cache
            .get(ProviderId::Yahoo, &aapl, KIND_QUOTE, Duration::from_secs(60))
            .await
            .expect("fresh entry");
        assert_eq!(hit.price, 189.5);

        // Zero TTL means everything is already stale.
        assert!(cache
            .get(ProviderId::Yahoo, &aapl, KIND_QUOTE, Duration::ZERO)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn writes_are_whole_record_replacements() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileQuoteCache::new(dir.path());
        let aapl = symbol("AAPL");

        cache
            .put(ProviderId::Finnhub, &aapl, KIND_QUOTE, &record("AAPL", 100.0))
            .await;
        cache
            .put(ProviderId::Finnhub, &aapl, KIND_QUOTE, &record("AAPL", 105.0))
            .await;

        let hit = cache
            .get(
                ProviderId::Finnhub,
                &aapl,
                KIND_QUOTE,
                Duration::from_secs(60),
            )
            .await
            .expect("entry present");
        assert_eq!(hit.price, 105.0);

        let stats = cache.stats().await;
        assert_eq!(stats.total_files, 1);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_provider() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileQuoteCache::new(dir.path());
        let aapl = symbol("AAPL");

        cache
            .put(ProviderId::Yahoo, &aapl, KIND_QUOTE, &record("AAPL", 100.0))
            .await;

        assert!(cache
            .get(
                ProviderId::Finnhub,
                &aapl,
                KIND_QUOTE,
                Duration::from_secs(60)
            )
            .await
            .is_none());
    }

    #[tokio::test]
    async fn clear_filters_by_provider_and_symbol() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileQuoteCache::new(dir.path());
        let aapl = symbol("AAPL");
        let msft = symbol("MSFT");

        cache
            .put(ProviderId::Yahoo, &aapl, KIND_QUOTE, &record("AAPL", 1.0))
            .await;
        cache
            .put(ProviderId::Yahoo, &msft, KIND_QUOTE, &record("MSFT", 2.0))
            .await;
        cache
            .put(ProviderId::Finnhub, &aapl, KIND_QUOTE, &record("AAPL", 3.0))
            .await;

        assert_eq!(cache.clear(Some(ProviderId::Finnhub), None).await, 1);
        assert_eq!(cache.clear(None, Some(&aapl)).await, 1);
        assert_eq!(cache.stats().await.total_files, 1);
    }

    #[tokio::test]
    async fn corrupt_cache_file_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileQuoteCache::new(dir.path());
        let aapl = symbol("AAPL");

        tokio::fs::write(dir.path().join("yahoo_AAPL_quote.json"), b"not json")
            .await
            .expect("write");

        assert!(cache
            .get(ProviderId::Yahoo, &aapl, KIND_QUOTE, Duration::from_secs(60))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn memory_cache_overwrites_advance_timestamp() {
        let cache = MemoryQuoteCache::new();
        let aapl = symbol("AAPL");

        cache
            .put(ProviderId::Yahoo, &aapl, KIND_QUOTE, &record("AAPL", 1.0))
            .await;
        let first = cache
            .cached_at(ProviderId::Yahoo, &aapl, KIND_QUOTE)
            .await
            .expect("stored");

        cache
            .put(ProviderId::Yahoo, &aapl, KIND_QUOTE, &record("AAPL", 2.0))
            .await;
        let second = cache
            .cached_at(ProviderId::Yahoo, &aapl, KIND_QUOTE)
            .await
            .expect("stored");

        assert!(second >= first);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn failure_records_are_storable_but_never_cached_by_adapters() {
        // The store itself does not police payloads; adapters only write
        // successful records. This just pins the document shape.
        let cache = MemoryQuoteCache::new();
        let bad = symbol("BAD");
        let failure = StockRecord::failure(bad.clone(), &FetchError::invalid_data("zero price"));

        cache
            .put(ProviderId::Yahoo, &bad, KIND_QUOTE, &failure)
            .await;
        let stored = cache
            .get(ProviderId::Yahoo, &bad, KIND_QUOTE, Duration::from_secs(60))
            .await
            .expect("stored");
        assert!(!stored.success);
    }
}
