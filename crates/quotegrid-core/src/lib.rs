//! quotegrid-core: resilient multi-provider stock quote acquisition.
//!
//! The layer acquires near-real-time quotes and fundamentals from several
//! independent, rate-limited, free-tier providers and returns a
//! consistently shaped record for every requested symbol, even when
//! providers throttle, error, or are unconfigured.
//!
//! Resolution order for one symbol: provider cache (if fresh), cascading
//! live providers, daily snapshot, static CSV dataset, synthetic demo
//! placeholder. The outward interface is [`BatchFetcher::fetch_all`];
//! callers own no knowledge of providers, caching, or retries.

pub mod batch;
pub mod cache;
mod domain;
mod error;
pub mod fallback;
pub mod http_client;
pub mod local_data;
pub mod pacing;
pub mod provider_policy;
pub mod providers;
pub mod retrying;
mod source;

pub use batch::{BatchConfig, BatchFetcher};
pub use cache::{CacheStats, CachedRecord, FileQuoteCache, MemoryQuoteCache, QuoteCache};
pub use domain::{DataOrigin, StockRecord, Symbol, UtcDateTime};
pub use error::{FetchError, FetchErrorKind, ValidationError};
pub use fallback::{FallbackChain, ProviderStatus};
pub use local_data::{demo_record, SnapshotStore, StaticDataset};
pub use provider_policy::{BackoffPolicy, ProviderPolicy};
pub use providers::QuoteFeed;
pub use source::ProviderId;
