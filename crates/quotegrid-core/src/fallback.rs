//! Cascading provider fallback.
//!
//! Providers are ranked by data completeness and quota generosity, so the
//! chain always tries the richest, cheapest source first and reserves the
//! scarce-quota providers for genuine failure cases. At most one provider
//! is consulted on the happy path.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::providers::QuoteFeed;
use crate::{FetchError, ProviderId, StockRecord, Symbol};

/// Configuration state of one provider in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub configured: bool,
}

pub struct FallbackChain {
    feeds: Vec<Arc<dyn QuoteFeed>>,
}

impl FallbackChain {
    /// Build a chain from feeds already sorted into priority order.
    pub fn new(feeds: Vec<Arc<dyn QuoteFeed>>) -> Self {
        Self { feeds }
    }

    /// Which providers are present and credentialed. A missing credential
    /// shows up here as `configured: false`, never as an error.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.feeds
            .iter()
            .map(|feed| ProviderStatus {
                provider: feed.id(),
                configured: feed.is_configured(),
            })
            .collect()
    }

    /// Walk the chain for one symbol: skip unconfigured feeds, accept the
    /// first successful record with a positive finite price, and stop
    /// there. Exhaustion yields a failure record carrying the last
    /// provider's error.
    pub async fn resolve(&self, symbol: &Symbol) -> StockRecord {
        let mut last_error: Option<FetchError> = None;

        for feed in &self.feeds {
            if !feed.is_configured() {
                debug!(provider = %feed.id(), symbol = %symbol, "skipping unconfigured provider");
                continue;
            }

            match feed.fetch(symbol).await {
                Ok(record) if record.is_usable() => {
                    debug!(provider = %feed.id(), symbol = %symbol, price = record.price, "provider accepted");
                    return record;
                }
                Ok(record) => {
                    warn!(provider = %feed.id(), symbol = %symbol, "provider returned an unusable record");
                    last_error = Some(FetchError::invalid_data(format!(
                        "{} returned an unusable record for {}",
                        feed.id(),
                        record.ticker
                    )));
                }
                Err(error) => {
                    warn!(provider = %feed.id(), symbol = %symbol, %error, "provider failed");
                    last_error = Some(error);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| FetchError::unconfigured("no provider is configured"));
        StockRecord::failure(symbol.clone(), &error)
    }
}
