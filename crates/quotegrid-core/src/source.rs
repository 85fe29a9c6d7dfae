use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers, in fallback priority order.
///
/// The ordering is a design decision, not an optimization: providers are
/// ranked by data completeness and quota generosity, so the fallback chain
/// always tries the richest, cheapest source first and reserves scarce-quota
/// providers for genuine failure cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Fundamentals and history, no credential required. First in the chain.
    Yahoo,
    /// Real-time quotes, 60 calls/minute free tier.
    Finnhub,
    /// End-of-day quotes, modest free tier.
    Marketstack,
    /// Backup quotes, 25 calls/day free tier. Last resort among live sources.
    Alphavantage,
}

impl ProviderId {
    /// Fallback priority order used by the chain.
    pub const PRIORITY: [Self; 4] = [
        Self::Yahoo,
        Self::Finnhub,
        Self::Marketstack,
        Self::Alphavantage,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Finnhub => "finnhub",
            Self::Marketstack => "marketstack",
            Self::Alphavantage => "alphavantage",
        }
    }

    /// Whether the provider is unusable without an API key.
    pub const fn requires_key(self) -> bool {
        !matches!(self, Self::Yahoo)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "finnhub" => Ok(Self::Finnhub),
            "marketstack" => Ok(Self::Marketstack),
            "alphavantage" => Ok(Self::Alphavantage),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}
