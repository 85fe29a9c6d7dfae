use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Validation errors raised while constructing domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid provider '{value}', expected one of yahoo, finnhub, marketstack, alphavantage")]
    InvalidProvider { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("price must be a positive, finite number")]
    NonPositivePrice,
}

/// Classification of a failed provider fetch.
///
/// Drives retry behavior: `Throttled` retries with exponential backoff,
/// `Transient` with a shorter linear backoff, everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Upstream signaled rate limiting (HTTP 429 or a vendor "rate" message).
    Throttled,
    /// Network failure or upstream timeout.
    Transient,
    /// Parse succeeded but the payload is unusable (e.g. zero price). Never retried.
    InvalidData,
    /// No credential for this provider. Skipped, not a failure.
    Unconfigured,
    /// Per-symbol deadline exceeded at the batch level.
    Timeout,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Throttled => "Throttled",
            Self::Transient => "Transient",
            Self::InvalidData => "InvalidData",
            Self::Unconfigured => "Unconfigured",
            Self::Timeout => "Timeout",
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::Throttled | Self::Transient)
    }
}

impl Display for FetchErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fetch error used by adapters and the fallback chain.
///
/// Never escapes past the batch fetcher; callers only ever see a
/// [`StockRecord`](crate::StockRecord) with `success = false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

impl FetchError {
    pub fn throttled(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Throttled,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidData,
            message: message.into(),
        }
    }

    pub fn unconfigured(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Unconfigured,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for FetchError {}
