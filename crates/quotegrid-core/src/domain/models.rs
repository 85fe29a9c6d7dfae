use serde::{Deserialize, Serialize};

use crate::{FetchError, Symbol, ValidationError};

/// Which tier produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    LiveApi,
    DailySnapshot,
    StaticCsv,
    Demo,
}

impl DataOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LiveApi => "live_api",
            Self::DailySnapshot => "daily_snapshot",
            Self::StaticCsv => "static_csv",
            Self::Demo => "demo",
        }
    }
}

/// Canonical flat record returned for every requested symbol.
///
/// Invariant: exactly one of (`success = true` with a positive, finite
/// `price`) or (`success = false` with `error` set and numeric fields at
/// their defaults) holds. `price` is never reported as zero on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub ticker: Symbol,
    pub name: String,
    pub price: f64,
    pub change_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe: Option<f64>,
    pub market_cap_billions: f64,
    pub dividend_yield_pct: f64,
    pub rsi: f64,
    pub volume: u64,
    pub sector: String,
    pub success: bool,
    pub source: DataOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StockRecord {
    /// Build a successful record, enforcing the positive-price invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn live(
        ticker: Symbol,
        name: impl Into<String>,
        price: f64,
        change_pct: f64,
        pe: Option<f64>,
        market_cap_billions: f64,
        dividend_yield_pct: f64,
        rsi: f64,
        volume: u64,
        sector: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(ValidationError::NonPositivePrice);
        }
        validate_finite("change_pct", change_pct)?;
        if let Some(pe) = pe {
            validate_finite("pe", pe)?;
        }
        validate_non_negative("market_cap_billions", market_cap_billions)?;
        validate_non_negative("dividend_yield_pct", dividend_yield_pct)?;
        validate_non_negative("rsi", rsi)?;

        Ok(Self {
            ticker,
            name: name.into(),
            price,
            change_pct,
            pe,
            market_cap_billions,
            dividend_yield_pct,
            rsi,
            volume,
            sector: sector.into(),
            success: true,
            source: DataOrigin::LiveApi,
            error: None,
        })
    }

    /// Build a failed record with numeric fields at their defaults.
    pub fn failure(ticker: Symbol, error: &FetchError) -> Self {
        let name = ticker.as_str().to_owned();
        Self {
            ticker,
            name,
            price: 0.0,
            change_pct: 0.0,
            pe: None,
            market_cap_billions: 0.0,
            dividend_yield_pct: 0.0,
            rsi: 0.0,
            volume: 0,
            sector: String::from("Unknown"),
            success: false,
            source: DataOrigin::LiveApi,
            error: Some(error.kind().as_str().to_owned()),
        }
    }

    /// Retag a record with the tier that actually served it.
    pub fn with_origin(mut self, origin: DataOrigin) -> Self {
        self.source = origin;
        self
    }

    /// A record the fallback chain will accept: successful with a positive,
    /// finite price.
    pub fn is_usable(&self) -> bool {
        self.success && self.price.is_finite() && self.price > 0.0
    }
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
