//! Canonical domain types: validated tickers, UTC timestamps, and the flat
//! per-symbol output record every tier of the acquisition layer produces.

mod models;
mod symbol;
mod timestamp;

pub use models::{DataOrigin, StockRecord};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
