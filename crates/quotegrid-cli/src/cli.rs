//! Argument definitions for the quotegrid CLI.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch quote records for a list of tickers |
//! | `sources` | Show provider configuration status |
//! | `cache stats` | Summarize the local quote cache |
//! | `cache clear` | Remove cached quote files |
//! | `snapshot cleanup` | Remove old daily snapshot files |

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Resilient multi-provider stock quote fetcher.
///
/// Cascades across Yahoo Finance, Finnhub, Marketstack, and Alpha Vantage
/// with per-provider rate limiting, tiered local fallback, and a flat
/// JSON record per requested ticker.
#[derive(Debug, Parser)]
#[command(name = "quotegrid", version, about = "Multi-provider stock quote fetcher")]
pub struct Cli {
    /// Directory holding the quote cache and daily snapshots.
    #[arg(long, global = true, default_value = ".cache")]
    pub cache_dir: PathBuf,

    /// Static reference CSV used as the last data tier.
    #[arg(long, global = true, default_value = "static_prices.csv")]
    pub static_csv: PathBuf,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch quote records for the given tickers, in input order.
    Fetch(FetchArgs),
    /// Show which providers are configured.
    Sources,
    /// Cache maintenance.
    Cache(CacheArgs),
    /// Daily snapshot maintenance.
    Snapshot(SnapshotArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Ticker symbols (case-insensitive, duplicates allowed).
    #[arg(required = true)]
    pub tickers: Vec<String>,

    /// Disable the synthetic demo placeholder tier; symbols with no data
    /// in any tier keep their failure record.
    #[arg(long, default_value_t = false)]
    pub no_demo: bool,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// File count, total bytes, and per-provider counts.
    Stats,
    /// Remove cache files, optionally filtered.
    Clear(CacheClearArgs),
}

#[derive(Debug, Args)]
pub struct CacheClearArgs {
    /// Only clear this provider's entries.
    #[arg(long)]
    pub provider: Option<String>,

    /// Only clear this ticker's entries.
    #[arg(long)]
    pub ticker: Option<String>,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub action: SnapshotAction,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotAction {
    /// Remove snapshot files older than the age limit.
    Cleanup(SnapshotCleanupArgs),
}

#[derive(Debug, Args)]
pub struct SnapshotCleanupArgs {
    /// Maximum snapshot age in days.
    #[arg(long, default_value_t = 7)]
    pub max_age_days: u64,
}
