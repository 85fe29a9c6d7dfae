//! Offline tiers: the daily snapshot file, the static reference CSV, and
//! the synthetic demo placeholder.
//!
//! The snapshot is a whole-day map of symbol to record, refreshed by
//! merging live batch results; it is trusted only while its file is less
//! than a day old. The static CSV has no expiry and is the last tier
//! before synthetic data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{DataOrigin, StockRecord, Symbol};

const SNAPSHOT_PREFIX: &str = "daily_prices_";
const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(24 * 3_600);

/// One JSON map per calendar day, filename encodes the date.
pub struct SnapshotStore {
    dir: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    fn today_path(&self) -> PathBuf {
        let date = time::OffsetDateTime::now_utc().date();
        self.dir.join(format!(
            "{SNAPSHOT_PREFIX}{:04}-{:02}-{:02}.json",
            date.year(),
            date.month() as u8,
            date.day()
        ))
    }

    /// Load today's snapshot if it exists and was written within the last
    /// 24 hours. Symbols are uppercased on the way in.
    pub async fn load(&self) -> HashMap<String, StockRecord> {
        let path = self.today_path();
        if !is_fresh_file(&path, SNAPSHOT_MAX_AGE) {
            return HashMap::new();
        }

        let Ok(body) = tokio::fs::read_to_string(&path).await else {
            return HashMap::new();
        };
        match serde_json::from_str::<HashMap<String, StockRecord>>(&body) {
            Ok(map) => map
                .into_iter()
                .map(|(ticker, record)| (ticker.to_ascii_uppercase(), record))
                .collect(),
            Err(error) => {
                warn!("discarding unreadable snapshot {}: {error}", path.display());
                HashMap::new()
            }
        }
    }

    /// Snapshot hit for one symbol, retagged with its tier.
    pub async fn lookup(&self, symbol: &Symbol) -> Option<StockRecord> {
        self.load()
            .await
            .remove(symbol.as_str())
            .map(|record| record.with_origin(DataOrigin::DailySnapshot))
    }

    /// Merge freshly fetched live records into today's snapshot. The
    /// read-modify-write is whole-file and runs under the store lock so
    /// two concurrent batches cannot drop each other's updates.
    pub async fn merge(&self, records: &[StockRecord]) {
        let live: Vec<&StockRecord> = records.iter().filter(|r| r.is_usable()).collect();
        if live.is_empty() {
            return;
        }

        let _guard = self.lock.lock().await;

        let mut snapshot = self.load().await;
        for record in live {
            snapshot.insert(record.ticker.as_str().to_owned(), record.clone());
        }

        if let Err(error) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("snapshot directory unavailable: {error}");
            return;
        }
        match serde_json::to_vec_pretty(&snapshot) {
            Ok(body) => {
                let path = self.today_path();
                if let Err(error) = tokio::fs::write(&path, body).await {
                    warn!("snapshot write failed for {}: {error}", path.display());
                } else {
                    debug!(tickers = snapshot.len(), "saved daily snapshot");
                }
            }
            Err(error) => warn!("snapshot serialization failed: {error}"),
        }
    }

    /// Remove snapshot files older than `max_age_days`. Returns the number
    /// of files removed.
    pub async fn cleanup(&self, max_age_days: u64) -> usize {
        let max_age = Duration::from_secs(max_age_days * 24 * 3_600);
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(SNAPSHOT_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            if is_fresh_file(&entry.path(), max_age) {
                continue;
            }
            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                debug!(file = %name, "removed old snapshot");
                removed += 1;
            }
        }
        removed
    }
}

fn is_fresh_file(path: &Path, max_age: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .is_some_and(|age| age <= max_age)
}

/// Row schema of the static reference CSV: the canonical record columns
/// plus reference-only extras.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticRow {
    pub ticker: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    #[serde(default)]
    pub volume: u64,
    #[serde(rename = "marketCap", default)]
    pub market_cap: f64,
    #[serde(default)]
    pub pe: Option<String>,
    #[serde(default)]
    pub dividend: f64,
    #[serde(default = "default_rsi")]
    pub rsi: f64,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default)]
    pub avg_volume: u64,
    #[serde(rename = "week52High", default)]
    pub week52_high: f64,
    #[serde(rename = "week52Low", default)]
    pub week52_low: f64,
    #[serde(default)]
    pub last_updated: Option<String>,
}

fn default_rsi() -> f64 {
    50.0
}

fn default_beta() -> f64 {
    1.0
}

/// Hand-maintained last-resort reference table, loaded once from a CSV
/// file. No TTL.
pub struct StaticDataset {
    rows: HashMap<String, StaticRow>,
}

impl StaticDataset {
    /// Load the table from disk. A missing or unreadable file yields an
    /// empty dataset rather than an error; this tier is best-effort.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut rows = HashMap::new();

        let reader = match csv::Reader::from_path(path) {
            Ok(reader) => reader,
            Err(error) => {
                debug!("static dataset unavailable at {}: {error}", path.display());
                return Self { rows };
            }
        };

        for result in reader.into_deserialize::<StaticRow>() {
            match result {
                Ok(mut row) => {
                    row.ticker = row.ticker.to_ascii_uppercase();
                    rows.insert(row.ticker.clone(), row);
                }
                Err(error) => warn!("skipping malformed static row: {error}"),
            }
        }

        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, symbol: &Symbol) -> Option<&StaticRow> {
        self.rows.get(symbol.as_str())
    }

    /// Canonical record for a symbol, tagged `static_csv`.
    pub fn lookup(&self, symbol: &Symbol) -> Option<StockRecord> {
        let row = self.rows.get(symbol.as_str())?;
        let pe = row
            .pe
            .as_deref()
            .and_then(|text| text.trim().parse::<f64>().ok());
        let volume = if row.volume > 0 {
            row.volume
        } else {
            row.avg_volume
        };

        StockRecord::live(
            symbol.clone(),
            row.name.clone(),
            row.price,
            row.change,
            pe,
            row.market_cap,
            row.dividend,
            row.rsi,
            volume,
            row.sector.clone().unwrap_or_else(|| String::from("Unknown")),
        )
        .ok()
        .map(|record| record.with_origin(DataOrigin::StaticCsv))
    }
}

/// Deterministic synthetic placeholder for when every other tier fails.
/// Values are seeded from the ticker bytes so repeated runs agree.
pub fn demo_record(symbol: &Symbol) -> StockRecord {
    let seed: u64 = symbol.as_str().bytes().map(u64::from).sum();
    let price = 90.0 + (seed % 220) as f64;
    let change = ((seed % 25) as f64 - 8.0) / 2.0;
    let pe = 10.0 + (seed % 25) as f64;
    let rsi = 40.0 + (seed % 40) as f64;
    let market_cap = 40.0 + (seed % 180) as f64;
    let dividend = (seed % 5) as f64;

    StockRecord::live(
        symbol.clone(),
        format!("{} (demo)", symbol.as_str()),
        price,
        change,
        Some(pe),
        market_cap,
        dividend,
        rsi,
        15_000_000,
        "Demo Sector",
    )
    .expect("demo values are always in range")
    .with_origin(DataOrigin::Demo)
}
