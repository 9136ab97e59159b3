//! Historical bar archive
//!
//! Read-only view over per-instrument CSV archives written by an ingestion
//! process outside this bot. Used to warm up indicators whose lookback is
//! longer than the cache retains. Gaps (market holidays, outages) simply
//! yield fewer bars; nothing is synthesized.
//!
//! Layout: `<dir>/<instrument>.csv` with header
//! `bucket_start,open,high,low,close,volume`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::market::bar::PriceBar;

#[derive(Debug, Deserialize)]
struct CsvRow {
    bucket_start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Read-only historical store over a directory of CSV archives
pub struct HistoricalStore {
    dir: PathBuf,
}

impl HistoricalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Return up to the `max_bars` most recent archived bars for
    /// `instrument`, ordered by bucket start ascending. A missing archive
    /// yields an empty sequence; rows failing OHLC validation are
    /// quarantined with a warning.
    pub fn backfill(&self, instrument: &str, max_bars: usize) -> Result<Vec<PriceBar>> {
        let path = self.dir.join(format!("{instrument}.csv"));
        let mut reader = match csv::Reader::from_path(&path) {
            Ok(r) => r,
            Err(e) => {
                if let csv::ErrorKind::Io(io) = e.kind() {
                    if io.kind() == std::io::ErrorKind::NotFound {
                        debug!(instrument, path = %path.display(), "No historical archive");
                        return Ok(Vec::new());
                    }
                }
                return Err(std::io::Error::new(std::io::ErrorKind::Other, e).into());
            }
        };

        let mut bars = Vec::new();
        for (idx, row) in reader.deserialize::<CsvRow>().enumerate() {
            match row {
                Ok(row) => {
                    let bar = PriceBar {
                        instrument: instrument.to_string(),
                        bucket_start: row.bucket_start,
                        open: row.open,
                        high: row.high,
                        low: row.low,
                        close: row.close,
                        volume: row.volume,
                    };
                    if let Err(e) = bar.validate() {
                        warn!(instrument, line = idx + 2, error = %e, "Quarantining bad archive row");
                        continue;
                    }
                    bars.push(bar);
                }
                Err(e) => {
                    warn!(instrument, line = idx + 2, error = %e, "Quarantining unreadable archive row");
                }
            }
        }

        bars.sort_by_key(|b| b.bucket_start);
        if bars.len() > max_bars {
            let excess = bars.len() - max_bars;
            bars.drain(..excess);
        }
        Ok(bars)
    }
}
