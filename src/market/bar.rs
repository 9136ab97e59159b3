//! Price bar model
//!
//! One `PriceBar` aggregates trades for one instrument over one fixed
//! time bucket. `bucket_start` is the natural key: there is at most one
//! bar per instrument per bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// OHLCV bar for one instrument and one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub instrument: String,
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Validate the OHLC invariant:
    /// high >= max(open, close) >= min(open, close) >= low >= 0,
    /// finite prices, non-negative volume.
    pub fn validate(&self) -> Result<(), AppError> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(AppError::DataIntegrity(format!(
                "{} @ {}: non-finite field in bar",
                self.instrument, self.bucket_start
            )));
        }
        if self.low < 0.0 {
            return Err(AppError::DataIntegrity(format!(
                "{} @ {}: negative low {}",
                self.instrument, self.bucket_start, self.low
            )));
        }
        if self.volume < 0.0 {
            return Err(AppError::DataIntegrity(format!(
                "{} @ {}: negative volume {}",
                self.instrument, self.bucket_start, self.volume
            )));
        }
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        if self.high < body_high || body_low < self.low {
            return Err(AppError::DataIntegrity(format!(
                "{} @ {}: OHLC out of order (o={} h={} l={} c={})",
                self.instrument, self.bucket_start, self.open, self.high, self.low, self.close
            )));
        }
        Ok(())
    }
}
