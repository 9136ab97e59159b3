//! Append-only trade ledger
//!
//! The ledger is the durable source of truth for position state. Every
//! confirmed fill is appended as one JSON line; positions are reconstructed
//! by folding the file in order at startup and are never trusted from
//! memory across a restart.
//!
//! Durability contract: each append is a single `write_all` of one
//! newline-terminated record followed by `sync_data`, so a crash can only
//! tear the final line. A torn final line is discarded and truncated away
//! on reopen; an unparseable interior record means the file was tampered
//! with or corrupted and is fatal.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::gateway::types::OrderSide;

/// A confirmed fill, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Ledger-assigned, monotonically increasing
    pub trade_id: u64,
    pub client_order_id: String,
    pub instrument: String,
    pub side: OrderSide,
    pub filled_quantity: f64,
    pub fill_price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Net position for one instrument, derived from the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument: String,
    /// Signed: positive long, negative short
    pub quantity: f64,
    pub average_entry_price: f64,
}

impl Position {
    pub fn flat(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            quantity: 0.0,
            average_entry_price: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    /// Fold one fill into the position. Extending exposure blends the
    /// average entry price; reducing leaves it unchanged; crossing through
    /// zero resets the basis to the fill price of the crossing trade.
    pub fn apply(&mut self, side: OrderSide, filled_quantity: f64, fill_price: f64) {
        let delta = match side {
            OrderSide::Buy => filled_quantity,
            OrderSide::Sell => -filled_quantity,
        };
        let old = self.quantity;
        let new = old + delta;

        if old == 0.0 || (old > 0.0) == (delta > 0.0) {
            // Opening or extending exposure in the same direction
            let total = old.abs() + delta.abs();
            if total > 0.0 {
                self.average_entry_price =
                    (self.average_entry_price * old.abs() + fill_price * delta.abs()) / total;
            }
        } else if new != 0.0 && (new > 0.0) != (old > 0.0) {
            // Crossed through zero: residual exposure has a new basis
            self.average_entry_price = fill_price;
        }
        // Pure reduction keeps the existing basis

        self.quantity = new;
        if self.quantity == 0.0 {
            self.average_entry_price = 0.0;
        }
    }
}

/// Durable, append-only, crash-recoverable trade log
#[derive(Debug)]
pub struct TradeLedger {
    path: PathBuf,
    file: File,
    trades: Vec<Trade>,
    next_trade_id: u64,
}

impl TradeLedger {
    /// Open (or create) the ledger at `path`, replaying existing records.
    ///
    /// A torn final line is truncated away with a warning. Any other
    /// unparseable record, or a non-monotonic trade_id, is a
    /// `DataIntegrity` error — the process must refuse to trade with an
    /// unverifiable position.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut contents = String::new();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        file.read_to_string(&mut contents)?;

        let mut trades: Vec<Trade> = Vec::new();
        let mut last_id = 0u64;
        let mut offset = 0usize;
        let mut truncate_to: Option<u64> = None;

        let ends_with_newline = contents.ends_with('\n');
        let lines: Vec<&str> = contents.split('\n').collect();
        // split('\n') on "a\nb\n" yields ["a", "b", ""]; the trailing empty
        // element is not a record. An empty file has no records at all.
        let record_count = if contents.is_empty() {
            0
        } else if ends_with_newline {
            lines.len().saturating_sub(1)
        } else {
            lines.len()
        };

        for (idx, line) in lines.iter().take(record_count).enumerate() {
            let is_last = idx == record_count - 1;
            match serde_json::from_str::<Trade>(line) {
                Ok(trade) => {
                    if trade.trade_id <= last_id {
                        return Err(AppError::DataIntegrity(format!(
                            "ledger {}: trade_id {} at record {} not monotonic",
                            path.display(),
                            trade.trade_id,
                            idx + 1
                        )));
                    }
                    last_id = trade.trade_id;
                    trades.push(trade);
                    offset += line.len() + 1;
                }
                Err(e) => {
                    if is_last && !ends_with_newline {
                        warn!(
                            path = %path.display(),
                            record = idx + 1,
                            "Discarding torn final ledger record (crash during append)"
                        );
                        truncate_to = Some(offset as u64);
                        break;
                    }
                    return Err(AppError::DataIntegrity(format!(
                        "ledger {}: record {} unparseable: {}",
                        path.display(),
                        idx + 1,
                        e
                    )));
                }
            }
        }

        if let Some(len) = truncate_to {
            file.set_len(len)?;
            file.seek(SeekFrom::End(0))?;
        } else if !contents.is_empty() && !ends_with_newline {
            // The final record is complete but its newline was lost in the
            // crash; repair it so the next append starts a fresh line.
            file.write_all(b"\n")?;
        }

        info!(
            path = %path.display(),
            trades = trades.len(),
            "Trade ledger opened"
        );

        Ok(Self {
            path,
            file,
            next_trade_id: last_id + 1,
            trades,
        })
    }

    /// Append one confirmed fill. Atomic with respect to crash: the record
    /// is a single newline-terminated write, synced before returning.
    pub fn append(
        &mut self,
        client_order_id: &str,
        instrument: &str,
        side: OrderSide,
        filled_quantity: f64,
        fill_price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Trade> {
        let trade = Trade {
            trade_id: self.next_trade_id,
            client_order_id: client_order_id.to_string(),
            instrument: instrument.to_string(),
            side,
            filled_quantity,
            fill_price,
            timestamp,
        };
        let mut line = serde_json::to_vec(&trade)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        self.next_trade_id += 1;
        self.trades.push(trade.clone());
        Ok(trade)
    }

    /// Fold every trade in append order into per-instrument positions.
    /// Deterministic and idempotent for the same ledger contents.
    pub fn reconstruct_positions(&self) -> HashMap<String, Position> {
        let mut positions: HashMap<String, Position> = HashMap::new();
        for trade in &self.trades {
            let position = positions
                .entry(trade.instrument.clone())
                .or_insert_with(|| Position::flat(trade.instrument.clone()));
            position.apply(trade.side, trade.filled_quantity, trade.fill_price);
        }
        positions
    }

    /// Timestamp of the trade that opened the current exposure for an
    /// instrument (the first trade after the position was last flat).
    /// None if the instrument is currently flat or unknown.
    pub fn position_opened_at(&self, instrument: &str) -> Option<DateTime<Utc>> {
        let mut position = Position::flat(instrument);
        let mut opened_at = None;
        for trade in self.trades.iter().filter(|t| t.instrument == instrument) {
            let was_flat = position.is_flat();
            position.apply(trade.side, trade.filled_quantity, trade.fill_price);
            if position.is_flat() {
                opened_at = None;
            } else if was_flat {
                opened_at = Some(trade.timestamp);
            }
        }
        opened_at
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
