//! Strategy engine framework
//!
//! A strategy is a pure function of market data plus current position
//! state: no hidden state, no I/O, so every implementation is unit-testable
//! in isolation. Concrete strategies are selected at configuration time and
//! held as a trait object; the scheduler never knows which one it drives.
//!
//! The engine-level guard in `evaluate_guarded` enforces the one rule that
//! is not the strategy's to waive: never trade on incomplete or degraded
//! data.

pub mod mean_reversion;
pub mod risk;
pub mod sma_cross;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::Position;
use crate::market::{CachedBar, PriceBar};

pub use mean_reversion::MeanReversion;
pub use risk::RiskLimits;
pub use sma_cross::SmaCross;

/// What the strategy wants done this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// One trading decision, produced fresh each tick and never persisted;
/// only the resulting trade (if any) reaches the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub instrument: String,
    pub action: Action,
    pub quantity: f64,
    /// Short tag explaining the decision, carried into logs
    pub reason: String,
}

impl Decision {
    pub fn hold(instrument: &str, reason: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            action: Action::Hold,
            quantity: 0.0,
            reason: reason.to_string(),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action == Action::Hold
    }
}

/// Everything a strategy may look at. Borrowed for the duration of one
/// evaluation; strategies must not retain any of it.
pub struct EvalContext<'a> {
    pub instrument: &'a str,
    pub position: &'a Position,
    /// Recent bars from the cache store, freshness-tagged, oldest first
    pub recent: &'a [CachedBar],
    /// Archived bars for indicator warm-up, oldest first
    pub history: &'a [PriceBar],
    pub now: DateTime<Utc>,
    /// When the current exposure was opened (from the ledger); None if flat
    pub position_opened_at: Option<DateTime<Utc>>,
}

impl<'a> EvalContext<'a> {
    /// Closing prices across history and recent bars, oldest first.
    /// Archive bars overlapping the cache window are dropped so no bucket
    /// is counted twice.
    pub fn closes(&self) -> Vec<f64> {
        let cutoff = self.recent.first().map(|c| c.bar.bucket_start);
        let mut closes: Vec<f64> = self
            .history
            .iter()
            .filter(|b| cutoff.map_or(true, |c| b.bucket_start < c))
            .map(|b| b.close)
            .collect();
        closes.extend(self.recent.iter().map(|c| c.bar.close));
        closes
    }

    /// Latest observed close, if any bar is present.
    pub fn last_close(&self) -> Option<f64> {
        self.recent
            .last()
            .map(|c| c.bar.close)
            .or_else(|| self.history.last().map(|b| b.close))
    }
}

/// Common trait for all trading strategies
///
/// Implementations must be pure with respect to the context: same inputs,
/// same decision.
pub trait Strategy: Send + Sync {
    /// Identifier used in logs and config
    fn name(&self) -> &'static str;

    /// Number of recent cache bars required for an evaluation. The guard
    /// holds if fewer (or any degraded) bars are available.
    fn lookback(&self) -> usize;

    /// Number of archived bars to request for indicator warm-up
    fn warmup(&self) -> usize {
        0
    }

    /// Produce a decision. Called only with a complete, fresh window; use
    /// `evaluate_guarded` at the call site to enforce that.
    fn evaluate(&self, ctx: &EvalContext) -> Decision;
}

/// Engine entry point: enforce the incomplete-data rule, then delegate.
///
/// If any required recent bar is missing or degraded, the decision is Hold
/// regardless of what the strategy would have said.
pub fn evaluate_guarded(strategy: &dyn Strategy, ctx: &EvalContext) -> Decision {
    if ctx.recent.len() < strategy.lookback() {
        return Decision::hold(ctx.instrument, "incomplete-data");
    }
    if ctx.recent.iter().any(|bar| !bar.is_fresh()) {
        return Decision::hold(ctx.instrument, "degraded-data");
    }
    strategy.evaluate(ctx)
}
