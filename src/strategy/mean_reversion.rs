//! Mean reversion strategy
//!
//! Buys after a sharp drop over the lookback window and bets on the price
//! reverting; exits on a configured gain or when the position has been held
//! too long. Additions to a losing position are capped by sizing: the
//! position may grow to at most `order_quantity * (1 + max_additions)`.

use chrono::Duration;

use crate::error::AppError;
use crate::strategy::{Action, Decision, EvalContext, Strategy};

/// Strategy parameters. `max_holding` is carried as a `chrono::Duration`;
/// the config layer deserializes it from seconds.
#[derive(Debug, Clone)]
pub struct MeanReversionConfig {
    /// Buckets to look back when measuring the drop
    pub lookback_bars: usize,
    /// Fractional drop that triggers an entry (0.10 = 10%)
    pub drop_threshold: f64,
    /// Fractional unrealized gain that triggers an exit
    pub gain_threshold: f64,
    /// Quantity per entry/addition order, before risk clamping
    pub order_quantity: f64,
    /// Maximum number of additions after the initial entry
    pub max_additions: u32,
    /// Exit regardless of price after holding this long
    pub max_holding: Option<Duration>,
}

impl MeanReversionConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.lookback_bars == 0 {
            return Err(AppError::Config(
                "mean_reversion: lookback_bars must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("drop_threshold", self.drop_threshold),
            ("gain_threshold", self.gain_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 || value >= 1.0 {
                return Err(AppError::Config(format!(
                    "mean_reversion: {name} must be in (0, 1) (got {value})"
                )));
            }
        }
        if !self.order_quantity.is_finite() || self.order_quantity <= 0.0 {
            return Err(AppError::Config(format!(
                "mean_reversion: order_quantity must be positive (got {})",
                self.order_quantity
            )));
        }
        Ok(())
    }
}

pub struct MeanReversion {
    cfg: MeanReversionConfig,
}

impl MeanReversion {
    pub fn new(cfg: MeanReversionConfig) -> Self {
        Self { cfg }
    }

    /// Fractional return over the lookback window, if enough closes exist.
    fn lookback_return(&self, closes: &[f64]) -> Option<f64> {
        let n = closes.len();
        if n < self.cfg.lookback_bars + 1 {
            return None;
        }
        let past = closes[n - 1 - self.cfg.lookback_bars];
        let current = closes[n - 1];
        if past <= 0.0 {
            return None;
        }
        Some((current - past) / past)
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> &'static str {
        "mean-reversion"
    }

    fn lookback(&self) -> usize {
        // The current bucket plus at least one prior close; the rest of
        // the window may come from the archive.
        2
    }

    fn warmup(&self) -> usize {
        self.cfg.lookback_bars + 1
    }

    fn evaluate(&self, ctx: &EvalContext) -> Decision {
        let closes = ctx.closes();
        let current = match closes.last() {
            Some(c) => *c,
            None => return Decision::hold(ctx.instrument, "no-data"),
        };

        let position = ctx.position;
        if position.quantity > 0.0 {
            // Exit checks first: take profit, then max holding age
            if position.average_entry_price > 0.0 {
                let gain = (current - position.average_entry_price) / position.average_entry_price;
                if gain >= self.cfg.gain_threshold {
                    return Decision {
                        instrument: ctx.instrument.to_string(),
                        action: Action::Sell,
                        quantity: position.quantity,
                        reason: "take-profit".to_string(),
                    };
                }
            }
            if let (Some(max_holding), Some(opened_at)) =
                (self.cfg.max_holding, ctx.position_opened_at)
            {
                if ctx.now - opened_at >= max_holding {
                    return Decision {
                        instrument: ctx.instrument.to_string(),
                        action: Action::Sell,
                        quantity: position.quantity,
                        reason: "max-holding".to_string(),
                    };
                }
            }
            // Add to the position on a continued drop, bounded by sizing
            let max_quantity =
                self.cfg.order_quantity * (1.0 + f64::from(self.cfg.max_additions));
            if position.quantity + self.cfg.order_quantity <= max_quantity {
                if let Some(ret) = self.lookback_return(&closes) {
                    if ret <= -self.cfg.drop_threshold {
                        return Decision {
                            instrument: ctx.instrument.to_string(),
                            action: Action::Buy,
                            quantity: self.cfg.order_quantity,
                            reason: "add-on-drop".to_string(),
                        };
                    }
                }
            }
            return Decision::hold(ctx.instrument, "holding");
        }

        // Flat: look for an entry
        match self.lookback_return(&closes) {
            Some(ret) if ret <= -self.cfg.drop_threshold => Decision {
                instrument: ctx.instrument.to_string(),
                action: Action::Buy,
                quantity: self.cfg.order_quantity,
                reason: "dip-entry".to_string(),
            },
            Some(_) => Decision::hold(ctx.instrument, "no-signal"),
            None => Decision::hold(ctx.instrument, "warming-up"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Position;
    use crate::strategy::test_support::{cached_bars, ctx_with, t0, BUCKET_SECS};

    fn cfg() -> MeanReversionConfig {
        MeanReversionConfig {
            lookback_bars: 7,
            drop_threshold: 0.10,
            gain_threshold: 0.10,
            order_quantity: 10.0,
            max_additions: 2,
            max_holding: Some(Duration::days(90)),
        }
    }

    fn long(quantity: f64, entry: f64) -> Position {
        Position {
            instrument: "XYZ".to_string(),
            quantity,
            average_entry_price: entry,
        }
    }

    #[test]
    fn test_flat_buys_after_drop() {
        let position = Position::flat("XYZ");
        // 100 -> 88 over 7 buckets: a 12% drop
        let recent = cached_bars(&[100.0, 98.0, 97.0, 95.0, 93.0, 91.0, 90.0, 88.0]);
        let ctx = ctx_with(&position, &recent, &[]);
        let decision = MeanReversion::new(cfg()).evaluate(&ctx);
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.quantity, 10.0);
        assert_eq!(decision.reason, "dip-entry");
    }

    #[test]
    fn test_flat_holds_on_small_drop() {
        let position = Position::flat("XYZ");
        let recent = cached_bars(&[100.0, 99.0, 99.0, 98.0, 98.0, 97.0, 97.0, 96.0]);
        let ctx = ctx_with(&position, &recent, &[]);
        let decision = MeanReversion::new(cfg()).evaluate(&ctx);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.reason, "no-signal");
    }

    #[test]
    fn test_take_profit_sells_everything() {
        let position = long(10.0, 100.0);
        let recent = cached_bars(&[108.0, 112.0]);
        let ctx = ctx_with(&position, &recent, &[]);
        let decision = MeanReversion::new(cfg()).evaluate(&ctx);
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.quantity, 10.0);
        assert_eq!(decision.reason, "take-profit");
    }

    #[test]
    fn test_max_holding_forces_exit() {
        let position = long(10.0, 100.0);
        let recent = cached_bars(&[100.0, 100.0]);
        let mut ctx = ctx_with(&position, &recent, &[]);
        ctx.position_opened_at = Some(t0() - Duration::days(91));
        let decision = MeanReversion::new(cfg()).evaluate(&ctx);
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.reason, "max-holding");
    }

    #[test]
    fn test_add_on_continued_drop() {
        let position = long(10.0, 100.0);
        let recent = cached_bars(&[100.0, 98.0, 97.0, 95.0, 93.0, 91.0, 90.0, 88.0]);
        let mut ctx = ctx_with(&position, &recent, &[]);
        ctx.position_opened_at = Some(t0());
        let decision = MeanReversion::new(cfg()).evaluate(&ctx);
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.reason, "add-on-drop");
    }

    #[test]
    fn test_additions_capped_by_sizing() {
        // order_quantity 10, max_additions 2 -> position may reach 30
        let position = long(30.0, 100.0);
        let recent = cached_bars(&[100.0, 98.0, 97.0, 95.0, 93.0, 91.0, 90.0, 88.0]);
        let ctx = ctx_with(&position, &recent, &[]);
        let decision = MeanReversion::new(cfg()).evaluate(&ctx);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.reason, "holding");
    }

    #[test]
    fn test_archive_fills_lookback_window() {
        let position = Position::flat("XYZ");
        let all = cached_bars(&[100.0, 98.0, 97.0, 95.0, 93.0, 91.0, 90.0, 88.0]);
        let (history_part, recent_part) = all.split_at(6);
        let history: Vec<_> = history_part.iter().map(|c| c.bar.clone()).collect();
        let ctx = ctx_with(&position, recent_part, &history);
        let decision = MeanReversion::new(cfg()).evaluate(&ctx);
        assert_eq!(decision.action, Action::Buy);
    }

    #[test]
    fn test_warming_up_holds() {
        let position = Position::flat("XYZ");
        let recent = cached_bars(&[100.0, 95.0]);
        let ctx = ctx_with(&position, &recent, &[]);
        let decision = MeanReversion::new(cfg()).evaluate(&ctx);
        assert_eq!(decision.reason, "warming-up");
    }

    #[test]
    fn test_config_validation() {
        let mut c = cfg();
        assert!(c.validate().is_ok());
        c.drop_threshold = 0.0;
        assert!(c.validate().is_err());
        c.drop_threshold = 0.1;
        c.gain_threshold = 1.5;
        assert!(c.validate().is_err());
        c.gain_threshold = 0.1;
        c.lookback_bars = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_bucket_constant_used_by_fixtures() {
        // Guards against fixture drift: bars are one bucket apart
        let bars = cached_bars(&[1.0, 2.0]);
        let delta = bars[1].bar.bucket_start - bars[0].bar.bucket_start;
        assert_eq!(delta.num_seconds(), BUCKET_SECS);
    }
}
