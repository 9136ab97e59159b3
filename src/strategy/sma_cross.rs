//! Moving-average crossover strategy
//!
//! Buys when the fast simple moving average crosses above the slow one,
//! sells the position down when it crosses back below. The crossing is
//! detected between the two most recent completed buckets, so the strategy
//! acts at most once per cross.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::strategy::{Action, Decision, EvalContext, Strategy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmaCrossConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Quantity per entry order, before risk clamping
    pub order_quantity: f64,
}

impl SmaCrossConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.fast_period == 0 || self.slow_period == 0 {
            return Err(AppError::Config(
                "sma_cross: periods must be greater than zero".to_string(),
            ));
        }
        if self.fast_period >= self.slow_period {
            return Err(AppError::Config(format!(
                "sma_cross: fast_period ({}) must be shorter than slow_period ({})",
                self.fast_period, self.slow_period
            )));
        }
        if !self.order_quantity.is_finite() || self.order_quantity <= 0.0 {
            return Err(AppError::Config(format!(
                "sma_cross: order_quantity must be positive (got {})",
                self.order_quantity
            )));
        }
        Ok(())
    }
}

pub struct SmaCross {
    cfg: SmaCrossConfig,
}

impl SmaCross {
    pub fn new(cfg: SmaCrossConfig) -> Self {
        Self { cfg }
    }

    /// Simple moving average over the `period` values ending at `end`
    /// (exclusive). None if the window does not fit.
    fn sma(closes: &[f64], period: usize, end: usize) -> Option<f64> {
        if period == 0 || end < period || end > closes.len() {
            return None;
        }
        Some(closes[end - period..end].iter().sum::<f64>() / period as f64)
    }
}

impl Strategy for SmaCross {
    fn name(&self) -> &'static str {
        "sma-cross"
    }

    fn lookback(&self) -> usize {
        // Enough cached bars to compute both averages at the previous and
        // the current bucket
        self.cfg.slow_period + 1
    }

    fn warmup(&self) -> usize {
        self.cfg.slow_period
    }

    fn evaluate(&self, ctx: &EvalContext) -> Decision {
        let closes = ctx.closes();
        let n = closes.len();
        if n < self.cfg.slow_period + 1 {
            return Decision::hold(ctx.instrument, "warming-up");
        }

        let fast_now = Self::sma(&closes, self.cfg.fast_period, n);
        let slow_now = Self::sma(&closes, self.cfg.slow_period, n);
        let fast_prev = Self::sma(&closes, self.cfg.fast_period, n - 1);
        let slow_prev = Self::sma(&closes, self.cfg.slow_period, n - 1);

        let (fast_now, slow_now, fast_prev, slow_prev) =
            match (fast_now, slow_now, fast_prev, slow_prev) {
                (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                _ => return Decision::hold(ctx.instrument, "warming-up"),
            };

        if fast_prev <= slow_prev && fast_now > slow_now {
            if ctx.position.quantity > 0.0 {
                return Decision::hold(ctx.instrument, "already-long");
            }
            return Decision {
                instrument: ctx.instrument.to_string(),
                action: Action::Buy,
                quantity: self.cfg.order_quantity,
                reason: "fast-over-slow".to_string(),
            };
        }

        if fast_prev >= slow_prev && fast_now < slow_now && ctx.position.quantity > 0.0 {
            return Decision {
                instrument: ctx.instrument.to_string(),
                action: Action::Sell,
                quantity: ctx.position.quantity,
                reason: "fast-under-slow".to_string(),
            };
        }

        Decision::hold(ctx.instrument, "no-cross")
    }
}
