//! Risk limits and quantity clamping
//!
//! Limits clamp rather than reject: a decision slightly over a limit is
//! trimmed to fit instead of being dropped, so a strategy is not starved
//! by minor breaches. Only a decision clamped to nothing becomes a Hold.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ledger::Position;
use crate::strategy::{Action, Decision};

/// Position and order size limits applied to every non-Hold decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum absolute position quantity per instrument
    pub max_position: f64,
    /// Maximum quantity per single order
    pub max_order_size: f64,
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.max_position.is_finite() || self.max_position <= 0.0 {
            return Err(AppError::Config(format!(
                "max_position must be a positive finite number (got {})",
                self.max_position
            )));
        }
        if !self.max_order_size.is_finite() || self.max_order_size <= 0.0 {
            return Err(AppError::Config(format!(
                "max_order_size must be a positive finite number (got {})",
                self.max_order_size
            )));
        }
        Ok(())
    }

    /// Clamp a decision so the order fits both limits given the current
    /// position. Returns Hold when nothing tradable remains.
    pub fn clamp(&self, decision: Decision, position: &Position) -> Decision {
        match decision.action {
            Action::Hold => decision,
            Action::Buy | Action::Sell => {
                // Head-room before |position| would exceed max_position
                let headroom = match decision.action {
                    Action::Buy => self.max_position - position.quantity,
                    Action::Sell => self.max_position + position.quantity,
                    Action::Hold => unreachable!(),
                };
                let quantity = decision
                    .quantity
                    .min(self.max_order_size)
                    .min(headroom.max(0.0));
                if quantity <= 0.0 {
                    return Decision::hold(&decision.instrument, "risk-limit");
                }
                Decision {
                    quantity,
                    ..decision
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_position: 20.0,
            max_order_size: 10.0,
        }
    }

    fn buy(quantity: f64) -> Decision {
        Decision {
            instrument: "XYZ".to_string(),
            action: Action::Buy,
            quantity,
            reason: "test".to_string(),
        }
    }

    fn sell(quantity: f64) -> Decision {
        Decision {
            instrument: "XYZ".to_string(),
            action: Action::Sell,
            quantity,
            reason: "test".to_string(),
        }
    }

    fn long(quantity: f64) -> Position {
        Position {
            instrument: "XYZ".to_string(),
            quantity,
            average_entry_price: 100.0,
        }
    }

    #[test]
    fn test_within_limits_passes_unchanged() {
        let decision = limits().clamp(buy(5.0), &Position::flat("XYZ"));
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.quantity, 5.0);
    }

    #[test]
    fn test_order_size_clamped() {
        let decision = limits().clamp(buy(50.0), &Position::flat("XYZ"));
        assert_eq!(decision.quantity, 10.0);
    }

    #[test]
    fn test_position_headroom_clamps_buy() {
        // Long 15 of max 20: only 5 more may be bought
        let decision = limits().clamp(buy(10.0), &long(15.0));
        assert_eq!(decision.quantity, 5.0);
    }

    #[test]
    fn test_at_max_position_becomes_hold() {
        let decision = limits().clamp(buy(10.0), &long(20.0));
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.reason, "risk-limit");
    }

    #[test]
    fn test_sell_headroom_accounts_for_long_position() {
        // Long 15: can sell 15 + 20 = 35 before breaching short limit,
        // but order size caps at 10
        let decision = limits().clamp(sell(35.0), &long(15.0));
        assert_eq!(decision.quantity, 10.0);
    }

    #[test]
    fn test_short_at_limit_cannot_sell_more() {
        let decision = limits().clamp(sell(1.0), &long(-20.0));
        assert_eq!(decision.action, Action::Hold);
    }

    #[test]
    fn test_hold_passes_through() {
        let decision = limits().clamp(Decision::hold("XYZ", "nothing"), &long(15.0));
        assert!(decision.is_hold());
        assert_eq!(decision.reason, "nothing");
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        let bad = RiskLimits {
            max_position: 0.0,
            max_order_size: 10.0,
        };
        assert!(bad.validate().is_err());
        let bad = RiskLimits {
            max_position: 10.0,
            max_order_size: f64::NAN,
        };
        assert!(bad.validate().is_err());
        assert!(limits().validate().is_ok());
    }
}
