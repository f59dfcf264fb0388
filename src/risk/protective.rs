use crate::models::Position;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
}

/// Fixed stop-loss / take-profit levels relative to entry
///
/// Independent from the trailing stop: evaluated first and never touches
/// trailing state. When `enforce` is false a hit is only reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtectiveStops {
    pub stop_loss_pct: Option<f64>,   // e.g. 0.05 = close at -5%
    pub take_profit_pct: Option<f64>, // e.g. 0.25 = close at +25%
    pub enforce: bool,
}

impl ProtectiveStops {
    pub fn is_configured(&self) -> bool {
        self.stop_loss_pct.is_some() || self.take_profit_pct.is_some()
    }

    /// Check a position against the fixed levels
    pub fn check(&self, position: &Position) -> Option<ExitReason> {
        let profit = position.profit_ratio();

        if let Some(sl) = self.stop_loss_pct {
            if profit <= -sl {
                return Some(ExitReason::StopLoss);
            }
        }

        if let Some(tp) = self.take_profit_pct {
            if profit >= tp {
                return Some(ExitReason::TakeProfit);
            }
        }

        None
    }
}
