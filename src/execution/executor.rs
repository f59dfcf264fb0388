use std::collections::HashSet;

use crate::execution::trailing::{TrailingConfig, TrailingDecision, TrailingStopTracker};
use crate::models::{OrderSide, Position, Signal};
use crate::risk::{position_size, ExitReason, ProtectiveStops};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Open {
        side: OrderSide,
        quantity: f64,
    },
    Close {
        side: OrderSide,
        quantity: f64,
        exit_reason: ExitReason,
    },
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

impl ExecutionDecision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: ExecutionAction::Skip,
            reason: reason.into(),
        }
    }
}

/// Turns signals and position snapshots into order decisions
///
/// Owns the trailing-stop tracker; exits are checked against the fixed
/// protective levels first, then the trailing stop.
pub struct Executor {
    risk_per_trade: f64,
    leverage: u32,
    protective: ProtectiveStops,
    trailing: TrailingStopTracker,
}

impl Executor {
    pub fn new(
        risk_per_trade: f64,
        leverage: u32,
        protective: ProtectiveStops,
        trailing: TrailingConfig,
    ) -> Self {
        Self {
            risk_per_trade,
            leverage,
            protective,
            trailing: TrailingStopTracker::new(trailing),
        }
    }

    /// Decide whether an open position should be closed this cycle
    pub fn review_position(&mut self, position: &Position) -> ExecutionDecision {
        if !position.is_open() {
            return ExecutionDecision::skip("No open size");
        }

        let close = |exit_reason: ExitReason, reason: String| ExecutionDecision {
            action: ExecutionAction::Close {
                side: position.side.closing_side(),
                quantity: position.contracts.abs(),
                exit_reason,
            },
            reason,
        };

        if let Some(exit_reason) = self.protective.check(position) {
            let profit_pct = position.profit_ratio() * 100.0;
            if self.protective.enforce {
                return close(
                    exit_reason,
                    format!("{:?} hit at {:.2}% profit", exit_reason, profit_pct),
                );
            }
            tracing::warn!(
                "⚠️  {} {:?} level reached at {:.2}% (not enforced)",
                position.symbol,
                exit_reason,
                profit_pct
            );
        }

        match self.trailing.observe(position) {
            TrailingDecision::Close {
                peak_price,
                trigger_price,
            } => close(
                ExitReason::TrailingStop,
                format!(
                    "Trailing stop: mark {:.4} crossed {:.4} (peak {:.4})",
                    position.mark_price, trigger_price, peak_price
                ),
            ),
            TrailingDecision::Hold => ExecutionDecision::skip(format!(
                "Holding at {:.2}% profit",
                position.profit_ratio() * 100.0
            )),
        }
    }

    /// Process an entry signal and decide what to do
    pub fn process_signal(
        &self,
        signal: &Signal,
        free_balance: f64,
        price: f64,
    ) -> Result<ExecutionDecision> {
        let side = match signal.direction.opening_side() {
            Some(side) => side,
            None => return Ok(ExecutionDecision::skip("Neutral signal")),
        };

        let quantity = position_size(free_balance, price, self.risk_per_trade, self.leverage)?;
        if quantity <= 0.0 {
            return Ok(ExecutionDecision::skip(format!(
                "No free balance to size {} entry",
                signal.symbol
            )));
        }

        Ok(ExecutionDecision {
            action: ExecutionAction::Open { side, quantity },
            reason: format!(
                "{:?} signal, {:.0}% of {:.2} free at {}x",
                signal.direction,
                self.risk_per_trade * 100.0,
                free_balance,
                self.leverage
            ),
        })
    }

    /// Forget trailing state once a close order went through
    pub fn position_closed(&mut self, symbol: &str) {
        self.trailing.remove(symbol);
    }

    /// Drop trailing state for positions closed outside the engine
    pub fn forget_closed(&mut self, open_symbols: &HashSet<&str>) -> Vec<String> {
        self.trailing.retain_open(open_symbols)
    }

    pub fn trailing(&self) -> &TrailingStopTracker {
        &self.trailing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::models::{Direction, PositionSide};

    fn executor() -> Executor {
        Executor::new(
            0.05,
            5,
            ProtectiveStops::default(),
            TrailingConfig::default(),
        )
    }

    fn signal(direction: Direction) -> Signal {
        Signal {
            symbol: "BTCUSDC".to_string(),
            direction,
        }
    }

    fn position(side: PositionSide, entry: f64, mark: f64, contracts: f64) -> Position {
        Position {
            symbol: "BTCUSDC".to_string(),
            side,
            entry_price: entry,
            mark_price: mark,
            contracts,
            unrealized_pnl_percent: 0.0,
        }
    }

    #[test]
    fn test_long_signal_opens_buy() {
        let decision = executor()
            .process_signal(&signal(Direction::Long), 1000.0, 50_000.0)
            .unwrap();

        // 1000 * 0.05 * 5 / 50000 = 0.005
        match decision.action {
            ExecutionAction::Open { side, quantity } => {
                assert_eq!(side, OrderSide::Buy);
                assert!((quantity - 0.005).abs() < 1e-12);
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_short_signal_opens_sell() {
        let decision = executor()
            .process_signal(&signal(Direction::Short), 1000.0, 100.0)
            .unwrap();

        assert!(matches!(
            decision.action,
            ExecutionAction::Open { side: OrderSide::Sell, .. }
        ));
    }

    #[test]
    fn test_neutral_signal_skips() {
        let decision = executor()
            .process_signal(&signal(Direction::Neutral), 1000.0, 100.0)
            .unwrap();

        assert!(matches!(decision.action, ExecutionAction::Skip));
        assert!(decision.reason.contains("Neutral"));
    }

    #[test]
    fn test_zero_balance_skips() {
        let decision = executor()
            .process_signal(&signal(Direction::Long), 0.0, 100.0)
            .unwrap();

        assert!(matches!(decision.action, ExecutionAction::Skip));
    }

    #[test]
    fn test_bad_price_is_sizing_error() {
        let result = executor().process_signal(&signal(Direction::Long), 1000.0, 0.0);
        assert!(matches!(result, Err(BotError::Sizing(_))));
    }

    #[test]
    fn test_trailing_exit_closes_full_size() {
        let mut executor = executor();

        let decision = executor.review_position(&position(PositionSide::Long, 100.0, 115.0, 2.5));
        assert!(matches!(decision.action, ExecutionAction::Skip));

        let decision = executor.review_position(&position(PositionSide::Long, 100.0, 111.0, 2.5));
        assert_eq!(
            decision.action,
            ExecutionAction::Close {
                side: OrderSide::Sell,
                quantity: 2.5,
                exit_reason: ExitReason::TrailingStop,
            }
        );
    }

    #[test]
    fn test_enforced_stop_loss_closes_before_trailing() {
        let mut executor = Executor::new(
            0.05,
            5,
            ProtectiveStops {
                stop_loss_pct: Some(0.05),
                take_profit_pct: None,
                enforce: true,
            },
            TrailingConfig::default(),
        );

        let decision = executor.review_position(&position(PositionSide::Short, 100.0, 106.0, 1.0));
        assert_eq!(
            decision.action,
            ExecutionAction::Close {
                side: OrderSide::Buy,
                quantity: 1.0,
                exit_reason: ExitReason::StopLoss,
            }
        );
        // Protective exits leave trailing state alone
        assert!(executor.trailing().is_empty());
    }

    #[test]
    fn test_unenforced_stop_only_logs() {
        let mut executor = Executor::new(
            0.05,
            5,
            ProtectiveStops {
                stop_loss_pct: Some(0.05),
                take_profit_pct: None,
                enforce: false,
            },
            TrailingConfig::default(),
        );

        let decision = executor.review_position(&position(PositionSide::Long, 100.0, 90.0, 1.0));
        assert!(matches!(decision.action, ExecutionAction::Skip));
        assert_eq!(executor.trailing().len(), 1);
    }

    #[test]
    fn test_zero_size_position_ignored() {
        let mut executor = executor();
        let decision = executor.review_position(&position(PositionSide::Long, 100.0, 150.0, 0.0));

        assert!(matches!(decision.action, ExecutionAction::Skip));
        assert!(executor.trailing().is_empty());
    }

    #[test]
    fn test_position_closed_resets_tracking() {
        let mut executor = executor();
        executor.review_position(&position(PositionSide::Long, 100.0, 120.0, 1.0));
        assert!(executor.trailing().state("BTCUSDC").unwrap().active);

        executor.position_closed("BTCUSDC");
        assert!(executor.trailing().state("BTCUSDC").is_none());
    }
}
