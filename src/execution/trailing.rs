use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{Position, PositionSide};

/// Trailing stop thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrailingConfig {
    pub activation_pct: f64,  // Profit ratio that arms the stop (0.12 = +12%)
    pub retracement_pct: f64, // Pullback from peak that closes (0.03 = 3%)
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            activation_pct: 0.12,
            retracement_pct: 0.03,
        }
    }
}

/// Per-symbol trailing state
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingState {
    pub symbol: String,
    pub side: PositionSide,
    pub peak_price: f64, // Most favorable mark seen
    pub active: bool,
}

impl TrailingState {
    fn new(position: &Position) -> Self {
        Self {
            symbol: position.symbol.clone(),
            side: position.side,
            peak_price: position.mark_price,
            active: false,
        }
    }

    /// Price at which an active stop closes the position
    pub fn trigger_price(&self, retracement_pct: f64) -> f64 {
        match self.side {
            PositionSide::Long => self.peak_price * (1.0 - retracement_pct),
            PositionSide::Short => self.peak_price * (1.0 + retracement_pct),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailingDecision {
    Hold,
    Close { peak_price: f64, trigger_price: f64 },
}

/// Tracks trailing stops for open positions, keyed by symbol
///
/// Inactive until the position reaches the activation profit, then closes
/// once the mark retraces from its best level. The peak is tracked from the
/// first observation so it is already correct when the stop arms.
#[derive(Debug, Default)]
pub struct TrailingStopTracker {
    config: TrailingConfig,
    states: HashMap<String, TrailingState>,
}

impl TrailingStopTracker {
    pub fn new(config: TrailingConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TrailingConfig {
        &self.config
    }

    /// Feed the latest position snapshot and decide whether to close
    pub fn observe(&mut self, position: &Position) -> TrailingDecision {
        let activation_pct = self.config.activation_pct;
        let retracement_pct = self.config.retracement_pct;

        let state = self
            .states
            .entry(position.symbol.clone())
            .or_insert_with(|| TrailingState::new(position));

        // Direction flipped outside the engine: start over
        if state.side != position.side {
            tracing::debug!(symbol = %position.symbol, "Position side changed, resetting trailing state");
            *state = TrailingState::new(position);
        }

        let mark = position.mark_price;
        match state.side {
            PositionSide::Long if mark > state.peak_price => state.peak_price = mark,
            PositionSide::Short if mark < state.peak_price => state.peak_price = mark,
            _ => {}
        }

        if !state.active && position.profit_ratio() >= activation_pct {
            state.active = true;
            tracing::info!(
                "🎯 Trailing stop armed for {} at {:.2}% profit (peak {:.4})",
                position.symbol,
                position.profit_ratio() * 100.0,
                state.peak_price
            );
        }

        if !state.active {
            return TrailingDecision::Hold;
        }

        let trigger_price = state.trigger_price(retracement_pct);
        let hit = match state.side {
            PositionSide::Long => mark <= trigger_price,
            PositionSide::Short => mark >= trigger_price,
        };

        if hit {
            TrailingDecision::Close {
                peak_price: state.peak_price,
                trigger_price,
            }
        } else {
            TrailingDecision::Hold
        }
    }

    /// Forget a symbol after its close order was submitted
    pub fn remove(&mut self, symbol: &str) -> Option<TrailingState> {
        self.states.remove(symbol)
    }

    /// Drop state for symbols that are no longer open
    pub fn retain_open(&mut self, open_symbols: &HashSet<&str>) -> Vec<String> {
        let stale: Vec<String> = self
            .states
            .keys()
            .filter(|s| !open_symbols.contains(s.as_str()))
            .cloned()
            .collect();

        for symbol in &stale {
            self.states.remove(symbol);
        }

        stale
    }

    pub fn state(&self, symbol: &str) -> Option<&TrailingState> {
        self.states.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
