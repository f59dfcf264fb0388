use crate::indicators::{calculate_ema, calculate_macd, calculate_rsi, MacdConfig};
use crate::models::Direction;
use serde::{Deserialize, Serialize};

/// Configuration for signal generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub fast_ema_period: usize,
    pub slow_ema_period: usize,
    pub rsi_period: usize,
    pub rsi_threshold: f64, // Long above, short below
    pub require_macd_confirmation: bool,
    pub macd: MacdConfig,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            fast_ema_period: 9,
            slow_ema_period: 21,
            rsi_period: 14,
            rsi_threshold: 50.0,
            require_macd_confirmation: false,
            macd: MacdConfig::default(),
        }
    }
}

impl SignalConfig {
    /// Closing prices needed before any indicator can be trusted
    ///
    /// # Example
    /// ```
    /// use futuresbot::strategy::signals::SignalConfig;
    ///
    /// let config = SignalConfig::default();
    /// // slow EMA(21) dominates RSI(14), which needs 15
    /// assert_eq!(config.min_closes(), 21);
    /// ```
    pub fn min_closes(&self) -> usize {
        self.slow_ema_period.max(self.rsi_period + 1)
    }
}

/// Indicator readings behind a signal, kept for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendReading {
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub rsi: f64,
    pub macd_histogram: Option<f64>,
}

/// Compute the indicator readings for a closing-price window
///
/// Returns `None` when the window is too short for RSI or empty.
pub fn read_indicators(closes: &[f64], config: &SignalConfig) -> Option<TrendReading> {
    let fast_ema = calculate_ema(closes, config.fast_ema_period)?;
    let slow_ema = calculate_ema(closes, config.slow_ema_period)?;
    let rsi = calculate_rsi(closes, config.rsi_period)?;

    let macd_histogram = if config.require_macd_confirmation {
        Some(calculate_macd(closes, &config.macd)?.histogram())
    } else {
        None
    };

    Some(TrendReading {
        fast_ema,
        slow_ema,
        rsi,
        macd_histogram,
    })
}

/// Decide a direction from indicator readings
///
/// Rules are checked in order: long, then short, otherwise neutral.
pub fn decide_direction(reading: &TrendReading, config: &SignalConfig) -> Direction {
    let macd_long = reading.macd_histogram.map_or(true, |h| h > 0.0);
    let macd_short = reading.macd_histogram.map_or(true, |h| h < 0.0);

    if reading.fast_ema > reading.slow_ema && reading.rsi > config.rsi_threshold && macd_long {
        return Direction::Long;
    }

    if reading.fast_ema < reading.slow_ema && reading.rsi < config.rsi_threshold && macd_short {
        return Direction::Short;
    }

    Direction::Neutral
}

/// Analyze a closing-price window and generate a direction
pub fn analyze_trend(closes: &[f64], config: &SignalConfig) -> Option<Direction> {
    let reading = read_indicators(closes, config)?;
    let direction = decide_direction(&reading, config);

    tracing::debug!(
        fast_ema = reading.fast_ema,
        slow_ema = reading.slow_ema,
        rsi = reading.rsi,
        macd_histogram = ?reading.macd_histogram,
        ?direction,
        "Indicators"
    );

    Some(direction)
}
