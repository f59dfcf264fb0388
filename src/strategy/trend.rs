use super::{
    signals::{analyze_trend, SignalConfig},
    Strategy,
};
use crate::error::BotError;
use crate::models::{closes, Candle, Signal};
use crate::Result;

/// EMA crossover trend strategy with RSI (and optional MACD) confirmation
///
/// This strategy identifies trend direction using:
/// - Fast/slow EMA crossover for trend direction
/// - RSI above/below the threshold for momentum
/// - MACD above/below its signal line when strict confirmation is enabled
#[derive(Debug, Clone)]
pub struct TrendStrategy {
    config: SignalConfig,
}

impl TrendStrategy {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }
}

impl Default for TrendStrategy {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

impl Strategy for TrendStrategy {
    fn generate_signal(&self, symbol: &str, candles: &[Candle]) -> Result<Signal> {
        let need = self.min_candles_required();
        if candles.len() < need {
            return Err(BotError::InsufficientData {
                symbol: symbol.to_string(),
                have: candles.len(),
                need,
            });
        }

        let prices = closes(candles);
        let direction =
            analyze_trend(&prices, &self.config).ok_or_else(|| BotError::InsufficientData {
                symbol: symbol.to_string(),
                have: candles.len(),
                need,
            })?;

        Ok(Signal {
            symbol: symbol.to_string(),
            direction,
        })
    }

    fn name(&self) -> &str {
        "TrendStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.config.min_closes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use chrono::Utc;

    fn create_test_candles(prices: &[f64]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| Candle {
                timestamp: Utc::now() - chrono::Duration::minutes((prices.len() - i) as i64 * 15),
                open: price,
                high: price * 1.01,
                low: price * 0.99,
                close: price,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_strategy_requires_sufficient_data() {
        let strategy = TrendStrategy::default();
        let prices: Vec<f64> = (0..8).map(|i| 100.0 + i as f64).collect();
        let candles = create_test_candles(&prices);

        let result = strategy.generate_signal("BTCUSDC", &candles);
        assert!(matches!(
            result,
            Err(BotError::InsufficientData { have: 8, need: 21, .. })
        ));
    }

    #[test]
    fn test_uptrend_is_long() {
        let strategy = TrendStrategy::default();
        let prices: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();

        let signal = strategy
            .generate_signal("BTCUSDC", &create_test_candles(&prices))
            .unwrap();
        assert_eq!(signal.symbol, "BTCUSDC");
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn test_downtrend_is_short() {
        let strategy = TrendStrategy::default();
        let prices: Vec<f64> = (0..100).map(|i| 300.0 - i as f64 * 2.0).collect();

        let signal = strategy
            .generate_signal("ETHUSDC", &create_test_candles(&prices))
            .unwrap();
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn test_sideways_market_is_neutral() {
        let strategy = TrendStrategy::default();
        // Alternating window: 7 gains and 7 losses of equal size, RSI exactly 50
        let prices: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 102.0 })
            .collect();

        let signal = strategy
            .generate_signal("SOLUSDC", &create_test_candles(&prices))
            .unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
    }

    #[test]
    fn test_signal_is_deterministic() {
        let strategy = TrendStrategy::default();
        let prices: Vec<f64> = (0..100)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect();
        let candles = create_test_candles(&prices);

        let first = strategy.generate_signal("BTCUSDC", &candles).unwrap();
        for _ in 0..10 {
            assert_eq!(strategy.generate_signal("BTCUSDC", &candles).unwrap(), first);
        }
    }

    #[test]
    fn test_min_candles_required() {
        let strategy = TrendStrategy::default();
        assert_eq!(strategy.min_candles_required(), 21);

        let strategy = TrendStrategy::new(SignalConfig {
            slow_ema_period: 10,
            rsi_period: 14,
            ..Default::default()
        });
        assert_eq!(strategy.min_candles_required(), 15);
    }

    #[test]
    fn test_strategy_name() {
        assert_eq!(TrendStrategy::default().name(), "TrendStrategy");
    }
}
