use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::Candle;

#[derive(Debug, Clone)]
struct SeriesState {
    price: f64,
    last_timestamp: DateTime<Utc>,
}

/// Seeded random-walk candle generator for paper trading
///
/// Each symbol walks independently from its starting price with a small drift
/// and uniform noise, one candle per step.
pub struct SyntheticFeed {
    rng: StdRng,
    interval_minutes: i64,
    drift_per_candle: f64,
    noise_pct: f64,
    series: HashMap<String, SeriesState>,
}

impl SyntheticFeed {
    /// Create a new feed with a seed for reproducibility
    pub fn new(seed: u64, interval_minutes: i64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            interval_minutes,
            drift_per_candle: 0.0,
            noise_pct: 0.004, // ±0.4% per candle
            series: HashMap::new(),
        }
    }

    pub fn with_drift(mut self, drift_per_candle: f64) -> Self {
        self.drift_per_candle = drift_per_candle;
        self
    }

    pub fn with_noise(mut self, noise_pct: f64) -> Self {
        self.noise_pct = noise_pct;
        self
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Start a symbol and return `history` candles ending now
    pub fn seed_symbol(&mut self, symbol: &str, start_price: f64, history: usize) -> Vec<Candle> {
        let start_time = Utc::now() - Duration::minutes(history as i64 * self.interval_minutes);
        self.series.insert(
            symbol.to_string(),
            SeriesState {
                price: start_price,
                last_timestamp: start_time,
            },
        );

        (0..history).filter_map(|_| self.next_candle(symbol)).collect()
    }

    /// Advance a symbol by one candle
    pub fn next_candle(&mut self, symbol: &str) -> Option<Candle> {
        let interval = Duration::minutes(self.interval_minutes);
        let drift = self.drift_per_candle;
        let noise_pct = self.noise_pct;

        let noise = if noise_pct > 0.0 {
            self.rng.gen_range(-noise_pct..noise_pct)
        } else {
            0.0
        };
        let wick = self.rng.gen_range(0.0..=noise_pct.max(0.0));
        let volume = self.rng.gen_range(500.0..1500.0);

        let state = self.series.get_mut(symbol)?;
        let open = state.price;
        let close = (open * (1.0 + drift + noise)).max(f64::MIN_POSITIVE);
        state.price = close;
        state.last_timestamp += interval;

        Some(Candle {
            timestamp: state.last_timestamp,
            open,
            high: open.max(close) * (1.0 + wick),
            low: open.min(close) * (1.0 - wick),
            close,
            volume,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_series() {
        let mut a = SyntheticFeed::new(42, 15);
        let mut b = SyntheticFeed::new(42, 15);

        let ca: Vec<f64> = a.seed_symbol("BTCUSDC", 50_000.0, 50).iter().map(|c| c.close).collect();
        let cb: Vec<f64> = b.seed_symbol("BTCUSDC", 50_000.0, 50).iter().map(|c| c.close).collect();
        assert_eq!(ca, cb);
    }

    #[test]
    fn test_candles_are_ordered_and_consistent() {
        let mut feed = SyntheticFeed::new(7, 15);
        let candles = feed.seed_symbol("ETHUSDC", 3000.0, 100);

        assert_eq!(candles.len(), 100);
        for window in candles.windows(2) {
            assert_eq!(
                (window[1].timestamp - window[0].timestamp).num_minutes(),
                15
            );
            assert_eq!(window[1].open, window[0].close);
        }
        for c in &candles {
            assert!(c.high >= c.open.max(c.close));
            assert!(c.low <= c.open.min(c.close));
            assert!(c.close > 0.0);
        }
    }

    #[test]
    fn test_drift_without_noise_is_exact() {
        let mut feed = SyntheticFeed::new(1, 15).with_noise(0.0).with_drift(0.01);
        let candles = feed.seed_symbol("SOLUSDC", 100.0, 2);

        assert!((candles[0].close - 101.0).abs() < 1e-9);
        assert!((candles[1].close - 102.01).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_symbol() {
        let mut feed = SyntheticFeed::new(1, 15);
        assert!(feed.next_candle("NOPE").is_none());
    }
}
