use super::moving_average::ema_series;
use serde::{Deserialize, Serialize};

/// MACD periods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MacdConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        }
    }
}

/// Latest MACD and signal line values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd_line: f64,
    pub signal_line: f64,
}

impl Macd {
    pub fn histogram(&self) -> f64 {
        self.macd_line - self.signal_line
    }
}

/// Calculate Moving Average Convergence/Divergence
///
/// The MACD line is the fast EMA minus the slow EMA over their overlapping
/// suffix; the signal line is an EMA of the MACD line. Only the latest values
/// are reported.
pub fn calculate_macd(prices: &[f64], config: &MacdConfig) -> Option<Macd> {
    let fast = ema_series(prices, config.fast_period);
    let slow = ema_series(prices, config.slow_period);

    let overlap = fast.len().min(slow.len());
    if overlap == 0 {
        return None;
    }

    let macd_line: Vec<f64> = fast[fast.len() - overlap..]
        .iter()
        .zip(&slow[slow.len() - overlap..])
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&macd_line, config.signal_period);

    Some(Macd {
        macd_line: *macd_line.last()?,
        signal_line: *signal_line.last()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_empty() {
        assert!(calculate_macd(&[], &MacdConfig::default()).is_none());
    }

    #[test]
    fn test_macd_single_price_is_zero() {
        let macd = calculate_macd(&[100.0], &MacdConfig::default()).unwrap();
        assert_eq!(macd.macd_line, 0.0);
        assert_eq!(macd.signal_line, 0.0);
    }

    #[test]
    fn test_macd_uptrend_above_signal() {
        let prices: Vec<f64> = (0..100).map(|i| 100.0 + i as f64 * 0.5).collect();
        let macd = calculate_macd(&prices, &MacdConfig::default()).unwrap();

        assert!(macd.macd_line > 0.0);
        assert!(macd.macd_line > macd.signal_line);
        assert!(macd.histogram() > 0.0);
    }

    #[test]
    fn test_macd_downtrend_below_signal() {
        let prices: Vec<f64> = (0..100).map(|i| 200.0 - i as f64 * 0.5).collect();
        let macd = calculate_macd(&prices, &MacdConfig::default()).unwrap();

        assert!(macd.macd_line < 0.0);
        assert!(macd.macd_line < macd.signal_line);
    }

    #[test]
    fn test_macd_flat_is_zero() {
        let prices = vec![50.0; 60];
        let macd = calculate_macd(&prices, &MacdConfig::default()).unwrap();
        assert!(macd.macd_line.abs() < 1e-9);
        assert!(macd.signal_line.abs() < 1e-9);
    }
}
