/// Calculate Relative Strength Index (RSI)
///
/// Sums the last `period` price differences: non-negative changes count as
/// gain, negative changes (absolute) as loss.
///
/// Values:
/// - RSI > 50: gains dominate the window
/// - RSI < 50: losses dominate the window
///
/// A window without losses is exactly 100.
///
/// Returns `None` when fewer than `period + 1` prices are available.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let start = prices.len() - period;
    let (gain, loss) = (start..prices.len()).fold((0.0, 0.0), |(gain, loss), i| {
        let change = prices[i] - prices[i - 1];
        if change >= 0.0 {
            (gain + change, loss)
        } else {
            (gain, loss + change.abs())
        }
    });

    if loss == 0.0 {
        return Some(100.0);
    }

    let rs = gain / loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}
