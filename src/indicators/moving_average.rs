/// Calculate the Exponential Moving Average (EMA) series
///
/// Output has the same length as the input. The first value seeds the
/// average directly (no SMA warm-up), then each step applies
/// `ema[i] = price[i] * k + ema[i - 1] * (1 - k)` with `k = 2 / (period + 1)`.
///
/// Returns an empty vector for empty input.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = prices.first() else {
        return Vec::new();
    };

    let multiplier = 2.0 / (period as f64 + 1.0);

    let mut series = Vec::with_capacity(prices.len());
    series.push(first);

    for price in &prices[1..] {
        let prev = series[series.len() - 1];
        series.push(price * multiplier + prev * (1.0 - multiplier));
    }

    series
}

/// Latest EMA value, `None` when there are no prices
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).last().copied()
}
