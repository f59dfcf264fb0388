use crate::error::BotError;
use crate::Result;

/// Calculate order quantity from margin balance, risk fraction and leverage
///
/// `quantity = balance * risk_per_trade * leverage / price`
///
/// No lot-size rounding happens here; exchange step sizes are applied at the
/// gateway.
///
/// # Example
/// ```
/// use futuresbot::risk::position_size;
///
/// // 1000 USDC, 5% risk, 5x leverage, BTC at 50k
/// let qty = position_size(1000.0, 50_000.0, 0.05, 5).unwrap();
/// assert!((qty - 0.005).abs() < 1e-12);
/// ```
pub fn position_size(balance: f64, price: f64, risk_per_trade: f64, leverage: u32) -> Result<f64> {
    if !balance.is_finite() || balance < 0.0 {
        return Err(BotError::Sizing(format!("invalid balance {}", balance)));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(BotError::Sizing(format!("invalid price {}", price)));
    }

    let margin = balance * risk_per_trade;
    Ok((margin * leverage as f64) / price)
}
