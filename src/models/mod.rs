use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OHLCV candlestick data, oldest first when in a series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Extract closing prices from candles
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Direction of an open futures position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that reduces a position of this direction
    pub fn closing_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

/// Open position snapshot as reported by the exchange
///
/// Read-only for the engine: changes happen by submitting orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub mark_price: f64,
    pub contracts: f64, // Absolute size, direction lives in `side`
    pub unrealized_pnl_percent: f64,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.contracts.abs() > 0.0
    }

    /// Unrealized profit as a ratio of entry price, signed by direction
    pub fn profit_ratio(&self) -> f64 {
        match self.side {
            PositionSide::Long => (self.mark_price - self.entry_price) / self.entry_price,
            PositionSide::Short => (self.entry_price - self.mark_price) / self.entry_price,
        }
    }
}

/// Funds for a single currency
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CurrencyBalance {
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

/// Account balances keyed by currency code
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Balances {
    pub currencies: HashMap<String, CurrencyBalance>,
}

impl Balances {
    pub fn get(&self, currency: &str) -> CurrencyBalance {
        self.currencies.get(currency).copied().unwrap_or_default()
    }

    pub fn free(&self, currency: &str) -> f64 {
        self.get(currency).free
    }

    /// Currencies holding a positive total, sorted by code
    pub fn funded(&self) -> Vec<(&str, f64)> {
        let mut funded: Vec<(&str, f64)> = self
            .currencies
            .iter()
            .filter(|(_, b)| b.total > 0.0)
            .map(|(code, b)| (code.as_str(), b.total))
            .collect();
        funded.sort_by(|a, b| a.0.cmp(b.0));
        funded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub last: f64,
}

/// Trading signal direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// Order side that opens a position in this direction
    pub fn opening_side(self) -> Option<OrderSide> {
        match self {
            Direction::Long => Some(OrderSide::Buy),
            Direction::Short => Some(OrderSide::Sell),
            Direction::Neutral => None,
        }
    }
}

/// Directional signal for one symbol, recomputed every cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Exchange acknowledgement of a submitted market order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(side: PositionSide, entry: f64, mark: f64) -> Position {
        Position {
            symbol: "BTCUSDC".to_string(),
            side,
            entry_price: entry,
            mark_price: mark,
            contracts: 0.01,
            unrealized_pnl_percent: 0.0,
        }
    }

    #[test]
    fn test_profit_ratio_long() {
        let pos = position(PositionSide::Long, 100.0, 115.0);
        assert!((pos.profit_ratio() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_profit_ratio_short() {
        let pos = position(PositionSide::Short, 100.0, 90.0);
        assert!((pos.profit_ratio() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_closing_side_is_opposite() {
        assert_eq!(PositionSide::Long.closing_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.closing_side(), OrderSide::Buy);
    }

    #[test]
    fn test_neutral_has_no_order_side() {
        assert_eq!(Direction::Long.opening_side(), Some(OrderSide::Buy));
        assert_eq!(Direction::Short.opening_side(), Some(OrderSide::Sell));
        assert_eq!(Direction::Neutral.opening_side(), None);
    }

    #[test]
    fn test_balances_missing_currency_is_zero() {
        let mut balances = Balances::default();
        balances.currencies.insert(
            "USDC".to_string(),
            CurrencyBalance {
                free: 800.0,
                used: 200.0,
                total: 1000.0,
            },
        );

        assert_eq!(balances.free("USDC"), 800.0);
        assert_eq!(balances.free("USDT"), 0.0);
        assert_eq!(balances.funded(), vec![("USDC", 1000.0)]);
    }
}
