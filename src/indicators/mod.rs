// Technical indicators module
// Implements EMA, RSI, MACD over closing-price series

pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use macd::{calculate_macd, Macd, MacdConfig};
pub use moving_average::{calculate_ema, ema_series};
pub use rsi::calculate_rsi;
