// Exchange connectivity behind a narrow async interface
pub mod binance;
pub mod paper;
pub mod synthetic;

pub use binance::BinanceFuturesClient;
pub use paper::PaperGateway;
pub use synthetic::SyntheticFeed;

use async_trait::async_trait;

use crate::models::{Balances, Candle, OrderAck, OrderSide, Position, Ticker};
use crate::Result;

/// Everything the engine needs from a futures exchange
///
/// Implementations return typed snapshots; transport and exchange failures
/// surface as `BotError::Gateway`.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// One-time warm-up before the first cycle (symbol metadata, lot sizes)
    async fn load_markets(&self) -> Result<()>;

    async fn fetch_balance(&self) -> Result<Balances>;

    /// All positions on the account; closed ones may appear with zero size
    async fn fetch_positions(&self) -> Result<Vec<Position>>;

    /// Candles oldest first; may return fewer than `limit`
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize)
        -> Result<Vec<Candle>>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker>;

    /// Idempotent
    async fn set_leverage(&self, leverage: u32, symbol: &str) -> Result<()>;

    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck>;
}
