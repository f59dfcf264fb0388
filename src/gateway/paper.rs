use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::ExchangeGateway;
use crate::error::BotError;
use crate::models::{
    Balances, Candle, CurrencyBalance, OrderAck, OrderSide, Position, PositionSide, Ticker,
};
use crate::Result;

const DEFAULT_LEVERAGE: u32 = 1;

#[derive(Debug, Clone)]
struct PaperPosition {
    side: PositionSide,
    entry_price: f64,
    contracts: f64,
    margin: f64,
}

#[derive(Debug, Default)]
struct PaperState {
    wallet: f64,
    used: f64,
    positions: HashMap<String, PaperPosition>,
    candles: HashMap<String, Vec<Candle>>,
    prices: HashMap<String, f64>,
    leverage: HashMap<String, u32>,
    orders: Vec<OrderAck>,
    failing: HashSet<String>,
    markets_loaded: bool,
}

impl PaperState {
    fn price(&self, symbol: &str) -> Option<f64> {
        self.prices
            .get(symbol)
            .copied()
            .or_else(|| self.candles.get(symbol)?.last().map(|c| c.close))
    }

    fn check_symbol(&self, symbol: &str) -> Result<()> {
        if self.failing.contains(symbol) {
            return Err(BotError::gateway(format!("simulated failure for {}", symbol)));
        }
        Ok(())
    }

    fn realize(&mut self, symbol: &str, exit_price: f64, qty: f64) {
        let Some(pos) = self.positions.get_mut(symbol) else {
            return;
        };

        let pnl = match pos.side {
            PositionSide::Long => (exit_price - pos.entry_price) * qty,
            PositionSide::Short => (pos.entry_price - exit_price) * qty,
        };
        let released = pos.margin * (qty / pos.contracts);

        pos.contracts -= qty;
        pos.margin -= released;
        self.used -= released;
        self.wallet += pnl;

        if pos.contracts <= f64::EPSILON {
            self.positions.remove(symbol);
        }
    }

    fn add(&mut self, symbol: &str, side: PositionSide, price: f64, qty: f64) {
        let leverage = self
            .leverage
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_LEVERAGE);
        let margin = price * qty / leverage as f64;
        self.used += margin;

        let pos = self
            .positions
            .entry(symbol.to_string())
            .or_insert(PaperPosition {
                side,
                entry_price: price,
                contracts: 0.0,
                margin: 0.0,
            });

        let total = pos.contracts + qty;
        pos.entry_price = (pos.entry_price * pos.contracts + price * qty) / total;
        pos.contracts = total;
        pos.margin += margin;
    }
}

/// Simulated futures exchange held in memory
///
/// Market orders fill at the current ticker price (or the last candle close).
/// Used for dry runs and to drive the engine in tests.
pub struct PaperGateway {
    base_currency: String,
    history_limit: Option<usize>,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    pub fn new(base_currency: impl Into<String>, starting_balance: f64) -> Self {
        Self {
            base_currency: base_currency.into(),
            history_limit: None,
            state: Mutex::new(PaperState {
                wallet: starting_balance,
                ..Default::default()
            }),
        }
    }

    /// Keep at most `limit` candles per symbol, dropping the oldest
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit.max(1));
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperState> {
        // A poisoned lock only means a test panicked mid-update
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the candle history for a symbol (oldest first)
    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.lock().candles.insert(symbol.to_string(), candles);
    }

    /// Append one candle and move the price to its close
    pub fn push_candle(&self, symbol: &str, candle: Candle) {
        let mut state = self.lock();
        state.prices.insert(symbol.to_string(), candle.close);
        let candles = state.candles.entry(symbol.to_string()).or_default();
        candles.push(candle);
        if let Some(limit) = self.history_limit {
            let excess = candles.len().saturating_sub(limit);
            candles.drain(..excess);
        }
    }

    /// Set the last/mark price for a symbol
    pub fn set_price(&self, symbol: &str, price: f64) {
        self.lock().prices.insert(symbol.to_string(), price);
    }

    /// Seed an existing position as if it had been opened earlier
    pub fn seed_position(&self, symbol: &str, side: PositionSide, entry_price: f64, contracts: f64) {
        let mut state = self.lock();
        state.positions.insert(
            symbol.to_string(),
            PaperPosition {
                side,
                entry_price,
                contracts,
                margin: 0.0,
            },
        );
        state.prices.entry(symbol.to_string()).or_insert(entry_price);
    }

    /// Make every per-symbol call for `symbol` fail
    pub fn fail_symbol(&self, symbol: &str) {
        self.lock().failing.insert(symbol.to_string());
    }

    pub fn orders(&self) -> Vec<OrderAck> {
        self.lock().orders.clone()
    }

    pub fn leverage_for(&self, symbol: &str) -> Option<u32> {
        self.lock().leverage.get(symbol).copied()
    }

    pub fn markets_loaded(&self) -> bool {
        self.lock().markets_loaded
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn load_markets(&self) -> Result<()> {
        self.lock().markets_loaded = true;
        Ok(())
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        let state = self.lock();
        let mut balances = Balances::default();
        balances.currencies.insert(
            self.base_currency.clone(),
            CurrencyBalance {
                free: (state.wallet - state.used).max(0.0),
                used: state.used,
                total: state.wallet,
            },
        );
        Ok(balances)
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        let state = self.lock();
        let mut positions: Vec<Position> = state
            .positions
            .iter()
            .map(|(symbol, pos)| {
                let mark = state.price(symbol).unwrap_or(pos.entry_price);
                let leverage = state
                    .leverage
                    .get(symbol)
                    .copied()
                    .unwrap_or(DEFAULT_LEVERAGE);
                let mut position = Position {
                    symbol: symbol.clone(),
                    side: pos.side,
                    entry_price: pos.entry_price,
                    mark_price: mark,
                    contracts: pos.contracts,
                    unrealized_pnl_percent: 0.0,
                };
                position.unrealized_pnl_percent =
                    position.profit_ratio() * leverage as f64 * 100.0;
                position
            })
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn fetch_ohlcv(&self, symbol: &str, _timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let state = self.lock();
        state.check_symbol(symbol)?;

        let candles = state
            .candles
            .get(symbol)
            .map(|c| c[c.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default();
        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let state = self.lock();
        state.check_symbol(symbol)?;

        let last = state
            .price(symbol)
            .ok_or_else(|| BotError::gateway(format!("no price for {}", symbol)))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
        })
    }

    async fn set_leverage(&self, leverage: u32, symbol: &str) -> Result<()> {
        let mut state = self.lock();
        state.check_symbol(symbol)?;
        state.leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck> {
        let mut state = self.lock();
        state.check_symbol(symbol)?;

        if !(quantity > 0.0) {
            return Err(BotError::gateway(format!(
                "invalid quantity {} for {}",
                quantity, symbol
            )));
        }

        let price = state
            .price(symbol)
            .ok_or_else(|| BotError::gateway(format!("no price for {}", symbol)))?;

        let order_side = match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };

        let mut remaining = quantity;
        if let Some(existing) = state.positions.get(symbol).cloned() {
            if existing.side != order_side {
                let reduce = remaining.min(existing.contracts);
                state.realize(symbol, price, reduce);
                remaining -= reduce;
            }
        }
        if remaining > f64::EPSILON {
            state.add(symbol, order_side, price, remaining);
        }

        let ack = OrderAck {
            order_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
        };
        state.orders.push(ack.clone());

        tracing::debug!(symbol, ?side, quantity, price, "Paper order filled");
        Ok(ack)
    }
}
