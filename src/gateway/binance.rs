use std::collections::HashMap;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::RwLock;

use super::ExchangeGateway;
use crate::error::BotError;
use crate::models::{
    Balances, Candle, CurrencyBalance, OrderAck, OrderSide, Position, PositionSide, Ticker,
};
use crate::Result;

// Binance USDⓈ-M Futures REST API
// Docs: https://developers.binance.com/docs/derivatives/usds-margined-futures
pub const BINANCE_FUTURES_API: &str = "https://fapi.binance.com";
const REQUEST_TIMEOUT_SECS: u64 = 30;

type HmacSha256 = Hmac<Sha256>;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Connection settings for the Binance futures client
#[derive(Debug, Clone)]
pub struct BinanceSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub recv_window_ms: u64,
    pub requests_per_second: u32,
}

impl BinanceSettings {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            base_url: BINANCE_FUTURES_API.to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            recv_window_ms: 60_000,
            requests_per_second: 10,
        }
    }
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: String,
        #[serde(rename = "minQty")]
        min_qty: String,
    },
    #[serde(rename = "MARKET_LOT_SIZE")]
    MarketLotSize {
        #[serde(rename = "stepSize")]
        step_size: String,
        #[serde(rename = "minQty")]
        min_qty: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    asset: String,
    balance: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
    mark_price: String,
    un_realized_profit: String,
    #[serde(default)]
    leverage: Option<String>,
    // BOTH in one-way mode, LONG/SHORT in hedge mode
    #[serde(default)]
    position_side: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    symbol: String,
    orig_qty: String,
}

// ============== Lot sizes ==============

/// Quantity rules for market orders on one symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotSize {
    pub step_size: Decimal,
    pub min_qty: Decimal,
}

impl LotSize {
    /// Floor `quantity` to the step size
    ///
    /// Returns `None` when the rounded quantity is below the minimum lot.
    pub fn round_quantity(&self, quantity: f64) -> Option<Decimal> {
        let qty = Decimal::from_f64(quantity)?;
        let rounded = if self.step_size > Decimal::ZERO {
            (qty / self.step_size).floor() * self.step_size
        } else {
            qty
        };

        if rounded <= Decimal::ZERO || rounded < self.min_qty {
            None
        } else {
            Some(rounded.normalize())
        }
    }
}

fn lot_size_from_filters(filters: &[SymbolFilter]) -> Option<LotSize> {
    // MARKET_LOT_SIZE governs market orders; fall back to LOT_SIZE
    let pick = |market: bool| {
        filters.iter().find_map(|f| match (f, market) {
            (SymbolFilter::MarketLotSize { step_size, min_qty }, true)
            | (SymbolFilter::LotSize { step_size, min_qty }, false) => Some((step_size, min_qty)),
            _ => None,
        })
    };

    let (step, min) = pick(true)
        .filter(|(step, _)| Decimal::from_str(step).map_or(false, |s| s > Decimal::ZERO))
        .or_else(|| pick(false))?;

    Some(LotSize {
        step_size: Decimal::from_str(step).ok()?,
        min_qty: Decimal::from_str(min).ok()?,
    })
}

// ============== Parsing helpers ==============

fn parse_f64(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| BotError::gateway(format!("bad number in {}: {:?}", field, value)))
}

/// Parse one kline row: `[openTime, open, high, low, close, volume, ...]`
fn parse_kline(row: &[serde_json::Value]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(BotError::gateway(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| BotError::gateway("kline open time is not an integer"))?;
    let timestamp = Utc
        .timestamp_millis_opt(open_time)
        .single()
        .ok_or_else(|| BotError::gateway(format!("invalid kline time {}", open_time)))?;

    let num = |i: usize, name: &str| -> Result<f64> {
        match &row[i] {
            serde_json::Value::String(s) => parse_f64(name, s),
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| BotError::gateway(format!("bad number in {}", name))),
            other => Err(BotError::gateway(format!(
                "unexpected {} value {}",
                name, other
            ))),
        }
    };

    Ok(Candle {
        timestamp,
        open: num(1, "open")?,
        high: num(2, "high")?,
        low: num(3, "low")?,
        close: num(4, "close")?,
        volume: num(5, "volume")?,
    })
}

/// Open positions from a positionRisk snapshot
///
/// Binance lists every symbol, flat ones with a zero amount. Hedge mode
/// reports a LONG and a SHORT row per symbol, which the engine cannot
/// manage, so it is rejected.
fn open_positions(risks: Vec<PositionRisk>) -> Result<Vec<Position>> {
    if let Some(hedged) = risks
        .iter()
        .find(|r| matches!(r.position_side.as_deref(), Some("LONG") | Some("SHORT")))
    {
        return Err(BotError::gateway(format!(
            "Hedge mode position reported for {}; switch the account to one-way mode",
            hedged.symbol
        )));
    }

    let mut positions = Vec::new();
    for risk in risks {
        let position = position_from_risk(risk)?;
        if position.is_open() {
            positions.push(position);
        }
    }
    Ok(positions)
}

fn position_from_risk(risk: PositionRisk) -> Result<Position> {
    let amount = parse_f64("positionAmt", &risk.position_amt)?;
    let entry_price = parse_f64("entryPrice", &risk.entry_price)?;
    let mark_price = parse_f64("markPrice", &risk.mark_price)?;
    let unrealized = parse_f64("unRealizedProfit", &risk.un_realized_profit)?;
    let leverage = risk
        .leverage
        .as_deref()
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|l| *l > 0.0)
        .unwrap_or(1.0);

    let contracts = amount.abs();
    let margin = contracts * entry_price / leverage;
    let unrealized_pnl_percent = if margin > 0.0 {
        unrealized / margin * 100.0
    } else {
        0.0
    };

    Ok(Position {
        symbol: risk.symbol,
        side: if amount < 0.0 {
            PositionSide::Short
        } else {
            PositionSide::Long
        },
        entry_price,
        mark_price,
        contracts,
        unrealized_pnl_percent,
    })
}

/// HMAC-SHA256 signature of a query string, hex encoded
pub fn sign_query(secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::configuration(format!("invalid API secret: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

// ============== Client ==============

/// Client for Binance USDⓈ-M futures
///
/// This struct is cloneable to allow sharing across async tasks.
/// All clones share the same rate limiter and market metadata.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    settings: BinanceSettings,
    markets: Arc<RwLock<HashMap<String, LotSize>>>,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceFuturesClient {
    pub fn new(settings: BinanceSettings) -> Result<Self> {
        if settings.api_key.is_empty() || settings.api_secret.is_empty() {
            return Err(BotError::configuration(
                "Missing API credentials (BINANCE_API_KEY / BINANCE_API_SECRET)",
            ));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            settings,
            markets: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter,
        })
    }

    /// Lot size for a symbol, if markets were loaded
    pub async fn lot_size(&self, symbol: &str) -> Option<LotSize> {
        self.markets.read().await.get(symbol).copied()
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let query = encode_params(params);
        let url = if query.is_empty() {
            format!("{}{}", self.settings.base_url, path)
        } else {
            format!("{}{}?{}", self.settings.base_url, path, query)
        };
        self.send(Method::GET, path, &url, false).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut params = params.to_vec();
        params.push(("recvWindow", self.settings.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = encode_params(&params);
        let signature = sign_query(&self.settings.api_secret, &query)?;
        let url = format!(
            "{}{}?{}&signature={}",
            self.settings.base_url, path, query, signature
        );
        self.send(method, path, &url, true).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        url: &str,
        with_key: bool,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let mut request = self.client.request(method.clone(), url);
        if with_key {
            request = request.header("X-MBX-APIKEY", &self.settings.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<ApiError>(&body) {
                Ok(err) => format!("{} (code {})", err.msg, err.code),
                Err(_) => body,
            };
            return Err(BotError::gateway(format!(
                "{} {} failed with {}: {}",
                method, path, status, detail
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ExchangeGateway for BinanceFuturesClient {
    async fn load_markets(&self) -> Result<()> {
        let info: ExchangeInfo = self.public_get("/fapi/v1/exchangeInfo", &[]).await?;

        let markets: HashMap<String, LotSize> = info
            .symbols
            .into_iter()
            .filter_map(|s| lot_size_from_filters(&s.filters).map(|lot| (s.symbol, lot)))
            .collect();

        tracing::info!("Loaded {} futures markets", markets.len());
        *self.markets.write().await = markets;
        Ok(())
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        let entries: Vec<BalanceEntry> = self.signed(Method::GET, "/fapi/v2/balance", &[]).await?;

        let mut balances = Balances::default();
        for entry in entries {
            let total = parse_f64("balance", &entry.balance)?;
            let free = parse_f64("availableBalance", &entry.available_balance)?;
            balances.currencies.insert(
                entry.asset,
                CurrencyBalance {
                    free,
                    used: (total - free).max(0.0),
                    total,
                },
            );
        }
        Ok(balances)
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        let risks: Vec<PositionRisk> = self
            .signed(Method::GET, "/fapi/v2/positionRisk", &[])
            .await?;
        open_positions(risks)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .public_get(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let ticker: TickerPrice = self
            .public_get("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;

        Ok(Ticker {
            last: parse_f64("price", &ticker.price)?,
            symbol: ticker.symbol,
        })
    }

    async fn set_leverage(&self, leverage: u32, symbol: &str) -> Result<()> {
        let _: serde_json::Value = self
            .signed(
                Method::POST,
                "/fapi/v1/leverage",
                &[
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck> {
        let lot = self.lot_size(symbol).await.ok_or_else(|| {
            BotError::gateway(format!(
                "No market metadata for {} (markets not loaded or unknown symbol)",
                symbol
            ))
        })?;

        let rounded = lot.round_quantity(quantity).ok_or_else(|| {
            BotError::gateway(format!(
                "Quantity {} for {} is below minimum lot {} (step {})",
                quantity, symbol, lot.min_qty, lot.step_size
            ))
        })?;

        let client_order_id = format!("fb-{}", uuid::Uuid::new_v4().simple());
        let response: OrderResponse = self
            .signed(
                Method::POST,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.as_str().to_string()),
                    ("type", "MARKET".to_string()),
                    ("quantity", rounded.to_string()),
                    ("newClientOrderId", client_order_id),
                ],
            )
            .await?;

        Ok(OrderAck {
            order_id: response.order_id.to_string(),
            symbol: response.symbol,
            side,
            quantity: Decimal::from_str(&response.orig_qty)
                .ok()
                .and_then(|q| q.to_f64())
                .unwrap_or_else(|| rounded.to_f64().unwrap_or(quantity)),
        })
    }
}
