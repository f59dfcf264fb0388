use std::collections::HashMap;
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::error::BotError;
use crate::execution::trailing::TrailingConfig;
use crate::gateway::binance::{BinanceSettings, BINANCE_FUTURES_API};
use crate::risk::ProtectiveStops;
use crate::strategy::signals::SignalConfig;
use crate::Result;

pub const DEFAULT_CONFIG_FILE: &str = "futuresbot.toml";

// Binance caps USDⓈ-M leverage at 125x
const MAX_LEVERAGE: u32 = 125;

// Environment variable -> config key
const ENV_KEYS: &[(&str, &str)] = &[
    ("LEVERAGE", "leverage"),
    ("RISK_PER_TRADE", "risk_per_trade"),
    ("CHECK_INTERVAL", "cycle_interval_minutes"),
    ("BASE_CURRENCY", "base_currency"),
    ("MAX_POSITIONS", "max_concurrent_positions"),
    ("BINANCE_API_KEY", "api_key"),
    ("BINANCE_API_SECRET", "api_secret"),
    ("BINANCE_REST_URL", "rest_url"),
    ("TIMEFRAME", "timeframe"),
    ("CANDLE_LIMIT", "candle_limit"),
    ("MIN_CAPITAL", "min_capital"),
    ("PORT", "health_port"),
    ("PAPER_TRADING", "paper"),
];

/// Bot configuration, immutable once loaded
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub leverage: u32,
    pub risk_per_trade: f64, // Fraction of free balance per entry (0.05 = 5%)
    pub cycle_interval_minutes: u64,
    pub base_currency: String,
    pub max_concurrent_positions: usize,
    pub watchlist: Vec<String>,

    pub api_key: String,
    pub api_secret: String,
    pub rest_url: String,
    pub recv_window_ms: u64,
    pub requests_per_second: u32,

    pub timeframe: String,
    pub candle_limit: usize,
    pub min_capital: f64,
    pub health_port: u16,

    pub paper: bool,
    pub paper_starting_balance: f64,

    pub signal: SignalConfig,
    pub trailing: TrailingConfig,
    pub protective: ProtectiveStops,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            leverage: 5,
            risk_per_trade: 0.05,
            cycle_interval_minutes: 5,
            base_currency: "USDC".to_string(),
            max_concurrent_positions: 3,
            watchlist: vec![
                "BTCUSDC".to_string(),
                "ETHUSDC".to_string(),
                "SOLUSDC".to_string(),
            ],
            api_key: String::new(),
            api_secret: String::new(),
            rest_url: BINANCE_FUTURES_API.to_string(),
            recv_window_ms: 60_000,
            requests_per_second: 10,
            timeframe: "15m".to_string(),
            candle_limit: 100,
            min_capital: 100.0,
            health_port: 3000,
            paper: false,
            paper_starting_balance: 1_000.0,
            signal: SignalConfig::default(),
            trailing: TrailingConfig::default(),
            protective: ProtectiveStops::default(),
        }
    }
}

impl BotConfig {
    /// Load from `.env`-populated process environment and an optional TOML file
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let (file, required) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };
        Self::from_sources(Some((file, required)), &env)
    }

    /// Layer defaults, then the file, then environment overrides
    pub fn from_sources(
        file: Option<(&Path, bool)>,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some((path, required)) = file {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(required),
            );
        }

        for (var, key) in ENV_KEYS {
            let value = env.get(*var).map(|v| v.trim()).filter(|v| !v.is_empty());
            builder = builder.set_override_option(*key, value.map(str::to_string))?;
        }

        if let Some(list) = env.get("WATCHLIST").filter(|v| !v.trim().is_empty()) {
            let symbols: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            builder = builder.set_override("watchlist", symbols)?;
        }

        let mut config: BotConfig = builder.build()?.try_deserialize()?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        self.base_currency = self.base_currency.trim().to_uppercase();

        let mut seen = Vec::with_capacity(self.watchlist.len());
        for symbol in &self.watchlist {
            let native = normalize_symbol(symbol);
            if !native.is_empty() && !seen.contains(&native) {
                seen.push(native);
            }
        }
        self.watchlist = seen;
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.paper && (self.api_key.is_empty() || self.api_secret.is_empty()) {
            return Err(BotError::configuration(
                "Missing API credentials: set BINANCE_API_KEY and BINANCE_API_SECRET (or run with --paper)",
            ));
        }
        if self.leverage == 0 || self.leverage > MAX_LEVERAGE {
            return Err(BotError::configuration(format!(
                "leverage must be between 1 and {}, got {}",
                MAX_LEVERAGE, self.leverage
            )));
        }
        if !(self.risk_per_trade > 0.0 && self.risk_per_trade <= 1.0) {
            return Err(BotError::configuration(format!(
                "risk_per_trade must be in (0, 1], got {}",
                self.risk_per_trade
            )));
        }
        if self.cycle_interval_minutes == 0 {
            return Err(BotError::configuration("cycle interval must be at least 1 minute"));
        }
        if self.max_concurrent_positions == 0 {
            return Err(BotError::configuration("max_concurrent_positions must be positive"));
        }
        if self.watchlist.is_empty() {
            return Err(BotError::configuration("watchlist is empty"));
        }
        if self.base_currency.is_empty() {
            return Err(BotError::configuration("base_currency is empty"));
        }
        self.validate_signal()?;
        self.validate_exits()?;
        if self.candle_limit < self.signal.min_closes() {
            return Err(BotError::configuration(format!(
                "candle_limit {} is below the {} closes the signal needs",
                self.candle_limit,
                self.signal.min_closes()
            )));
        }
        Ok(())
    }

    fn validate_signal(&self) -> Result<()> {
        let signal = &self.signal;
        let periods = [
            ("signal.fast_ema_period", signal.fast_ema_period),
            ("signal.slow_ema_period", signal.slow_ema_period),
            ("signal.rsi_period", signal.rsi_period),
            ("signal.macd.fast_period", signal.macd.fast_period),
            ("signal.macd.slow_period", signal.macd.slow_period),
            ("signal.macd.signal_period", signal.macd.signal_period),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, period)| *period == 0) {
            return Err(BotError::configuration(format!("{} must be positive", name)));
        }
        if signal.fast_ema_period >= signal.slow_ema_period {
            return Err(BotError::configuration(format!(
                "signal.fast_ema_period ({}) must be below signal.slow_ema_period ({})",
                signal.fast_ema_period, signal.slow_ema_period
            )));
        }
        if signal.macd.fast_period >= signal.macd.slow_period {
            return Err(BotError::configuration(format!(
                "signal.macd.fast_period ({}) must be below signal.macd.slow_period ({})",
                signal.macd.fast_period, signal.macd.slow_period
            )));
        }
        if !signal.rsi_threshold.is_finite() || !(0.0..=100.0).contains(&signal.rsi_threshold) {
            return Err(BotError::configuration(format!(
                "signal.rsi_threshold must be in [0, 100], got {}",
                signal.rsi_threshold
            )));
        }
        Ok(())
    }

    fn validate_exits(&self) -> Result<()> {
        if !(self.trailing.activation_pct.is_finite() && self.trailing.activation_pct > 0.0) {
            return Err(BotError::configuration(format!(
                "trailing.activation_pct must be positive, got {}",
                self.trailing.activation_pct
            )));
        }
        if !(self.trailing.retracement_pct > 0.0 && self.trailing.retracement_pct < 1.0) {
            return Err(BotError::configuration(format!(
                "trailing.retracement_pct must be in (0, 1), got {}",
                self.trailing.retracement_pct
            )));
        }
        let levels = [
            ("protective.stop_loss_pct", self.protective.stop_loss_pct),
            ("protective.take_profit_pct", self.protective.take_profit_pct),
        ];
        for (name, level) in levels {
            if let Some(pct) = level {
                if !(pct.is_finite() && pct > 0.0) {
                    return Err(BotError::configuration(format!(
                        "{} must be positive, got {}",
                        name, pct
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cycle_interval_minutes * 60)
    }

    pub fn binance_settings(&self) -> BinanceSettings {
        BinanceSettings {
            base_url: self.rest_url.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            recv_window_ms: self.recv_window_ms,
            requests_per_second: self.requests_per_second,
        }
    }
}

/// Convert `BTC/USDC` or `BTC/USDC:USDC` into the exchange-native `BTCUSDC`
pub fn normalize_symbol(symbol: &str) -> String {
    let pair = symbol.split(':').next().unwrap_or(symbol);
    pair.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::from_sources(None, &HashMap::new()).unwrap();

        assert_eq!(config.leverage, 5);
        assert_eq!(config.risk_per_trade, 0.05);
        assert_eq!(config.cycle_interval_minutes, 5);
        assert_eq!(config.max_concurrent_positions, 3);
        assert_eq!(config.base_currency, "USDC");
        assert_eq!(config.watchlist, vec!["BTCUSDC", "ETHUSDC", "SOLUSDC"]);
        assert_eq!(config.timeframe, "15m");
        assert_eq!(config.candle_limit, 100);
        assert_eq!(config.health_port, 3000);
        assert_eq!(config.trailing.activation_pct, 0.12);
        assert!(!config.protective.is_configured());
    }

    #[test]
    fn test_env_overrides() {
        let config = BotConfig::from_sources(
            None,
            &env(&[
                ("LEVERAGE", "10"),
                ("RISK_PER_TRADE", "0.03"),
                ("CHECK_INTERVAL", "15"),
                ("PORT", "8080"),
                ("BINANCE_API_KEY", "key"),
                ("BINANCE_API_SECRET", "secret"),
                ("WATCHLIST", "BTC/USDC:USDC, eth/usdc,BTCUSDC"),
            ]),
        )
        .unwrap();

        assert_eq!(config.leverage, 10);
        assert_eq!(config.risk_per_trade, 0.03);
        assert_eq!(config.cycle_interval_minutes, 15);
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.api_key, "key");
        // Normalized and deduplicated, order kept
        assert_eq!(config.watchlist, vec!["BTCUSDC", "ETHUSDC"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let config = BotConfig::from_sources(None, &env(&[("LEVERAGE", "  ")])).unwrap();
        assert_eq!(config.leverage, 5);
    }

    #[test]
    fn test_missing_credentials_rejected_unless_paper() {
        let mut config = BotConfig::default();
        assert!(matches!(config.validate(), Err(BotError::Configuration(_))));

        config.paper = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = BotConfig {
            paper: true,
            ..BotConfig::default()
        };

        let cases = [
            BotConfig { leverage: 0, ..base.clone() },
            BotConfig { risk_per_trade: 0.0, ..base.clone() },
            BotConfig { risk_per_trade: 1.5, ..base.clone() },
            BotConfig { cycle_interval_minutes: 0, ..base.clone() },
            BotConfig { watchlist: vec![], ..base.clone() },
            BotConfig { candle_limit: 10, ..base.clone() },
        ];

        for config in cases {
            assert!(matches!(config.validate(), Err(BotError::Configuration(_))));
        }
    }

    #[test]
    fn test_invalid_signal_settings_rejected() {
        let base = BotConfig {
            paper: true,
            ..BotConfig::default()
        };
        let signal = |f: fn(&mut SignalConfig)| {
            let mut config = base.clone();
            f(&mut config.signal);
            config
        };

        let cases = [
            ("rsi_period", signal(|s| s.rsi_period = 0)),
            ("fast_ema_period", signal(|s| s.fast_ema_period = 0)),
            ("slow_ema_period", signal(|s| s.slow_ema_period = 0)),
            ("macd.fast_period", signal(|s| s.macd.fast_period = 0)),
            ("macd.slow_period", signal(|s| s.macd.slow_period = 0)),
            ("macd.signal_period", signal(|s| s.macd.signal_period = 0)),
            ("fast == slow", signal(|s| s.fast_ema_period = 21)),
            ("fast > slow", signal(|s| s.fast_ema_period = 30)),
            ("macd fast > slow", signal(|s| s.macd.fast_period = 30)),
            ("rsi_threshold", signal(|s| s.rsi_threshold = 150.0)),
        ];

        for (name, config) in cases {
            assert!(
                matches!(config.validate(), Err(BotError::Configuration(_))),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_invalid_exit_settings_rejected() {
        let base = BotConfig {
            paper: true,
            ..BotConfig::default()
        };
        let trailing = |activation_pct: f64, retracement_pct: f64| BotConfig {
            trailing: TrailingConfig {
                activation_pct,
                retracement_pct,
            },
            ..base.clone()
        };
        let protective = |stop_loss_pct: Option<f64>, take_profit_pct: Option<f64>| BotConfig {
            protective: ProtectiveStops {
                stop_loss_pct,
                take_profit_pct,
                enforce: true,
            },
            ..base.clone()
        };

        let cases = [
            ("activation 0", trailing(0.0, 0.03)),
            ("activation negative", trailing(-0.1, 0.03)),
            ("retracement 0", trailing(0.12, 0.0)),
            ("retracement 1", trailing(0.12, 1.0)),
            ("retracement 1.5", trailing(0.12, 1.5)),
            ("stop loss 0", protective(Some(0.0), None)),
            ("stop loss negative", protective(Some(-0.05), None)),
            ("take profit 0", protective(None, Some(0.0))),
            ("take profit negative", protective(Some(0.05), Some(-0.2))),
        ];

        for (name, config) in cases {
            assert!(
                matches!(config.validate(), Err(BotError::Configuration(_))),
                "{} should be rejected",
                name
            );
        }

        assert!(protective(Some(0.05), Some(0.2)).validate().is_ok());
        assert!(trailing(0.2, 0.5).validate().is_ok());
    }

    #[test]
    fn test_unparseable_env_is_configuration_error() {
        let result = BotConfig::from_sources(None, &env(&[("LEVERAGE", "lots")]));
        assert!(matches!(result, Err(BotError::Configuration(_))));
    }

    #[test]
    fn test_toml_file_layer() {
        let path = std::env::temp_dir().join(format!("futuresbot-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
leverage = 3
watchlist = ["BTC/USDC", "SOL/USDC"]

[signal]
require_macd_confirmation = true

[trailing]
activation_pct = 0.08

[protective]
stop_loss_pct = 0.05
enforce = true
"#,
        )
        .unwrap();

        let config =
            BotConfig::from_sources(Some((path.as_path(), true)), &env(&[("LEVERAGE", "7")])).unwrap();
        std::fs::remove_file(&path).ok();

        // Env wins over file
        assert_eq!(config.leverage, 7);
        assert_eq!(config.watchlist, vec!["BTCUSDC", "SOLUSDC"]);
        assert!(config.signal.require_macd_confirmation);
        assert_eq!(config.signal.fast_ema_period, 9);
        assert_eq!(config.trailing.activation_pct, 0.08);
        assert_eq!(config.trailing.retracement_pct, 0.03);
        assert_eq!(config.protective.stop_loss_pct, Some(0.05));
        assert!(config.protective.enforce);
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("BTC/USDC"), "BTCUSDC");
        assert_eq!(normalize_symbol("BTC/USDC:USDC"), "BTCUSDC");
        assert_eq!(normalize_symbol("solusdc"), "SOLUSDC");
    }
}
