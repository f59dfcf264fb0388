use thiserror::Error;

/// Errors raised by the trading engine and its gateways
#[derive(Debug, Error)]
pub enum BotError {
    /// Fewer candles than an indicator needs. The symbol is skipped for this cycle.
    #[error("Insufficient data for {symbol}: {have} candles, need {need}")]
    InsufficientData {
        symbol: String,
        have: usize,
        need: usize,
    },

    /// Network, auth, rate-limit or exchange-side failure
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Missing credentials or invalid values at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sizing error: {0}")]
    Sizing(String),

    /// Startup balance check failed; retried after one interval
    #[error("Insufficient capital: {have:.2} {currency}, need at least {need:.2}")]
    InsufficientCapital {
        currency: String,
        have: f64,
        need: f64,
    },
}

impl BotError {
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for errors that only affect a single symbol
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        Self::Gateway(e.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        Self::Gateway(format!("Malformed exchange response: {}", e))
    }
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = BotError::InsufficientData {
            symbol: "BTCUSDC".to_string(),
            have: 8,
            need: 15,
        };

        assert!(err.is_insufficient_data());
        assert_eq!(
            err.to_string(),
            "Insufficient data for BTCUSDC: 8 candles, need 15"
        );
    }

    #[test]
    fn test_gateway_error_is_not_data_error() {
        let err = BotError::gateway("timeout");
        assert!(!err.is_insufficient_data());
        assert!(err.to_string().contains("timeout"));
    }
}
