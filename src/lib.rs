// Core modules
pub mod config;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod health;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use config::BotConfig;
pub use error::BotError;
pub use execution::{CycleReport, ReconciliationScheduler};
pub use gateway::ExchangeGateway;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
