// Core modules
pub mod backtest;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod memory;
pub mod models;
pub mod optimizer;
pub mod persistence;
pub mod regime;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{run_backtest, BacktestResult};
pub use error::EngineError;
pub use models::*;
pub use optimizer::run_optimization;
pub use regime::{detect_regime, MarketRegime};
pub use strategy::{generate_signal, StrategyParams};

// Error handling
pub type Result<T> = std::result::Result<T, EngineError>;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
