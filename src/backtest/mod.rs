pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::{profit_factor, sharpe_ratio, BacktestResult, TradeTally};
pub use runner::{run_backtest, BacktestRunner, ExitReason, FEE_RATE, STARTING_BALANCE};
pub use synthetic::{MarketScenario, SyntheticDataGenerator, INTERVAL_MS};
