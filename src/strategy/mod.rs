// Regime-aware rule set and its tunable parameters
pub mod params;
pub mod signals;

pub use params::StrategyParams;
pub use signals::{generate_signal, MIN_SIGNAL_CANDLES};
