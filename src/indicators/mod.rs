// Technical indicators module
// Series-valued SMA, EMA, RSI, Bollinger Bands and ADX, aligned with their input

pub mod adx;
pub mod bollinger;
pub mod moving_average;
pub mod rsi;

pub use adx::calculate_adx;
pub use bollinger::{calculate_bollinger, BollingerBand};
pub use moving_average::{calculate_ema, calculate_sma, last_sma};
pub use rsi::calculate_rsi;
