use serde::{Deserialize, Serialize};

/// Longest lookback any period gene may take
pub const MAX_PERIOD: usize = 200;

/// Gap kept between the short and long EMA periods
const EMA_SPREAD: usize = 5;

/// Tunable knobs of the regime-aware rule set
///
/// Periods are bar counts, RSI levels are on the 0-100 scale and the risk
/// fields are fractions of the entry price (0.02 = 2%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParams {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub rsi_trend_buy_threshold: f64,
    pub rsi_trend_sell_threshold: f64,
    pub ema_short: usize,
    pub ema_long: usize,
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            rsi_trend_buy_threshold: 45.0,
            rsi_trend_sell_threshold: 55.0,
            ema_short: 9,
            ema_long: 21,
            adx_period: 14,
            adx_threshold: 25.0,
            stop_loss: 0.02,
            take_profit: 0.04,
        }
    }
}

impl StrategyParams {
    /// Candles consumed before the simulator starts trading
    pub fn warmup(&self) -> usize {
        self.rsi_period
            .max(self.ema_long)
            .max(self.adx_period)
            .saturating_add(20)
    }

    /// Clamp every gene into its legal range and restore the cross-gene
    /// invariants (oversold at most overbought - 10, long EMA at least 5 bars
    /// slower than the short one, take-profit 1% above stop-loss).
    ///
    /// Periods are capped at `MAX_PERIOD`, so suggestions from outside the
    /// engine cannot push lookbacks past any realistic history.
    pub fn repaired(mut self) -> Self {
        self.rsi_period = self.rsi_period.clamp(2, MAX_PERIOD);
        self.adx_period = self.adx_period.clamp(1, MAX_PERIOD);

        self.rsi_overbought = self.rsi_overbought.clamp(51.0, 99.0);
        self.rsi_oversold = self.rsi_oversold.clamp(1.0, self.rsi_overbought - 10.0);
        self.rsi_trend_buy_threshold = self.rsi_trend_buy_threshold.clamp(30.0, 70.0);
        self.rsi_trend_sell_threshold = self.rsi_trend_sell_threshold.clamp(30.0, 70.0);

        self.ema_short = self.ema_short.clamp(2, MAX_PERIOD - EMA_SPREAD);
        self.ema_long = self.ema_long.clamp(self.ema_short + EMA_SPREAD, MAX_PERIOD);

        self.stop_loss = self.stop_loss.max(0.005);
        self.take_profit = self.take_profit.max(self.stop_loss + 0.01);

        self
    }

    /// True when the cross-gene invariants hold
    pub fn is_well_formed(&self) -> bool {
        self.rsi_oversold < self.rsi_overbought
            && self.ema_short < self.ema_long
            && self.take_profit > self.stop_loss
    }
}
