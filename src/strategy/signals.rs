use crate::indicators::{calculate_bollinger, calculate_ema, calculate_rsi, last_sma};
use crate::models::{Candle, Signal};
use crate::regime::MarketRegime;

use super::StrategyParams;

/// Minimum history for the volume SMA and the long EMAs to settle
pub const MIN_SIGNAL_CANDLES: usize = 50;

const VOLUME_SMA_PERIOD: usize = 20;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_STD_DEV: f64 = 2.0;
const SQUEEZE_BANDWIDTH: f64 = 0.0015;
const BREAKOUT_RELATIVE_VOLUME: f64 = 1.2;
const CROSS_RELATIVE_VOLUME: f64 = 0.5;

/// Indicator snapshot for the last two bars of a series
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    price: f64,
    rsi: f64,
    prev_rsi: f64,
    ema_short: f64,
    prev_ema_short: f64,
    ema_long: f64,
    prev_ema_long: f64,
    relative_volume: f64,
    bandwidth: f64,
}

impl Snapshot {
    fn compute(candles: &[Candle], params: &StrategyParams) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let n = closes.len();

        let rsi = calculate_rsi(&closes, params.rsi_period);
        let ema_short = calculate_ema(&closes, params.ema_short);
        let ema_long = calculate_ema(&closes, params.ema_long);

        // Thin markets report near-zero volume; use a fixed floor instead
        let avg_volume = last_sma(&volumes, VOLUME_SMA_PERIOD).unwrap_or(0.0);
        let safe_avg_volume = if avg_volume < 1.0 { 100.0 } else { avg_volume };

        let bandwidth = calculate_bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEV)
            .last()
            .copied()
            .flatten()
            .map(|band| band.bandwidth)
            .unwrap_or(f64::INFINITY);

        Self {
            price: closes[n - 1],
            rsi: rsi[n - 1],
            prev_rsi: rsi[n - 2],
            ema_short: ema_short[n - 1],
            prev_ema_short: ema_short[n - 2],
            ema_long: ema_long[n - 1],
            prev_ema_long: ema_long[n - 2],
            relative_volume: volumes[n - 1] / safe_avg_volume,
            bandwidth,
        }
    }

    fn long_trend_up(&self) -> bool {
        self.ema_long > self.prev_ema_long
    }

    fn long_trend_down(&self) -> bool {
        self.ema_long < self.prev_ema_long
    }
}

/// Generate a BUY / SELL / HOLD decision for the last candle of `candles`
///
/// Rules, in order:
/// 1. Bollinger squeeze (bandwidth < 0.15%) holds in every regime but VOLATILE
/// 2. The regime's own rule (trend pullback, trend rally, mean reversion hook,
///    momentum breakout)
/// 3. EMA golden / death cross confirmed by the long EMA slope and volume
///
/// Pure: the same inputs always give the same signal.
pub fn generate_signal(
    candles: &[Candle],
    params: &StrategyParams,
    regime: MarketRegime,
) -> Signal {
    if candles.len() < MIN_SIGNAL_CANDLES {
        return Signal::hold("Insufficient data");
    }

    let s = Snapshot::compute(candles, params);
    if s.rsi.is_nan() || s.ema_long.is_nan() {
        return Signal::hold("Indicators unavailable");
    }

    let squeezing = s.bandwidth < SQUEEZE_BANDWIDTH;
    if squeezing && regime != MarketRegime::Volatile {
        return Signal::hold("Market Squeeze (Low Volatility)");
    }

    if let Some(signal) = regime_rule(&s, params, regime) {
        return signal;
    }

    if !squeezing {
        if let Some(signal) = crossover_rule(&s, params) {
            return signal;
        }
    }

    Signal::hold("")
}

fn regime_rule(s: &Snapshot, params: &StrategyParams, regime: MarketRegime) -> Option<Signal> {
    match regime {
        MarketRegime::TrendingUp => {
            let pullback = s.rsi < params.rsi_trend_buy_threshold;
            let structure_intact = s.price > s.ema_long;
            let aligned = s.ema_short > s.ema_long;
            let hooking_up = s.rsi > s.prev_rsi;

            (pullback && structure_intact && s.long_trend_up() && aligned && hooking_up).then(|| {
                Signal::buy(format!(
                    "Trend Pullback Buy: RSI {:.1} < {}.",
                    s.rsi, params.rsi_trend_buy_threshold
                ))
            })
        }
        MarketRegime::TrendingDown => {
            let rally = s.rsi > params.rsi_trend_sell_threshold;
            let structure_intact = s.price < s.ema_long;
            let aligned = s.ema_short < s.ema_long;
            let hooking_down = s.rsi < s.prev_rsi;

            (rally && structure_intact && s.long_trend_down() && aligned && hooking_down).then(|| {
                Signal::sell(format!(
                    "Trend Rally Sell: RSI {:.1} > {}.",
                    s.rsi, params.rsi_trend_sell_threshold
                ))
            })
        }
        MarketRegime::Ranging => {
            if s.prev_rsi < params.rsi_oversold
                && s.rsi > s.prev_rsi
                && s.rsi > params.rsi_oversold
            {
                return Some(Signal::buy(format!(
                    "Mean Reversion Buy: RSI {:.1} hooking up from oversold.",
                    s.rsi
                )));
            }
            if s.prev_rsi > params.rsi_overbought
                && s.rsi < s.prev_rsi
                && s.rsi < params.rsi_overbought
            {
                return Some(Signal::sell(format!(
                    "Mean Reversion Sell: RSI {:.1} hooking down from overbought.",
                    s.rsi
                )));
            }
            None
        }
        MarketRegime::Volatile => {
            let surge = s.relative_volume > BREAKOUT_RELATIVE_VOLUME;
            if surge && s.price > s.ema_short && s.rsi > 60.0 && s.rsi < 85.0 {
                return Some(Signal::buy(format!(
                    "Momentum Breakout: price above EMA{} on {:.2}x volume.",
                    params.ema_short, s.relative_volume
                )));
            }
            if surge && s.price < s.ema_short && s.rsi > 15.0 && s.rsi < 40.0 {
                return Some(Signal::sell(format!(
                    "Momentum Breakdown: price below EMA{} on {:.2}x volume.",
                    params.ema_short, s.relative_volume
                )));
            }
            None
        }
        MarketRegime::Unknown => None,
    }
}

fn crossover_rule(s: &Snapshot, params: &StrategyParams) -> Option<Signal> {
    let volume_support = s.relative_volume >= CROSS_RELATIVE_VOLUME;
    if !volume_support {
        return None;
    }

    if s.prev_ema_short <= s.prev_ema_long && s.ema_short > s.ema_long && s.long_trend_up() {
        return Some(Signal::buy(format!(
            "Golden Cross: EMA{} crossed above EMA{}.",
            params.ema_short, params.ema_long
        )));
    }

    if s.prev_ema_short >= s.prev_ema_long && s.ema_short < s.ema_long && s.long_trend_down() {
        return Some(Signal::sell(format!(
            "Death Cross: EMA{} crossed below EMA{}.",
            params.ema_short, params.ema_long
        )));
    }

    None
}
