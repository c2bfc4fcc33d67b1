/// Market Regime Detector using ADX + price action
///
/// Classifies markets into regimes, checked in priority order:
/// - Volatile: trailing high/low range wider than 2.5% of the low
/// - Trending up / down: ADX > 20, direction from close vs SMA(50)
/// - Ranging: everything else
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::indicators::{calculate_adx, last_sma};
use crate::models::Candle;

/// Minimum history before any classification is attempted
pub const MIN_REGIME_CANDLES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    Unknown,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 5] = [
        MarketRegime::TrendingUp,
        MarketRegime::TrendingDown,
        MarketRegime::Ranging,
        MarketRegime::Volatile,
        MarketRegime::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::TrendingUp => "TRENDING_UP",
            MarketRegime::TrendingDown => "TRENDING_DOWN",
            MarketRegime::Ranging => "RANGING",
            MarketRegime::Volatile => "VOLATILE",
            MarketRegime::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse for labels coming from outside the engine; anything
    /// unrecognised maps to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(MarketRegime::Unknown)
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "TRENDING_UP" | "UP" => Ok(MarketRegime::TrendingUp),
            "TRENDING_DOWN" | "DOWN" => Ok(MarketRegime::TrendingDown),
            "RANGING" => Ok(MarketRegime::Ranging),
            "VOLATILE" => Ok(MarketRegime::Volatile),
            "UNKNOWN" => Ok(MarketRegime::Unknown),
            _ => Err(format!("unknown market regime: {}", s)),
        }
    }
}

/// Classification plus a short justification for observability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAssessment {
    pub regime: MarketRegime,
    pub reason: String,
}

pub struct RegimeDetector {
    adx_period: usize,
    adx_trend_threshold: f64,
    sma_period: usize,
    range_lookback: usize,
    volatile_range_threshold: f64,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            adx_period: 14,
            adx_trend_threshold: 20.0,
            sma_period: 50,
            range_lookback: 15,
            volatile_range_threshold: 0.025,
        }
    }
}

impl RegimeDetector {
    pub fn new(
        adx_period: usize,
        adx_trend_threshold: f64,
        sma_period: usize,
        range_lookback: usize,
        volatile_range_threshold: f64,
    ) -> Self {
        Self {
            adx_period,
            adx_trend_threshold,
            sma_period,
            range_lookback,
            volatile_range_threshold,
        }
    }

    /// Detect current market regime based on recent candles
    pub fn detect(&self, candles: &[Candle]) -> RegimeAssessment {
        if candles.len() < MIN_REGIME_CANDLES.max(self.sma_period) {
            return RegimeAssessment {
                regime: MarketRegime::Unknown,
                reason: "Insufficient data".to_string(),
            };
        }

        let adx = calculate_adx(candles, self.adx_period)
            .last()
            .copied()
            .unwrap_or(0.0);

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let current_price = closes[closes.len() - 1];
        let sma = last_sma(&closes, self.sma_period).unwrap_or(current_price);

        // 1. Volatility dominates trend
        let range = recent_range(candles, self.range_lookback);
        if range > self.volatile_range_threshold {
            return RegimeAssessment {
                regime: MarketRegime::Volatile,
                reason: format!(
                    "Volatility expansion: {:.1}% range over last {} candles",
                    range * 100.0,
                    self.range_lookback
                ),
            };
        }

        // 2. Trend strength
        if adx > self.adx_trend_threshold {
            let (regime, side) = if current_price > sma {
                (MarketRegime::TrendingUp, "above")
            } else {
                (MarketRegime::TrendingDown, "below")
            };
            return RegimeAssessment {
                regime,
                reason: format!(
                    "Trend strength ADX {:.1} > {:.0}, price {} SMA{}",
                    adx, self.adx_trend_threshold, side, self.sma_period
                ),
            };
        }

        // 3. No trend, no expansion
        RegimeAssessment {
            regime: MarketRegime::Ranging,
            reason: format!(
                "Sideways: ADX {:.1} <= {:.0}",
                adx, self.adx_trend_threshold
            ),
        }
    }
}

/// (max high - min low) / min low over the trailing `lookback` candles
fn recent_range(candles: &[Candle], lookback: usize) -> f64 {
    let start = candles.len().saturating_sub(lookback);
    let recent = &candles[start..];

    let high = recent.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = recent.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);

    (high - low) / low
}

/// Classify the candle series with the default thresholds
pub fn detect_regime(candles: &[Candle]) -> RegimeAssessment {
    RegimeDetector::default().detect(candles)
}
