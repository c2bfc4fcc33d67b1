use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::regime::MarketRegime;

/// OHLCV candlestick, `time` in milliseconds since epoch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Trading signal direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// Output of the signal generator: direction plus a human-readable reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub reason: String,
}

impl Signal {
    pub fn buy(reason: impl Into<String>) -> Self {
        Self {
            signal_type: SignalType::Buy,
            reason: reason.into(),
        }
    }

    pub fn sell(reason: impl Into<String>) -> Self {
        Self {
            signal_type: SignalType::Sell,
            reason: reason.into(),
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            signal_type: SignalType::Hold,
            reason: reason.into(),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.signal_type == SignalType::Hold
    }
}

/// Signal record handed to persistence and, downstream, to order execution.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradeSignal {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub price: f64,
    pub timestamp: i64,
    pub reason: String,
    pub symbol: String,
    pub regime_at_creation: MarketRegime,
}

impl TradeSignal {
    /// Stamp a generated signal against the candle it fired on
    pub fn from_signal(
        signal: &Signal,
        candle: &Candle,
        symbol: &str,
        regime: MarketRegime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            signal_type: signal.signal_type,
            price: candle.close,
            timestamp: candle.time,
            reason: signal.reason.clone(),
            symbol: symbol.to_string(),
            regime_at_creation: regime,
        }
    }
}
