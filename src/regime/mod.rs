// Market regime classification and advisory
pub mod advisor;
pub mod detector;

pub use advisor::{merge_params, Advisor, Advisory, LlmAdvisor, OfflineAdvisor};
pub use detector::{
    detect_regime, MarketRegime, RegimeAssessment, RegimeDetector, MIN_REGIME_CANDLES,
};
