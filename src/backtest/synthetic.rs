use crate::models::Candle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Candle spacing of every generated series (1 minute)
pub const INTERVAL_MS: i64 = 60_000;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MarketScenario {
    /// Steady uptrend with light noise (+0.05% per candle)
    Uptrend,
    /// Steady downtrend with light noise (-0.05% per candle)
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large swings (up to ±0.8% per candle)
    Volatile,
    /// Random walk with a 90-minute hole every 50 candles
    WithGaps,
}

/// Generates synthetic 1-minute price data for backtests and the demo feed
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 1_000.0,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Generate `num_candles` candles for a scenario, the first one stamped
    /// at `start_time` (ms)
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        start_time: i64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut price = self.base_price;
        let mut slot: i64 = 0;

        for i in 0..num_candles {
            price = match scenario {
                MarketScenario::Uptrend => {
                    price * (1.0 + 0.0005 + self.rng.gen_range(-0.0003..0.0003))
                }
                MarketScenario::Downtrend => {
                    price * (1.0 - 0.0005 + self.rng.gen_range(-0.0003..0.0003))
                }
                MarketScenario::Sideways => {
                    // 10% pull back to the mean each bar
                    let reversion = (self.base_price - price) * 0.1;
                    price + reversion + price * self.rng.gen_range(-0.001..0.001)
                }
                MarketScenario::Volatile => {
                    let next = price * (1.0 + self.rng.gen_range(-0.008..0.008));
                    next.max(self.base_price * 0.5)
                }
                MarketScenario::WithGaps => {
                    if i > 0 && i % 50 == 0 {
                        slot += 90;
                    }
                    price * (1.0 + self.rng.gen_range(-0.001..0.001))
                }
            };

            candles.push(self.create_candle(price, start_time + slot * INTERVAL_MS));
            slot += 1;
        }

        candles
    }

    /// Next live tick after `last`, exactly one interval later
    pub fn next_candle(&mut self, last: &Candle) -> Candle {
        let change = last.close * self.rng.gen_range(-0.0004..0.00042);
        self.create_candle(last.close + change, last.time + INTERVAL_MS)
    }

    /// Helper to create a candle from close price and timestamp
    fn create_candle(&mut self, price: f64, time: i64) -> Candle {
        let noise_pct = 0.0005;

        let high = price * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..noise_pct));

        let open_raw = price * (1.0 + self.rng.gen_range(-noise_pct..noise_pct));
        let open = open_raw.clamp(low, high);

        // Vary volume ±30%
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle::new(time, open, high, low, price, volume)
    }
}
