use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Genetic search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Chance that a child goes through mutation at all
    pub mutation_probability: f64,
    /// Per-gene chance of being perturbed once a child mutates
    pub gene_mutation_rate: f64,
    /// Fixed RNG seed for reproducible runs; entropy when unset
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 10,
            mutation_probability: 0.8,
            gene_mutation_rate: 0.5,
            seed: None,
        }
    }
}

/// Language-model advisory client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Falls back to `OPENAI_API_KEY`; without a key only the offline advisor runs
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub min_call_interval_secs: u64,
    pub cooldown_secs: u64,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            min_call_interval_secs: 30,
            cooldown_secs: 300,
            max_retries: 3,
            request_timeout_secs: 30,
        }
    }
}

impl AdvisorConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Top-level engine configuration
///
/// Layered: built-in defaults, then an optional `regime-trader.{toml,yaml,json}`
/// in the working directory, then `REGIME__*` environment variables
/// (`REGIME__OPTIMIZER__GENERATIONS=5`, `REGIME__REDIS_URL=redis://...`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub log_filter: String,
    /// Regime memory lives in Redis when set, in-process otherwise
    pub redis_url: Option<String>,
    /// Candles retained per asset
    pub max_history: usize,
    pub min_candles_for_optimization: usize,
    pub optimizer: OptimizerConfig,
    pub advisor: AdvisorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_filter: "regime_trader=info".to_string(),
            redis_url: None,
            max_history: 300,
            min_candles_for_optimization: 200,
            optimizer: OptimizerConfig::default(),
            advisor: AdvisorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        Self::load_from("regime-trader")
    }

    /// Load with `file_stem` as the optional config file name
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix("REGIME")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        tracing::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}
