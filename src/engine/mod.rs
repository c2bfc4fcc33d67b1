/// Per-asset orchestration of one engine cycle
///
/// merge feed → detect regime → pick params (memory, else current) →
/// signal → optimize and remember once enough history has accumulated
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::backtest::BacktestResult;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::feed::CandleStore;
use crate::memory::{MemoryStore, RegimeMemory, UpdateDecision};
use crate::models::{Candle, Signal, TradeSignal};
use crate::optimizer::GeneticOptimizer;
use crate::regime::{Advisor, Advisory, MarketRegime, RegimeDetector};
use crate::strategy::{generate_signal, StrategyParams};
use crate::Result;

/// Where the params used for a cycle's signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamsSource {
    RegimeMemory,
    Current,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    /// Regime the search ran under: the advisory's, or the detected one when
    /// the advisory could not tell
    pub regime: MarketRegime,
    pub params: StrategyParams,
    pub result: BacktestResult,
    pub fitness: f64,
    pub baseline_fitness: f64,
    pub decision: UpdateDecision,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub asset: String,
    pub candle_count: usize,
    pub regime: MarketRegime,
    pub regime_reason: String,
    pub params_source: ParamsSource,
    pub signal: Signal,
    /// BUY / SELL newly logged this cycle; `None` when the latest candle
    /// already produced its record in an earlier cycle
    pub trade_signal: Option<TradeSignal>,
    pub optimization: Option<OptimizationReport>,
}

pub struct AssetEngine<S> {
    candles: CandleStore,
    memory: Arc<RegimeMemory<S>>,
    advisor: Arc<dyn Advisor>,
    detector: RegimeDetector,
    optimizer: GeneticOptimizer,
    min_candles_for_optimization: usize,
    current_params: RwLock<HashMap<String, StrategyParams>>,
    signal_log: RwLock<HashMap<String, Vec<TradeSignal>>>,
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> EngineError {
    EngineError::Store(e.to_string())
}

impl<S: MemoryStore> AssetEngine<S> {
    pub fn new(
        config: &EngineConfig,
        memory: Arc<RegimeMemory<S>>,
        advisor: Arc<dyn Advisor>,
    ) -> Self {
        Self {
            candles: CandleStore::new(config.max_history),
            memory,
            advisor,
            detector: RegimeDetector::default(),
            optimizer: GeneticOptimizer::new(config.optimizer.clone()),
            min_candles_for_optimization: config.min_candles_for_optimization,
            current_params: RwLock::new(HashMap::new()),
            signal_log: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_optimizer(mut self, optimizer: GeneticOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn candle_store(&self) -> &CandleStore {
        &self.candles
    }

    pub fn memory(&self) -> &RegimeMemory<S> {
        &self.memory
    }

    /// Params the asset falls back to when memory has nothing for its regime
    pub fn current_params(&self, asset: &str) -> Result<StrategyParams> {
        let params = self.current_params.read().map_err(poisoned)?;
        Ok(params.get(asset).copied().unwrap_or_default())
    }

    /// BUY / SELL records emitted for `asset`, oldest first
    pub fn signals(&self, asset: &str) -> Result<Vec<TradeSignal>> {
        let log = self.signal_log.read().map_err(poisoned)?;
        Ok(log.get(asset).cloned().unwrap_or_default())
    }

    pub async fn process(&self, asset: &str, batch: &[Candle]) -> Result<CycleReport> {
        self.candles.ingest(asset, batch)?;
        let candles = self.candles.candles(asset)?;

        let assessment = self.detector.detect(&candles);
        let regime = assessment.regime;

        let (params, params_source) = match self.memory.recall(asset, regime).await? {
            Some(entry) => (entry.params, ParamsSource::RegimeMemory),
            None => (self.current_params(asset)?, ParamsSource::Current),
        };

        let signal = generate_signal(&candles, &params, regime);
        let trade_signal = match (signal.is_hold(), candles.last()) {
            (false, Some(last)) => self.log_signal(asset, &signal, last, regime)?,
            _ => None,
        };

        let optimization = if candles.len() >= self.min_candles_for_optimization {
            match self.optimize(asset, &candles, regime, &params).await {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!(
                        "Optimization failed for {}, memory left untouched: {}",
                        asset,
                        e
                    );
                    None
                }
            }
        } else {
            tracing::debug!(
                "{}: {}/{} candles, optimization deferred",
                asset,
                candles.len(),
                self.min_candles_for_optimization
            );
            None
        };

        Ok(CycleReport {
            asset: asset.to_string(),
            candle_count: candles.len(),
            regime,
            regime_reason: assessment.reason,
            params_source,
            signal,
            trade_signal,
            optimization,
        })
    }

    /// Append a record for `last` unless one was already logged at its
    /// timestamp
    fn log_signal(
        &self,
        asset: &str,
        signal: &Signal,
        last: &Candle,
        regime: MarketRegime,
    ) -> Result<Option<TradeSignal>> {
        let mut log = self.signal_log.write().map_err(poisoned)?;
        let records = log.entry(asset.to_string()).or_default();
        if records.last().is_some_and(|r| r.timestamp == last.time) {
            tracing::debug!("{}: signal at {} already logged", asset, last.time);
            return Ok(None);
        }

        let record = TradeSignal::from_signal(signal, last, asset, regime);
        tracing::info!(
            "📈 {} {} @ ${:.4} [{}] {}",
            asset,
            record.signal_type,
            record.price,
            regime,
            record.reason
        );
        records.push(record.clone());
        Ok(Some(record))
    }

    /// Advisory → genetic search → regime memory
    ///
    /// Nothing is written unless the search completes.
    async fn optimize(
        &self,
        asset: &str,
        candles: &[Candle],
        detected: MarketRegime,
        current: &StrategyParams,
    ) -> Result<OptimizationReport> {
        let advisory = self.advisor.advise(asset, candles, current).await;
        let target = match advisory.regime {
            MarketRegime::Unknown => detected,
            suggested => suggested,
        };
        if target != detected {
            tracing::info!(
                "{}: advisor sees {} where detector sees {}",
                asset,
                target,
                detected
            );
        }

        let outcome = self
            .optimizer
            .run(candles, target, Some(advisory.suggested_params))
            .await?;

        let analysis = Advisory {
            backtest_result: Some(outcome.result),
            ..advisory
        };
        let decision = self
            .memory
            .remember(asset, target, outcome.params, analysis, outcome.result.net_profit)
            .await?;

        {
            let mut params = self.current_params.write().map_err(poisoned)?;
            params.insert(asset.to_string(), outcome.params);
        }

        Ok(OptimizationReport {
            regime: target,
            params: outcome.params,
            result: outcome.result,
            fitness: outcome.fitness,
            baseline_fitness: outcome.baseline_fitness,
            decision,
        })
    }
}
