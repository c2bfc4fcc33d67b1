use std::cmp::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::operators::{crossover, fitness, mutate, random_params};
use crate::backtest::{run_backtest, BacktestResult};
use crate::config::OptimizerConfig;
use crate::models::Candle;
use crate::regime::MarketRegime;
use crate::strategy::StrategyParams;
use crate::Result;

/// One evaluated individual
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub params: StrategyParams,
    pub result: BacktestResult,
    pub fitness: f64,
}

/// Scores one parameter set on a candle history
pub type Evaluator = fn(&[Candle], &StrategyParams, MarketRegime) -> BacktestResult;

impl Candidate {
    fn evaluate(
        evaluator: Evaluator,
        candles: &[Candle],
        params: StrategyParams,
        regime: MarketRegime,
    ) -> Self {
        let result = evaluator(candles, &params, regime);
        Self {
            params,
            result,
            fitness: fitness(&result),
        }
    }
}

/// Per-generation progress
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub generation: usize,
    /// Fittest individual of this generation
    pub generation_best: f64,
    /// Fittest individual seen so far, baseline included
    pub global_best: f64,
    pub best_net_profit: f64,
}

/// Best-ever parameters of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationOutcome {
    pub params: StrategyParams,
    pub result: BacktestResult,
    pub fitness: f64,
    /// Fitness of the baseline parameters evaluated alone
    pub baseline_fitness: f64,
    pub history: Vec<GenerationStats>,
}

/// Genetic search over `StrategyParams`, scored by full backtests
pub struct GeneticOptimizer {
    config: OptimizerConfig,
    baseline: StrategyParams,
    evaluator: Evaluator,
}

impl Default for GeneticOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl GeneticOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            baseline: StrategyParams::default(),
            evaluator: run_backtest,
        }
    }

    pub fn with_baseline(mut self, baseline: StrategyParams) -> Self {
        self.baseline = baseline;
        self
    }

    /// Replace the full backtest used to score individuals
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    fn population_size(&self) -> usize {
        self.config.population_size.max(2)
    }

    /// Baseline first, then the optional seed, then random draws
    pub fn initial_population<R: Rng + ?Sized>(
        &self,
        seed: Option<StrategyParams>,
        rng: &mut R,
    ) -> Vec<StrategyParams> {
        let size = self.population_size();
        let mut population = Vec::with_capacity(size);
        population.push(self.baseline);
        if let Some(seed) = seed {
            population.push(seed.repaired());
        }
        while population.len() < size {
            population.push(random_params(rng));
        }
        population
    }

    /// Survivors are kept as-is; children are crossed from two random
    /// survivors and mutated with `mutation_probability`
    fn next_generation<R: Rng + ?Sized>(
        &self,
        ranked: &[Candidate],
        rng: &mut R,
    ) -> Vec<StrategyParams> {
        let size = self.population_size();
        let survivors: Vec<StrategyParams> = ranked
            .iter()
            .take((size / 2).max(1))
            .map(|c| c.params)
            .collect();

        let mutation_probability = self.config.mutation_probability.clamp(0.0, 1.0);
        let mut next = survivors.clone();
        while next.len() < size {
            let a = &survivors[rng.gen_range(0..survivors.len())];
            let b = &survivors[rng.gen_range(0..survivors.len())];
            let mut child = crossover(a, b, rng);
            if rng.gen_bool(mutation_probability) {
                child = mutate(&child, self.config.gene_mutation_rate, rng);
            }
            next.push(child);
        }
        next
    }

    /// Run the fixed number of generations and return the best-ever individual
    ///
    /// Each generation is evaluated in parallel on the blocking pool and
    /// awaited as a whole before breeding the next one. A panicking
    /// evaluation aborts the whole run.
    pub async fn run(
        &self,
        candles: &[Candle],
        regime: MarketRegime,
        seed: Option<StrategyParams>,
    ) -> Result<OptimizationOutcome> {
        let candles: Arc<[Candle]> = Arc::from(candles);
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let evaluator = self.evaluator;
        let baseline = {
            let candles = candles.clone();
            let params = self.baseline;
            tokio::task::spawn_blocking(move || {
                Candidate::evaluate(evaluator, &candles, params, regime)
            })
            .await?
        };
        let mut best = baseline;

        tracing::info!(
            "Optimizing {} candles in {} regime: population {}, {} generations, \
             baseline fitness {:.2}",
            candles.len(),
            regime,
            self.population_size(),
            self.config.generations,
            baseline.fitness
        );

        let mut population = self.initial_population(seed, &mut rng);
        let mut history = Vec::with_capacity(self.config.generations);

        for generation in 0..self.config.generations {
            let mut ranked =
                evaluate_population(evaluator, candles.clone(), population, regime).await?;
            ranked.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));

            let leader = ranked[0];
            if leader.fitness.total_cmp(&best.fitness) == Ordering::Greater {
                best = leader;
            }

            let stats = GenerationStats {
                generation: generation + 1,
                generation_best: leader.fitness,
                global_best: best.fitness,
                best_net_profit: leader.result.net_profit,
            };
            tracing::info!(
                "Generation {}/{}: best fitness {:.2} (net ${:.2}), global best {:.2}",
                stats.generation,
                self.config.generations,
                stats.generation_best,
                stats.best_net_profit,
                stats.global_best
            );
            history.push(stats);

            population = self.next_generation(&ranked, &mut rng);
            tokio::task::yield_now().await;
        }

        tracing::info!(
            "Optimization complete: fitness {:.2}, net ${:.2}, {} trades",
            best.fitness,
            best.result.net_profit,
            best.result.trade_count
        );

        Ok(OptimizationOutcome {
            params: best.params,
            result: best.result,
            fitness: best.fitness,
            baseline_fitness: baseline.fitness,
            history,
        })
    }
}

/// Backtest every individual on the rayon pool, preserving population order
async fn evaluate_population(
    evaluator: Evaluator,
    candles: Arc<[Candle]>,
    population: Vec<StrategyParams>,
    regime: MarketRegime,
) -> Result<Vec<Candidate>> {
    let evaluated = tokio::task::spawn_blocking(move || {
        population
            .par_iter()
            .map(|params| Candidate::evaluate(evaluator, &candles, *params, regime))
            .collect::<Vec<_>>()
    })
    .await?;

    Ok(evaluated)
}

/// Optimize with the default configuration and baseline
pub async fn run_optimization(
    candles: &[Candle],
    regime: MarketRegime,
    seed: Option<StrategyParams>,
) -> Result<OptimizationOutcome> {
    GeneticOptimizer::default().run(candles, regime, seed).await
}
