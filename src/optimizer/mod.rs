// Genetic search over strategy parameters
pub mod genetic;
pub mod operators;

pub use genetic::{
    run_optimization, Candidate, Evaluator, GenerationStats, GeneticOptimizer, OptimizationOutcome,
};
pub use operators::{crossover, fitness, mutate, random_params, NO_TRADE_FITNESS};
