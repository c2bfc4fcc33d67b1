use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use regime_trader::backtest::{run_backtest, MarketScenario, SyntheticDataGenerator, INTERVAL_MS};
use regime_trader::config::EngineConfig;
use regime_trader::engine::{AssetEngine, CycleReport};
use regime_trader::memory::{InMemoryStore, MemoryStore, RegimeMemory};
use regime_trader::optimizer::GeneticOptimizer;
use regime_trader::persistence::RedisMemoryStore;
use regime_trader::regime::{Advisor, LlmAdvisor, MarketRegime, RegimeDetector};
use regime_trader::strategy::{generate_signal, StrategyParams};
use regime_trader::Candle;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "regime-trader")]
#[command(
    about = "Regime-aware signal engine with backtesting and genetic parameter search",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Synthetic series shared by the one-shot commands
#[derive(Args, Debug, Clone)]
struct DataArgs {
    #[arg(long, value_enum, default_value = "uptrend")]
    scenario: MarketScenario,

    /// Number of 1-minute candles
    #[arg(long, default_value = "300")]
    candles: usize,

    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify the market regime
    Detect {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Evaluate the signal for the last candle
    Signal {
        #[command(flatten)]
        data: DataArgs,

        /// Regime override (defaults to the detected one)
        #[arg(long)]
        regime: Option<MarketRegime>,
    },

    /// Replay the default strategy and print the performance report
    Backtest {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long)]
        regime: Option<MarketRegime>,
    },

    /// Search strategy parameters with the genetic optimizer
    Optimize {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long)]
        regime: Option<MarketRegime>,

        /// Overrides the configured generation count
        #[arg(long)]
        generations: Option<usize>,
    },

    /// Drive the engine with a synthetic live feed
    Run {
        /// Comma-separated asset symbols
        #[arg(long, value_delimiter = ',', default_value = "SOL,ETH")]
        assets: Vec<String>,

        #[arg(long, default_value = "5")]
        cycles: usize,

        /// Candles of history loaded before the first cycle
        #[arg(long, default_value = "250")]
        history: usize,

        #[arg(long, value_enum, default_value = "sideways")]
        scenario: MarketScenario,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = EngineConfig::load().context("failed to load configuration")?;
    setup_logging(&config.log_filter);

    match cli.command {
        Commands::Detect { data } => detect(&data),
        Commands::Signal { data, regime } => signal(&data, regime),
        Commands::Backtest { data, regime } => backtest(&data, regime),
        Commands::Optimize {
            data,
            regime,
            generations,
        } => optimize(&config, &data, regime, generations).await,
        Commands::Run {
            assets,
            cycles,
            history,
            scenario,
            seed,
        } => run(&config, assets, cycles, history, scenario, seed).await,
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn generate_candles(data: &DataArgs) -> Vec<Candle> {
    let start = regime_trader::now_ms() - data.candles as i64 * INTERVAL_MS;
    SyntheticDataGenerator::new(data.seed).generate(data.scenario, data.candles, start)
}

fn resolve_regime(candles: &[Candle], regime: Option<MarketRegime>) -> MarketRegime {
    regime.unwrap_or_else(|| RegimeDetector::default().detect(candles).regime)
}

async fn connect_memory_store(config: &EngineConfig) -> Arc<dyn MemoryStore> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        tracing::info!("Regime memory kept in-process (no redis_url configured)");
        return Arc::new(InMemoryStore::new());
    };

    match RedisMemoryStore::new(redis_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Failed to connect to Redis ({}), keeping regime memory in-process", e);
            Arc::new(InMemoryStore::new())
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn detect(data: &DataArgs) -> Result<()> {
    let candles = generate_candles(data);
    let assessment = RegimeDetector::default().detect(&candles);

    println!("\n🔍 {:?} scenario, {} candles (seed {})", data.scenario, candles.len(), data.seed);
    println!("  Regime: {}", assessment.regime);
    println!("  Reason: {}", assessment.reason);
    Ok(())
}

fn signal(data: &DataArgs, regime: Option<MarketRegime>) -> Result<()> {
    let candles = generate_candles(data);
    let regime = resolve_regime(&candles, regime);
    let signal = generate_signal(&candles, &StrategyParams::default(), regime);

    println!("\n📡 {:?} scenario, regime {}", data.scenario, regime);
    println!("  Signal: {}", signal.signal_type);
    if !signal.reason.is_empty() {
        println!("  Reason: {}", signal.reason);
    }
    Ok(())
}

fn backtest(data: &DataArgs, regime: Option<MarketRegime>) -> Result<()> {
    let candles = generate_candles(data);
    let regime = resolve_regime(&candles, regime);

    println!("\n🧪 Backtesting default strategy: {:?} scenario, regime {}", data.scenario, regime);
    run_backtest(&candles, &StrategyParams::default(), regime).print_report();
    Ok(())
}

async fn optimize(
    config: &EngineConfig,
    data: &DataArgs,
    regime: Option<MarketRegime>,
    generations: Option<usize>,
) -> Result<()> {
    let candles = generate_candles(data);
    let regime = resolve_regime(&candles, regime);

    let mut optimizer_config = config.optimizer.clone();
    if let Some(generations) = generations {
        optimizer_config.generations = generations;
    }

    println!("\n🧬 Optimizing on {:?} scenario, regime {}", data.scenario, regime);
    let outcome = GeneticOptimizer::new(optimizer_config)
        .run(&candles, regime, None)
        .await
        .context("optimization run failed")?;

    println!("  Baseline fitness: {:.2}", outcome.baseline_fitness);
    println!("  Best fitness:     {:.2}", outcome.fitness);
    println!("  Best params:      {}", serde_json::to_string_pretty(&outcome.params)?);
    outcome.result.print_report();
    Ok(())
}

async fn run(
    config: &EngineConfig,
    assets: Vec<String>,
    cycles: usize,
    history: usize,
    scenario: MarketScenario,
    seed: u64,
) -> Result<()> {
    tracing::info!("🚀 regime-trader starting: {} assets, {} cycles", assets.len(), cycles);

    let memory = Arc::new(RegimeMemory::new(connect_memory_store(config).await));
    let advisor: Arc<dyn Advisor> = Arc::new(LlmAdvisor::new(&config.advisor)?);
    tracing::info!("Advisor: {}", advisor.name());
    let engine = Arc::new(AssetEngine::new(config, memory, advisor));

    let start = regime_trader::now_ms() - history as i64 * INTERVAL_MS;
    let mut feeds: Vec<(String, SyntheticDataGenerator, Vec<Candle>)> = assets
        .into_iter()
        .enumerate()
        .map(|(i, asset)| {
            let mut generator = SyntheticDataGenerator::new(seed + i as u64);
            let batch = generator.generate(scenario, history, start);
            (asset, generator, batch)
        })
        .collect();

    for cycle in 1..=cycles {
        tracing::info!("🔄 Cycle {}/{}", cycle, cycles);

        // Assets are independent; run them side by side
        let handles: Vec<_> = feeds
            .iter()
            .map(|(asset, _, batch)| {
                let engine = engine.clone();
                let asset = asset.clone();
                let batch = batch.clone();
                tokio::spawn(async move { engine.process(&asset, &batch).await })
            })
            .collect();

        for handle in handles {
            match handle.await? {
                Ok(report) => log_cycle(&report),
                Err(e) => tracing::error!("Cycle failed: {}", e),
            }
        }

        for (asset, generator, batch) in feeds.iter_mut() {
            let last = engine
                .candle_store()
                .latest(asset)?
                .with_context(|| format!("no candles stored for {}", asset))?;
            *batch = vec![generator.next_candle(&last)];
        }
    }

    for (asset, _, _) in &feeds {
        let signals = engine.signals(asset)?;
        println!("\n📜 {}: {} signals", asset, signals.len());
        for record in signals {
            println!(
                "  {} {} @ ${:.4} ({})",
                record.timestamp, record.signal_type, record.price, record.reason
            );
        }
    }

    tracing::info!("👋 regime-trader stopped");
    Ok(())
}

fn log_cycle(report: &CycleReport) {
    tracing::info!(
        "{}: {} candles, {} ({}), signal {} {}",
        report.asset,
        report.candle_count,
        report.regime,
        report.regime_reason,
        report.signal.signal_type,
        report.signal.reason
    );
    if let Some(optimization) = &report.optimization {
        tracing::info!(
            "{}: optimized for {} → net ${:.2}, fitness {:.2}, memory {:?}",
            report.asset,
            optimization.regime,
            optimization.result.net_profit,
            optimization.fitness,
            optimization.decision
        );
    }
}
