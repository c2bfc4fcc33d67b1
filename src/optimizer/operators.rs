use rand::Rng;

use crate::backtest::BacktestResult;
use crate::strategy::StrategyParams;

/// Fitness of a run that never traded
pub const NO_TRADE_FITNESS: f64 = -1000.0;

/// Quality score used to rank candidates
///
/// `netProfit * min(profitFactor, 3) * (winRate / 50) * penalty`, where the
/// penalty is 0.2 for fewer than 5 trades. Runs without trades score -1000.
pub fn fitness(result: &BacktestResult) -> f64 {
    if result.trade_count == 0 {
        return NO_TRADE_FITNESS;
    }

    let trade_count_penalty = if result.trade_count < 5 { 0.2 } else { 1.0 };
    let pf_score = result.profit_factor.min(3.0);

    result.net_profit * pf_score * (result.win_rate / 50.0) * trade_count_penalty
}

/// Uniform draw from the initial search box
pub fn random_params<R: Rng + ?Sized>(rng: &mut R) -> StrategyParams {
    StrategyParams {
        rsi_period: rng.gen_range(7..17),
        rsi_overbought: rng.gen_range(65..80_u32) as f64,
        rsi_oversold: rng.gen_range(20..35_u32) as f64,
        rsi_trend_buy_threshold: rng.gen_range(40..60_u32) as f64,
        rsi_trend_sell_threshold: rng.gen_range(40..60_u32) as f64,
        ema_short: rng.gen_range(5..15),
        ema_long: rng.gen_range(20..50),
        adx_period: 14,
        adx_threshold: 25.0,
        stop_loss: rng.gen_range(0.01..0.05),
        take_profit: rng.gen_range(0.02..0.10),
    }
    .repaired()
}

fn pick<T, R: Rng + ?Sized>(rng: &mut R, a: T, b: T) -> T {
    if rng.gen_bool(0.5) {
        a
    } else {
        b
    }
}

/// Uniform crossover: every gene comes from either parent with equal odds
pub fn crossover<R: Rng + ?Sized>(
    a: &StrategyParams,
    b: &StrategyParams,
    rng: &mut R,
) -> StrategyParams {
    StrategyParams {
        rsi_period: pick(rng, a.rsi_period, b.rsi_period),
        rsi_overbought: pick(rng, a.rsi_overbought, b.rsi_overbought),
        rsi_oversold: pick(rng, a.rsi_oversold, b.rsi_oversold),
        rsi_trend_buy_threshold: pick(rng, a.rsi_trend_buy_threshold, b.rsi_trend_buy_threshold),
        rsi_trend_sell_threshold: pick(rng, a.rsi_trend_sell_threshold, b.rsi_trend_sell_threshold),
        ema_short: pick(rng, a.ema_short, b.ema_short),
        ema_long: pick(rng, a.ema_long, b.ema_long),
        adx_period: pick(rng, a.adx_period, b.adx_period),
        adx_threshold: pick(rng, a.adx_threshold, b.adx_threshold),
        stop_loss: pick(rng, a.stop_loss, b.stop_loss),
        take_profit: pick(rng, a.take_profit, b.take_profit),
    }
    .repaired()
}

fn step_period<R: Rng + ?Sized>(rng: &mut R, value: usize) -> usize {
    if rng.gen_bool(0.5) {
        value + 1
    } else {
        value.saturating_sub(1)
    }
}

fn step_level<R: Rng + ?Sized>(rng: &mut R, value: f64) -> f64 {
    value + if rng.gen_bool(0.5) { 2.0 } else { -2.0 }
}

fn step_fraction<R: Rng + ?Sized>(rng: &mut R, value: f64) -> f64 {
    value * if rng.gen_bool(0.5) { 1.1 } else { 0.9 }
}

/// Perturb each gene with probability `gene_rate`, then re-apply the bounds
///
/// Periods move by one bar, RSI levels by two points, risk fractions by 10%.
pub fn mutate<R: Rng + ?Sized>(
    params: &StrategyParams,
    gene_rate: f64,
    rng: &mut R,
) -> StrategyParams {
    let rate = gene_rate.clamp(0.0, 1.0);
    let mut p = *params;

    if rng.gen_bool(rate) {
        p.rsi_period = step_period(rng, p.rsi_period);
    }
    if rng.gen_bool(rate) {
        p.rsi_overbought = step_level(rng, p.rsi_overbought);
    }
    if rng.gen_bool(rate) {
        p.rsi_oversold = step_level(rng, p.rsi_oversold);
    }
    if rng.gen_bool(rate) {
        p.rsi_trend_buy_threshold = step_level(rng, p.rsi_trend_buy_threshold);
    }
    if rng.gen_bool(rate) {
        p.rsi_trend_sell_threshold = step_level(rng, p.rsi_trend_sell_threshold);
    }
    if rng.gen_bool(rate) {
        p.ema_short = step_period(rng, p.ema_short);
    }
    if rng.gen_bool(rate) {
        p.ema_long = step_period(rng, p.ema_long);
    }
    if rng.gen_bool(rate) {
        p.stop_loss = step_fraction(rng, p.stop_loss);
    }
    if rng.gen_bool(rate) {
        p.take_profit = step_fraction(rng, p.take_profit);
    }

    p.repaired()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn result_with(
        net_profit: f64,
        trade_count: usize,
        win_rate: f64,
        profit_factor: f64,
    ) -> BacktestResult {
        BacktestResult {
            net_profit,
            trade_count,
            win_rate,
            profit_factor,
            ..BacktestResult::zeroed()
        }
    }

    #[test]
    fn test_fitness_formula() {
        assert_eq!(fitness(&BacktestResult::zeroed()), NO_TRADE_FITNESS);

        // 100 * min(2, 3) * (60 / 50) * 1
        let healthy = result_with(100.0, 10, 60.0, 2.0);
        assert!((fitness(&healthy) - 240.0).abs() < 1e-9);

        // Profit factor capped at 3, few trades penalised by 0.2
        let lucky = result_with(100.0, 2, 100.0, 10.0);
        assert!((fitness(&lucky) - 120.0).abs() < 1e-9);

        let losing = result_with(-50.0, 6, 0.0, 0.0);
        assert_eq!(fitness(&losing), 0.0);
    }

    #[test]
    fn test_random_params_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let p = random_params(&mut rng);
            assert!(p.is_well_formed());
            assert!((7..17).contains(&p.rsi_period));
            assert!((65.0..80.0).contains(&p.rsi_overbought));
            assert!((20.0..35.0).contains(&p.rsi_oversold));
            assert!((5..15).contains(&p.ema_short));
            assert!((20..50).contains(&p.ema_long));
            assert!((0.01..0.05).contains(&p.stop_loss));
            assert!(p.take_profit >= p.stop_loss + 0.01 - 1e-12);
            assert_eq!(p.adx_period, 14);
        }
    }

    #[test]
    fn test_crossover_genes_come_from_parents() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = StrategyParams::default();
        let b = StrategyParams {
            rsi_period: 10,
            ema_short: 6,
            ema_long: 40,
            ..StrategyParams::default()
        };

        for _ in 0..100 {
            let child = crossover(&a, &b, &mut rng);
            assert!(child.is_well_formed());
            assert!(child.rsi_period == 14 || child.rsi_period == 10);
            assert!(child.ema_short == 9 || child.ema_short == 6);
            assert!(child.ema_long == 21 || child.ema_long == 40);
        }
    }

    #[test]
    fn test_crossover_repairs_mixed_risk_genes() {
        let mut rng = StdRng::seed_from_u64(3);
        let tight = StrategyParams {
            stop_loss: 0.01,
            take_profit: 0.02,
            ..StrategyParams::default()
        };
        let wide = StrategyParams {
            stop_loss: 0.05,
            take_profit: 0.07,
            ..StrategyParams::default()
        };

        for _ in 0..100 {
            let child = crossover(&tight, &wide, &mut rng);
            assert!(child.take_profit >= child.stop_loss + 0.01 - 1e-12);
        }
    }

    #[test]
    fn test_mutation_preserves_invariants() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut p = StrategyParams::default();

        // Random walk with every gene mutating each step
        for _ in 0..2_000 {
            p = mutate(&p, 1.0, &mut rng);
            assert!(p.rsi_oversold <= p.rsi_overbought - 10.0);
            assert!(p.ema_long >= p.ema_short + 5);
            assert!(p.take_profit >= p.stop_loss + 0.01 - 1e-12);
            assert!(p.rsi_period >= 2 && p.ema_short >= 2);
            assert!((51.0..=99.0).contains(&p.rsi_overbought));
            assert!(p.stop_loss >= 0.005);
        }
    }

    #[test]
    fn test_zero_rate_mutation_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = StrategyParams::default();
        assert_eq!(mutate(&p, 0.0, &mut rng), p);
    }
}
