use crate::backtest::metrics::{BacktestResult, TradeTally};
use crate::models::{Candle, SignalType};
use crate::regime::MarketRegime;
use crate::strategy::{generate_signal, StrategyParams};

pub const STARTING_BALANCE: f64 = 10_000.0;
/// Taker fee charged on both entry and exit
pub const FEE_RATE: f64 = 0.0006;

/// Why an open position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    EndOfData,
}

/// Long position held by the simulator
#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    entry_price: f64,
    amount: f64,
    cost_basis: f64,
}

impl OpenPosition {
    /// Enter with the whole balance at `price`, paying the entry fee
    fn open(balance: f64, price: f64, fee_rate: f64) -> Self {
        let net_invested = balance - balance * fee_rate;
        Self {
            entry_price: price,
            amount: net_invested / price,
            cost_basis: balance,
        }
    }

    /// Intrabar exit check; stop-loss wins when both levels are touched
    fn exit_price(
        &self,
        candle: &Candle,
        params: &StrategyParams,
        signal: SignalType,
    ) -> Option<(f64, ExitReason)> {
        let stop_loss_price = self.entry_price * (1.0 - params.stop_loss);
        let take_profit_price = self.entry_price * (1.0 + params.take_profit);

        if candle.low <= stop_loss_price {
            Some((stop_loss_price, ExitReason::StopLoss))
        } else if candle.high >= take_profit_price {
            Some((take_profit_price, ExitReason::TakeProfit))
        } else if signal == SignalType::Sell {
            Some((candle.close, ExitReason::Signal))
        } else {
            None
        }
    }

    /// Value after paying the exit fee at `price`
    fn net_value(&self, price: f64, fee_rate: f64) -> f64 {
        let gross = self.amount * price;
        gross - gross * fee_rate
    }
}

/// Deterministic long-only replay of the signal generator over history
pub struct BacktestRunner {
    starting_balance: f64,
    fee_rate: f64,
}

impl Default for BacktestRunner {
    fn default() -> Self {
        Self::new(STARTING_BALANCE, FEE_RATE)
    }
}

impl BacktestRunner {
    pub fn new(starting_balance: f64, fee_rate: f64) -> Self {
        Self {
            starting_balance,
            fee_rate,
        }
    }

    /// Replay `candles` bar by bar from the warm-up index
    ///
    /// Each bar: signal on the prefix ending here, resolve exits of an open
    /// position (stop-loss, take-profit, SELL at close), open on BUY when
    /// flat, then mark equity to market. Any position still open at the end
    /// is closed at the final close.
    pub fn run(
        &self,
        candles: &[Candle],
        params: &StrategyParams,
        regime: MarketRegime,
    ) -> BacktestResult {
        let warmup = params.warmup();
        if candles.len() <= warmup {
            return BacktestResult::zeroed();
        }

        let mut balance = self.starting_balance;
        let mut position: Option<OpenPosition> = None;
        let mut tally = TradeTally::default();

        let mut equity_curve = Vec::with_capacity(candles.len() - warmup);
        let mut peak_equity = self.starting_balance;
        let mut max_drawdown = 0.0_f64;

        for i in warmup..candles.len() {
            let candle = &candles[i];
            let signal = generate_signal(&candles[..=i], params, regime);

            if let Some(open) = position {
                if let Some((price, reason)) = open.exit_price(candle, params, signal.signal_type) {
                    let proceeds = open.net_value(price, self.fee_rate);
                    let pnl = proceeds - open.cost_basis;
                    balance = proceeds;
                    tally.record(pnl);
                    position = None;

                    tracing::debug!(
                        "Exit {:?} @ {:.4} (entry {:.4}), P&L ${:.2}",
                        reason,
                        price,
                        open.entry_price,
                        pnl
                    );
                }
            }

            if position.is_none() && signal.signal_type == SignalType::Buy {
                position = Some(OpenPosition::open(balance, candle.close, self.fee_rate));
                tracing::debug!("Entry @ {:.4}: {}", candle.close, signal.reason);
            }

            let equity = match &position {
                Some(open) => open.net_value(candle.close, self.fee_rate),
                None => balance,
            };
            equity_curve.push(equity);

            if equity > peak_equity {
                peak_equity = equity;
            }
            let drawdown = (peak_equity - equity) / peak_equity;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        if let (Some(open), Some(last)) = (position, candles.last()) {
            let proceeds = open.net_value(last.close, self.fee_rate);
            let pnl = proceeds - open.cost_basis;
            balance = proceeds;
            tally.record(pnl);

            tracing::debug!(
                "Exit {:?} @ {:.4}, P&L ${:.2}",
                ExitReason::EndOfData,
                last.close,
                pnl
            );
        }

        let result =
            tally.into_result(balance - self.starting_balance, max_drawdown, &equity_curve);

        tracing::debug!(
            "Backtest complete ({}): {} trades, P&L ${:.2}, win rate {:.1}%",
            regime,
            result.trade_count,
            result.net_profit,
            result.win_rate
        );

        result
    }
}

/// Simulate `params` under `regime` with the standard balance and fee
pub fn run_backtest(
    candles: &[Candle],
    params: &StrategyParams,
    regime: MarketRegime,
) -> BacktestResult {
    BacktestRunner::default().run(candles, params, regime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                Candle::new(i as i64 * 60_000, close, close + 0.05, close - 0.05, close, 1000.0)
            })
            .collect()
    }

    fn rising_wave(n: usize) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / 30.0;
                100.0 + 0.04 * i as f64 + 0.8 * phase.sin()
            })
            .collect();
        create_test_candles(&closes)
    }

    #[test]
    fn test_short_series_returns_zeroed() {
        let params = StrategyParams::default();
        let candles = rising_wave(params.warmup());
        assert_eq!(
            run_backtest(&candles, &params, MarketRegime::TrendingUp),
            BacktestResult::zeroed()
        );
    }

    #[test]
    fn test_flat_market_no_trades() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| Candle::new(i * 60_000, 100.0, 100.0, 100.0, 100.0, 1000.0))
            .collect();

        let result = run_backtest(&candles, &StrategyParams::default(), MarketRegime::Ranging);

        assert_eq!(result.trade_count, 0);
        assert_eq!(result.net_profit, 0.0);
        assert_eq!(result.profit_factor, 0.0);
        assert_eq!(result.max_drawdown, 0.0);
        assert_eq!(result.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_rising_market_is_profitable() {
        let candles = rising_wave(300);
        let result = run_backtest(&candles, &StrategyParams::default(), MarketRegime::TrendingUp);

        // Every pullback entry reaches the 4% target or the end of data in profit
        assert_eq!(result.trade_count, 9);
        assert_eq!(result.win_rate, 100.0);
        assert_eq!(result.profit_factor, 10.0);
        assert!(result.net_profit > 400.0, "net profit {}", result.net_profit);
        assert!(result.max_drawdown > 0.0 && result.max_drawdown < 2.0);
        assert_eq!(result.sortino_ratio, 0.0);
    }

    #[test]
    fn test_backtest_is_deterministic() {
        let candles = rising_wave(200);
        let params = StrategyParams::default();

        let a = run_backtest(&candles, &params, MarketRegime::TrendingUp);
        let b = run_backtest(&candles, &params, MarketRegime::TrendingUp);

        assert_eq!(a.net_profit.to_bits(), b.net_profit.to_bits());
        assert_eq!(a.sharpe_ratio.to_bits(), b.sharpe_ratio.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn test_stop_loss_takes_priority_over_take_profit() {
        let position = OpenPosition::open(10_000.0, 100.0, FEE_RATE);
        let params = StrategyParams::default();

        // Range touches both 98 (stop) and 104 (target)
        let wide = Candle::new(0, 100.0, 105.0, 97.0, 101.0, 1000.0);
        let (price, reason) = position.exit_price(&wide, &params, SignalType::Hold).unwrap();
        assert_eq!(reason, ExitReason::StopLoss);
        assert!((price - 98.0).abs() < 1e-9);

        let target = Candle::new(0, 100.0, 104.5, 99.0, 104.0, 1000.0);
        let (price, reason) = position.exit_price(&target, &params, SignalType::Sell).unwrap();
        assert_eq!(reason, ExitReason::TakeProfit);
        assert!((price - 104.0).abs() < 1e-9);

        let quiet = Candle::new(0, 100.0, 100.5, 99.5, 100.2, 1000.0);
        assert_eq!(
            position.exit_price(&quiet, &params, SignalType::Sell),
            Some((100.2, ExitReason::Signal))
        );
        assert_eq!(position.exit_price(&quiet, &params, SignalType::Buy), None);
    }

    #[test]
    fn test_round_trip_fees() {
        let position = OpenPosition::open(10_000.0, 100.0, FEE_RATE);
        assert!((position.amount - 99.94).abs() < 1e-9);

        // Exiting at the entry price loses both fees
        let proceeds = position.net_value(100.0, FEE_RATE);
        assert!(proceeds < 10_000.0);
        assert!((10_000.0 - proceeds - 11.996_4).abs() < 1e-6);
    }

    #[test]
    fn test_losing_downtrend_trades() {
        // Pullback buys inside a falling market keep getting stopped or sold
        let closes: Vec<f64> = (0..300)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / 30.0;
                200.0 - 0.04 * i as f64 - 0.8 * phase.sin()
            })
            .collect();
        let candles = create_test_candles(&closes);

        let result = run_backtest(&candles, &StrategyParams::default(), MarketRegime::TrendingDown);
        assert!(result.trade_count > 0);
        assert!(result.net_profit < 0.0);
        assert_eq!(result.profit_factor, 0.0);
        assert!((-5.0..=5.0).contains(&result.sharpe_ratio));
    }
}
