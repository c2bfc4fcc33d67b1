use serde::{Deserialize, Serialize};

/// Sharpe annualisation for 1-minute bars
const ANNUALIZATION_FACTOR: f64 = 365.0 * 24.0 * 60.0;
const SHARPE_CLAMP: f64 = 5.0;
const MIN_RETURN_STD_DEV: f64 = 1e-8;
/// Profit factor reported when a run has winners but no losers
const LOSSLESS_PROFIT_FACTOR: f64 = 10.0;

/// Performance report of one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub net_profit: f64,
    /// Percentage of closed trades with positive P&L
    pub win_rate: f64,
    pub trade_count: usize,
    pub profit_factor: f64,
    /// Peak-to-trough decline of the equity curve, in percent
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    /// Not computed; always 0
    pub sortino_ratio: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

impl BacktestResult {
    /// Result for a run too short to trade
    pub fn zeroed() -> Self {
        Self {
            net_profit: 0.0,
            win_rate: 0.0,
            trade_count: 0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 P&L SUMMARY");
        println!("  Net Profit:            ${:.2}", self.net_profit);

        println!("\n📈 TRADE STATISTICS");
        println!("  Total Trades:          {}", self.trade_count);
        println!("  Win Rate:              {:.1}%", self.win_rate);

        if self.trade_count > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Average Win:           ${:.2}", self.avg_win);
            println!("  Average Loss:          ${:.2}", self.avg_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);
        }

        println!("\n⚠️  RISK METRICS");
        println!("  Max Drawdown:          {:.2}%", self.max_drawdown);
        println!("  Sharpe Ratio:          {:.2}", self.sharpe_ratio);

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}

/// Running win/loss accumulator for closed trades
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeTally {
    pub trade_count: usize,
    pub wins: usize,
    pub gross_profit: f64,
    pub gross_loss: f64,
}

impl TradeTally {
    /// Book a closed trade; zero P&L counts as a loss
    pub fn record(&mut self, pnl: f64) {
        if pnl > 0.0 {
            self.wins += 1;
            self.gross_profit += pnl;
        } else {
            self.gross_loss += pnl.abs();
        }
        self.trade_count += 1;
    }

    pub fn losses(&self) -> usize {
        self.trade_count - self.wins
    }

    /// Assemble the final report
    ///
    /// `max_drawdown` is the fraction observed on the equity curve.
    pub fn into_result(
        self,
        net_profit: f64,
        max_drawdown: f64,
        equity_curve: &[f64],
    ) -> BacktestResult {
        let win_rate = if self.trade_count > 0 {
            self.wins as f64 / self.trade_count as f64 * 100.0
        } else {
            0.0
        };
        let avg_win = if self.wins > 0 {
            self.gross_profit / self.wins as f64
        } else {
            0.0
        };
        let avg_loss = if self.losses() > 0 {
            self.gross_loss / self.losses() as f64
        } else {
            0.0
        };

        BacktestResult {
            net_profit,
            win_rate,
            trade_count: self.trade_count,
            profit_factor: profit_factor(self.gross_profit, self.gross_loss),
            max_drawdown: max_drawdown * 100.0,
            sharpe_ratio: sharpe_ratio(equity_curve),
            sortino_ratio: 0.0,
            avg_win,
            avg_loss,
        }
    }
}

/// Gross profit over gross loss, 10 for a lossless winning run, 0 for no P&L
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss == 0.0 {
        if gross_profit > 0.0 {
            LOSSLESS_PROFIT_FACTOR
        } else {
            0.0
        }
    } else {
        gross_profit / gross_loss
    }
}

/// Annualised Sharpe ratio of per-bar equity returns, clamped to [-5, 5]
///
/// Uses the population standard deviation; a near-zero deviation yields 0.
pub fn sharpe_ratio(equity_curve: &[f64]) -> f64 {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();

    if returns.is_empty() {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let sharpe = if std_dev > MIN_RETURN_STD_DEV {
        mean / std_dev * ANNUALIZATION_FACTOR.sqrt()
    } else {
        0.0
    };

    sharpe.clamp(-SHARPE_CLAMP, SHARPE_CLAMP)
}
