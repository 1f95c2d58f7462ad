//! Performance report computed from an equity curve and trade log.
//!
//! All statistics derive from the recorded curve and trades, so the same
//! inputs always produce the same report. Ratios are annualized with the
//! period count of the configured data frequency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::{EquityPoint, Trade};

/// Errors from metric computation.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("insufficient data: need at least {needed} equity points, got {got}")]
    InsufficientData { needed: usize, got: usize },
}

/// Comprehensive performance statistics for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    // Return metrics
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,

    // Risk-adjusted returns
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,

    // Drawdown
    pub max_drawdown_pct: f64,
    /// Longest stretch of consecutive periods below the running peak.
    pub max_drawdown_duration: usize,

    // Trade statistics
    pub total_trades: usize,
    /// Trades that reduced or closed a position (carry realized P&L).
    pub realized_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    /// `None` when there are no losing trades.
    pub profit_factor: Option<f64>,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub total_fees: Decimal,
}

impl Default for PerformanceReport {
    fn default() -> Self {
        Self {
            total_return_pct: 0.0,
            annualized_return_pct: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            calmar_ratio: 0.0,
            max_drawdown_pct: 0.0,
            max_drawdown_duration: 0,
            total_trades: 0,
            realized_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            profit_factor: None,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            total_fees: Decimal::ZERO,
        }
    }
}

impl PerformanceReport {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let profit_factor = match self.profit_factor {
            Some(pf) => format!("{:.2}", pf),
            None => "n/a".to_string(),
        };
        format!(
            "Performance Summary\n\
             ====================\n\
             \n\
             Total Return: {:.2}%\n\
             Annualized Return: {:.2}%\n\
             Sharpe Ratio: {:.2}\n\
             Sortino Ratio: {:.2}\n\
             Calmar Ratio: {:.2}\n\
             \n\
             Max Drawdown: {:.2}% ({} periods)\n\
             \n\
             Trades: {} ({} realized, W: {}, L: {})\n\
             Win Rate: {:.1}%\n\
             Profit Factor: {}\n\
             Avg Winner: {:.2}\n\
             Avg Loser: {:.2}\n\
             Largest Win: {:.2}\n\
             Largest Loss: {:.2}\n\
             Total Fees: {:.2}",
            self.total_return_pct,
            self.annualized_return_pct,
            self.sharpe_ratio,
            self.sortino_ratio,
            self.calmar_ratio,
            self.max_drawdown_pct,
            self.max_drawdown_duration,
            self.total_trades,
            self.realized_trades,
            self.winning_trades,
            self.losing_trades,
            self.win_rate * 100.0,
            profit_factor,
            self.avg_win,
            self.avg_loss,
            self.largest_win,
            self.largest_loss,
            self.total_fees,
        )
    }
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.is_empty() {
        return 0.0;
    }
    drawdown_stats(equity_curve).0
}

/// Simple returns between consecutive equity points.
pub fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = to_f64(w[0].equity);
            let curr = to_f64(w[1].equity);
            if prev == 0.0 {
                0.0
            } else {
                (curr - prev) / prev
            }
        })
        .collect()
}

/// Compute the full performance report.
///
/// Needs at least two equity points; everything else degrades gracefully
/// (an empty trade log yields zeroed trade statistics, ratios become 0
/// rather than NaN when a denominator vanishes).
pub fn compute_performance(
    equity_curve: &[EquityPoint],
    trades: &[Trade],
    risk_free_rate: f64,
    periods_per_year: f64,
) -> Result<PerformanceReport, MetricsError> {
    if equity_curve.len() < 2 {
        return Err(MetricsError::InsufficientData {
            needed: 2,
            got: equity_curve.len(),
        });
    }

    let initial = to_f64(equity_curve[0].equity);
    let final_value = to_f64(equity_curve[equity_curve.len() - 1].equity);
    let total_return = if initial == 0.0 {
        0.0
    } else {
        final_value / initial - 1.0
    };

    let periods = (equity_curve.len() - 1) as f64;
    let annualized_return = if 1.0 + total_return <= 0.0 {
        -1.0
    } else {
        (1.0 + total_return).powf(periods_per_year / periods) - 1.0
    };

    let returns = period_returns(equity_curve);
    let per_period_rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - per_period_rf).collect();
    let mean_excess = excess.iter().sum::<f64>() / excess.len() as f64;

    let stdev = population_stdev(&excess);
    let sharpe_ratio = if stdev == 0.0 {
        0.0
    } else {
        mean_excess / stdev * periods_per_year.sqrt()
    };

    let negative_excess: Vec<f64> = excess.iter().copied().filter(|e| *e < 0.0).collect();
    let downside = population_stdev(&negative_excess);
    let sortino_ratio = if downside == 0.0 {
        0.0
    } else {
        mean_excess / downside * periods_per_year.sqrt()
    };

    let (max_drawdown, max_drawdown_duration) = drawdown_stats(equity_curve);
    let calmar_ratio = if max_drawdown == 0.0 {
        0.0
    } else {
        annualized_return / max_drawdown
    };

    let realized: Vec<Decimal> = trades.iter().filter_map(|t| t.realized_pnl).collect();
    let winners: Vec<Decimal> = realized
        .iter()
        .copied()
        .filter(|p| *p > Decimal::ZERO)
        .collect();
    let losers: Vec<Decimal> = realized
        .iter()
        .copied()
        .filter(|p| *p < Decimal::ZERO)
        .collect();

    let gross_profit: Decimal = winners.iter().copied().sum();
    let gross_loss: Decimal = losers.iter().copied().sum();
    let win_rate = if realized.is_empty() {
        0.0
    } else {
        winners.len() as f64 / realized.len() as f64
    };
    let profit_factor = if losers.is_empty() {
        None
    } else {
        Some(to_f64(gross_profit) / to_f64(gross_loss.abs()))
    };

    let avg_win = if winners.is_empty() {
        Decimal::ZERO
    } else {
        gross_profit / Decimal::from(winners.len() as i64)
    };
    let avg_loss = if losers.is_empty() {
        Decimal::ZERO
    } else {
        gross_loss / Decimal::from(losers.len() as i64)
    };

    Ok(PerformanceReport {
        total_return_pct: total_return * 100.0,
        annualized_return_pct: annualized_return * 100.0,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        max_drawdown_pct: max_drawdown * 100.0,
        max_drawdown_duration,
        total_trades: trades.len(),
        realized_trades: realized.len(),
        winning_trades: winners.len(),
        losing_trades: losers.len(),
        win_rate,
        profit_factor,
        gross_profit,
        gross_loss,
        avg_win,
        avg_loss,
        largest_win: winners.iter().copied().max().unwrap_or(Decimal::ZERO),
        largest_loss: losers.iter().copied().min().unwrap_or(Decimal::ZERO),
        total_fees: trades.iter().map(|t| t.fee).sum(),
    })
}

fn to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(0.0)
}

fn population_stdev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Largest peak-to-trough decline as a fraction of the peak, plus the
/// longest run of periods spent below the running peak.
fn drawdown_stats(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let mut peak = to_f64(equity_curve[0].equity);
    let mut max_drawdown = 0.0;
    let mut current_run = 0;
    let mut max_run = 0;

    for point in equity_curve {
        let value = to_f64(point.equity);
        if value >= peak {
            peak = value;
            current_run = 0;
        } else {
            current_run += 1;
            max_run = max_run.max(current_run);
            if peak > 0.0 {
                let drawdown = (peak - value) / peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }
    }

    (max_drawdown, max_run)
}
