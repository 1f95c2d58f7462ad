//! Optimization objectives.
//!
//! An objective picks the scalar the optimizer maximizes out of a
//! completed backtest's performance report.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::BacktestResult;

/// Metric the optimizer maximizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    SharpeRatio,
    TotalReturn,
    SortinoRatio,
    CalmarRatio,
    ProfitFactor,
}

impl Objective {
    /// Score a completed backtest. Higher is better.
    pub fn score(&self, result: &BacktestResult) -> f64 {
        let perf = &result.performance;
        match self {
            Self::SharpeRatio => perf.sharpe_ratio,
            Self::TotalReturn => perf.total_return_pct,
            Self::SortinoRatio => perf.sortino_ratio,
            Self::CalmarRatio => perf.calmar_ratio,
            Self::ProfitFactor => match perf.profit_factor {
                Some(pf) => pf,
                // No losers recorded: top score when anything was won,
                // floor when nothing traded at all.
                None if perf.gross_profit > Decimal::ZERO => f64::INFINITY,
                None => 0.0,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SharpeRatio => "sharpe_ratio",
            Self::TotalReturn => "total_return",
            Self::SortinoRatio => "sortino_ratio",
            Self::CalmarRatio => "calmar_ratio",
            Self::ProfitFactor => "profit_factor",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sharpe_ratio" | "sharpe" => Ok(Self::SharpeRatio),
            "total_return" | "return" => Ok(Self::TotalReturn),
            "sortino_ratio" | "sortino" => Ok(Self::SortinoRatio),
            "calmar_ratio" | "calmar" => Ok(Self::CalmarRatio),
            "profit_factor" => Ok(Self::ProfitFactor),
            other => Err(format!("unknown objective '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::BacktestConfig;
    use crate::metrics::PerformanceReport;
    use crate::risk::RiskReport;
    use rust_decimal_macros::dec;

    fn result_with(performance: PerformanceReport) -> BacktestResult {
        BacktestResult {
            strategy_name: "test".to_string(),
            config: BacktestConfig::default(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            open_positions: Vec::new(),
            final_equity: dec!(10000),
            total_fees: dec!(0),
            rejected_signals: 0,
            performance,
            risk: RiskReport {
                var_estimates: Vec::new(),
                stress_results: Vec::new(),
                max_drawdown_pct: 0.0,
            },
        }
    }

    #[test]
    fn test_each_objective_reads_its_metric() {
        let result = result_with(PerformanceReport {
            sharpe_ratio: 1.5,
            total_return_pct: 12.0,
            sortino_ratio: 2.1,
            calmar_ratio: 0.8,
            profit_factor: Some(1.7),
            ..PerformanceReport::default()
        });

        assert_eq!(Objective::SharpeRatio.score(&result), 1.5);
        assert_eq!(Objective::TotalReturn.score(&result), 12.0);
        assert_eq!(Objective::SortinoRatio.score(&result), 2.1);
        assert_eq!(Objective::CalmarRatio.score(&result), 0.8);
        assert_eq!(Objective::ProfitFactor.score(&result), 1.7);
    }

    #[test]
    fn test_profit_factor_without_losers() {
        let all_wins = result_with(PerformanceReport {
            profit_factor: None,
            gross_profit: dec!(50),
            ..PerformanceReport::default()
        });
        assert_eq!(Objective::ProfitFactor.score(&all_wins), f64::INFINITY);

        let no_trades = result_with(PerformanceReport::default());
        assert_eq!(Objective::ProfitFactor.score(&no_trades), 0.0);
    }

    #[test]
    fn test_parse_round_trip() {
        for objective in [
            Objective::SharpeRatio,
            Objective::TotalReturn,
            Objective::SortinoRatio,
            Objective::CalmarRatio,
            Objective::ProfitFactor,
        ] {
            assert_eq!(objective.as_str().parse::<Objective>(), Ok(objective));
        }
        assert!("drawdown".parse::<Objective>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&Objective::SharpeRatio).unwrap(),
            "\"sharpe_ratio\""
        );
        let back: Objective = serde_json::from_str("\"profit_factor\"").unwrap();
        assert_eq!(back, Objective::ProfitFactor);
    }
}
