//! Risk report assembly.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::{EquityPoint, Position};
use crate::metrics::{max_drawdown, period_returns};

use super::stress::{apply_scenarios, StressResult, StressScenario};
use super::var::VarEstimate;

/// Tail and stress statistics for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    /// One entry per configured confidence level.
    pub var_estimates: Vec<VarEstimate>,

    /// One entry per configured stress scenario.
    pub stress_results: Vec<StressResult>,

    /// Max drawdown of the equity curve, as a percentage.
    pub max_drawdown_pct: f64,
}

impl RiskReport {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Risk Summary".to_string(),
            "====================".to_string(),
            String::new(),
        ];
        for estimate in &self.var_estimates {
            lines.push(format!(
                "VaR {:.0}%: historical {:.2}%, parametric {:.2}%, ES {:.2}%",
                estimate.confidence * 100.0,
                estimate.historical_var * 100.0,
                estimate.parametric_var * 100.0,
                estimate.expected_shortfall * 100.0,
            ));
        }
        lines.push(String::new());
        for result in &self.stress_results {
            lines.push(format!(
                "Stress '{}': {:.2} ({})",
                result.scenario.name, result.estimated_loss, result.scenario.description,
            ));
        }
        lines.push(String::new());
        lines.push(format!("Max Drawdown: {:.2}%", self.max_drawdown_pct));
        lines.join("\n")
    }
}

/// Compute the risk report over the period-return series and the
/// end-of-run open positions.
///
/// Total by construction: an equity curve too short for a return series
/// yields zeroed tail estimates rather than an error.
pub fn compute_risk(
    equity_curve: &[EquityPoint],
    open_positions: &[Position],
    last_prices: &BTreeMap<(String, String), Decimal>,
    confidence_levels: &[f64],
    scenarios: &[StressScenario],
) -> RiskReport {
    let returns = period_returns(equity_curve);

    let var_estimates = confidence_levels
        .iter()
        .map(|c| VarEstimate::from_returns(&returns, *c))
        .collect();

    RiskReport {
        var_estimates,
        stress_results: apply_scenarios(open_positions, last_prices, scenarios),
        max_drawdown_pct: max_drawdown(equity_curve) * 100.0,
    }
}
