//! Stress scenarios applied to open exposure.
//!
//! A scenario is a uniform relative repricing of every open position's
//! last quoted probability. Estimated losses are loss-positive, so a
//! short position books a negative "loss" (a gain) under a selloff.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::Position;

/// A named uniform price shock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    pub description: String,

    /// Relative price move, e.g. -0.30 for a 30% drop.
    pub price_shock_pct: f64,
}

impl StressScenario {
    pub fn new(name: impl Into<String>, description: impl Into<String>, shock: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            price_shock_pct: shock,
        }
    }

    /// The scenario set used when a config does not supply its own.
    pub fn default_set() -> Vec<StressScenario> {
        vec![
            StressScenario::new(
                "moderate_selloff",
                "Broad 15% repricing against open exposure",
                -0.15,
            ),
            StressScenario::new(
                "severe_selloff",
                "Broad 30% repricing against open exposure",
                -0.30,
            ),
            StressScenario::new(
                "extreme_collapse",
                "Half of open exposure wiped out",
                -0.50,
            ),
            StressScenario::new(
                "short_squeeze",
                "20% repricing against short exposure",
                0.20,
            ),
        ]
    }
}

/// Estimated loss for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario: StressScenario,
    pub estimated_loss: Decimal,
}

/// Apply every scenario to the open positions at their last prices.
///
/// A position without a quoted price yet is valued at its entry price.
pub fn apply_scenarios(
    positions: &[Position],
    last_prices: &BTreeMap<(String, String), Decimal>,
    scenarios: &[StressScenario],
) -> Vec<StressResult> {
    scenarios
        .iter()
        .map(|scenario| {
            let shock = Decimal::try_from(scenario.price_shock_pct).unwrap_or_default();
            let estimated_loss: Decimal = positions
                .iter()
                .map(|p| {
                    let key = (p.market_id.clone(), p.outcome.clone());
                    let price = last_prices
                        .get(&key)
                        .copied()
                        .unwrap_or(p.average_entry_price);
                    -(p.quantity * price * shock)
                })
                .sum();
            StressResult {
                scenario: scenario.clone(),
                estimated_loss,
            }
        })
        .collect()
}
