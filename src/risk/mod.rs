//! Risk metrics module.
//!
//! Provides:
//! - Historical and parametric Value-at-Risk
//! - Expected shortfall
//! - Stress scenarios over open exposure
//! - The aggregated per-run risk report

pub mod report;
pub mod stress;
pub mod var;

pub use report::{compute_risk, RiskReport};
pub use stress::{apply_scenarios, StressResult, StressScenario};
pub use var::{expected_shortfall, historical_var, parametric_var, VarEstimate};
