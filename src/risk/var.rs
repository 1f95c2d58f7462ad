//! Value-at-Risk and expected shortfall over period returns.
//!
//! All three estimators follow the loss-positive convention: a value of
//! 0.03 at 95% confidence reads "the 5% worst periods lose at least 3%".

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Tail-risk estimates at one confidence level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    pub confidence: f64,
    pub historical_var: f64,
    pub parametric_var: f64,
    pub expected_shortfall: f64,
}

impl VarEstimate {
    /// Compute all three estimators for one confidence level.
    pub fn from_returns(returns: &[f64], confidence: f64) -> Self {
        Self {
            confidence,
            historical_var: historical_var(returns, confidence),
            parametric_var: parametric_var(returns, confidence),
            expected_shortfall: expected_shortfall(returns, confidence),
        }
    }
}

/// Historical VaR: the `(1 - confidence)` quantile of returns by sorted
/// index, sign-flipped. Returns 0 for an empty series.
pub fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((1.0 - confidence) * sorted.len() as f64) as usize;
    -sorted[idx.min(sorted.len() - 1)]
}

/// Parametric (Gaussian) VaR from the sample mean and standard deviation.
pub fn parametric_var(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let z = standard_normal_quantile(1.0 - confidence);
    -(mean + z * variance.sqrt())
}

/// Mean of the returns at or below the historical VaR quantile,
/// sign-flipped. Never less than the historical VaR itself.
pub fn expected_shortfall(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let quantile = -historical_var(returns, confidence);
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= quantile).collect();
    if tail.is_empty() {
        return 0.0;
    }
    -(tail.iter().sum::<f64>() / tail.len() as f64)
}

/// Standard normal quantile function.
fn standard_normal_quantile(p: f64) -> f64 {
    let normal = Normal::new(0.0, 1.0).unwrap();
    normal.inverse_cdf(p)
}
