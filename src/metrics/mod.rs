//! Performance metrics module.
//!
//! Provides comprehensive performance calculations:
//! - Total and annualized return
//! - Sharpe, Sortino, and Calmar ratios
//! - Maximum drawdown and drawdown duration
//! - Win rate, profit factor, trade statistics

pub mod performance;

pub use performance::{
    compute_performance, max_drawdown, period_returns, MetricsError, PerformanceReport,
};
