//! Backtesting engine for weather-driven market strategies.
//!
//! This module provides the deterministic simulation core:
//! - Timeline construction from market and weather observations
//! - Look-ahead-free signal generation (prefix slices only)
//! - Position and cash bookkeeping with constraint enforcement
//! - Equity curve recording and result assembly
//! - Parallel multi-strategy comparison

pub mod engine;
pub mod ledger;

pub use engine::{
    run_multiple_strategies, BacktestConfig, BacktestEngine, BacktestError, BacktestResult,
    CancellationToken, DataFrequency, EquityPoint,
};
pub use ledger::{Ledger, Position, PositionStatus, RejectionReason, SignalOutcome, Trade};
