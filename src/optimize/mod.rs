//! Strategy parameter optimization.
//!
//! Provides:
//! - Search space types (continuous, discrete, categorical ranges)
//! - Objectives over backtest performance metrics
//! - Grid, random, and evolutionary search with parallel evaluation

pub mod objective;
pub mod optimizer;
pub mod space;

pub use objective::Objective;
pub use optimizer::{
    Evaluation, OptimizationMethod, OptimizationResult, OptimizeError, Optimizer, OptimizerConfig,
};
pub use space::{ParamRange, SearchSpace};
