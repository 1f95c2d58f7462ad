pub mod backtest;
pub mod data;
pub mod metrics;
pub mod optimize;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use data::{DataProvider, MarketObservation, ObservationStore, WeatherObservation};
pub use strategy::{create_strategy, ParamSet, ParamValue, Strategy, TradingSignal};
pub use backtest::{run_multiple_strategies, BacktestConfig, BacktestEngine, BacktestResult};
pub use optimize::{Objective, OptimizationMethod, OptimizationResult, Optimizer, OptimizerConfig};
pub use risk::{compute_risk, RiskReport};
pub use metrics::{compute_performance, PerformanceReport};
