//! Trading strategies driven by weather data.
//!
//! This module provides the strategy abstraction and the built-in strategies:
//! - Signal and parameter types shared by every strategy
//! - Threshold triggers on a single weather variable
//! - Weighted multi-variable scoring
//! - Seasonal deviation against a trailing window
//! - A registry for constructing strategies by name

pub mod params;
pub mod pattern;
pub mod registry;
pub mod seasonal;
pub mod signal;
pub mod threshold;
pub mod traits;

pub use params::{ParamSet, ParamValue};
pub use pattern::MultiVariableStrategy;
pub use registry::{
    create_strategy, default_search_space, RegistryFactory, StrategyFactory, STRATEGY_NAMES,
};
pub use seasonal::SeasonalStrategy;
pub use signal::{Side, TradingSignal};
pub use threshold::{ThresholdStrategy, TriggerMode};
pub use traits::{Strategy, StrategyError};
