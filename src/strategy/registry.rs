//! Strategy registry: build strategies by name.
//!
//! The engine and the optimizer both construct strategies from a name
//! plus a parameter set, so strategy selection stays a runtime concern
//! (config files, CLI flags, optimizer candidates) rather than a
//! compile-time one.

use crate::optimize::{ParamRange, SearchSpace};

use super::params::ParamSet;
use super::pattern::MultiVariableStrategy;
use super::seasonal::SeasonalStrategy;
use super::threshold::ThresholdStrategy;
use super::traits::{Strategy, StrategyError};

/// Names accepted by [`create_strategy`].
pub const STRATEGY_NAMES: &[&str] = &["threshold", "pattern", "seasonal"];

/// Instantiate a strategy by name, validating its parameters.
pub fn create_strategy(name: &str, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError> {
    match name {
        "threshold" => Ok(Box::new(ThresholdStrategy::from_params(params)?)),
        "pattern" => Ok(Box::new(MultiVariableStrategy::from_params(params)?)),
        "seasonal" => Ok(Box::new(SeasonalStrategy::from_params(params)?)),
        other => Err(StrategyError::Unknown(other.to_string())),
    }
}

/// Builds fresh strategy instances from candidate parameter sets.
///
/// The optimizer holds one of these per search so each evaluation gets
/// its own instance and nothing leaks between candidates.
pub trait StrategyFactory: Send + Sync {
    fn name(&self) -> &str;
    fn create(&self, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError>;
}

/// Factory backed by the registry lookup.
#[derive(Debug, Clone)]
pub struct RegistryFactory {
    name: String,
}

impl RegistryFactory {
    pub fn new(name: &str) -> Result<Self, StrategyError> {
        if !STRATEGY_NAMES.contains(&name) {
            return Err(StrategyError::Unknown(name.to_string()));
        }
        Ok(Self { name: name.to_string() })
    }
}

impl StrategyFactory for RegistryFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError> {
        create_strategy(&self.name, params)
    }
}

/// Default parameter search space for a registered strategy, used when
/// an optimization run does not spell out its own.
pub fn default_search_space(name: &str) -> Result<SearchSpace, StrategyError> {
    let mut space = SearchSpace::new();
    match name {
        "threshold" => {
            space.insert(
                "threshold".to_string(),
                ParamRange::Continuous { min: 20.0, max: 40.0 },
            );
            space.insert(
                "exit_buffer".to_string(),
                ParamRange::Continuous { min: 0.0, max: 3.0 },
            );
            space.insert(
                "quantity".to_string(),
                ParamRange::Discrete { min: 50, max: 200, step: 50 },
            );
        }
        "pattern" => {
            space.insert(
                "entry_score".to_string(),
                ParamRange::Continuous { min: 0.45, max: 0.85 },
            );
            space.insert(
                "exit_score".to_string(),
                ParamRange::Continuous { min: 0.05, max: 0.40 },
            );
            space.insert(
                "temperature_weight".to_string(),
                ParamRange::Continuous { min: 0.0, max: 1.0 },
            );
            space.insert(
                "wind_weight".to_string(),
                ParamRange::Continuous { min: 0.0, max: 1.0 },
            );
        }
        "seasonal" => {
            space.insert(
                "window_days".to_string(),
                ParamRange::Discrete { min: 10, max: 60, step: 10 },
            );
            space.insert(
                "upper_percentile".to_string(),
                ParamRange::Continuous { min: 0.6, max: 0.95 },
            );
            space.insert(
                "lower_percentile".to_string(),
                ParamRange::Continuous { min: 0.05, max: 0.4 },
            );
        }
        other => return Err(StrategyError::Unknown(other.to_string())),
    }
    Ok(space)
}
