//! Parameter search space definitions.
//!
//! A search space maps parameter names to ranges. Each range produces a
//! discrete value list for grid search, uniform draws for random search,
//! and bounded perturbations for evolutionary mutation.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::strategy::{ParamSet, ParamValue};

/// Legal values for one strategy parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRange {
    /// Real interval, discretized only for grid search.
    Continuous { min: f64, max: f64 },
    /// Integer lattice from `min` to `max` in `step` increments.
    Discrete { min: i64, max: i64, step: i64 },
    /// Fixed set of string options.
    Categorical(Vec<String>),
}

/// Named parameter ranges for one optimization run.
///
/// Ordered map so grid enumeration and candidate keys are stable.
pub type SearchSpace = BTreeMap<String, ParamRange>;

impl ParamRange {
    /// Whether the range contains at least one value.
    pub fn admits_values(&self) -> bool {
        match self {
            Self::Continuous { min, max } => min.is_finite() && max.is_finite() && min <= max,
            Self::Discrete { min, max, step } => *step > 0 && min <= max,
            Self::Categorical(values) => !values.is_empty(),
        }
    }

    /// Discrete values for grid search.
    ///
    /// Continuous ranges yield `grid_points` evenly spaced values (their
    /// midpoint when `grid_points < 2`); discrete and categorical ranges
    /// ignore `grid_points` and yield every value they contain. Degenerate
    /// ranges yield nothing.
    pub fn grid_values(&self, grid_points: usize) -> Vec<ParamValue> {
        if !self.admits_values() {
            return Vec::new();
        }
        match self {
            Self::Continuous { min, max } => {
                let span = max - min;
                if grid_points < 2 || span == 0.0 {
                    return vec![ParamValue::Float(min + span / 2.0)];
                }
                (0..grid_points)
                    .map(|i| ParamValue::Float(min + span * i as f64 / (grid_points - 1) as f64))
                    .collect()
            }
            Self::Discrete { min, max, step } => {
                let mut values = Vec::new();
                let mut current = *min;
                while current <= *max {
                    values.push(ParamValue::Int(current));
                    current += step;
                }
                values
            }
            Self::Categorical(values) => {
                values.iter().map(|v| ParamValue::Str(v.clone())).collect()
            }
        }
    }

    /// Uniform draw from the range.
    ///
    /// Callers validate the range first; discrete draws stay on the step
    /// lattice.
    pub fn sample(&self, rng: &mut impl Rng) -> ParamValue {
        match self {
            Self::Continuous { min, max } => ParamValue::Float(rng.gen_range(*min..=*max)),
            Self::Discrete { min, max, step } => {
                let steps = (max - min) / step;
                ParamValue::Int(min + rng.gen_range(0..=steps) * step)
            }
            Self::Categorical(values) => {
                ParamValue::Str(values[rng.gen_range(0..values.len())].clone())
            }
        }
    }

    /// Perturb `current` within the range.
    ///
    /// `scale` bounds the move as a fraction of the range span. Discrete
    /// values move whole steps and snap back onto the lattice; categorical
    /// values are redrawn.
    pub fn mutate(&self, current: &ParamValue, rng: &mut impl Rng, scale: f64) -> ParamValue {
        match self {
            Self::Continuous { min, max } => {
                let span = max - min;
                if span <= 0.0 {
                    return ParamValue::Float(*min);
                }
                let base = current.as_f64().unwrap_or(min + span / 2.0);
                let offset = rng.gen_range(-scale * span..=scale * span);
                ParamValue::Float((base + offset).clamp(*min, *max))
            }
            Self::Discrete { min, max, step } => {
                let lattice = (max - min) / step;
                let reach = ((lattice as f64 * scale).ceil() as i64).max(1);
                let base = current.as_i64().unwrap_or(*min);
                let moved = base + rng.gen_range(-reach..=reach) * step;
                ParamValue::Int(min + ((moved - min) / step).clamp(0, lattice) * step)
            }
            Self::Categorical(values) => {
                ParamValue::Str(values[rng.gen_range(0..values.len())].clone())
            }
        }
    }
}

/// Per-dimension grid value lists, in key order.
pub fn grid_axes(space: &SearchSpace, grid_points: usize) -> Vec<(String, Vec<ParamValue>)> {
    space
        .iter()
        .map(|(name, range)| (name.clone(), range.grid_values(grid_points)))
        .collect()
}

/// Total number of grid combinations, saturating on overflow.
pub fn grid_size(axes: &[(String, Vec<ParamValue>)]) -> usize {
    axes.iter()
        .fold(1, |acc, (_, values)| acc.saturating_mul(values.len()))
}

/// Decode the `index`-th grid combination (mixed-radix over the axes).
pub fn grid_candidate(axes: &[(String, Vec<ParamValue>)], index: usize) -> ParamSet {
    let mut params = ParamSet::new();
    let mut rest = index;
    for (name, values) in axes {
        params.insert(name.clone(), values[rest % values.len()].clone());
        rest /= values.len();
    }
    params
}

/// Materialize the full Cartesian product.
pub fn enumerate_grid(axes: &[(String, Vec<ParamValue>)]) -> Vec<ParamSet> {
    (0..grid_size(axes))
        .map(|index| grid_candidate(axes, index))
        .collect()
}

/// One uniform draw per dimension.
pub fn sample_set(space: &SearchSpace, rng: &mut impl Rng) -> ParamSet {
    space
        .iter()
        .map(|(name, range)| (name.clone(), range.sample(rng)))
        .collect()
}
