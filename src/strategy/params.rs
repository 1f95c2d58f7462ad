//! Strategy parameter values.
//!
//! Parameters travel as a name/value map so strategies can be constructed
//! by name and swept by the optimizer without bespoke config structs.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => Some(v.round() as i64),
            Self::Str(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Named parameters for one strategy instance.
///
/// Ordered map so serialized sets and sweep keys are stable.
pub type ParamSet = BTreeMap<String, ParamValue>;

pub fn get_f64(params: &ParamSet, key: &str, default: f64) -> f64 {
    params.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

pub fn get_i64(params: &ParamSet, key: &str, default: i64) -> i64 {
    params.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

pub fn get_decimal(params: &ParamSet, key: &str, default: Decimal) -> Decimal {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .and_then(Decimal::from_f64_retain)
        .unwrap_or(default)
}

pub fn get_str<'a>(params: &'a ParamSet, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

/// Compact `name=value` key for logs and evaluation history.
pub fn param_key(params: &ParamSet) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("_")
}
