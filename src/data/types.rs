//! Core observation types for weather-informed backtesting.
//!
//! Observations are produced by the external ingestion/validation pipeline
//! and arrive already cleaned, quality-scored, and sorted by timestamp.
//! The engine treats them as read-only inputs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single market quote for one outcome of a prediction market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    /// Observation time (UTC).
    pub timestamp: DateTime<Utc>,

    /// Market identifier.
    pub market_id: String,

    /// Outcome name within the market (e.g., "yes").
    pub outcome: String,

    /// Quoted contract price in [0, 1].
    pub probability: Decimal,

    /// Traded volume at this observation.
    pub volume: Decimal,

    /// Upstream quality score in [0, 1].
    pub quality_score: f64,
}

/// A single weather station reading.
///
/// Individual measurements are optional: stations report irregular
/// subsets of variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// Observation time (UTC).
    pub timestamp: DateTime<Utc>,

    /// Station or location identifier.
    pub location: String,

    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_kph: Option<f64>,
    pub precipitation_mm: Option<f64>,

    /// Upstream quality score in [0, 1].
    pub quality_score: f64,
}

impl WeatherObservation {
    /// Extract a single measurement by field.
    pub fn field(&self, field: WeatherField) -> Option<f64> {
        match field {
            WeatherField::Temperature => self.temperature_c,
            WeatherField::Humidity => self.humidity_pct,
            WeatherField::WindSpeed => self.wind_speed_kph,
            WeatherField::Precipitation => self.precipitation_mm,
        }
    }
}

/// Weather variable selector used by strategy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherField {
    Temperature,
    Humidity,
    WindSpeed,
    Precipitation,
}

impl WeatherField {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "temperature" | "temperature_c" => Some(Self::Temperature),
            "humidity" | "humidity_pct" => Some(Self::Humidity),
            "wind_speed" | "wind" | "wind_speed_kph" => Some(Self::WindSpeed),
            "precipitation" | "precipitation_mm" => Some(Self::Precipitation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::WindSpeed => "wind_speed",
            Self::Precipitation => "precipitation",
        }
    }
}
