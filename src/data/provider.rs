//! Data access interface consumed by the backtesting engine.
//!
//! Providers return observations sorted by timestamp ascending, already
//! quality-filtered upstream. The engine never mutates what it reads.

use chrono::{DateTime, Utc};
use polars::prelude::PolarsError;
use thiserror::Error;

use super::types::{MarketObservation, WeatherObservation};

#[derive(Error, Debug)]
pub enum DataError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only source of aligned market and weather observations.
pub trait DataProvider: Send + Sync {
    /// Market observations for the given markets inside `[start, end]`,
    /// sorted by timestamp ascending.
    fn get_market_data(
        &self,
        market_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketObservation>, DataError>;

    /// Weather observations for the given locations inside `[start, end]`,
    /// sorted by timestamp ascending.
    fn get_weather_data(
        &self,
        locations: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherObservation>, DataError>;
}

/// Provider over pre-materialized observation vectors.
///
/// Used by tests and by the optimizer, which loads data once and shares
/// it across candidate evaluations.
pub struct InMemoryProvider {
    market: Vec<MarketObservation>,
    weather: Vec<WeatherObservation>,
}

impl InMemoryProvider {
    /// Build a provider; observations are sorted by timestamp on entry
    /// so lookups stay ordered regardless of input order.
    pub fn new(mut market: Vec<MarketObservation>, mut weather: Vec<WeatherObservation>) -> Self {
        market.sort_by_key(|o| o.timestamp);
        weather.sort_by_key(|o| o.timestamp);
        Self { market, weather }
    }

    pub fn market_len(&self) -> usize {
        self.market.len()
    }

    pub fn weather_len(&self) -> usize {
        self.weather.len()
    }
}

impl DataProvider for InMemoryProvider {
    fn get_market_data(
        &self,
        market_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketObservation>, DataError> {
        Ok(self
            .market
            .iter()
            .filter(|o| {
                o.timestamp >= start && o.timestamp <= end && market_ids.contains(&o.market_id)
            })
            .cloned()
            .collect())
    }

    fn get_weather_data(
        &self,
        locations: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherObservation>, DataError> {
        Ok(self
            .weather
            .iter()
            .filter(|o| {
                o.timestamp >= start && o.timestamp <= end && locations.contains(&o.location)
            })
            .cloned()
            .collect())
    }
}
