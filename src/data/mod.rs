//! Data access layer.
//!
//! Provides:
//! - Observation types (market quotes, weather readings)
//! - The read-only provider interface the engine consumes
//! - A CSV-backed store for interchange files from the upstream pipeline

pub mod loader;
pub mod provider;
pub mod types;

pub use loader::{ObservationStore, MARKET_FILE, WEATHER_FILE};
pub use provider::{DataError, DataProvider, InMemoryProvider};
pub use types::{MarketObservation, WeatherField, WeatherObservation};
