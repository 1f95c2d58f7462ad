//! The strategy capability interface.
//!
//! A strategy is a pure function of the observation slices visible at the
//! current step plus a read-only snapshot of open positions. It must not
//! mutate its inputs, block, or carry side effects; the engine relies on
//! this to run strategies in parallel across independent runs.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::backtest::Position;
use crate::data::{MarketObservation, WeatherField, WeatherObservation};

use super::signal::TradingSignal;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Unknown strategy: {0}")]
    Unknown(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Signal generation failed: {0}")]
    Generation(String),
}

/// Pluggable trading policy.
///
/// `generate_signals` receives only observations timestamped at or before
/// the current simulation step; returning an error aborts that run.
pub trait Strategy: Send + Sync {
    /// Registered strategy name.
    fn name(&self) -> &str;

    /// Turn visible observations and open positions into signals.
    fn generate_signals(
        &self,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
        open_positions: &[Position],
    ) -> Result<Vec<TradingSignal>, StrategyError>;
}

/// Latest quote per `(market_id, outcome)`, in key order.
///
/// The input slice is sorted by timestamp, so the last write per key wins.
pub fn latest_market_quotes(market: &[MarketObservation]) -> Vec<&MarketObservation> {
    let mut latest: BTreeMap<(&str, &str), &MarketObservation> = BTreeMap::new();
    for obs in market {
        latest.insert((obs.market_id.as_str(), obs.outcome.as_str()), obs);
    }
    latest.into_values().collect()
}

/// Most recent reading of one weather field, optionally pinned to a location.
pub fn latest_weather_value(
    weather: &[WeatherObservation],
    location: Option<&str>,
    field: WeatherField,
) -> Option<f64> {
    weather
        .iter()
        .rev()
        .filter(|o| location.map_or(true, |loc| o.location == loc))
        .find_map(|o| o.field(field))
}

/// Open position for a `(market_id, outcome)`, if any.
pub fn open_position<'a>(
    positions: &'a [Position],
    market_id: &str,
    outcome: &str,
) -> Option<&'a Position> {
    positions
        .iter()
        .find(|p| p.market_id == market_id && p.outcome == outcome)
}
