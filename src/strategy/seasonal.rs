//! Seasonal strategy: current reading versus its own trailing window.
//!
//! Keeps a trailing window of readings for one weather variable and
//! compares the latest value against percentile bands of that window.
//! Entry when the value sits in the upper band (unusually high for the
//! recent season), exit when it drops into the lower band. All context
//! comes from the visible history, so the comparison never peeks ahead.

use chrono::Duration;
use rust_decimal::Decimal;

use crate::backtest::Position;
use crate::data::{MarketObservation, WeatherField, WeatherObservation};

use super::params::{self, ParamSet};
use super::signal::TradingSignal;
use super::traits::{latest_market_quotes, open_position, Strategy, StrategyError};

#[derive(Debug, Clone)]
pub struct SeasonalStrategy {
    field: WeatherField,
    window_days: i64,
    upper_percentile: f64,
    lower_percentile: f64,
    min_observations: usize,
    location: Option<String>,
    market_id: Option<String>,
    outcome: String,
    quantity: Decimal,
}

impl SeasonalStrategy {
    /// Build from a parameter set.
    ///
    /// Recognized parameters: `field`, `window_days`, `upper_percentile`,
    /// `lower_percentile`, `min_observations`, `location`, `market_id`,
    /// `outcome`, `quantity`.
    pub fn from_params(p: &ParamSet) -> Result<Self, StrategyError> {
        let field_name = params::get_str(p, "field", "temperature");
        let field = WeatherField::from_str(field_name).ok_or_else(|| {
            StrategyError::InvalidParameter {
                name: "field".to_string(),
                reason: format!("unknown weather field '{}'", field_name),
            }
        })?;

        let window_days = params::get_i64(p, "window_days", 30);
        if window_days < 1 {
            return Err(StrategyError::InvalidParameter {
                name: "window_days".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let upper = params::get_f64(p, "upper_percentile", 0.8);
        let lower = params::get_f64(p, "lower_percentile", 0.2);
        if !(0.0..=1.0).contains(&upper) || !(0.0..=1.0).contains(&lower) || lower >= upper {
            return Err(StrategyError::InvalidParameter {
                name: "percentiles".to_string(),
                reason: format!(
                    "need 0 <= lower < upper <= 1, got lower={} upper={}",
                    lower, upper
                ),
            });
        }

        let quantity = params::get_decimal(p, "quantity", Decimal::from(100));
        if quantity <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameter {
                name: "quantity".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            field,
            window_days,
            upper_percentile: upper,
            lower_percentile: lower,
            min_observations: params::get_i64(p, "min_observations", 5).max(1) as usize,
            location: p.get("location").and_then(|v| v.as_str()).map(String::from),
            market_id: p.get("market_id").and_then(|v| v.as_str()).map(String::from),
            outcome: params::get_str(p, "outcome", "yes").to_string(),
            quantity,
        })
    }

    /// Readings of the configured field inside the trailing window,
    /// oldest first, ending at the most recent visible observation.
    fn window_values(&self, weather: &[WeatherObservation]) -> Vec<f64> {
        let Some(latest) = weather
            .iter()
            .rev()
            .find(|o| self.location.as_deref().map_or(true, |loc| o.location == loc))
        else {
            return Vec::new();
        };
        let cutoff = latest.timestamp - Duration::days(self.window_days);

        weather
            .iter()
            .filter(|o| o.timestamp >= cutoff)
            .filter(|o| self.location.as_deref().map_or(true, |loc| o.location == loc))
            .filter_map(|o| o.field(self.field))
            .collect()
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() as f64) * p) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Fraction of window values at or below the latest reading.
fn rank(values: &[f64], latest: f64) -> f64 {
    let below = values.iter().filter(|v| **v <= latest).count();
    below as f64 / values.len() as f64
}

impl Strategy for SeasonalStrategy {
    fn name(&self) -> &str {
        "seasonal"
    }

    fn generate_signals(
        &self,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
        open_positions: &[Position],
    ) -> Result<Vec<TradingSignal>, StrategyError> {
        let values = self.window_values(weather);
        if values.len() < self.min_observations {
            return Ok(Vec::new());
        }
        let latest = match values.last() {
            Some(v) => *v,
            None => return Ok(Vec::new()),
        };

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let upper_band = percentile(&sorted, self.upper_percentile);
        let lower_band = percentile(&sorted, self.lower_percentile);
        let latest_rank = rank(&values, latest);

        let mut signals = Vec::new();
        for quote in latest_market_quotes(market) {
            if quote.outcome != self.outcome {
                continue;
            }
            if let Some(ref target) = self.market_id {
                if &quote.market_id != target {
                    continue;
                }
            }

            let held = open_position(open_positions, &quote.market_id, &quote.outcome);
            if latest >= upper_band && held.is_none() {
                signals.push(TradingSignal::buy(
                    quote.market_id.clone(),
                    quote.outcome.clone(),
                    self.quantity,
                    latest_rank,
                    format!(
                        "{} {:.2} above p{:.0} of trailing {}d",
                        self.field.as_str(),
                        latest,
                        self.upper_percentile * 100.0,
                        self.window_days
                    ),
                ));
            } else if latest <= lower_band {
                if let Some(position) = held {
                    signals.push(TradingSignal::sell(
                        quote.market_id.clone(),
                        quote.outcome.clone(),
                        position.quantity.abs(),
                        1.0 - latest_rank,
                        format!(
                            "{} {:.2} below p{:.0} of trailing {}d",
                            self.field.as_str(),
                            latest,
                            self.lower_percentile * 100.0,
                            self.window_days
                        ),
                    ));
                }
            }
        }

        Ok(signals)
    }
}
