//! Threshold strategy: one weather variable crossing a fixed level.
//!
//! Buys the configured outcome when the latest reading crosses the
//! threshold in the trigger direction, and closes the position when the
//! reading crosses back (with an optional hysteresis buffer so marginal
//! flutter does not churn positions).

use rust_decimal::Decimal;

use crate::backtest::Position;
use crate::data::{MarketObservation, WeatherField, WeatherObservation};

use super::params::{self, ParamSet};
use super::signal::TradingSignal;
use super::traits::{
    latest_market_quotes, latest_weather_value, open_position, Strategy, StrategyError,
};

/// Which crossing direction opens a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Above,
    Below,
}

#[derive(Debug, Clone)]
pub struct ThresholdStrategy {
    field: WeatherField,
    threshold: f64,
    mode: TriggerMode,
    exit_buffer: f64,
    location: Option<String>,
    market_id: Option<String>,
    outcome: String,
    quantity: Decimal,
}

impl ThresholdStrategy {
    /// Build from a parameter set.
    ///
    /// Recognized parameters: `field`, `threshold`, `mode` (above/below),
    /// `exit_buffer`, `location`, `market_id`, `outcome`, `quantity`.
    pub fn from_params(p: &ParamSet) -> Result<Self, StrategyError> {
        let field_name = params::get_str(p, "field", "temperature");
        let field = WeatherField::from_str(field_name).ok_or_else(|| {
            StrategyError::InvalidParameter {
                name: "field".to_string(),
                reason: format!("unknown weather field '{}'", field_name),
            }
        })?;

        let mode = match params::get_str(p, "mode", "above") {
            "above" => TriggerMode::Above,
            "below" => TriggerMode::Below,
            other => {
                return Err(StrategyError::InvalidParameter {
                    name: "mode".to_string(),
                    reason: format!("expected 'above' or 'below', got '{}'", other),
                })
            }
        };

        let quantity = params::get_decimal(p, "quantity", Decimal::from(100));
        if quantity <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameter {
                name: "quantity".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            field,
            threshold: params::get_f64(p, "threshold", 30.0),
            mode,
            exit_buffer: params::get_f64(p, "exit_buffer", 0.0).max(0.0),
            location: p.get("location").and_then(|v| v.as_str()).map(String::from),
            market_id: p.get("market_id").and_then(|v| v.as_str()).map(String::from),
            outcome: params::get_str(p, "outcome", "yes").to_string(),
            quantity,
        })
    }

    fn triggered(&self, value: f64) -> bool {
        match self.mode {
            TriggerMode::Above => value >= self.threshold,
            TriggerMode::Below => value <= self.threshold,
        }
    }

    fn released(&self, value: f64) -> bool {
        match self.mode {
            TriggerMode::Above => value < self.threshold - self.exit_buffer,
            TriggerMode::Below => value > self.threshold + self.exit_buffer,
        }
    }

    fn strength(&self, value: f64) -> f64 {
        let scale = self.threshold.abs().max(1.0);
        ((value - self.threshold).abs() / scale).clamp(0.0, 1.0)
    }
}

impl Strategy for ThresholdStrategy {
    fn name(&self) -> &str {
        "threshold"
    }

    fn generate_signals(
        &self,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
        open_positions: &[Position],
    ) -> Result<Vec<TradingSignal>, StrategyError> {
        let Some(value) = latest_weather_value(weather, self.location.as_deref(), self.field)
        else {
            return Ok(Vec::new());
        };

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
            if self.triggered(value) && held.is_none() {
                signals.push(TradingSignal::buy(
                    quote.market_id.clone(),
                    quote.outcome.clone(),
                    self.quantity,
                    self.strength(value),
                    format!("{} {:.2} crossed {:.2}", self.field.as_str(), value, self.threshold),
                ));
            } else if self.released(value) {
                if let Some(position) = held {
                    signals.push(TradingSignal::sell(
                        quote.market_id.clone(),
                        quote.outcome.clone(),
                        position.quantity.abs(),
                        self.strength(value),
                        format!(
                            "{} {:.2} released {:.2}",
                            self.field.as_str(),
                            value,
                            self.threshold
                        ),
                    ));
                }
            }
        }

        Ok(signals)
    }
}
