//! Multi-variable strategy: weighted score over several weather variables.
//!
//! Each variable is normalized against a reference scale, multiplied by
//! its weight, and the weighted mean over the variables that actually
//! have data becomes the score. Entry when the score reaches
//! `entry_score`, exit when it falls back to `exit_score`.

use rust_decimal::Decimal;

use crate::backtest::Position;
use crate::data::{MarketObservation, WeatherField, WeatherObservation};

use super::params::{self, ParamSet};
use super::signal::TradingSignal;
use super::traits::{
    latest_market_quotes, latest_weather_value, open_position, Strategy, StrategyError,
};

/// One scored variable: weight plus the scale that maps a raw reading
/// onto roughly [0, 1].
#[derive(Debug, Clone, Copy)]
struct VariableWeight {
    field: WeatherField,
    weight: f64,
    scale: f64,
}

#[derive(Debug, Clone)]
pub struct MultiVariableStrategy {
    variables: Vec<VariableWeight>,
    entry_score: f64,
    exit_score: f64,
    location: Option<String>,
    market_id: Option<String>,
    outcome: String,
    quantity: Decimal,
}

impl MultiVariableStrategy {
    /// Build from a parameter set.
    ///
    /// Weights: `temperature_weight`, `wind_weight`, `precipitation_weight`,
    /// `humidity_weight`. Scales: `<variable>_scale`. Thresholds:
    /// `entry_score`, `exit_score`. Plus the usual `location`, `market_id`,
    /// `outcome`, `quantity`.
    pub fn from_params(p: &ParamSet) -> Result<Self, StrategyError> {
        let variables = vec![
            VariableWeight {
                field: WeatherField::Temperature,
                weight: params::get_f64(p, "temperature_weight", 0.5),
                scale: params::get_f64(p, "temperature_scale", 35.0),
            },
            VariableWeight {
                field: WeatherField::WindSpeed,
                weight: params::get_f64(p, "wind_weight", 0.3),
                scale: params::get_f64(p, "wind_scale", 50.0),
            },
            VariableWeight {
                field: WeatherField::Precipitation,
                weight: params::get_f64(p, "precipitation_weight", 0.2),
                scale: params::get_f64(p, "precipitation_scale", 10.0),
            },
            VariableWeight {
                field: WeatherField::Humidity,
                weight: params::get_f64(p, "humidity_weight", 0.0),
                scale: params::get_f64(p, "humidity_scale", 100.0),
            },
        ];

        if variables.iter().map(|v| v.weight.abs()).sum::<f64>() == 0.0 {
            return Err(StrategyError::InvalidParameter {
                name: "weights".to_string(),
                reason: "at least one variable weight must be non-zero".to_string(),
            });
        }
        for v in &variables {
            if v.scale <= 0.0 {
                return Err(StrategyError::InvalidParameter {
                    name: format!("{}_scale", v.field.as_str()),
                    reason: "must be positive".to_string(),
                });
            }
        }

        let entry_score = params::get_f64(p, "entry_score", 0.6);
        let exit_score = params::get_f64(p, "exit_score", 0.3);
        if exit_score >= entry_score {
            return Err(StrategyError::InvalidParameter {
                name: "exit_score".to_string(),
                reason: "must be below entry_score".to_string(),
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
            variables,
            entry_score,
            exit_score,
            location: p.get("location").and_then(|v| v.as_str()).map(String::from),
            market_id: p.get("market_id").and_then(|v| v.as_str()).map(String::from),
            outcome: params::get_str(p, "outcome", "yes").to_string(),
            quantity,
        })
    }

    /// Weighted score over the variables that have a reading. Variables
    /// without data drop out of both numerator and normalizer, so a
    /// missing sensor does not silently drag the score toward zero.
    fn score(&self, weather: &[WeatherObservation]) -> Option<f64> {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for v in &self.variables {
            if v.weight == 0.0 {
                continue;
            }
            if let Some(value) = latest_weather_value(weather, self.location.as_deref(), v.field) {
                weighted += v.weight * (value / v.scale).clamp(0.0, 1.0);
                total_weight += v.weight.abs();
            }
        }
        if total_weight == 0.0 {
            None
        } else {
            Some(weighted / total_weight)
        }
    }
}

impl Strategy for MultiVariableStrategy {
    fn name(&self) -> &str {
        "pattern"
    }

    fn generate_signals(
        &self,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
        open_positions: &[Position],
    ) -> Result<Vec<TradingSignal>, StrategyError> {
        let Some(score) = self.score(weather) else {
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
            if score >= self.entry_score && held.is_none() {
                signals.push(TradingSignal::buy(
                    quote.market_id.clone(),
                    quote.outcome.clone(),
                    self.quantity,
                    score.clamp(0.0, 1.0),
                    format!("weather score {:.2} >= {:.2}", score, self.entry_score),
                ));
            } else if score <= self.exit_score {
                if let Some(position) = held {
                    signals.push(TradingSignal::sell(
                        quote.market_id.clone(),
                        quote.outcome.clone(),
                        position.quantity.abs(),
                        (1.0 - score).clamp(0.0, 1.0),
                        format!("weather score {:.2} <= {:.2}", score, self.exit_score),
                    ));
                }
            }
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::params::ParamValue;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn market_obs() -> MarketObservation {
        MarketObservation {
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap(),
            market_id: "m1".to_string(),
            outcome: "yes".to_string(),
            probability: dec!(0.40),
            volume: dec!(100),
            quality_score: 1.0,
        }
    }

    fn weather_obs(
        temp: Option<f64>,
        wind: Option<f64>,
        precip: Option<f64>,
    ) -> WeatherObservation {
        WeatherObservation {
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap(),
            location: "NYC".to_string(),
            temperature_c: temp,
            humidity_pct: None,
            wind_speed_kph: wind,
            precipitation_mm: precip,
            quality_score: 1.0,
        }
    }

    #[test]
    fn test_high_score_emits_entry() {
        let strategy = MultiVariableStrategy::from_params(&ParamSet::new()).unwrap();
        // 35/35, 50/50, 10/10 all saturate at 1.0, so the score is 1.0.
        let weather = [weather_obs(Some(35.0), Some(50.0), Some(10.0))];
        let signals = strategy.generate_signals(&[market_obs()], &weather, &[]).unwrap();

        assert_eq!(signals.len(), 1);
        assert!((signals[0].strength - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_variable_renormalizes() {
        let strategy = MultiVariableStrategy::from_params(&ParamSet::new()).unwrap();
        // Only temperature present at full scale: score stays 1.0 rather
        // than being diluted by the absent wind and precipitation.
        let weather = [weather_obs(Some(35.0), None, None)];
        let signals = strategy.generate_signals(&[market_obs()], &weather, &[]).unwrap();
        assert_eq!(signals.len(), 1);
    }

    #[test]
    fn test_low_score_no_entry() {
        let strategy = MultiVariableStrategy::from_params(&ParamSet::new()).unwrap();
        let weather = [weather_obs(Some(5.0), Some(5.0), Some(0.0))];
        let signals = strategy.generate_signals(&[market_obs()], &weather, &[]).unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut p = ParamSet::new();
        p.insert("temperature_weight".to_string(), ParamValue::Float(0.0));
        p.insert("wind_weight".to_string(), ParamValue::Float(0.0));
        p.insert("precipitation_weight".to_string(), ParamValue::Float(0.0));
        p.insert("humidity_weight".to_string(), ParamValue::Float(0.0));
        assert!(matches!(
            MultiVariableStrategy::from_params(&p),
            Err(StrategyError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_exit_band_ordering_enforced() {
        let mut p = ParamSet::new();
        p.insert("entry_score".to_string(), ParamValue::Float(0.3));
        p.insert("exit_score".to_string(), ParamValue::Float(0.5));
        assert!(MultiVariableStrategy::from_params(&p).is_err());
    }
}
