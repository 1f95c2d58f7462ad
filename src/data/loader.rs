//! CSV-backed observation store.
//!
//! Loads cleaned market and weather observations from interchange files
//! produced by the upstream pipeline:
//! - `markets.csv`: timestamp, market_id, outcome, probability, volume, quality_score
//! - `weather.csv`: timestamp, location, temperature_c, humidity_pct,
//!   wind_speed_kph, precipitation_mm, quality_score
//!
//! Timestamps are ISO-8601 strings (RFC 3339, `YYYY-MM-DD HH:MM:SS`, or
//! bare dates treated as midnight UTC).

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use rust_decimal::Decimal;

use super::provider::{DataError, DataProvider};
use super::types::{MarketObservation, WeatherObservation};

/// File name for market observations inside the data directory.
pub const MARKET_FILE: &str = "markets.csv";

/// File name for weather observations inside the data directory.
pub const WEATHER_FILE: &str = "weather.csv";

/// CSV data store implementing the provider interface.
pub struct ObservationStore {
    data_dir: String,
    min_quality: f64,
}

impl ObservationStore {
    /// Create a store pointing at a data directory.
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
            min_quality: 0.0,
        }
    }

    /// Drop observations below this quality score on load.
    pub fn with_min_quality(mut self, min_quality: f64) -> Self {
        self.min_quality = min_quality;
        self
    }

    fn market_path(&self) -> String {
        format!("{}/{}", self.data_dir, MARKET_FILE)
    }

    fn weather_path(&self) -> String {
        format!("{}/{}", self.data_dir, WEATHER_FILE)
    }

    fn load_csv(&self, path: &str) -> Result<DataFrame, DataError> {
        if !Path::new(path).exists() {
            return Err(DataError::FileNotFound(path.to_string()));
        }
        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()?
            .collect()?;
        Ok(df)
    }

    /// Load every market observation in the store, sorted by timestamp.
    pub fn load_markets(&self) -> Result<Vec<MarketObservation>, DataError> {
        let path = self.market_path();
        let df = self.load_csv(&path)?;

        let ts_col = df.column("timestamp")?;
        let id_col = df.column("market_id")?;
        let outcome_col = df.column("outcome")?;
        let prob_col = df.column("probability")?;
        let volume_col = df.column("volume")?;
        let quality_col = df.column("quality_score").ok();

        let mut out = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let timestamp = string_at(ts_col, idx)
                .and_then(parse_timestamp)
                .ok_or_else(|| {
                    DataError::InvalidData(format!("{}: bad timestamp at row {}", path, idx))
                })?;
            let market_id = string_at(id_col, idx).ok_or_else(|| {
                DataError::InvalidData(format!("{}: missing market_id at row {}", path, idx))
            })?;
            let outcome = string_at(outcome_col, idx).ok_or_else(|| {
                DataError::InvalidData(format!("{}: missing outcome at row {}", path, idx))
            })?;
            let probability = numeric_at(prob_col, idx).ok_or_else(|| {
                DataError::InvalidData(format!("{}: missing probability at row {}", path, idx))
            })?;

            let quality_score = quality_col.and_then(|c| numeric_at(c, idx)).unwrap_or(1.0);
            if quality_score < self.min_quality {
                continue;
            }

            out.push(MarketObservation {
                timestamp,
                market_id: market_id.to_string(),
                outcome: outcome.to_string(),
                probability: Decimal::from_f64_retain(probability).unwrap_or_default(),
                volume: Decimal::from_f64_retain(numeric_at(volume_col, idx).unwrap_or(0.0))
                    .unwrap_or_default(),
                quality_score,
            });
        }

        out.sort_by_key(|o| o.timestamp);
        Ok(out)
    }

    /// Load every weather observation in the store, sorted by timestamp.
    pub fn load_weather(&self) -> Result<Vec<WeatherObservation>, DataError> {
        let path = self.weather_path();
        let df = self.load_csv(&path)?;

        let ts_col = df.column("timestamp")?;
        let location_col = df.column("location")?;
        // Measurement columns are optional; stations report irregular subsets.
        let temp_col = df.column("temperature_c").ok();
        let humidity_col = df.column("humidity_pct").ok();
        let wind_col = df.column("wind_speed_kph").ok();
        let precip_col = df.column("precipitation_mm").ok();
        let quality_col = df.column("quality_score").ok();

        let mut out = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let timestamp = string_at(ts_col, idx)
                .and_then(parse_timestamp)
                .ok_or_else(|| {
                    DataError::InvalidData(format!("{}: bad timestamp at row {}", path, idx))
                })?;
            let location = string_at(location_col, idx).ok_or_else(|| {
                DataError::InvalidData(format!("{}: missing location at row {}", path, idx))
            })?;

            let quality_score = quality_col.and_then(|c| numeric_at(c, idx)).unwrap_or(1.0);
            if quality_score < self.min_quality {
                continue;
            }

            out.push(WeatherObservation {
                timestamp,
                location: location.to_string(),
                temperature_c: temp_col.and_then(|c| numeric_at(c, idx)),
                humidity_pct: humidity_col.and_then(|c| numeric_at(c, idx)),
                wind_speed_kph: wind_col.and_then(|c| numeric_at(c, idx)),
                precipitation_mm: precip_col.and_then(|c| numeric_at(c, idx)),
                quality_score,
            });
        }

        out.sort_by_key(|o| o.timestamp);
        Ok(out)
    }
}

impl DataProvider for ObservationStore {
    fn get_market_data(
        &self,
        market_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketObservation>, DataError> {
        Ok(self
            .load_markets()?
            .into_iter()
            .filter(|o| {
                o.timestamp >= start && o.timestamp <= end && market_ids.contains(&o.market_id)
            })
            .collect())
    }

    fn get_weather_data(
        &self,
        locations: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherObservation>, DataError> {
        Ok(self
            .load_weather()?
            .into_iter()
            .filter(|o| {
                o.timestamp >= start && o.timestamp <= end && locations.contains(&o.location)
            })
            .collect())
    }
}

fn string_at(col: &Column, idx: usize) -> Option<&str> {
    col.str().ok().and_then(|c| c.get(idx))
}

/// Numeric cell with integer fallback (CSV inference may pick i64).
fn numeric_at(col: &Column, idx: usize) -> Option<f64> {
    if let Ok(c) = col.f64() {
        c.get(idx)
    } else if let Ok(c) = col.i64() {
        c.get(idx).map(|v| v as f64)
    } else {
        None
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn temp_store(name: &str, markets: &str, weather: &str) -> ObservationStore {
        let dir = std::env::temp_dir().join(format!("tempest-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MARKET_FILE), markets).unwrap();
        std::fs::write(dir.join(WEATHER_FILE), weather).unwrap();
        ObservationStore::new(dir.to_str().unwrap())
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-07-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-07-01 12:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-07-01"),
            Some(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("July 1st"), None);
    }

    #[test]
    fn test_missing_file() {
        let store = ObservationStore::new("/nonexistent/tempest-data");
        assert!(matches!(
            store.load_markets(),
            Err(DataError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_load_markets_sorted() {
        let store = temp_store(
            "markets",
            "timestamp,market_id,outcome,probability,volume,quality_score\n\
             2024-07-02T12:00:00Z,m1,yes,0.45,900,1.0\n\
             2024-07-01T12:00:00Z,m1,yes,0.40,1500,1.0\n",
            "timestamp,location\n2024-07-01T12:00:00Z,NYC\n",
        );

        let out = store.load_markets().unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].timestamp < out[1].timestamp);
        assert_eq!(out[0].probability, dec!(0.40));
        assert_eq!(out[1].volume, dec!(900));
    }

    #[test]
    fn test_weather_optional_columns_and_quality_filter() {
        let store = temp_store(
            "weather",
            "timestamp,market_id,outcome,probability,volume,quality_score\n\
             2024-07-01T12:00:00Z,m1,yes,0.40,10,1.0\n",
            "timestamp,location,temperature_c,quality_score\n\
             2024-07-01T06:00:00Z,NYC,24.0,0.3\n\
             2024-07-01T12:00:00Z,NYC,31.5,0.95\n",
        )
        .with_min_quality(0.5);

        let out = store.load_weather().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].temperature_c, Some(31.5));
        assert_eq!(out[0].wind_speed_kph, None);
    }
}
