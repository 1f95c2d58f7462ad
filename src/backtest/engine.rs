//! Core backtesting engine.
//!
//! Runs the simulation loop:
//! 1. Build a deduplicated timeline from market and weather timestamps
//! 2. At each step, reveal only the observations at or before the step
//! 3. Ask the strategy for signals against a snapshot of open positions
//! 4. Apply signals to the ledger at the last quoted probability
//! 5. Mark open positions to market and record an equity point
//!
//! Strategies only ever see prefix slices of the sorted observation
//! streams, so no code path can read data from the future.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, DurationRound, NaiveDate, NaiveTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::data::{DataError, DataProvider, MarketObservation, WeatherObservation};
use crate::metrics::{compute_performance, MetricsError, PerformanceReport};
use crate::risk::{compute_risk, RiskReport, StressScenario};
use crate::strategy::{create_strategy, ParamSet, Strategy};

use super::ledger::{Ledger, Position, SignalOutcome, Trade};

/// Sampling granularity of the simulation timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFrequency {
    Hourly,
    #[default]
    Daily,
}

impl DataFrequency {
    /// Periods used to annualize per-period statistics.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Self::Hourly => 8760.0,
            Self::Daily => 365.0,
        }
    }

    /// Truncate a timestamp to the start of its bucket.
    pub fn bucket(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let span = match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
        };
        timestamp.duration_trunc(span).unwrap_or(timestamp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }
}

/// Configuration for backtest execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// First simulated day (inclusive, UTC).
    pub start_date: NaiveDate,

    /// Last simulated day (inclusive, UTC).
    pub end_date: NaiveDate,

    /// Starting cash.
    pub initial_capital: Decimal,

    /// Commission as a fraction of traded notional.
    pub commission_per_trade: Decimal,

    /// Largest open notional per position as a fraction of equity.
    pub max_position_size: f64,

    /// Maximum distinct open positions.
    pub max_positions: usize,

    /// Timeline bucket size.
    #[serde(default)]
    pub data_frequency: DataFrequency,

    /// Minimum fraction of timeline buckets each series must cover.
    #[serde(default = "default_min_coverage")]
    pub min_data_coverage: f64,

    /// Annual risk-free rate used for excess returns.
    #[serde(default)]
    pub risk_free_rate: f64,

    /// Confidence levels for VaR and expected shortfall.
    #[serde(default = "default_confidence_levels")]
    pub var_confidence_levels: Vec<f64>,

    /// Stress scenarios applied to end-of-run exposure.
    #[serde(default = "StressScenario::default_set")]
    pub stress_scenarios: Vec<StressScenario>,
}

fn default_min_coverage() -> f64 {
    0.5
}

fn default_confidence_levels() -> Vec<f64> {
    vec![0.95, 0.99]
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            initial_capital: Decimal::from(10_000),
            commission_per_trade: Decimal::new(1, 2),
            max_position_size: 0.25,
            max_positions: 10,
            data_frequency: DataFrequency::Daily,
            min_data_coverage: default_min_coverage(),
            risk_free_rate: 0.0,
            var_confidence_levels: default_confidence_levels(),
            stress_scenarios: StressScenario::default_set(),
        }
    }
}

impl BacktestConfig {
    /// UTC observation window, half-open `[start, end)`.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start_date.and_time(NaiveTime::MIN).and_utc();
        let end = self.end_date.and_time(NaiveTime::MIN).and_utc() + Duration::days(1);
        (start, end)
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(BacktestError::Config(
                "initial_capital must be positive".to_string(),
            ));
        }
        if self.start_date >= self.end_date {
            return Err(BacktestError::Config(format!(
                "start_date {} must be before end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.max_positions == 0 {
            return Err(BacktestError::Config(
                "max_positions must be at least 1".to_string(),
            ));
        }
        if self.max_position_size <= 0.0 || self.max_position_size > 1.0 {
            return Err(BacktestError::Config(format!(
                "max_position_size must be in (0, 1], got {}",
                self.max_position_size
            )));
        }
        if self.commission_per_trade < Decimal::ZERO {
            return Err(BacktestError::Config(
                "commission_per_trade must not be negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_data_coverage) {
            return Err(BacktestError::Config(format!(
                "min_data_coverage must be in [0, 1], got {}",
                self.min_data_coverage
            )));
        }
        Ok(())
    }
}

/// Errors surfaced by backtest execution.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("strategy '{name}' failed: {reason}")]
    Strategy { name: String, reason: String },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

impl From<DataError> for BacktestError {
    fn from(err: DataError) -> Self {
        Self::Data(err.to_string())
    }
}

/// Cooperative stop flag checked at every timeline step.
///
/// Clones share the flag, so a token handed to a worker can be cancelled
/// from the outside. An optional deadline makes the token trip on its own.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that cancels itself after the given wall-clock duration.
    pub fn with_timeout(limit: std::time::Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + limit),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// Equity snapshot at one timeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
    pub cash: Decimal,
    pub positions_value: Decimal,
    pub open_positions: usize,
    pub period_pnl: Decimal,
}

/// Result of a completed backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,

    /// Configuration used.
    pub config: BacktestConfig,

    /// All executed trades.
    pub trades: Vec<Trade>,

    /// Equity curve, one point per timeline step.
    pub equity_curve: Vec<EquityPoint>,

    /// Positions still open at the end of the window.
    pub open_positions: Vec<Position>,

    pub final_equity: Decimal,
    pub total_fees: Decimal,

    /// Signals the ledger or engine refused to execute.
    pub rejected_signals: usize,

    pub performance: PerformanceReport,
    pub risk: RiskReport,
}

impl BacktestResult {
    /// Generate summary string.
    pub fn summary(&self) -> String {
        format!(
            "Backtest: {} ({} to {}, {})\n\
             ----------------------------------------\n\
             Final Equity: {:.2}\n\
             Trades: {} (rejected signals: {})\n\
             Open at End: {}\n\
             Total Fees: {:.2}\n\
             \n\
             {}\n\
             \n\
             {}",
            self.strategy_name,
            self.config.start_date,
            self.config.end_date,
            self.config.data_frequency.as_str(),
            self.final_equity,
            self.trades.len(),
            self.rejected_signals,
            self.open_positions.len(),
            self.total_fees,
            self.performance.summary(),
            self.risk.summary(),
        )
    }
}

/// The main backtesting engine.
pub struct BacktestEngine {
    config: BacktestConfig,
    ledger: Ledger,
    equity_curve: Vec<EquityPoint>,
    rejected_signals: usize,
}

impl BacktestEngine {
    /// Create a new engine, validating the configuration.
    pub fn new(config: BacktestConfig) -> Result<Self, BacktestError> {
        config.validate()?;
        let ledger = Ledger::new(&config);
        Ok(Self {
            config,
            ledger,
            equity_curve: Vec::new(),
            rejected_signals: 0,
        })
    }

    /// Run a backtest, loading observations through the provider.
    pub fn run(
        &mut self,
        strategy: &dyn Strategy,
        provider: &dyn DataProvider,
        market_ids: &[String],
        locations: &[String],
    ) -> Result<BacktestResult, BacktestError> {
        let (start, end) = self.config.window();
        let market = provider.get_market_data(market_ids, start, end)?;
        let weather = provider.get_weather_data(locations, start, end)?;

        for id in market_ids {
            if !market.iter().any(|o| &o.market_id == id) {
                return Err(BacktestError::Data(format!(
                    "no observations for market '{}' in {} to {}",
                    id, self.config.start_date, self.config.end_date
                )));
            }
        }
        for location in locations {
            if !weather.iter().any(|o| &o.location == location) {
                return Err(BacktestError::Data(format!(
                    "no weather observations for '{}' in {} to {}",
                    location, self.config.start_date, self.config.end_date
                )));
            }
        }

        info!(
            strategy = strategy.name(),
            market_observations = market.len(),
            weather_observations = weather.len(),
            "starting backtest"
        );
        self.run_with_data(strategy, &market, &weather)
    }

    /// Run with pre-loaded observations (for optimization, avoids re-reading).
    pub fn run_with_data(
        &mut self,
        strategy: &dyn Strategy,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Result<BacktestResult, BacktestError> {
        self.run_cancellable(strategy, market, weather, &CancellationToken::new())
    }

    /// Run with an external cancellation token.
    pub fn run_cancellable(
        &mut self,
        strategy: &dyn Strategy,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
        cancel: &CancellationToken,
    ) -> Result<BacktestResult, BacktestError> {
        // Reset state so one engine can host repeated runs.
        self.ledger = Ledger::new(&self.config);
        self.equity_curve.clear();
        self.rejected_signals = 0;

        let (start, end) = self.config.window();
        let mut market: Vec<MarketObservation> = market
            .iter()
            .filter(|o| o.timestamp >= start && o.timestamp < end)
            .cloned()
            .collect();
        market.sort_by_key(|o| o.timestamp);
        let mut weather: Vec<WeatherObservation> = weather
            .iter()
            .filter(|o| o.timestamp >= start && o.timestamp < end)
            .cloned()
            .collect();
        weather.sort_by_key(|o| o.timestamp);

        self.check_coverage(&market, &weather)?;

        let timeline = self.build_timeline(&market, &weather);
        if timeline.is_empty() {
            return Err(BacktestError::Data(format!(
                "no observations between {} and {}",
                self.config.start_date, self.config.end_date
            )));
        }

        let mut market_cursor = 0;
        let mut weather_cursor = 0;
        for step in timeline {
            if cancel.is_cancelled() {
                return Err(BacktestError::Cancelled);
            }

            while market_cursor < market.len() && market[market_cursor].timestamp <= step {
                let quote = &market[market_cursor];
                self.ledger
                    .update_price(&quote.market_id, &quote.outcome, quote.probability);
                market_cursor += 1;
            }
            while weather_cursor < weather.len() && weather[weather_cursor].timestamp <= step {
                weather_cursor += 1;
            }

            self.process_step(
                strategy,
                &market[..market_cursor],
                &weather[..weather_cursor],
                step,
            )?;
        }

        self.build_result(strategy.name())
    }

    /// One timeline step: signals, execution, equity snapshot.
    fn process_step(
        &mut self,
        strategy: &dyn Strategy,
        visible_market: &[MarketObservation],
        visible_weather: &[WeatherObservation],
        step: DateTime<Utc>,
    ) -> Result<(), BacktestError> {
        let open = self.ledger.open_positions();
        let signals = strategy
            .generate_signals(visible_market, visible_weather, &open)
            .map_err(|e| BacktestError::Strategy {
                name: strategy.name().to_string(),
                reason: e.to_string(),
            })?;

        for signal in &signals {
            let price = self.ledger.last_price(&signal.market_id, &signal.outcome);
            if let SignalOutcome::Rejected(_) = self.ledger.apply_signal(signal, price, step) {
                self.rejected_signals += 1;
            }
        }

        let equity = self.ledger.total_equity();
        let prev = self
            .equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.config.initial_capital);
        self.equity_curve.push(EquityPoint {
            timestamp: step,
            equity,
            cash: self.ledger.cash(),
            positions_value: self.ledger.positions_value(),
            open_positions: self.ledger.open_position_count(),
            period_pnl: equity - prev,
        });
        Ok(())
    }

    /// Strictly increasing timeline: the last observed timestamp in each
    /// `data_frequency` bucket, over both observation streams.
    fn build_timeline(
        &self,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Vec<DateTime<Utc>> {
        let mut last_per_bucket: BTreeMap<DateTime<Utc>, DateTime<Utc>> = BTreeMap::new();
        let timestamps = market
            .iter()
            .map(|o| o.timestamp)
            .chain(weather.iter().map(|o| o.timestamp));
        for ts in timestamps {
            let bucket = self.config.data_frequency.bucket(ts);
            let latest = last_per_bucket.entry(bucket).or_insert(ts);
            if ts > *latest {
                *latest = ts;
            }
        }
        last_per_bucket.into_values().collect()
    }

    /// Verify every series present in the window covers enough timeline
    /// buckets. The error names the worst series.
    fn check_coverage(
        &self,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Result<(), BacktestError> {
        let total = self.total_buckets();
        if total == 0 {
            return Err(BacktestError::Data("empty backtest window".to_string()));
        }

        let mut buckets_by_series: BTreeMap<String, BTreeSet<DateTime<Utc>>> = BTreeMap::new();
        for o in market {
            buckets_by_series
                .entry(format!("market '{}'", o.market_id))
                .or_default()
                .insert(self.config.data_frequency.bucket(o.timestamp));
        }
        for o in weather {
            buckets_by_series
                .entry(format!("weather '{}'", o.location))
                .or_default()
                .insert(self.config.data_frequency.bucket(o.timestamp));
        }

        let mut worst: Option<(String, f64)> = None;
        for (series, buckets) in &buckets_by_series {
            let coverage = buckets.len() as f64 / total as f64;
            if worst.as_ref().map_or(true, |(_, w)| coverage < *w) {
                worst = Some((series.clone(), coverage));
            }
        }

        if let Some((series, coverage)) = worst {
            if coverage < self.config.min_data_coverage {
                return Err(BacktestError::Data(format!(
                    "{} covers {:.1}% of {} {} buckets, below the {:.1}% minimum",
                    series,
                    coverage * 100.0,
                    total,
                    self.config.data_frequency.as_str(),
                    self.config.min_data_coverage * 100.0
                )));
            }
        }
        Ok(())
    }

    fn total_buckets(&self) -> i64 {
        let days = (self.config.end_date - self.config.start_date).num_days() + 1;
        match self.config.data_frequency {
            DataFrequency::Daily => days,
            DataFrequency::Hourly => days * 24,
        }
    }

    /// Assemble the final result with performance and risk reports.
    fn build_result(&self, strategy_name: &str) -> Result<BacktestResult, BacktestError> {
        let performance = compute_performance(
            &self.equity_curve,
            self.ledger.trades(),
            self.config.risk_free_rate,
            self.config.data_frequency.periods_per_year(),
        )?;

        let open_positions = self.ledger.open_positions();
        let risk = compute_risk(
            &self.equity_curve,
            &open_positions,
            self.ledger.last_prices(),
            &self.config.var_confidence_levels,
            &self.config.stress_scenarios,
        );

        info!(
            strategy = strategy_name,
            final_equity = %self.ledger.total_equity(),
            trades = self.ledger.trades().len(),
            rejected = self.rejected_signals,
            "backtest complete"
        );

        Ok(BacktestResult {
            strategy_name: strategy_name.to_string(),
            config: self.config.clone(),
            trades: self.ledger.trades().to_vec(),
            equity_curve: self.equity_curve.clone(),
            open_positions,
            final_equity: self.ledger.total_equity(),
            total_fees: self.ledger.total_fees(),
            rejected_signals: self.rejected_signals,
            performance,
            risk,
        })
    }
}

/// Run several strategies over one shared data load.
///
/// Each strategy gets a private engine and ledger, so a failure lands in
/// that strategy's slot without disturbing the others.
pub fn run_multiple_strategies(
    config: &BacktestConfig,
    provider: &dyn DataProvider,
    strategies: &[(String, ParamSet)],
    market_ids: &[String],
    locations: &[String],
) -> Result<Vec<(String, Result<BacktestResult, BacktestError>)>, BacktestError> {
    config.validate()?;
    let (start, end) = config.window();
    let market = provider.get_market_data(market_ids, start, end)?;
    let weather = provider.get_weather_data(locations, start, end)?;

    info!(
        strategies = strategies.len(),
        market_observations = market.len(),
        weather_observations = weather.len(),
        "running strategy comparison"
    );

    let results = strategies
        .par_iter()
        .map(|(name, params)| {
            let run = || -> Result<BacktestResult, BacktestError> {
                let strategy =
                    create_strategy(name, params).map_err(|e| BacktestError::Strategy {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                let mut engine = BacktestEngine::new(config.clone())?;
                engine.run_with_data(strategy.as_ref(), &market, &weather)
            };
            (name.clone(), run())
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryProvider;
    use crate::strategy::{StrategyError, TradingSignal};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn config() -> BacktestConfig {
        BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
            initial_capital: dec!(10000),
            commission_per_trade: dec!(0.01),
            max_position_size: 1.0,
            max_positions: 10,
            ..BacktestConfig::default()
        }
    }

    fn market_obs(day: u32, hour: u32, prob: Decimal) -> MarketObservation {
        MarketObservation {
            timestamp: Utc.with_ymd_and_hms(2024, 7, day, hour, 0, 0).unwrap(),
            market_id: "m1".to_string(),
            outcome: "yes".to_string(),
            probability: prob,
            volume: dec!(1000),
            quality_score: 1.0,
        }
    }

    /// Buys 100 units of m1/yes once, then holds.
    struct BuyOnce;

    impl Strategy for BuyOnce {
        fn name(&self) -> &str {
            "buy_once"
        }

        fn generate_signals(
            &self,
            _market: &[MarketObservation],
            _weather: &[WeatherObservation],
            open_positions: &[Position],
        ) -> Result<Vec<TradingSignal>, StrategyError> {
            if open_positions.is_empty() {
                Ok(vec![TradingSignal::buy("m1", "yes", dec!(100), 1.0, "entry")])
            } else {
                Ok(Vec::new())
            }
        }
    }

    /// Buys only when a visible quote exceeds the trigger probability.
    struct BuyAboveTrigger {
        trigger: Decimal,
    }

    impl Strategy for BuyAboveTrigger {
        fn name(&self) -> &str {
            "buy_above_trigger"
        }

        fn generate_signals(
            &self,
            market: &[MarketObservation],
            _weather: &[WeatherObservation],
            open_positions: &[Position],
        ) -> Result<Vec<TradingSignal>, StrategyError> {
            let seen = market.iter().any(|o| o.probability > self.trigger);
            if seen && open_positions.is_empty() {
                Ok(vec![TradingSignal::buy("m1", "yes", dec!(10), 1.0, "trigger")])
            } else {
                Ok(Vec::new())
            }
        }
    }

    /// Keeps bidding on a market that never quotes.
    struct BuyUnquoted;

    impl Strategy for BuyUnquoted {
        fn name(&self) -> &str {
            "buy_unquoted"
        }

        fn generate_signals(
            &self,
            _market: &[MarketObservation],
            _weather: &[WeatherObservation],
            open_positions: &[Position],
        ) -> Result<Vec<TradingSignal>, StrategyError> {
            if open_positions.is_empty() {
                Ok(vec![TradingSignal::buy("m2", "yes", dec!(10), 1.0, "entry")])
            } else {
                Ok(Vec::new())
            }
        }
    }

    struct FailingStrategy;

    impl Strategy for FailingStrategy {
        fn name(&self) -> &str {
            "failing"
        }

        fn generate_signals(
            &self,
            _market: &[MarketObservation],
            _weather: &[WeatherObservation],
            _open_positions: &[Position],
        ) -> Result<Vec<TradingSignal>, StrategyError> {
            Err(StrategyError::Generation("boom".to_string()))
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(BacktestEngine::new(BacktestConfig {
            initial_capital: dec!(0),
            ..config()
        })
        .is_err());
        assert!(BacktestEngine::new(BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            ..config()
        })
        .is_err());
        assert!(BacktestEngine::new(BacktestConfig {
            max_position_size: 1.5,
            ..config()
        })
        .is_err());
        assert!(BacktestEngine::new(BacktestConfig {
            max_positions: 0,
            ..config()
        })
        .is_err());
        assert!(BacktestEngine::new(config()).is_ok());
    }

    #[test]
    fn test_timeline_keeps_last_timestamp_per_bucket() {
        let engine = BacktestEngine::new(config()).unwrap();
        let market = vec![
            market_obs(1, 9, dec!(0.40)),
            market_obs(1, 15, dec!(0.42)),
            market_obs(2, 11, dec!(0.45)),
        ];
        let timeline = engine.build_timeline(&market, &[]);

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0], Utc.with_ymd_and_hms(2024, 7, 1, 15, 0, 0).unwrap());
        assert_eq!(timeline[1], Utc.with_ymd_and_hms(2024, 7, 2, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_hourly_timeline() {
        let engine = BacktestEngine::new(BacktestConfig {
            data_frequency: DataFrequency::Hourly,
            ..config()
        })
        .unwrap();
        let market = vec![
            market_obs(1, 9, dec!(0.40)),
            market_obs(1, 15, dec!(0.42)),
            market_obs(2, 11, dec!(0.45)),
        ];
        let timeline = engine.build_timeline(&market, &[]);
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn test_single_buy_run() {
        let mut engine = BacktestEngine::new(config()).unwrap();
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];
        let result = engine.run_with_data(&BuyOnce, &market, &[]).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.equity_curve.len(), 2);
        // Buy 100 @ 0.40: fee 0.40, cash 9959.60, position worth 40.
        assert_eq!(result.equity_curve[0].equity, dec!(9999.6));
        // Next day the quote moves to 0.50.
        assert_eq!(result.final_equity, dec!(10009.6));
        assert_eq!(result.open_positions.len(), 1);
        assert_eq!(result.rejected_signals, 0);
    }

    #[test]
    fn test_signal_for_unquoted_market_is_rejected() {
        let mut engine = BacktestEngine::new(config()).unwrap();
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];
        let result = engine.run_with_data(&BuyUnquoted, &market, &[]).unwrap();

        // m2 never quotes, so the bid is rejected on both steps.
        assert!(result.trades.is_empty());
        assert_eq!(result.rejected_signals, 2);
        assert_eq!(result.final_equity, dec!(10000));
    }

    #[test]
    fn test_equity_identity_holds_every_step() {
        let mut engine = BacktestEngine::new(config()).unwrap();
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];
        let result = engine.run_with_data(&BuyOnce, &market, &[]).unwrap();

        for point in &result.equity_curve {
            assert_eq!(point.equity, point.cash + point.positions_value);
        }
    }

    #[test]
    fn test_no_look_ahead() {
        // Day 1 quotes 0.40, day 2 quotes 0.50. The trigger at 0.45 can
        // only be seen on day 2, so the entry must land on day 2.
        let mut engine = BacktestEngine::new(config()).unwrap();
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];
        let strategy = BuyAboveTrigger { trigger: dec!(0.45) };
        let result = engine.run_with_data(&strategy, &market, &[]).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(
            result.trades[0].timestamp,
            Utc.with_ymd_and_hms(2024, 7, 2, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_cancellation() {
        let mut engine = BacktestEngine::new(config()).unwrap();
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];
        let token = CancellationToken::new();
        token.cancel();

        let result = engine.run_cancellable(&BuyOnce, &market, &[], &token);
        assert!(matches!(result, Err(BacktestError::Cancelled)));
    }

    #[test]
    fn test_coverage_failure_names_series() {
        let mut engine = BacktestEngine::new(BacktestConfig {
            end_date: NaiveDate::from_ymd_opt(2024, 7, 10).unwrap(),
            ..config()
        })
        .unwrap();
        // Two observed days out of ten is 20%, below the 50% default.
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];

        let err = engine.run_with_data(&BuyOnce, &market, &[]).unwrap_err();
        match err {
            BacktestError::Data(msg) => assert!(msg.contains("m1"), "got: {}", msg),
            other => panic!("expected data error, got {:?}", other),
        }
    }

    #[test]
    fn test_strategy_error_aborts_run() {
        let mut engine = BacktestEngine::new(config()).unwrap();
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];

        let err = engine.run_with_data(&FailingStrategy, &market, &[]).unwrap_err();
        assert!(matches!(err, BacktestError::Strategy { .. }));
    }

    #[test]
    fn test_empty_window_is_a_data_error() {
        let mut engine = BacktestEngine::new(config()).unwrap();
        let err = engine.run_with_data(&BuyOnce, &[], &[]).unwrap_err();
        assert!(matches!(err, BacktestError::Data(_)));
    }

    #[test]
    fn test_multi_strategy_isolation() {
        let weather: Vec<WeatherObservation> = (1..=2)
            .map(|day| WeatherObservation {
                timestamp: Utc.with_ymd_and_hms(2024, 7, day, 12, 0, 0).unwrap(),
                location: "NYC".to_string(),
                temperature_c: Some(33.0),
                humidity_pct: None,
                wind_speed_kph: None,
                precipitation_mm: None,
                quality_score: 1.0,
            })
            .collect();
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];
        let provider = InMemoryProvider::new(market, weather);

        let strategies = vec![
            ("threshold".to_string(), ParamSet::new()),
            ("unknown".to_string(), ParamSet::new()),
        ];
        let results = run_multiple_strategies(
            &config(),
            &provider,
            &strategies,
            &["m1".to_string()],
            &["NYC".to_string()],
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(matches!(
            results[1].1,
            Err(BacktestError::Strategy { .. })
        ));
    }

    #[test]
    fn test_rerun_produces_identical_artifacts() {
        let market = vec![market_obs(1, 12, dec!(0.40)), market_obs(2, 12, dec!(0.50))];

        let mut first = BacktestEngine::new(config()).unwrap();
        let a = first.run_with_data(&BuyOnce, &market, &[]).unwrap();
        let mut second = BacktestEngine::new(config()).unwrap();
        let b = second.run_with_data(&BuyOnce, &market, &[]).unwrap();

        assert_eq!(
            serde_json::to_string(&a.trades).unwrap(),
            serde_json::to_string(&b.trades).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&a.equity_curve).unwrap(),
            serde_json::to_string(&b.equity_curve).unwrap()
        );
    }

    #[test]
    fn test_no_signal_run_keeps_capital_flat() {
        // 30 daily quotes and a trigger no quote can reach: nothing moves.
        let mut engine = BacktestEngine::new(BacktestConfig {
            end_date: NaiveDate::from_ymd_opt(2024, 7, 30).unwrap(),
            ..config()
        })
        .unwrap();
        let market: Vec<MarketObservation> =
            (1..=30).map(|day| market_obs(day, 12, dec!(0.40))).collect();
        let strategy = BuyAboveTrigger { trigger: dec!(2) };
        let result = engine.run_with_data(&strategy, &market, &[]).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.final_equity, dec!(10000));
        assert_eq!(result.performance.total_return_pct, 0.0);
        assert_eq!(result.performance.max_drawdown_pct, 0.0);
        assert_eq!(result.equity_curve.len(), 30);
    }
}
