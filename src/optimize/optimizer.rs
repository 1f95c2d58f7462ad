//! Strategy parameter optimization.
//!
//! Three search methods over a [`SearchSpace`]:
//! - Grid search: exhaustive Cartesian product, with continuous
//!   dimensions discretized into `grid_points` values
//! - Random search: seeded uniform draws
//! - Evolutionary search: tournament selection, uniform crossover,
//!   bounded per-gene mutation
//!
//! Every candidate runs a full backtest over shared observation slices
//! with its own engine and ledger. Candidates are scored in parallel;
//! all stochastic choices come from one seeded generator that is only
//! touched between parallel batches, so a fixed seed reproduces the
//! whole search. The complete evaluation history is kept, failures
//! included.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::backtest::{
    BacktestConfig, BacktestEngine, BacktestError, BacktestResult, CancellationToken,
};
use crate::data::{DataError, DataProvider, MarketObservation, WeatherObservation};
use crate::strategy::params::param_key;
use crate::strategy::{ParamSet, StrategyFactory};

use super::objective::Objective;
use super::space::{enumerate_grid, grid_axes, grid_candidate, grid_size, sample_set, SearchSpace};

const TOURNAMENT_SIZE: usize = 3;
const MUTATION_RATE: f64 = 0.2;
const MUTATION_SCALE: f64 = 0.1;
const MIN_POPULATION: usize = 4;
const MAX_POPULATION: usize = 20;

/// Search method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    #[default]
    GridSearch,
    RandomSearch,
    Evolutionary,
}

impl OptimizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GridSearch => "grid_search",
            Self::RandomSearch => "random_search",
            Self::Evolutionary => "evolutionary",
        }
    }
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid_search" | "grid" => Ok(Self::GridSearch),
            "random_search" | "random" => Ok(Self::RandomSearch),
            "evolutionary" => Ok(Self::Evolutionary),
            other => Err(format!("unknown optimization method '{}'", other)),
        }
    }
}

fn default_max_evaluations() -> usize {
    100
}

fn default_grid_points() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_max_failure_rate() -> f64 {
    0.5
}

/// Optimizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Search method.
    #[serde(default)]
    pub method: OptimizationMethod,

    /// Evaluation budget.
    #[serde(default = "default_max_evaluations")]
    pub max_evaluations: usize,

    /// Values per continuous dimension under grid search.
    #[serde(default = "default_grid_points")]
    pub grid_points: usize,

    /// Subsample an oversized grid instead of failing.
    #[serde(default)]
    pub sample_oversized_grid: bool,

    /// Seed for every stochastic choice.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Abort when failed/evaluated exceeds this share.
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,

    /// Wall-clock limit per candidate, if any.
    #[serde(default)]
    pub candidate_timeout_secs: Option<u64>,

    /// Metric to maximize.
    #[serde(default)]
    pub objective: Objective,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            method: OptimizationMethod::GridSearch,
            max_evaluations: default_max_evaluations(),
            grid_points: default_grid_points(),
            sample_oversized_grid: false,
            seed: default_seed(),
            max_failure_rate: default_max_failure_rate(),
            candidate_timeout_secs: None,
            objective: Objective::SharpeRatio,
        }
    }
}

/// Errors surfaced by optimization.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("grid of {combinations} combinations exceeds the budget of {max_evaluations}")]
    SpaceTooLarge {
        combinations: usize,
        max_evaluations: usize,
    },

    #[error("search space admits no candidates")]
    EmptySpace,

    #[error("{failed} of {evaluated} candidates failed, above the allowed failure rate")]
    FailureRateExceeded { failed: usize, evaluated: usize },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),
}

/// One candidate's outcome in the evaluation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub index: usize,
    pub params: ParamSet,

    /// Objective score, absent when the run failed.
    pub score: Option<f64>,

    /// Compact result summary or failure message.
    pub outcome: String,
}

/// Result of a completed optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub strategy_name: String,
    pub method: OptimizationMethod,
    pub objective: Objective,

    pub best_params: ParamSet,
    pub best_score: f64,

    /// Full backtest of the winning candidate.
    pub best_result: BacktestResult,

    pub evaluated: usize,
    pub failed: usize,

    /// Every candidate in evaluation order, failures included.
    pub history: Vec<Evaluation>,
}

impl OptimizationResult {
    /// Generate summary string.
    pub fn summary(&self) -> String {
        format!(
            "Optimization: {} via {}\n\
             ----------------------------------------\n\
             Objective: {}\n\
             Candidates: {} evaluated, {} failed\n\
             Best Score: {:.4}\n\
             Best Params: {}\n\
             \n\
             {}",
            self.strategy_name,
            self.method,
            self.objective,
            self.evaluated,
            self.failed,
            self.best_score,
            param_key(&self.best_params),
            self.best_result.summary(),
        )
    }
}

/// Parameter optimizer over pre-loaded observation data.
pub struct Optimizer {
    backtest_config: BacktestConfig,
    config: OptimizerConfig,
}

impl Optimizer {
    /// Create an optimizer, validating the backtest configuration.
    pub fn new(
        backtest_config: BacktestConfig,
        config: OptimizerConfig,
    ) -> Result<Self, OptimizeError> {
        backtest_config.validate()?;
        Ok(Self {
            backtest_config,
            config,
        })
    }

    /// Load observations through a provider, then optimize over them.
    pub fn optimize_with_provider(
        &self,
        factory: &dyn StrategyFactory,
        space: &SearchSpace,
        provider: &dyn DataProvider,
        market_ids: &[String],
        locations: &[String],
    ) -> Result<OptimizationResult, OptimizeError> {
        let (start, end) = self.backtest_config.window();
        let market = provider.get_market_data(market_ids, start, end)?;
        let weather = provider.get_weather_data(locations, start, end)?;
        self.optimize(factory, space, &market, &weather)
    }

    /// Run the configured search over shared observation slices.
    pub fn optimize(
        &self,
        factory: &dyn StrategyFactory,
        space: &SearchSpace,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Result<OptimizationResult, OptimizeError> {
        validate_space(space)?;

        info!(
            "optimizing '{}' via {} (budget {}, objective {})",
            factory.name(),
            self.config.method,
            self.config.max_evaluations,
            self.config.objective,
        );

        let evaluations = match self.config.method {
            OptimizationMethod::GridSearch => self.run_grid(factory, space, market, weather)?,
            OptimizationMethod::RandomSearch => self.run_random(factory, space, market, weather),
            OptimizationMethod::Evolutionary => {
                self.run_evolutionary(factory, space, market, weather)
            }
        };

        self.build_result(factory.name(), evaluations)
    }

    fn run_grid(
        &self,
        factory: &dyn StrategyFactory,
        space: &SearchSpace,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Result<Vec<(ParamSet, Result<BacktestResult, BacktestError>)>, OptimizeError> {
        let axes = grid_axes(space, self.config.grid_points);
        let combinations = grid_size(&axes);

        let candidates = if combinations <= self.config.max_evaluations {
            enumerate_grid(&axes)
        } else if self.config.sample_oversized_grid {
            let mut rng = Pcg64::seed_from_u64(self.config.seed);
            let mut picks =
                index::sample(&mut rng, combinations, self.config.max_evaluations).into_vec();
            picks.sort_unstable();
            info!(
                "sampling {} of {} grid combinations",
                picks.len(),
                combinations
            );
            picks
                .into_iter()
                .map(|i| grid_candidate(&axes, i))
                .collect()
        } else {
            return Err(OptimizeError::SpaceTooLarge {
                combinations,
                max_evaluations: self.config.max_evaluations,
            });
        };

        Ok(self.evaluate_all(factory, &candidates, market, weather))
    }

    fn run_random(
        &self,
        factory: &dyn StrategyFactory,
        space: &SearchSpace,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Vec<(ParamSet, Result<BacktestResult, BacktestError>)> {
        let mut rng = Pcg64::seed_from_u64(self.config.seed);
        let candidates: Vec<ParamSet> = (0..self.config.max_evaluations)
            .map(|_| sample_set(space, &mut rng))
            .collect();
        self.evaluate_all(factory, &candidates, market, weather)
    }

    fn run_evolutionary(
        &self,
        factory: &dyn StrategyFactory,
        space: &SearchSpace,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Vec<(ParamSet, Result<BacktestResult, BacktestError>)> {
        let mut rng = Pcg64::seed_from_u64(self.config.seed);
        let population_size =
            (self.config.max_evaluations / 5).clamp(MIN_POPULATION, MAX_POPULATION);
        let generations = (self.config.max_evaluations / population_size).max(1);
        info!(
            "evolutionary search: {} generations of {} candidates",
            generations, population_size
        );

        let progress = AtomicUsize::new(0);
        let total = population_size * generations;

        let mut population: Vec<ParamSet> = (0..population_size)
            .map(|_| sample_set(space, &mut rng))
            .collect();
        let mut evaluations = Vec::with_capacity(total);

        for generation in 0..generations {
            let batch =
                self.evaluate_batch(factory, &population, market, weather, &progress, total);

            // Failed candidates stay in the pool but lose every tournament.
            let ranked: Vec<(ParamSet, f64)> = batch
                .iter()
                .map(|(params, outcome)| {
                    let score = match outcome {
                        Ok(result) => self.config.objective.score(result),
                        Err(_) => f64::NEG_INFINITY,
                    };
                    (params.clone(), score)
                })
                .collect();
            evaluations.extend(batch);

            let best = ranked
                .iter()
                .map(|(_, score)| *score)
                .fold(f64::NEG_INFINITY, f64::max);
            info!(
                "generation {}/{}: best score {:.4}",
                generation + 1,
                generations,
                best
            );

            if generation + 1 < generations {
                population = (0..population_size)
                    .map(|_| {
                        let mut child = crossover(
                            tournament(&ranked, &mut rng),
                            tournament(&ranked, &mut rng),
                            &mut rng,
                        );
                        mutate_child(space, &mut child, &mut rng);
                        child
                    })
                    .collect();
            }
        }

        evaluations
    }

    fn evaluate_all(
        &self,
        factory: &dyn StrategyFactory,
        candidates: &[ParamSet],
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Vec<(ParamSet, Result<BacktestResult, BacktestError>)> {
        let progress = AtomicUsize::new(0);
        self.evaluate_batch(factory, candidates, market, weather, &progress, candidates.len())
    }

    fn evaluate_batch(
        &self,
        factory: &dyn StrategyFactory,
        candidates: &[ParamSet],
        market: &[MarketObservation],
        weather: &[WeatherObservation],
        progress: &AtomicUsize,
        total: usize,
    ) -> Vec<(ParamSet, Result<BacktestResult, BacktestError>)> {
        candidates
            .par_iter()
            .map(|params| {
                let outcome = self.evaluate_one(factory, params, market, weather);

                let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                if done % (total / 10).max(1) == 0 || done == total {
                    info!(
                        "evaluated {}/{} candidates ({:.0}%)",
                        done,
                        total,
                        done as f64 / total as f64 * 100.0
                    );
                }

                (params.clone(), outcome)
            })
            .collect()
    }

    fn evaluate_one(
        &self,
        factory: &dyn StrategyFactory,
        params: &ParamSet,
        market: &[MarketObservation],
        weather: &[WeatherObservation],
    ) -> Result<BacktestResult, BacktestError> {
        let strategy = factory
            .create(params)
            .map_err(|e| BacktestError::Strategy {
                name: factory.name().to_string(),
                reason: e.to_string(),
            })?;

        let mut engine = BacktestEngine::new(self.backtest_config.clone())?;
        let cancel = match self.config.candidate_timeout_secs {
            Some(secs) => CancellationToken::with_timeout(Duration::from_secs(secs)),
            None => CancellationToken::new(),
        };
        engine.run_cancellable(strategy.as_ref(), market, weather, &cancel)
    }

    fn build_result(
        &self,
        strategy_name: &str,
        evaluations: Vec<(ParamSet, Result<BacktestResult, BacktestError>)>,
    ) -> Result<OptimizationResult, OptimizeError> {
        let evaluated = evaluations.len();
        let failed = evaluations
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .count();
        if evaluated > 0 && failed as f64 > self.config.max_failure_rate * evaluated as f64 {
            return Err(OptimizeError::FailureRateExceeded { failed, evaluated });
        }

        let mut best: Option<(&ParamSet, &BacktestResult, f64)> = None;
        for (params, outcome) in &evaluations {
            let result = match outcome {
                Ok(result) => result,
                Err(_) => continue,
            };
            let score = self.config.objective.score(result);
            if score.is_nan() {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, incumbent, incumbent_score)) => {
                    score > incumbent_score
                        || (score == incumbent_score
                            && result.performance.max_drawdown_pct
                                < incumbent.performance.max_drawdown_pct)
                }
            };
            if better {
                best = Some((params, result, score));
            }
        }

        let (best_params, best_result, best_score) =
            best.ok_or(OptimizeError::FailureRateExceeded { failed, evaluated })?;
        let best_params = best_params.clone();
        let best_result = best_result.clone();

        info!(
            "best candidate {} scored {:.4}",
            param_key(&best_params),
            best_score
        );

        let history = evaluations
            .iter()
            .enumerate()
            .map(|(index, (params, outcome))| match outcome {
                Ok(result) => Evaluation {
                    index,
                    params: params.clone(),
                    score: Some(self.config.objective.score(result)),
                    outcome: format!(
                        "final equity {}, {} trades, max drawdown {:.2}%",
                        result.final_equity,
                        result.trades.len(),
                        result.performance.max_drawdown_pct,
                    ),
                },
                Err(err) => Evaluation {
                    index,
                    params: params.clone(),
                    score: None,
                    outcome: err.to_string(),
                },
            })
            .collect();

        Ok(OptimizationResult {
            strategy_name: strategy_name.to_string(),
            method: self.config.method,
            objective: self.config.objective,
            best_params,
            best_score,
            best_result,
            evaluated,
            failed,
            history,
        })
    }
}

fn validate_space(space: &SearchSpace) -> Result<(), OptimizeError> {
    if space.is_empty() || space.values().any(|range| !range.admits_values()) {
        return Err(OptimizeError::EmptySpace);
    }
    Ok(())
}

fn tournament<'a>(ranked: &'a [(ParamSet, f64)], rng: &mut Pcg64) -> &'a ParamSet {
    let mut winner = rng.gen_range(0..ranked.len());
    for _ in 1..TOURNAMENT_SIZE {
        let challenger = rng.gen_range(0..ranked.len());
        if ranked[challenger].1 > ranked[winner].1 {
            winner = challenger;
        }
    }
    &ranked[winner].0
}

fn crossover(a: &ParamSet, b: &ParamSet, rng: &mut Pcg64) -> ParamSet {
    a.iter()
        .map(|(name, value)| {
            let gene = if rng.gen_bool(0.5) {
                value
            } else {
                b.get(name).unwrap_or(value)
            };
            (name.clone(), gene.clone())
        })
        .collect()
}

fn mutate_child(space: &SearchSpace, child: &mut ParamSet, rng: &mut Pcg64) {
    for (name, range) in space {
        if !rng.gen_bool(MUTATION_RATE) {
            continue;
        }
        let mutated = match child.get(name) {
            Some(value) => range.mutate(value, rng, MUTATION_SCALE),
            None => range.sample(rng),
        };
        child.insert(name.clone(), mutated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::space::ParamRange;
    use crate::strategy::{ParamValue, RegistryFactory};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn configs(
        method: OptimizationMethod,
        max_evaluations: usize,
    ) -> (BacktestConfig, OptimizerConfig) {
        let backtest = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 7, 10).unwrap(),
            initial_capital: dec!(10000),
            commission_per_trade: dec!(0.01),
            max_position_size: 1.0,
            max_positions: 10,
            ..BacktestConfig::default()
        };
        let optimizer = OptimizerConfig {
            method,
            max_evaluations,
            objective: Objective::TotalReturn,
            ..OptimizerConfig::default()
        };
        (backtest, optimizer)
    }

    fn market_obs(day: u32, prob: Decimal) -> MarketObservation {
        MarketObservation {
            timestamp: Utc.with_ymd_and_hms(2024, 7, day, 12, 0, 0).unwrap(),
            market_id: "m1".to_string(),
            outcome: "yes".to_string(),
            probability: prob,
            volume: dec!(1000),
            quality_score: 1.0,
        }
    }

    fn weather_obs(day: u32, temp: f64) -> WeatherObservation {
        WeatherObservation {
            timestamp: Utc.with_ymd_and_hms(2024, 7, day, 12, 0, 0).unwrap(),
            location: "NYC".to_string(),
            temperature_c: Some(temp),
            humidity_pct: None,
            wind_speed_kph: None,
            precipitation_mm: None,
            quality_score: 1.0,
        }
    }

    /// Prices dip then recover while temperatures ramp, so each threshold
    /// enters on a different day: 25 enters at the 0.50 top, 30 at the
    /// 0.32 bottom, 35 at the 0.60 recovery. 30 wins on total return.
    fn fixture() -> (Vec<MarketObservation>, Vec<WeatherObservation>) {
        let prices = [
            dec!(0.50),
            dec!(0.48),
            dec!(0.30),
            dec!(0.30),
            dec!(0.32),
            dec!(0.40),
            dec!(0.50),
            dec!(0.60),
            dec!(0.60),
            dec!(0.60),
        ];
        let temps = [26.0, 26.0, 27.0, 28.0, 31.0, 31.0, 32.0, 33.0, 36.0, 36.0];
        let market = prices
            .iter()
            .enumerate()
            .map(|(i, p)| market_obs(i as u32 + 1, *p))
            .collect();
        let weather = temps
            .iter()
            .enumerate()
            .map(|(i, t)| weather_obs(i as u32 + 1, *t))
            .collect();
        (market, weather)
    }

    fn threshold_space() -> SearchSpace {
        let mut space = SearchSpace::new();
        space.insert(
            "threshold".to_string(),
            ParamRange::Discrete { min: 25, max: 35, step: 5 },
        );
        space
    }

    #[test]
    fn test_grid_search_finds_best_threshold() {
        let (backtest, optimizer_config) = configs(OptimizationMethod::GridSearch, 50);
        let optimizer = Optimizer::new(backtest, optimizer_config).unwrap();
        let factory = RegistryFactory::new("threshold").unwrap();
        let (market, weather) = fixture();

        let result = optimizer
            .optimize(&factory, &threshold_space(), &market, &weather)
            .unwrap();

        assert_eq!(result.evaluated, 3);
        assert_eq!(result.failed, 0);
        assert_eq!(result.history.len(), 3);
        assert_eq!(result.best_params.get("threshold"), Some(&ParamValue::Int(30)));
        assert!(result.best_score > 0.0);
    }

    #[test]
    fn test_oversized_grid_rejected_then_sampled() {
        let (backtest, mut optimizer_config) = configs(OptimizationMethod::GridSearch, 4);
        let factory = RegistryFactory::new("threshold").unwrap();
        let (market, weather) = fixture();

        let mut space = threshold_space();
        space.insert(
            "exit_buffer".to_string(),
            ParamRange::Continuous { min: 0.0, max: 2.0 },
        );
        // 3 thresholds x 5 buffers = 15 combinations against a budget of 4.

        let optimizer = Optimizer::new(backtest.clone(), optimizer_config.clone()).unwrap();
        match optimizer.optimize(&factory, &space, &market, &weather) {
            Err(OptimizeError::SpaceTooLarge {
                combinations,
                max_evaluations,
            }) => {
                assert_eq!(combinations, 15);
                assert_eq!(max_evaluations, 4);
            }
            other => panic!("expected SpaceTooLarge, got {:?}", other.map(|r| r.evaluated)),
        }

        optimizer_config.sample_oversized_grid = true;
        let optimizer = Optimizer::new(backtest, optimizer_config).unwrap();
        let result = optimizer.optimize(&factory, &space, &market, &weather).unwrap();
        assert_eq!(result.evaluated, 4);
    }

    #[test]
    fn test_empty_space_rejected() {
        let (backtest, optimizer_config) = configs(OptimizationMethod::RandomSearch, 10);
        let optimizer = Optimizer::new(backtest, optimizer_config).unwrap();
        let factory = RegistryFactory::new("threshold").unwrap();
        let (market, weather) = fixture();

        assert!(matches!(
            optimizer.optimize(&factory, &SearchSpace::new(), &market, &weather),
            Err(OptimizeError::EmptySpace)
        ));
    }

    #[test]
    fn test_random_search_respects_budget_and_seed() {
        let (backtest, optimizer_config) = configs(OptimizationMethod::RandomSearch, 8);
        let factory = RegistryFactory::new("threshold").unwrap();
        let (market, weather) = fixture();

        let mut space = threshold_space();
        space.insert(
            "exit_buffer".to_string(),
            ParamRange::Continuous { min: 0.0, max: 2.0 },
        );

        let optimizer = Optimizer::new(backtest.clone(), optimizer_config.clone()).unwrap();
        let first = optimizer.optimize(&factory, &space, &market, &weather).unwrap();
        assert_eq!(first.evaluated, 8);

        let optimizer = Optimizer::new(backtest, optimizer_config).unwrap();
        let second = optimizer.optimize(&factory, &space, &market, &weather).unwrap();

        let first_params: Vec<_> = first.history.iter().map(|e| e.params.clone()).collect();
        let second_params: Vec<_> = second.history.iter().map(|e| e.params.clone()).collect();
        assert_eq!(first_params, second_params);
        assert_eq!(first.best_params, second.best_params);
    }

    #[test]
    fn test_evolutionary_reproducible_under_fixed_seed() {
        let (backtest, optimizer_config) = configs(OptimizationMethod::Evolutionary, 8);
        let factory = RegistryFactory::new("threshold").unwrap();
        let (market, weather) = fixture();

        let mut space = threshold_space();
        space.insert(
            "exit_buffer".to_string(),
            ParamRange::Continuous { min: 0.0, max: 2.0 },
        );

        let optimizer = Optimizer::new(backtest.clone(), optimizer_config.clone()).unwrap();
        let first = optimizer.optimize(&factory, &space, &market, &weather).unwrap();
        // Two generations of four under a budget of eight.
        assert_eq!(first.evaluated, 8);

        let optimizer = Optimizer::new(backtest, optimizer_config).unwrap();
        let second = optimizer.optimize(&factory, &space, &market, &weather).unwrap();

        let first_params: Vec<_> = first.history.iter().map(|e| e.params.clone()).collect();
        let second_params: Vec<_> = second.history.iter().map(|e| e.params.clone()).collect();
        assert_eq!(first_params, second_params);
        assert_eq!(first.best_params, second.best_params);
    }

    #[test]
    fn test_failure_rate_threshold_aborts() {
        let (backtest, optimizer_config) = configs(OptimizationMethod::GridSearch, 10);
        let optimizer = Optimizer::new(backtest, optimizer_config).unwrap();
        let factory = RegistryFactory::new("threshold").unwrap();
        let (market, weather) = fixture();

        let mut space = threshold_space();
        space.insert(
            "quantity".to_string(),
            ParamRange::Discrete { min: -100, max: -100, step: 1 },
        );

        match optimizer.optimize(&factory, &space, &market, &weather) {
            Err(OptimizeError::FailureRateExceeded { failed, evaluated }) => {
                assert_eq!(failed, 3);
                assert_eq!(evaluated, 3);
            }
            other => panic!("expected FailureRateExceeded, got {:?}", other.map(|r| r.evaluated)),
        }
    }

    #[test]
    fn test_failed_candidates_recorded_in_history() {
        let (backtest, mut optimizer_config) = configs(OptimizationMethod::GridSearch, 10);
        optimizer_config.max_failure_rate = 0.9;
        let optimizer = Optimizer::new(backtest, optimizer_config).unwrap();
        let factory = RegistryFactory::new("threshold").unwrap();
        let (market, weather) = fixture();

        let mut space = threshold_space();
        // Quantity in {-100, 100}: half the grid fails validation.
        space.insert(
            "quantity".to_string(),
            ParamRange::Discrete { min: -100, max: 100, step: 200 },
        );

        let result = optimizer.optimize(&factory, &space, &market, &weather).unwrap();
        assert_eq!(result.evaluated, 6);
        assert_eq!(result.failed, 3);

        let failures: Vec<_> = result.history.iter().filter(|e| e.score.is_none()).collect();
        assert_eq!(failures.len(), 3);
        assert!(failures[0].outcome.contains("quantity"));
        assert_eq!(result.best_params.get("threshold"), Some(&ParamValue::Int(30)));
    }

    #[test]
    fn test_candidate_timeout_cancels_runs() {
        let (backtest, mut optimizer_config) = configs(OptimizationMethod::GridSearch, 10);
        optimizer_config.candidate_timeout_secs = Some(0);
        let optimizer = Optimizer::new(backtest, optimizer_config).unwrap();
        let factory = RegistryFactory::new("threshold").unwrap();
        let (market, weather) = fixture();

        match optimizer.optimize(&factory, &threshold_space(), &market, &weather) {
            Err(OptimizeError::FailureRateExceeded { failed, evaluated }) => {
                assert_eq!(failed, 3);
                assert_eq!(evaluated, 3);
            }
            other => panic!("expected FailureRateExceeded, got {:?}", other.map(|r| r.evaluated)),
        }
    }
}
