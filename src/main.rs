//! Tempest Backtester CLI
//!
//! Runs weather-informed strategy backtests over cleaned CSV observations.
//!
//! # Usage
//!
//! ```bash
//! # Backtest one strategy over July 2024
//! tempest-backtest single --strategy threshold \
//!     --markets nyc-high-temp --locations NYC \
//!     --start 2024-07-01 --end 2024-07-31
//!
//! # Compare strategies on the same observations
//! tempest-backtest multi --strategy threshold --strategy seasonal \
//!     --markets nyc-high-temp --locations NYC
//!
//! # Search for the best threshold parameters
//! tempest-backtest optimize --strategy threshold \
//!     --optimization-method random_search --max-evaluations 200 --seed 7 \
//!     --markets nyc-high-temp --locations NYC --output best.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use serde::Serialize;

use tempest_backtest::backtest::{run_multiple_strategies, BacktestConfig, BacktestEngine};
use tempest_backtest::data::ObservationStore;
use tempest_backtest::optimize::{
    Objective, OptimizationMethod, Optimizer, OptimizerConfig, SearchSpace,
};
use tempest_backtest::strategy::{create_strategy, default_search_space, ParamSet, RegistryFactory};

const SEPARATOR: &str = "============================================================";

/// Weather-informed strategy backtester CLI.
#[derive(Parser)]
#[command(name = "tempest-backtest")]
#[command(about = "Backtest trading strategies driven by weather observations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding markets.csv and weather.csv
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Backtest configuration file (JSON); explicit flags take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// First simulated day (YYYY-MM-DD)
    #[arg(long, global = true)]
    start: Option<String>,

    /// Last simulated day (YYYY-MM-DD)
    #[arg(long, global = true)]
    end: Option<String>,

    /// Starting cash
    #[arg(long, global = true)]
    capital: Option<String>,

    /// Commission as a fraction of traded notional
    #[arg(long, global = true)]
    commission: Option<String>,

    /// Write the full result as JSON to this file
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a single strategy
    Single {
        /// Strategy name (threshold, pattern, seasonal)
        #[arg(long)]
        strategy: String,

        /// Strategy parameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Comma-separated market identifiers
        #[arg(long)]
        markets: String,

        /// Comma-separated weather locations
        #[arg(long)]
        locations: String,
    },

    /// Backtest several strategies on the same observations
    Multi {
        /// Strategy name, repeatable
        #[arg(long = "strategy", required = true)]
        strategies: Vec<String>,

        /// Comma-separated market identifiers
        #[arg(long)]
        markets: String,

        /// Comma-separated weather locations
        #[arg(long)]
        locations: String,
    },

    /// Search for the best strategy parameters
    Optimize {
        /// Strategy name (threshold, pattern, seasonal)
        #[arg(long)]
        strategy: String,

        /// Search method: grid_search, random_search, or evolutionary
        #[arg(long, default_value = "grid_search")]
        optimization_method: String,

        /// Candidate budget
        #[arg(long, default_value_t = 100)]
        max_evaluations: usize,

        /// Objective: sharpe_ratio, total_return, sortino_ratio, calmar_ratio, profit_factor
        #[arg(long, default_value = "sharpe_ratio")]
        objective: String,

        /// Seed for the search RNG
        #[arg(long)]
        seed: Option<u64>,

        /// Search space file (JSON); defaults to the strategy's built-in space
        #[arg(long)]
        space: Option<PathBuf>,

        /// Subsample oversized grids instead of refusing them
        #[arg(long)]
        sample_oversized_grid: bool,

        /// Comma-separated market identifiers
        #[arg(long)]
        markets: String,

        /// Comma-separated weather locations
        #[arg(long)]
        locations: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tempest_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let store = ObservationStore::new(&cli.data_dir.to_string_lossy());
    let output = cli.output.clone();

    match cli.command {
        Commands::Single {
            strategy,
            params,
            markets,
            locations,
        } => {
            cmd_single(
                config,
                &store,
                &strategy,
                params.as_deref(),
                &split_list(&markets),
                &split_list(&locations),
                output.as_deref(),
            )?;
        }
        Commands::Multi {
            strategies,
            markets,
            locations,
        } => {
            cmd_multi(
                config,
                &store,
                &strategies,
                &split_list(&markets),
                &split_list(&locations),
                output.as_deref(),
            )?;
        }
        Commands::Optimize {
            strategy,
            optimization_method,
            max_evaluations,
            objective,
            seed,
            space,
            sample_oversized_grid,
            markets,
            locations,
        } => {
            cmd_optimize(
                config,
                &store,
                &strategy,
                &optimization_method,
                max_evaluations,
                &objective,
                seed,
                space.as_deref(),
                sample_oversized_grid,
                &split_list(&markets),
                &split_list(&locations),
                output.as_deref(),
            )?;
        }
    }

    Ok(())
}

/// Base config from the optional JSON file, with flag overrides applied on top.
fn load_config(cli: &Cli) -> Result<BacktestConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => BacktestConfig::default(),
    };

    if let Some(start) = &cli.start {
        config.start_date =
            NaiveDate::parse_from_str(start, "%Y-%m-%d").context("Invalid start date format")?;
    }
    if let Some(end) = &cli.end {
        config.end_date =
            NaiveDate::parse_from_str(end, "%Y-%m-%d").context("Invalid end date format")?;
    }
    if let Some(capital) = &cli.capital {
        config.initial_capital = capital.parse::<Decimal>().context("Invalid capital value")?;
    }
    if let Some(commission) = &cli.commission {
        config.commission_per_trade = commission
            .parse::<Decimal>()
            .context("Invalid commission value")?;
    }

    Ok(config)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn cmd_single(
    config: BacktestConfig,
    store: &ObservationStore,
    strategy_name: &str,
    params_json: Option<&str>,
    market_ids: &[String],
    locations: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let params: ParamSet = match params_json {
        Some(raw) => serde_json::from_str(raw).context("Invalid --params JSON")?,
        None => ParamSet::new(),
    };
    let strategy = create_strategy(strategy_name, &params)?;

    let mut engine = BacktestEngine::new(config)?;
    let result = engine.run(strategy.as_ref(), store, market_ids, locations)?;

    println!("{}", result.summary());
    write_output(output, &result)?;
    Ok(())
}

fn cmd_multi(
    config: BacktestConfig,
    store: &ObservationStore,
    strategy_names: &[String],
    market_ids: &[String],
    locations: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let requested: Vec<(String, ParamSet)> = strategy_names
        .iter()
        .map(|name| (name.clone(), ParamSet::new()))
        .collect();

    let outcomes = run_multiple_strategies(&config, store, &requested, market_ids, locations)?;

    println!("{}", SEPARATOR);
    println!("Strategy Comparison ({} strategies)", outcomes.len());
    println!("{}", SEPARATOR);
    for (name, outcome) in &outcomes {
        match outcome {
            Ok(result) => println!("\n{}", result.summary()),
            Err(err) => println!("\n{}: failed ({})", name, err),
        }
    }

    if output.is_some() {
        let entries: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|(name, outcome)| match outcome {
                Ok(result) => serde_json::json!({ "strategy": name, "result": result }),
                Err(err) => serde_json::json!({ "strategy": name, "error": err.to_string() }),
            })
            .collect();
        write_output(output, &entries)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_optimize(
    config: BacktestConfig,
    store: &ObservationStore,
    strategy_name: &str,
    method_raw: &str,
    max_evaluations: usize,
    objective_raw: &str,
    seed: Option<u64>,
    space_file: Option<&Path>,
    sample_oversized_grid: bool,
    market_ids: &[String],
    locations: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let method: OptimizationMethod = method_raw.parse().map_err(anyhow::Error::msg)?;
    let objective: Objective = objective_raw.parse().map_err(anyhow::Error::msg)?;

    let space: SearchSpace = match space_file {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read search space file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid search space file {}", path.display()))?
        }
        None => default_search_space(strategy_name)?,
    };

    let factory = RegistryFactory::new(strategy_name)?;
    let mut optimizer_config = OptimizerConfig {
        method,
        max_evaluations,
        objective,
        sample_oversized_grid,
        ..OptimizerConfig::default()
    };
    if let Some(seed) = seed {
        optimizer_config.seed = seed;
    }

    let optimizer = Optimizer::new(config, optimizer_config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    spinner.set_message(format!(
        "optimizing '{}' ({} candidates max)",
        strategy_name, max_evaluations
    ));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = optimizer.optimize_with_provider(&factory, &space, store, market_ids, locations);
    spinner.finish_and_clear();
    let result = outcome?;

    println!("{}", result.summary());
    write_output(output, &result)?;
    Ok(())
}

fn write_output<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    if let Some(path) = path {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("\nResult written to {}", path.display());
    }
    Ok(())
}
