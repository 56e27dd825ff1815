//! CLI definition and dispatch.
//!
//! Each command runs in stages: load and validate the INI config, load the
//! series the data port serves, then hand off to the domain. Pipelines take
//! `&dyn` ports so tests can drive them without touching disk; the `run_*`
//! wrappers turn their errors into process exit codes.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestResult, TestPeriod};
use crate::domain::config_validation::{
    data_directory, parse_backtest_config, parse_periods, parse_redirects, parse_sweep_settings,
    use_extended, validate_backtest_config, validate_sweep_config,
};
use crate::domain::error::PitError;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::market_data::MarketData;
use crate::domain::metrics::Metrics;
use crate::domain::params::{self, ParamTree};
use crate::domain::strategy::StrategyRegistry;
use crate::domain::strategy_manager::StrategyManager;
use crate::domain::sweep::{
    EntryStatus, ParameterSweepEngine, RankMetric, SweepResult, SweepSpec, load_sweep_document,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_LOG_FILTER: &str = "pitsweep=info";

#[derive(Parser, Debug)]
#[command(
    name = "pitsweep",
    about = "Point-in-time backtester with constrained parameter sweeps"
)]
pub struct Cli {
    /// Log filter, e.g. `debug` or `pitsweep=trace`; overrides RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one strategy over the configured range
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: String,
        /// JSON object merged over the strategy's default parameters
        #[arg(short, long)]
        params: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep every strategy in a spec document
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        spec: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        rank_by: Option<RankMetric>,
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Worker threads; overrides `[sweep] threads`
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Check config and sweep spec without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        spec: Option<PathBuf>,
    },
    /// List registered strategies and their default parameters
    Strategies,
    /// Show range, size and frequency of loaded series
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
    },
}

/// Install the stderr subscriber. `--log-level` wins over `RUST_LOG`, which
/// wins over the built-in default.
pub fn init_logging(level: Option<&str>) -> Result<(), String> {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives).map_err(|e| format!("invalid --log-level: {e}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| format!("failed to init logging: {e}"))
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            strategy,
            params,
            output,
        } => run_backtest(&config, &strategy, params.as_ref(), output.as_ref()),
        Command::Sweep {
            config,
            spec,
            output,
            rank_by,
            top,
            threads,
        } => run_sweep(&config, &spec, output.as_ref(), rank_by, top, threads),
        Command::Validate { config, spec } => run_validate(&config, spec.as_ref()),
        Command::Strategies => run_strategies(),
        Command::Info { config, ticker } => run_info(&config, ticker.as_deref()),
    }
}

fn fail(e: &PitError) -> ExitCode {
    error!("{e}");
    e.into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PitError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        fail(&err)
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, PitError> {
    validate_backtest_config(adapter)?;
    parse_backtest_config(adapter)
}

/// Parameter overrides from a JSON file; must be an object.
pub fn read_params(path: &Path) -> Result<ParamTree, PitError> {
    let text = std::fs::read_to_string(path)?;
    let parse_err = |reason: String| PitError::SpecParse {
        file: path.display().to_string(),
        reason,
    };
    let tree: ParamTree = serde_json::from_str(&text).map_err(|e| parse_err(e.to_string()))?;
    if !tree.is_object() {
        return Err(parse_err("parameter file must hold a JSON object".into()));
    }
    Ok(tree)
}

/// Every series the port serves, with `[redirects]` applied. With
/// `[data] use_extended`, `ext_X` series also stand in for `X` unless an
/// explicit redirect says otherwise.
pub fn load_market(data_port: &dyn DataPort, config: &dyn ConfigPort) -> Result<MarketData, PitError> {
    let mut market = MarketData::load_all(data_port)?;
    for (from, to) in parse_redirects(config)? {
        market.redirect(from, to)?;
    }
    if use_extended(config)? {
        market.prefer_extended();
    }
    Ok(market)
}

pub fn build_manager(market: MarketData, bt_config: BacktestConfig) -> StrategyManager {
    StrategyManager::new(
        Arc::new(StrategyRegistry::with_builtins()),
        Arc::new(market),
        Arc::new(IndicatorEngine::new()),
        bt_config,
    )
}

fn data_port_for(config: &dyn ConfigPort) -> Result<CsvAdapter, PitError> {
    let dir = data_directory(config)?;
    info!(dir = %dir.display(), "reading series");
    Ok(CsvAdapter::new(dir))
}

fn print_metrics(label: &str, days: usize, m: &Metrics) {
    println!(
        "{label:<16} {days:>6} days  return {:>8.2}%  annualized {:>7.2}%  max dd -{:.1}% ({} days)  sharpe {:.2}  sortino {:.2}  final {:.2}",
        m.total_return * 100.0,
        m.annualized_return * 100.0,
        m.max_drawdown * 100.0,
        m.max_drawdown_duration,
        m.sharpe_ratio,
        m.sortino_ratio,
        m.final_value,
    );
}

fn run_backtest(
    config_path: &PathBuf,
    strategy_id: &str,
    params_path: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let overrides = match params_path.map(|p| read_params(p)).transpose() {
        Ok(tree) => tree.unwrap_or_else(|| serde_json::json!({})),
        Err(e) => return fail(&e),
    };

    let data_port = match data_port_for(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    match run_backtest_pipeline(&data_port, &adapter, strategy_id, &overrides, output.map(PathBuf::as_path)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

/// Run one backtest, print its summary and per-period metrics, and write
/// reports when `output` is set. A failed run still writes its partial path.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
    strategy_id: &str,
    overrides: &ParamTree,
    output: Option<&Path>,
) -> Result<BacktestResult, PitError> {
    let bt_config = build_backtest_config(config)?;
    let periods = parse_periods(config)?;
    let market = load_market(data_port, config)?;
    let manager = build_manager(market, bt_config.clone());

    info!(
        strategy = %strategy_id,
        start = %bt_config.start_date,
        end = %bt_config.end_date,
        calendar = %bt_config.calendar,
        frequency = %bt_config.frequency,
        "running backtest"
    );
    let reporter = CsvReportAdapter::new();

    match manager.execute(strategy_id, bt_config.start_date, bt_config.end_date, overrides) {
        Ok(result) => {
            println!("=== {} ===", result.strategy_id);
            println!("params: {}", result.params);
            print_metrics("full", result.len(), &result.metrics(bt_config.risk_free_rate));
            print_periods(&result, &periods, bt_config.risk_free_rate);
            println!("rebalances: {}", result.rebalancing_log.len());

            if let Some(dir) = output {
                reporter.write_backtest(&result, &periods, bt_config.risk_free_rate, dir)?;
            }
            Ok(result)
        }
        Err(failure) => {
            error!(
                strategy = %failure.strategy_id,
                date = ?failure.date,
                ticker = ?failure.ticker(),
                simulated_days = failure.partial.len(),
                "{}",
                failure.error
            );
            if let (Some(dir), false) = (output, failure.partial.is_empty()) {
                reporter.write_backtest(&failure.partial, &[], bt_config.risk_free_rate, dir)?;
            }
            Err(failure.error)
        }
    }
}

fn print_periods(result: &BacktestResult, periods: &[TestPeriod], risk_free_rate: f64) {
    for period in periods {
        match result.extract_period(period.start, period.end) {
            Ok(slice) => print_metrics(&period.name, slice.len(), &slice.metrics(risk_free_rate)),
            Err(e) => warn!(period = %period.name, "{e}"),
        }
    }
}

fn run_sweep(
    config_path: &PathBuf,
    spec_path: &PathBuf,
    output: Option<&PathBuf>,
    rank_by: Option<RankMetric>,
    top: usize,
    threads: Option<usize>,
) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let specs = match load_sweep_document(spec_path) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    let data_port = match data_port_for(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let options = SweepOptions {
        rank_by,
        top,
        threads,
        output: output.map(PathBuf::as_path),
    };
    match run_sweep_pipeline(&data_port, &adapter, &specs, &options) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

/// Command-line overrides for a sweep; `None` falls back to `[sweep]`.
#[derive(Debug, Clone, Default)]
pub struct SweepOptions<'a> {
    pub rank_by: Option<RankMetric>,
    pub top: usize,
    pub threads: Option<usize>,
    pub output: Option<&'a Path>,
}

pub fn run_sweep_pipeline(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
    specs: &[SweepSpec],
    options: &SweepOptions<'_>,
) -> Result<Vec<SweepResult>, PitError> {
    let bt_config = build_backtest_config(config)?;
    validate_sweep_config(config)?;
    let settings = parse_sweep_settings(config)?;
    let periods = parse_periods(config)?;
    let rank_by = options.rank_by.unwrap_or(settings.rank_by);
    let threads = options.threads.unwrap_or(settings.threads);

    for spec in specs {
        spec.validate()?;
    }

    let market = load_market(data_port, config)?;
    let engine = ParameterSweepEngine::new(build_manager(market, bt_config.clone())).with_threads(threads);
    let reporter = CsvReportAdapter::new();

    let mut results = Vec::with_capacity(specs.len());
    for spec in specs {
        let result = engine.run(spec, bt_config.start_date, bt_config.end_date)?;
        print_sweep(&result, rank_by, options.top);
        if let Some(dir) = options.output {
            reporter.write_sweep(&result, rank_by, &periods, bt_config.risk_free_rate, dir)?;
        }
        results.push(result);
    }
    Ok(results)
}

fn print_sweep(result: &SweepResult, rank_by: RankMetric, top: usize) {
    println!("=== {} sweep ({} to {}) ===", result.strategy_id, result.start, result.end);
    println!(
        "grid {}  filtered {}  evaluated {}  duplicates {}  failed {}  cancelled {}",
        result.grid_size,
        result.filtered_out,
        result.entries.len(),
        result.duplicates(),
        result.failures().len(),
        result.cancelled(),
    );
    println!("top {top} by {rank_by}:");
    for (rank, entry) in result.rank(rank_by).into_iter().take(top).enumerate() {
        if let Some(m) = entry.status.metrics() {
            println!(
                "  {:>3}. {}  return {:.2}%  max dd -{:.1}%",
                rank + 1,
                entry.combination,
                m.total_return * 100.0,
                m.max_drawdown * 100.0,
            );
        }
    }
    for entry in result.failures() {
        if let EntryStatus::Failed { reason, .. } = &entry.status {
            println!("  failed {}: {reason}", entry.combination);
        }
    }
}

/// Grid sizes of one sweep spec before and after constraint filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSummary {
    pub strategy_id: String,
    pub grid_size: usize,
    pub filtered_out: usize,
    pub remaining: usize,
}

/// Check a config and optional sweep specs. For each spec the strategy must
/// exist and its defaults merged with the first surviving combination must
/// pass the strategy's own parameter checks.
pub fn dry_run(config: &dyn ConfigPort, specs: &[SweepSpec]) -> Result<Vec<GridSummary>, PitError> {
    build_backtest_config(config)?;
    validate_sweep_config(config)?;

    let registry = StrategyRegistry::with_builtins();
    let mut summaries = Vec::with_capacity(specs.len());
    for spec in specs {
        spec.validate()?;
        let strategy = registry.get(&spec.strategy_id)?;
        let grid_size = spec.grid_size()?;
        let (combinations, filtered_out) = spec.combinations()?;
        if let Some(first) = combinations.first() {
            let merged = params::merge(&strategy.default_params(), &first.overrides()?);
            strategy.required_tickers(&merged)?;
        }
        summaries.push(GridSummary {
            strategy_id: spec.strategy_id.clone(),
            grid_size,
            filtered_out,
            remaining: combinations.len(),
        });
    }
    Ok(summaries)
}

fn run_validate(config_path: &PathBuf, spec_path: Option<&PathBuf>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let specs = match spec_path.map(|p| load_sweep_document(p)).transpose() {
        Ok(s) => s.unwrap_or_default(),
        Err(e) => return fail(&e),
    };

    match dry_run(&adapter, &specs) {
        Ok(summaries) => {
            println!("config is valid");
            for s in &summaries {
                println!(
                    "{}: grid {}  filtered {}  remaining {}",
                    s.strategy_id, s.grid_size, s.filtered_out, s.remaining
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_strategies() -> ExitCode {
    let registry = StrategyRegistry::with_builtins();
    for strategy in registry.iter() {
        println!("{}  {}", strategy.id(), strategy.description());
        println!("    defaults: {}", strategy.default_params());
    }
    ExitCode::SUCCESS
}

fn run_info(config_path: &PathBuf, ticker: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let data_port = match data_port_for(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let tickers = match ticker {
        Some(t) => vec![t.to_string()],
        None => match data_port.list_tickers() {
            Ok(t) => t,
            Err(e) => return fail(&e),
        },
    };

    let mut failed = None;
    for t in &tickers {
        match data_port.load_series(t) {
            Ok(series) => println!(
                "{}: {} points, {} to {} ({})",
                t,
                series.len(),
                series.first_date(),
                series.last_date(),
                series.frequency()
            ),
            Err(e) => {
                error!(ticker = %t, "{e}");
                failed.get_or_insert(e);
            }
        }
    }

    match failed {
        Some(e) => (&e).into(),
        None => ExitCode::SUCCESS,
    }
}
