//! Constrained parameter sweeps.
//!
//! A [`SweepSpec`] declares numeric ranges for parameter paths plus ordering
//! constraints between them. The sweep expands the ranges into a grid,
//! filters combinations that break a constraint, collapses combinations whose
//! merged parameter trees are identical, runs each distinct tree once on a
//! rayon pool, and ranks the results.
//!
//! Sweep documents are JSON, keyed by strategy id:
//!
//! ```json
//! {
//!   "ma_switch": {
//!     "window_days": {"min": 100, "max": 200, "nsteps": 3},
//!     "thresholds[exit]": {"min": 0.95, "max": 1.0, "nsteps": 6},
//!     "thresholds[enter]": {"min": 1.0, "max": 1.05, "nsteps": 6},
//!     "_increase_condition": [["thresholds[exit]", "thresholds[enter]"]]
//!   }
//! }
//! ```

use crate::domain::backtest::{BacktestResult, TestPeriod};
use crate::domain::error::PitError;
use crate::domain::metrics::Metrics;
use crate::domain::params::{self, ParamPath, ParamTree};
use crate::domain::strategy::Strategy;
use crate::domain::strategy_manager::StrategyManager;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

pub const INCREASE_CONDITION_KEY: &str = "_increase_condition";

/// Decimals used when the step size gives no guidance (single value or zero step).
const DEFAULT_DECIMALS: i32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub path: ParamPath,
    /// The path as written in the sweep document.
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub nsteps: usize,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

impl ParameterSpec {
    pub fn new(label: &str, min: f64, max: f64, nsteps: usize) -> Result<Self, PitError> {
        Ok(Self {
            path: ParamPath::parse(label)?,
            label: label.to_string(),
            min,
            max,
            nsteps,
        })
    }

    pub fn validate(&self) -> Result<(), PitError> {
        let invalid = |reason: String| PitError::SpecInvalid {
            reason: format!("{}: {reason}", self.label),
        };
        if self.nsteps == 0 {
            return Err(invalid("nsteps must be at least 1".into()));
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(invalid("min and max must be finite".into()));
        }
        if self.min > self.max {
            return Err(invalid(format!("min {} is greater than max {}", self.min, self.max)));
        }
        Ok(())
    }

    /// `nsteps` evenly spaced values over `[min, max]`, rounded two digits
    /// past the step's leading digit to strip floating-point noise.
    pub fn values(&self) -> Vec<f64> {
        match self.nsteps {
            0 => Vec::new(),
            1 => vec![self.min],
            n => {
                let step = (self.max - self.min) / (n - 1) as f64;
                let decimals = if step > 0.0 {
                    (2 - step.log10().floor() as i32).clamp(0, 10)
                } else {
                    DEFAULT_DECIMALS
                };
                (0..n)
                    .map(|i| {
                        let raw = if i == n - 1 {
                            self.max
                        } else {
                            self.min + step * i as f64
                        };
                        round_to(raw, decimals)
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterCombination {
    /// Position in the unfiltered grid.
    pub index: usize,
    pub assignments: Vec<(ParamPath, f64)>,
}

impl ParameterCombination {
    /// Value assigned to `path`; with repeated paths the last assignment wins.
    pub fn value(&self, path: &ParamPath) -> Option<f64> {
        self.assignments
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, v)| *v)
    }

    /// Every constraint group is strictly increasing.
    pub fn satisfies(&self, constraints: &[Vec<ParamPath>]) -> bool {
        constraints.iter().all(|group| {
            let values: Vec<f64> = group.iter().filter_map(|p| self.value(p)).collect();
            values.windows(2).all(|w| w[0] < w[1])
        })
    }

    pub fn overrides(&self) -> Result<ParamTree, PitError> {
        params::overrides_from(&self.assignments)
    }
}

impl fmt::Display for ParameterCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .assignments
            .iter()
            .map(|(p, v)| format!("{p}={v}"))
            .collect();
        write!(f, "#{} {}", self.index, parts.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    pub strategy_id: String,
    pub parameters: Vec<ParameterSpec>,
    /// Groups of paths whose values must be strictly increasing, in order.
    pub constraints: Vec<Vec<ParamPath>>,
}

impl SweepSpec {
    pub fn new(
        strategy_id: impl Into<String>,
        parameters: Vec<ParameterSpec>,
        constraints: Vec<Vec<ParamPath>>,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            parameters,
            constraints,
        }
    }

    pub fn validate(&self) -> Result<(), PitError> {
        if self.strategy_id.is_empty() {
            return Err(PitError::SpecInvalid {
                reason: "empty strategy id".into(),
            });
        }
        for p in &self.parameters {
            p.validate()?;
        }
        for group in &self.constraints {
            for path in group {
                if !self.parameters.iter().any(|p| &p.path == path) {
                    return Err(PitError::SpecInvalid {
                        reason: format!(
                            "{}: constraint refers to undeclared parameter {path}",
                            self.strategy_id
                        ),
                    });
                }
            }
        }
        self.grid_size()?;
        Ok(())
    }

    /// Values per declared parameter, in declaration order.
    pub fn grid(&self) -> Vec<Vec<f64>> {
        self.parameters.iter().map(ParameterSpec::values).collect()
    }

    /// Size of the unfiltered cartesian product.
    pub fn grid_size(&self) -> Result<usize, PitError> {
        self.parameters
            .iter()
            .try_fold(1usize, |acc, p| acc.checked_mul(p.nsteps))
            .ok_or_else(|| PitError::SpecInvalid {
                reason: format!("{}: grid size overflows", self.strategy_id),
            })
    }

    /// Cartesian product (last parameter varies fastest) with constraint
    /// violators removed. Returns the survivors and the number filtered out.
    pub fn combinations(&self) -> Result<(Vec<ParameterCombination>, usize), PitError> {
        self.validate()?;
        let grid = self.grid();
        let total = self.grid_size()?;
        let mut counters = vec![0usize; grid.len()];
        let mut kept = Vec::new();

        for index in 0..total {
            let combination = ParameterCombination {
                index,
                assignments: self
                    .parameters
                    .iter()
                    .zip(grid.iter().zip(&counters))
                    .map(|(p, (values, &c))| (p.path.clone(), values[c]))
                    .collect(),
            };
            if combination.satisfies(&self.constraints) {
                kept.push(combination);
            }

            for pos in (0..counters.len()).rev() {
                counters[pos] += 1;
                if counters[pos] < grid[pos].len() {
                    break;
                }
                counters[pos] = 0;
            }
        }

        let filtered_out = total - kept.len();
        Ok((kept, filtered_out))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeDoc {
    min: f64,
    max: f64,
    nsteps: usize,
}

/// Parse a sweep document into one spec per strategy, in document order.
pub fn parse_sweep_document(text: &str, file: &str) -> Result<Vec<SweepSpec>, PitError> {
    let parse_err = |reason: String| PitError::SpecParse {
        file: file.to_string(),
        reason,
    };
    let doc: Value = serde_json::from_str(text).map_err(|e| parse_err(e.to_string()))?;
    let strategies = doc
        .as_object()
        .ok_or_else(|| parse_err("top level must be an object keyed by strategy id".into()))?;

    let mut specs = Vec::with_capacity(strategies.len());
    for (strategy_id, body) in strategies {
        let body = body
            .as_object()
            .ok_or_else(|| parse_err(format!("{strategy_id}: expected an object")))?;
        let mut parameters = Vec::new();
        let mut constraints = Vec::new();

        for (key, value) in body {
            if key == INCREASE_CONDITION_KEY {
                let groups: Vec<Vec<String>> = serde_json::from_value(value.clone())
                    .map_err(|e| parse_err(format!("{strategy_id}.{key}: {e}")))?;
                for group in groups {
                    let paths = group
                        .iter()
                        .map(|raw| ParamPath::parse(raw))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| PitError::SpecInvalid {
                            reason: format!("{strategy_id}: {e}"),
                        })?;
                    constraints.push(paths);
                }
            } else if key.starts_with('_') {
                return Err(PitError::SpecInvalid {
                    reason: format!("{strategy_id}: unknown directive {key}"),
                });
            } else {
                let range: RangeDoc = serde_json::from_value(value.clone())
                    .map_err(|e| parse_err(format!("{strategy_id}.{key}: {e}")))?;
                let spec = ParameterSpec::new(key, range.min, range.max, range.nsteps).map_err(|e| {
                    PitError::SpecInvalid {
                        reason: format!("{strategy_id}: {e}"),
                    }
                })?;
                parameters.push(spec);
            }
        }

        let spec = SweepSpec::new(strategy_id.clone(), parameters, constraints);
        spec.validate()?;
        specs.push(spec);
    }
    Ok(specs)
}

pub fn load_sweep_document(path: &Path) -> Result<Vec<SweepSpec>, PitError> {
    let text = std::fs::read_to_string(path)?;
    parse_sweep_document(&text, &path.display().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankMetric {
    #[default]
    TotalReturn,
    MaxDrawdown,
}

impl RankMetric {
    pub fn value(&self, metrics: &Metrics) -> f64 {
        match self {
            RankMetric::TotalReturn => metrics.total_return,
            RankMetric::MaxDrawdown => metrics.max_drawdown,
        }
    }
}

impl FromStr for RankMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "return" | "total_return" => Ok(RankMetric::TotalReturn),
            "drawdown" | "max_drawdown" => Ok(RankMetric::MaxDrawdown),
            other => Err(format!("unknown rank metric '{other}' (expected return or drawdown)")),
        }
    }
}

impl fmt::Display for RankMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankMetric::TotalReturn => write!(f, "return"),
            RankMetric::MaxDrawdown => write!(f, "drawdown"),
        }
    }
}

/// Shared flag that stops a sweep from starting further runs.
#[derive(Debug, Clone, Default)]
pub struct SweepCancel(Arc<AtomicBool>);

impl SweepCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum EntryStatus {
    Completed {
        result: Arc<BacktestResult>,
        metrics: Metrics,
    },
    Failed {
        reason: String,
        ticker: Option<String>,
        failed_on: Option<NaiveDate>,
    },
    Cancelled,
}

impl EntryStatus {
    pub fn metrics(&self) -> Option<&Metrics> {
        match self {
            EntryStatus::Completed { metrics, .. } => Some(metrics),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EntryStatus::Failed { .. })
    }

    /// Metrics of a completed run restricted to `period`; `None` when the run
    /// did not complete or has no dates inside the period.
    pub fn period_metrics(&self, period: &TestPeriod, risk_free_rate: f64) -> Option<Metrics> {
        match self {
            EntryStatus::Completed { result, .. } => result
                .extract_period(period.start, period.end)
                .ok()
                .map(|slice| slice.metrics(risk_free_rate)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepEntry {
    pub combination: ParameterCombination,
    /// Full parameter tree the strategy ran with.
    pub params: ParamTree,
    /// Index of the combination whose run this entry reuses.
    pub duplicate_of: Option<usize>,
    pub status: EntryStatus,
}

#[derive(Debug, Clone)]
pub struct SweepResult {
    pub strategy_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub grid_size: usize,
    pub filtered_out: usize,
    /// One entry per surviving combination, in grid order.
    pub entries: Vec<SweepEntry>,
}

impl SweepResult {
    /// Completed entries, best first. Ties keep grid order.
    pub fn rank(&self, metric: RankMetric) -> Vec<&SweepEntry> {
        let mut ranked: Vec<(&SweepEntry, f64)> = self
            .entries
            .iter()
            .filter_map(|e| e.status.metrics().map(|m| (e, metric.value(m))))
            .collect();
        match metric {
            RankMetric::TotalReturn => ranked.sort_by(|a, b| b.1.total_cmp(&a.1)),
            RankMetric::MaxDrawdown => ranked.sort_by(|a, b| a.1.total_cmp(&b.1)),
        }
        ranked.into_iter().map(|(e, _)| e).collect()
    }

    pub fn best(&self, metric: RankMetric) -> Option<&SweepEntry> {
        self.rank(metric).into_iter().next()
    }

    pub fn failures(&self) -> Vec<&SweepEntry> {
        self.entries.iter().filter(|e| e.status.is_failed()).collect()
    }

    pub fn cancelled(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Cancelled))
            .count()
    }

    pub fn duplicates(&self) -> usize {
        self.entries.iter().filter(|e| e.duplicate_of.is_some()).count()
    }
}

/// Serialized form of a tree with object keys sorted, so structurally equal
/// trees give equal keys regardless of insertion order.
fn canonical_key(tree: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = Map::new();
                for key in keys {
                    out.insert(key.clone(), sorted(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(tree).to_string()
}

struct Planned {
    combination: ParameterCombination,
    params: ParamTree,
    duplicate_of: Option<usize>,
}

pub struct ParameterSweepEngine {
    manager: StrategyManager,
    threads: usize,
    cancel: SweepCancel,
}

impl ParameterSweepEngine {
    pub fn new(manager: StrategyManager) -> Self {
        Self {
            manager,
            threads: 0,
            cancel: SweepCancel::new(),
        }
    }

    /// Worker threads for the run pool; 0 uses every core.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_cancel(mut self, cancel: SweepCancel) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> SweepCancel {
        self.cancel.clone()
    }

    pub fn manager(&self) -> &StrategyManager {
        &self.manager
    }

    pub fn run(&self, spec: &SweepSpec, start: NaiveDate, end: NaiveDate) -> Result<SweepResult, PitError> {
        spec.validate()?;
        self.manager.resolve(&spec.strategy_id)?;
        let grid_size = spec.grid_size()?;
        let (combinations, filtered_out) = spec.combinations()?;
        info!(
            strategy = %spec.strategy_id,
            grid_size,
            filtered_out,
            remaining = combinations.len(),
            "sweep grid expanded"
        );
        self.run_combinations(spec, combinations, grid_size, filtered_out, start, end)
    }

    /// Execute an already-expanded list of combinations.
    pub fn run_combinations(
        &self,
        spec: &SweepSpec,
        combinations: Vec<ParameterCombination>,
        grid_size: usize,
        filtered_out: usize,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SweepResult, PitError> {
        let strategy = self.manager.resolve(&spec.strategy_id)?;

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut plan = Vec::with_capacity(combinations.len());
        for combination in combinations {
            let params = self
                .manager
                .merged_params(strategy.as_ref(), &combination.overrides()?);
            let slot = plan.len();
            let duplicate_of = match seen.entry(canonical_key(&params)) {
                Entry::Occupied(first) => Some(*first.get()),
                Entry::Vacant(vacant) => {
                    vacant.insert(slot);
                    None
                }
            };
            plan.push(Planned {
                combination,
                params,
                duplicate_of,
            });
        }

        let unique: Vec<usize> = (0..plan.len()).filter(|&i| plan[i].duplicate_of.is_none()).collect();
        info!(
            strategy = %spec.strategy_id,
            runs = unique.len(),
            duplicates = plan.len() - unique.len(),
            threads = self.threads,
            "sweep dispatching"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| PitError::Io(std::io::Error::other(e.to_string())))?;

        let statuses: Vec<EntryStatus> = pool.install(|| {
            unique
                .par_iter()
                .map(|&slot| self.execute_one(strategy.as_ref(), spec, &plan[slot], start, end))
                .collect()
        });

        let mut by_slot: HashMap<usize, EntryStatus> = unique.into_iter().zip(statuses).collect();
        let mut entries: Vec<SweepEntry> = Vec::with_capacity(plan.len());
        for (slot, planned) in plan.into_iter().enumerate() {
            let (status, duplicate_of) = match planned.duplicate_of {
                Some(first) => {
                    let original = &entries[first];
                    debug!(
                        combination = %planned.combination,
                        duplicate_of = original.combination.index,
                        "reusing duplicate result"
                    );
                    (original.status.clone(), Some(original.combination.index))
                }
                None => (by_slot.remove(&slot).unwrap_or(EntryStatus::Cancelled), None),
            };
            entries.push(SweepEntry {
                combination: planned.combination,
                params: planned.params,
                duplicate_of,
                status,
            });
        }

        let result = SweepResult {
            strategy_id: spec.strategy_id.clone(),
            start,
            end,
            grid_size,
            filtered_out,
            entries,
        };
        if self.cancel.is_cancelled() {
            info!(strategy = %spec.strategy_id, cancelled = result.cancelled(), "sweep cancelled");
        }
        info!(
            strategy = %spec.strategy_id,
            completed = result.entries.len() - result.failures().len() - result.cancelled(),
            failed = result.failures().len(),
            "sweep finished"
        );
        Ok(result)
    }

    fn execute_one(
        &self,
        strategy: &dyn Strategy,
        spec: &SweepSpec,
        planned: &Planned,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EntryStatus {
        if self.cancel.is_cancelled() {
            return EntryStatus::Cancelled;
        }
        if !planned.combination.satisfies(&spec.constraints) {
            let error = PitError::InvalidCombination {
                reason: format!("{} breaks an ordering constraint", planned.combination),
            };
            warn!(combination = %planned.combination, error = %error, "combination failed");
            return EntryStatus::Failed {
                reason: error.to_string(),
                ticker: None,
                failed_on: None,
            };
        }
        match self.manager.run_merged(strategy, start, end, &planned.params) {
            Ok(result) => {
                let metrics = result.metrics(self.manager.config().risk_free_rate);
                EntryStatus::Completed {
                    result: Arc::new(result),
                    metrics,
                }
            }
            Err(failure) => {
                warn!(
                    combination = %planned.combination,
                    date = ?failure.date,
                    error = %failure.error,
                    "combination failed"
                );
                EntryStatus::Failed {
                    reason: failure.error.to_string(),
                    ticker: failure.ticker().map(str::to_string),
                    failed_on: failure.date,
                }
            }
        }
    }
}
