//! CSV/JSON report adapter implementing ReportPort.
//!
//! A backtest writes `<strategy>_values.csv`, `<strategy>_rebalancing.csv` and
//! `<strategy>_periods.csv`. A sweep writes `<strategy>_sweep.csv` with one row
//! per combination (ranked rows first) and `<strategy>_sweep_summary.json`.

use crate::domain::backtest::{BacktestResult, TestPeriod};
use crate::domain::error::PitError;
use crate::domain::metrics::Metrics;
use crate::domain::params::ParamTree;
use crate::domain::sweep::{EntryStatus, RankMetric, SweepEntry, SweepResult};
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn csv_io(e: csv::Error) -> PitError {
    PitError::Io(std::io::Error::from(e))
}

fn prepare(output_dir: &Path, name: String) -> Result<PathBuf, PitError> {
    fs::create_dir_all(output_dir)?;
    Ok(output_dir.join(name))
}

#[derive(Serialize)]
struct ValueRow {
    date: NaiveDate,
    value: f64,
    normalized: f64,
}

#[derive(Serialize)]
struct RebalanceRow {
    date: NaiveDate,
    mode: String,
    allocation: String,
}

#[derive(Serialize)]
struct PeriodRow<'a> {
    period: &'a str,
    start: NaiveDate,
    end: NaiveDate,
    days: usize,
    total_return: f64,
    annualized_return: f64,
    max_drawdown: f64,
    max_drawdown_duration: usize,
    sharpe_ratio: f64,
    sortino_ratio: f64,
    final_value: f64,
}

impl<'a> PeriodRow<'a> {
    fn new(period: &'a str, result: &BacktestResult, risk_free_rate: f64) -> Option<Self> {
        let start = *result.date_range.first()?;
        let end = *result.date_range.last()?;
        let m = result.metrics(risk_free_rate);
        Some(Self {
            period,
            start,
            end,
            days: result.len(),
            total_return: m.total_return,
            annualized_return: m.annualized_return,
            max_drawdown: m.max_drawdown,
            max_drawdown_duration: m.max_drawdown_duration,
            sharpe_ratio: m.sharpe_ratio,
            sortino_ratio: m.sortino_ratio,
            final_value: m.final_value,
        })
    }
}

#[derive(Serialize)]
struct BestSummary<'a> {
    index: usize,
    assignments: BTreeMap<String, f64>,
    params: &'a ParamTree,
    metrics: &'a Metrics,
}

#[derive(Serialize)]
struct FailureSummary<'a> {
    index: usize,
    assignments: BTreeMap<String, f64>,
    reason: &'a str,
    ticker: Option<&'a str>,
    date: Option<NaiveDate>,
}

#[derive(Serialize)]
struct SweepSummary<'a> {
    strategy_id: &'a str,
    start: NaiveDate,
    end: NaiveDate,
    rank_by: String,
    grid_size: usize,
    filtered_out: usize,
    evaluated: usize,
    completed: usize,
    duplicates: usize,
    cancelled: usize,
    best: Option<BestSummary<'a>>,
    failures: Vec<FailureSummary<'a>>,
}

fn assignment_map(entry: &SweepEntry) -> BTreeMap<String, f64> {
    entry
        .combination
        .assignments
        .iter()
        .map(|(path, value)| (path.to_string(), *value))
        .collect()
}

impl ReportPort for CsvReportAdapter {
    fn write_backtest(
        &self,
        result: &BacktestResult,
        periods: &[TestPeriod],
        risk_free_rate: f64,
        output_dir: &Path,
    ) -> Result<(), PitError> {
        let id = &result.strategy_id;

        let values_path = prepare(output_dir, format!("{id}_values.csv"))?;
        let mut wtr = csv::Writer::from_path(&values_path).map_err(csv_io)?;
        let normalized = result.normalized();
        for ((date, value), normalized) in result
            .date_range
            .iter()
            .zip(&result.portfolio_values)
            .zip(normalized)
        {
            wtr.serialize(ValueRow {
                date: *date,
                value: *value,
                normalized,
            })
            .map_err(csv_io)?;
        }
        wtr.flush()?;

        let log_path = prepare(output_dir, format!("{id}_rebalancing.csv"))?;
        let mut wtr = csv::Writer::from_path(&log_path).map_err(csv_io)?;
        for entry in &result.rebalancing_log {
            wtr.serialize(RebalanceRow {
                date: entry.date,
                mode: entry.mode.clone(),
                allocation: entry.allocation.to_string(),
            })
            .map_err(csv_io)?;
        }
        wtr.flush()?;

        let periods_path = prepare(output_dir, format!("{id}_periods.csv"))?;
        let mut wtr = csv::Writer::from_path(&periods_path).map_err(csv_io)?;
        if let Some(row) = PeriodRow::new("full", result, risk_free_rate) {
            wtr.serialize(row).map_err(csv_io)?;
        }
        for period in periods {
            // Periods outside the simulated range have nothing to report.
            if let Ok(slice) = result.extract_period(period.start, period.end) {
                if let Some(row) = PeriodRow::new(&period.name, &slice, risk_free_rate) {
                    wtr.serialize(row).map_err(csv_io)?;
                }
            }
        }
        wtr.flush()?;

        info!(dir = %output_dir.display(), strategy = %id, "backtest report written");
        Ok(())
    }

    fn write_sweep(
        &self,
        result: &SweepResult,
        metric: RankMetric,
        periods: &[TestPeriod],
        risk_free_rate: f64,
        output_dir: &Path,
    ) -> Result<(), PitError> {
        let id = &result.strategy_id;
        let ranked = result.rank(metric);
        let unranked = result.entries.iter().filter(|e| e.status.metrics().is_none());

        let labels: Vec<String> = result
            .entries
            .first()
            .map(|e| e.combination.assignments.iter().map(|(p, _)| p.to_string()).collect())
            .unwrap_or_default();

        let csv_path = prepare(output_dir, format!("{id}_sweep.csv"))?;
        let mut wtr = csv::Writer::from_path(&csv_path).map_err(csv_io)?;
        let mut header = vec!["rank".to_string(), "index".to_string(), "status".to_string()];
        header.extend(labels.iter().cloned());
        header.extend(
            [
                "total_return",
                "annualized_return",
                "max_drawdown",
                "sharpe_ratio",
                "sortino_ratio",
                "final_value",
            ]
            .map(String::from),
        );
        for period in periods {
            header.push(format!("{}_return", period.name));
            header.push(format!("{}_drawdown", period.name));
        }
        header.extend(["duplicate_of", "error"].map(String::from));
        wtr.write_record(&header).map_err(csv_io)?;

        let rows = ranked
            .iter()
            .enumerate()
            .map(|(i, e)| (Some(i + 1), *e))
            .chain(unranked.map(|e| (None, e)));
        for (rank, entry) in rows {
            let mut record = vec![
                rank.map(|r| r.to_string()).unwrap_or_default(),
                entry.combination.index.to_string(),
                match entry.status {
                    EntryStatus::Completed { .. } => "completed",
                    EntryStatus::Failed { .. } => "failed",
                    EntryStatus::Cancelled => "cancelled",
                }
                .to_string(),
            ];
            record.extend(entry.combination.assignments.iter().map(|(_, v)| v.to_string()));
            match &entry.status {
                EntryStatus::Completed { metrics: m, .. } => record.extend(
                    [
                        m.total_return,
                        m.annualized_return,
                        m.max_drawdown,
                        m.sharpe_ratio,
                        m.sortino_ratio,
                        m.final_value,
                    ]
                    .map(|v| v.to_string()),
                ),
                _ => record.extend(std::iter::repeat_n(String::new(), 6)),
            }
            for period in periods {
                match entry.status.period_metrics(period, risk_free_rate) {
                    Some(m) => {
                        record.push(m.total_return.to_string());
                        record.push(m.max_drawdown.to_string());
                    }
                    None => record.extend([String::new(), String::new()]),
                }
            }
            record.push(entry.duplicate_of.map(|d| d.to_string()).unwrap_or_default());
            record.push(match &entry.status {
                EntryStatus::Failed { reason, .. } => reason.clone(),
                _ => String::new(),
            });
            wtr.write_record(&record).map_err(csv_io)?;
        }
        wtr.flush()?;

        let summary = SweepSummary {
            strategy_id: id,
            start: result.start,
            end: result.end,
            rank_by: metric.to_string(),
            grid_size: result.grid_size,
            filtered_out: result.filtered_out,
            evaluated: result.entries.len(),
            completed: ranked.len(),
            duplicates: result.duplicates(),
            cancelled: result.cancelled(),
            best: ranked.first().copied().and_then(|e| {
                e.status.metrics().map(|metrics| BestSummary {
                    index: e.combination.index,
                    assignments: assignment_map(e),
                    params: &e.params,
                    metrics,
                })
            }),
            failures: result
                .failures()
                .into_iter()
                .filter_map(|e| match &e.status {
                    EntryStatus::Failed {
                        reason,
                        ticker,
                        failed_on,
                    } => Some(FailureSummary {
                        index: e.combination.index,
                        assignments: assignment_map(e),
                        reason,
                        ticker: ticker.as_deref(),
                        date: *failed_on,
                    }),
                    _ => None,
                })
                .collect(),
        };
        let summary_path = prepare(output_dir, format!("{id}_sweep_summary.json"))?;
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| PitError::Io(std::io::Error::other(e.to_string())))?;
        fs::write(&summary_path, json)?;

        info!(dir = %output_dir.display(), strategy = %id, rows = result.entries.len(), "sweep report written");
        Ok(())
    }
}
