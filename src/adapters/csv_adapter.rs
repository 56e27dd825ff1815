//! CSV file data adapter.
//!
//! One file per ticker in a flat directory: `SPY.csv` holds a daily series,
//! `CPI.monthly.csv` a monthly one. The first column is the date; the value
//! comes from a `value` column, else a `close` column, else the second column.
//! Header names match case-insensitively. Rows with a blank value are skipped.

use crate::domain::calendar::Frequency;
use crate::domain::error::PitError;
use crate::domain::series::PointInTimeSeries;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const MONTHLY_SUFFIX: &str = ".monthly.csv";
const DAILY_SUFFIX: &str = ".csv";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// File backing `ticker`, preferring the daily name when both exist.
    fn csv_path(&self, ticker: &str) -> Result<(PathBuf, Frequency), PitError> {
        let daily = self.base_path.join(format!("{ticker}{DAILY_SUFFIX}"));
        if daily.is_file() {
            return Ok((daily, Frequency::Daily));
        }
        let monthly = self.base_path.join(format!("{ticker}{MONTHLY_SUFFIX}"));
        if monthly.is_file() {
            return Ok((monthly, Frequency::Monthly));
        }
        Err(PitError::Data {
            reason: format!("no CSV for {ticker} in {}", self.base_path.display()),
        })
    }
}

fn value_column(headers: &csv::StringRecord) -> Result<usize, PitError> {
    let position = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
    position("value")
        .or_else(|| position("close"))
        .or(if headers.len() >= 2 { Some(1) } else { None })
        .ok_or_else(|| PitError::Data {
            reason: "CSV needs a date column and a value column".into(),
        })
}

impl DataPort for CsvAdapter {
    fn list_tickers(&self) -> Result<Vec<String>, PitError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| PitError::Data {
            reason: format!("failed to read directory {}: {}", self.base_path.display(), e),
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PitError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            let ticker = name_str
                .strip_suffix(MONTHLY_SUFFIX)
                .or_else(|| name_str.strip_suffix(DAILY_SUFFIX));
            if let Some(ticker) = ticker.filter(|t| !t.is_empty()) {
                tickers.push(ticker.to_string());
            }
        }

        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }

    fn load_series(&self, ticker: &str) -> Result<PointInTimeSeries, PitError> {
        let (path, frequency) = self.csv_path(ticker)?;
        let content = fs::read_to_string(&path).map_err(|e| PitError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| PitError::Data {
                reason: format!("{}: CSV header error: {}", path.display(), e),
            })?
            .clone();
        let column = value_column(&headers)?;

        let mut raw = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| PitError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;

            let date_str = record.get(0).unwrap_or_default().trim();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| PitError::Data {
                reason: format!("{} row {}: invalid date '{}': {}", path.display(), row + 1, date_str, e),
            })?;

            let value_str = record.get(column).unwrap_or_default().trim();
            if value_str.is_empty() {
                debug!(ticker = %ticker, date = %date, "skipping blank value");
                continue;
            }
            let value: f64 = value_str.parse().map_err(|e| PitError::Data {
                reason: format!("{} row {}: invalid value '{}': {}", path.display(), row + 1, value_str, e),
            })?;

            raw.push((date, value));
        }

        Ok(PointInTimeSeries::load(
            ticker,
            raw,
            frequency,
            path.display().to_string(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::SeriesError;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join("SPY.csv"),
            "date,open,high,low,close,volume\n\
             2024-01-15,100.0,110.0,90.0,105.0,50000\n\
             2024-01-16,105.0,115.0,100.0,110.0,60000\n\
             2024-01-17,110.0,120.0,105.0,115.0,55000\n",
        )
        .unwrap();
        fs::write(
            path.join("CPI.monthly.csv"),
            "date,value\n2024-01-01,308.4\n2024-02-01,\n2024-03-01,310.3\n",
        )
        .unwrap();
        fs::write(path.join("AGG.csv"), "Date,Adj\n2024-01-15,95.5\n").unwrap();
        fs::write(path.join("notes.txt"), "not a series\n").unwrap();

        (dir, path)
    }

    #[test]
    fn list_tickers_strips_suffixes() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(adapter.list_tickers().unwrap(), vec!["AGG", "CPI", "SPY"]);
    }

    #[test]
    fn load_series_prefers_close_column() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter.load_series("SPY").unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.frequency(), Frequency::Daily);
        assert_eq!(series.first_date(), date(2024, 1, 15));
        assert_eq!(series.latest_at(date(2024, 1, 16)), Some((date(2024, 1, 16), 110.0)));
    }

    #[test]
    fn monthly_suffix_sets_frequency_and_skips_blanks() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter.load_series("CPI").unwrap();
        assert_eq!(series.frequency(), Frequency::Monthly);
        assert_eq!(series.len(), 2);
        assert_eq!(series.latest_at(date(2024, 2, 20)), Some((date(2024, 1, 1), 308.4)));
    }

    #[test]
    fn falls_back_to_second_column() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let series = adapter.load_series("AGG").unwrap();
        assert_eq!(series.latest_at(date(2024, 1, 15)), Some((date(2024, 1, 15), 95.5)));
    }

    #[test]
    fn missing_file_is_a_data_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(matches!(adapter.load_series("XYZ"), Err(PitError::Data { .. })));
    }

    #[test]
    fn unsorted_rows_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("BAD.csv"),
            "date,value\n2024-01-02,1.0\n2024-01-01,2.0\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        assert!(matches!(
            adapter.load_series("BAD"),
            Err(PitError::Series(SeriesError::UnsortedData { .. }))
        ));
    }

    #[test]
    fn header_only_file_is_empty_series() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("NONE.csv"), "date,value\n").unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        assert!(matches!(
            adapter.load_series("NONE"),
            Err(PitError::Series(SeriesError::EmptySeries { .. }))
        ));
    }

    #[test]
    fn bad_value_names_the_row() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("X.csv"), "date,value\n2024-01-01,abc\n").unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let err = adapter.load_series("X").unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}
