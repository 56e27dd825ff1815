//! Configuration validation.
//!
//! Every section is checked and converted to its domain type before any data
//! is loaded, so a bad config fails fast with the offending `[section] key`.

use crate::domain::backtest::{BacktestConfig, DEFAULT_MAX_STALENESS_DAYS, TestPeriod};
use crate::domain::calendar::{CalendarKind, Frequency};
use crate::domain::error::PitError;
use crate::domain::sweep::RankMetric;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

/// `[sweep]` section.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SweepSettings {
    /// Worker threads; 0 means one per core.
    pub threads: usize,
    pub rank_by: RankMetric,
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), PitError> {
    parse_backtest_config(config)?;
    parse_periods(config)?;
    parse_redirects(config)?;
    use_extended(config)?;
    Ok(())
}

pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<(), PitError> {
    parse_sweep_settings(config).map(|_| ())
}

pub fn parse_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, PitError> {
    let start_date = require_date(config, "backtest", "start_date")?;
    let end_date = require_date(config, "backtest", "end_date")?;
    if start_date > end_date {
        return Err(invalid("backtest", "start_date", "start_date must not be after end_date"));
    }

    let max_lookback: i64 =
        parse_optional(config, "backtest", "max_lookback_days")?.unwrap_or(DEFAULT_MAX_STALENESS_DAYS.into());
    let max_staleness_days = u32::try_from(max_lookback)
        .map_err(|_| invalid("backtest", "max_lookback_days", "max_lookback_days must be a non-negative day count"))?;

    let calendar: CalendarKind = parse_optional(config, "backtest", "calendar")?.unwrap_or_default();
    let frequency: Frequency = parse_optional(config, "backtest", "frequency")?.unwrap_or_default();

    let risk_free_rate: f64 = parse_optional(config, "backtest", "risk_free_rate")?.unwrap_or(0.0);
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(invalid("backtest", "risk_free_rate", "risk_free_rate must be in [0, 1)"));
    }

    Ok(BacktestConfig {
        start_date,
        end_date,
        max_staleness_days,
        calendar,
        frequency,
        risk_free_rate,
    })
}

/// `[data] directory`, required whenever series are loaded from disk.
pub fn data_directory(config: &dyn ConfigPort) -> Result<PathBuf, PitError> {
    config
        .get_string("data", "directory")
        .map(PathBuf::from)
        .ok_or_else(|| PitError::ConfigMissing {
            section: "data".to_string(),
            key: "directory".to_string(),
        })
}

pub fn parse_sweep_settings(config: &dyn ConfigPort) -> Result<SweepSettings, PitError> {
    let threads: i64 = parse_optional(config, "sweep", "threads")?.unwrap_or(0);
    let threads = usize::try_from(threads).map_err(|_| invalid("sweep", "threads", "threads must be >= 0"))?;
    let rank_by: RankMetric = parse_optional(config, "sweep", "rank_by")?.unwrap_or_default();
    Ok(SweepSettings { threads, rank_by })
}

/// `[data] use_extended`: serve `X` from a loaded `ext_X` series. Default false.
pub fn use_extended(config: &dyn ConfigPort) -> Result<bool, PitError> {
    Ok(parse_optional(config, "data", "use_extended")?.unwrap_or(false))
}

/// `[periods] NAME = START..END`, in key order.
pub fn parse_periods(config: &dyn ConfigPort) -> Result<Vec<TestPeriod>, PitError> {
    config
        .section_entries("periods")
        .into_iter()
        .map(|(name, range)| {
            let (start, end) = range
                .split_once("..")
                .ok_or_else(|| invalid("periods", &name, "expected YYYY-MM-DD..YYYY-MM-DD"))?;
            let start = parse_date(start.trim(), "periods", &name)?;
            let end = parse_date(end.trim(), "periods", &name)?;
            if start > end {
                return Err(invalid("periods", &name, "period start is after its end"));
            }
            Ok(TestPeriod { name, start, end })
        })
        .collect()
}

/// `[redirects] FROM = TO` pairs, in key order.
pub fn parse_redirects(config: &dyn ConfigPort) -> Result<Vec<(String, String)>, PitError> {
    let entries = config.section_entries("redirects");
    for (from, to) in &entries {
        if to.is_empty() {
            return Err(invalid("redirects", from, "redirect target is empty"));
        }
        if from == to {
            return Err(invalid("redirects", from, "ticker redirects to itself"));
        }
    }
    Ok(entries)
}

fn parse_optional<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, PitError>
where
    T: FromStr,
    T::Err: Display,
{
    config
        .get_string(section, key)
        .map(|raw| raw.parse::<T>().map_err(|e| invalid(section, key, &format!("'{raw}': {e}"))))
        .transpose()
}

fn require_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, PitError> {
    let raw = config.get_string(section, key).ok_or_else(|| PitError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })?;
    parse_date(&raw, section, key)
}

fn parse_date(value: &str, section: &str, key: &str) -> Result<NaiveDate, PitError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| invalid(section, key, &format!("invalid date '{value}', expected YYYY-MM-DD")))
}

fn invalid(section: &str, key: &str, reason: &str) -> PitError {
    PitError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const DATES: &str = "[backtest]\nstart_date = 2020-01-01\nend_date = 2024-12-31\n";

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
start_date = 2020-01-01
end_date = 2024-12-31
max_lookback_days = 40
calendar = weekdays
frequency = monthly
risk_free_rate = 0.02

[periods]
covid = 2020-02-01..2020-06-30
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
        let parsed = parse_backtest_config(&config).unwrap();
        assert_eq!(parsed.start_date, date(2020, 1, 1));
        assert_eq!(parsed.max_staleness_days, 40);
        assert_eq!(parsed.calendar, CalendarKind::Weekdays);
        assert_eq!(parsed.frequency, Frequency::Monthly);
        assert!((parsed.risk_free_rate - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let parsed = parse_backtest_config(&make_config(DATES)).unwrap();
        assert_eq!(parsed.max_staleness_days, DEFAULT_MAX_STALENESS_DAYS);
        assert_eq!(parsed.calendar, CalendarKind::Nyse);
        assert_eq!(parsed.frequency, Frequency::Daily);
        assert!((parsed.risk_free_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_day_range_is_allowed() {
        let config = make_config("[backtest]\nstart_date = 2020-01-02\nend_date = 2020-01-02\n");
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn missing_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, PitError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 2020/01/01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn negative_lookback_fails() {
        let config = make_config(&format!("{DATES}max_lookback_days = -1\n"));
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "max_lookback_days"));
    }

    #[test]
    fn non_numeric_lookback_fails() {
        let config = make_config(&format!("{DATES}max_lookback_days = forever\n"));
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "max_lookback_days"));
    }

    #[test]
    fn unknown_calendar_fails() {
        let config = make_config(&format!("{DATES}calendar = lse\n"));
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "calendar"));
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        for rate in ["1.5", "-0.05"] {
            let config = make_config(&format!("{DATES}risk_free_rate = {rate}\n"));
            let err = validate_backtest_config(&config).unwrap_err();
            assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "risk_free_rate"));
        }
    }

    #[test]
    fn data_directory_is_required() {
        let err = data_directory(&make_config(DATES)).unwrap_err();
        assert!(matches!(err, PitError::ConfigMissing { section, .. } if section == "data"));

        let config = make_config("[data]\ndirectory = /srv/series\n");
        assert_eq!(data_directory(&config).unwrap(), PathBuf::from("/srv/series"));
    }

    #[test]
    fn sweep_settings_parse() {
        let config = make_config("[sweep]\nthreads = 3\nrank_by = drawdown\n");
        let settings = parse_sweep_settings(&config).unwrap();
        assert_eq!(settings.threads, 3);
        assert_eq!(settings.rank_by, RankMetric::MaxDrawdown);

        assert_eq!(parse_sweep_settings(&make_config("")).unwrap(), SweepSettings::default());
    }

    #[test]
    fn sweep_settings_reject_bad_values() {
        let err = validate_sweep_config(&make_config("[sweep]\nthreads = -2\n")).unwrap_err();
        assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "threads"));

        let err = validate_sweep_config(&make_config("[sweep]\nrank_by = sharpe\n")).unwrap_err();
        assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "rank_by"));
    }

    #[test]
    fn periods_parse_in_key_order() {
        let config = make_config("[periods]\nb = 2021-01-01..2021-06-30\na = 2020-01-01 .. 2020-12-31\n");
        let periods = parse_periods(&config).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].name, "a");
        assert_eq!(periods[0].start, date(2020, 1, 1));
        assert_eq!(periods[0].end, date(2020, 12, 31));
        assert_eq!(periods[1].name, "b");
    }

    #[test]
    fn malformed_periods_fail() {
        for range in ["2020-01-01", "2020-01-01..2020-13-01", "2021-01-01..2020-01-01"] {
            let config = make_config(&format!("[periods]\nbad = {range}\n"));
            let err = parse_periods(&config).unwrap_err();
            assert!(matches!(err, PitError::ConfigInvalid { key, .. } if key == "bad"));
        }
    }

    #[test]
    fn use_extended_defaults_off() {
        assert!(!use_extended(&make_config("[data]\ndirectory = data\n")).unwrap());
        assert!(use_extended(&make_config("[data]\nuse_extended = true\n")).unwrap());
        let config = make_config(&format!("{DATES}\n[data]\nuse_extended = yes\n"));
        assert!(matches!(
            validate_backtest_config(&config),
            Err(PitError::ConfigInvalid { ref key, .. }) if key == "use_extended"
        ));
    }

    #[test]
    fn redirects_parse_and_reject_self_loops() {
        let config = make_config("[redirects]\nSPX = SPY\n");
        assert_eq!(
            parse_redirects(&config).unwrap(),
            vec![("SPX".to_string(), "SPY".to_string())]
        );

        let config = make_config("[redirects]\nSPY = SPY\n");
        assert!(matches!(
            parse_redirects(&config),
            Err(PitError::ConfigInvalid { section, .. }) if section == "redirects"
        ));
    }
}
