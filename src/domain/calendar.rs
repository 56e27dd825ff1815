//! Trading calendars.
//!
//! A [`MarketCalendar`] answers "is this a trading day?"; [`TradingCalendar`]
//! is the materialized, strictly increasing list of trading dates for one
//! requested range and is what the simulation loop iterates.

use crate::domain::error::PitError;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::fmt;
use std::str::FromStr;

/// Native sampling frequency of a calendar or series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Frequency {
    #[default]
    Daily,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(format!("unknown frequency '{other}' (expected daily or monthly)")),
        }
    }
}

/// Source of truth for which dates a market is open.
pub trait MarketCalendar: Send + Sync {
    fn name(&self) -> &str;
    fn is_trading_day(&self, date: NaiveDate) -> bool;
}

/// New York Stock Exchange full-day closures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NyseCalendar;

/// Monday through Friday, no holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekdayCalendar;

/// Every calendar day is a trading day.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuousCalendar;

/// Closures outside the regular holiday rules.
const NYSE_UNSCHEDULED_CLOSURES: &[(i32, u32, u32)] = &[
    (2001, 9, 11),
    (2001, 9, 12),
    (2001, 9, 13),
    (2001, 9, 14),
    (2004, 6, 11),
    (2007, 1, 2),
    (2012, 10, 29),
    (2012, 10, 30),
    (2018, 12, 5),
    (2025, 1, 9),
];

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Saturday holidays move to Friday, Sunday holidays to Monday.
fn observed(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => date.checked_sub_signed(Duration::days(1)),
        Weekday::Sun => date.checked_add_signed(Duration::days(1)),
        _ => Some(date),
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut day = first_of_next.pred_opt()?;
    while day.weekday() != weekday {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// Western (Gregorian) Easter Sunday, anonymous algorithm.
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Regular NYSE holidays for one year, as observed dates.
pub fn nyse_holidays(year: i32) -> Vec<NaiveDate> {
    let mut holidays: Vec<Option<NaiveDate>> = Vec::with_capacity(11);

    // Saturday New Year's Day is not observed on the preceding Friday.
    let new_year = NaiveDate::from_ymd_opt(year, 1, 1);
    holidays.push(new_year.filter(|d| d.weekday() != Weekday::Sat).and_then(observed));

    if year >= 1998 {
        holidays.push(NaiveDate::from_weekday_of_month_opt(year, 1, Weekday::Mon, 3));
    }
    holidays.push(NaiveDate::from_weekday_of_month_opt(year, 2, Weekday::Mon, 3));
    holidays.push(easter_sunday(year).and_then(|d| d.checked_sub_signed(Duration::days(2))));
    holidays.push(last_weekday_of_month(year, 5, Weekday::Mon));
    if year >= 2022 {
        holidays.push(NaiveDate::from_ymd_opt(year, 6, 19).and_then(observed));
    }
    holidays.push(NaiveDate::from_ymd_opt(year, 7, 4).and_then(observed));
    holidays.push(NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Mon, 1));
    holidays.push(NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4));
    holidays.push(NaiveDate::from_ymd_opt(year, 12, 25).and_then(observed));

    holidays.into_iter().flatten().collect()
}

impl MarketCalendar for NyseCalendar {
    fn name(&self) -> &str {
        "nyse"
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        if is_weekend(date) {
            return false;
        }
        let ymd = (date.year(), date.month(), date.day());
        if NYSE_UNSCHEDULED_CLOSURES.contains(&ymd) {
            return false;
        }
        !nyse_holidays(date.year()).contains(&date)
    }
}

impl MarketCalendar for WeekdayCalendar {
    fn name(&self) -> &str {
        "weekdays"
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date)
    }
}

impl MarketCalendar for ContinuousCalendar {
    fn name(&self) -> &str {
        "continuous"
    }

    fn is_trading_day(&self, _date: NaiveDate) -> bool {
        true
    }
}

/// Calendar selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarKind {
    #[default]
    Nyse,
    Weekdays,
    Continuous,
}

impl CalendarKind {
    pub fn source(&self) -> &'static dyn MarketCalendar {
        match self {
            CalendarKind::Nyse => &NyseCalendar,
            CalendarKind::Weekdays => &WeekdayCalendar,
            CalendarKind::Continuous => &ContinuousCalendar,
        }
    }
}

impl FromStr for CalendarKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nyse" => Ok(CalendarKind::Nyse),
            "weekdays" => Ok(CalendarKind::Weekdays),
            "continuous" => Ok(CalendarKind::Continuous),
            other => Err(format!(
                "unknown calendar '{other}' (expected nyse, weekdays or continuous)"
            )),
        }
    }
}

impl fmt::Display for CalendarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source().name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingCalendar {
    frequency: Frequency,
    dates: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// All trading days of `source` in `[start, end]`.
    pub fn build(
        start: NaiveDate,
        end: NaiveDate,
        source: &dyn MarketCalendar,
    ) -> Result<Self, PitError> {
        if start > end {
            return Err(PitError::InvalidRange {
                start,
                end,
                reason: "start date is after end date".into(),
            });
        }

        let dates: Vec<NaiveDate> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| source.is_trading_day(*d))
            .collect();

        if dates.is_empty() {
            return Err(PitError::InvalidRange {
                start,
                end,
                reason: format!("no {} trading dates in range", source.name()),
            });
        }

        Ok(Self {
            frequency: Frequency::Daily,
            dates,
        })
    }

    /// First trading day of each month in `[start, end]`.
    pub fn build_monthly(
        start: NaiveDate,
        end: NaiveDate,
        source: &dyn MarketCalendar,
    ) -> Result<Self, PitError> {
        let daily = Self::build(start, end, source)?;
        let mut dates: Vec<NaiveDate> = Vec::new();
        for date in daily.dates {
            let new_month = dates
                .last()
                .is_none_or(|prev| (prev.year(), prev.month()) != (date.year(), date.month()));
            if new_month {
                dates.push(date);
            }
        }
        Ok(Self {
            frequency: Frequency::Monthly,
            dates,
        })
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }
}
