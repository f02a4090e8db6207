//! Calendar period alignment.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Calendar granularity at which series and forecasts are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Granularity {
    /// First day of the period containing `date`.
    ///
    /// Weeks start on Monday (ISO 8601).
    pub fn align(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                let offset = date.weekday().num_days_from_monday() as u64;
                date - Days::new(offset)
            }
            Granularity::Month => start_of_month(date),
            Granularity::Quarter => {
                let quarter_month = ((date.month() - 1) / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).unwrap_or(date)
            }
            Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// Start of the period `n` periods after the (aligned) `period`.
    pub fn advance(&self, period: NaiveDate, n: u32) -> NaiveDate {
        let period = self.align(period);
        let shifted = match self {
            Granularity::Day => period.checked_add_days(Days::new(n as u64)),
            Granularity::Week => period.checked_add_days(Days::new(7 * n as u64)),
            Granularity::Month => period.checked_add_months(Months::new(n)),
            Granularity::Quarter => period.checked_add_months(Months::new(3 * n)),
            Granularity::Year => period.checked_add_months(Months::new(12 * n)),
        };
        shifted.unwrap_or(NaiveDate::MAX)
    }

    /// Human-readable period label used in reports.
    pub fn label(&self, period: NaiveDate) -> String {
        match self {
            Granularity::Day => period.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let iso = period.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            Granularity::Month => period.format("%Y-%m").to_string(),
            Granularity::Quarter => format!("{}-Q{}", period.year(), (period.month() - 1) / 3 + 1),
            Granularity::Year => period.year().to_string(),
        }
    }

    /// Seasonal cycle length in periods.
    pub fn default_season_length(&self) -> usize {
        match self {
            Granularity::Day => 7,
            Granularity::Week => 52,
            Granularity::Month => 12,
            Granularity::Quarter => 4,
            Granularity::Year => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Granularity {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" | "d" => Ok(Granularity::Day),
            "week" | "weekly" | "w" => Ok(Granularity::Week),
            "month" | "monthly" | "m" => Ok(Granularity::Month),
            "quarter" | "quarterly" | "q" => Ok(Granularity::Quarter),
            "year" | "yearly" | "annual" | "y" => Ok(Granularity::Year),
            _ => Err(PipelineError::invalid_parameter(
                "granularity",
                s,
                "expected day, week, month, quarter or year",
            )),
        }
    }
}

fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_align() {
        assert_eq!(Granularity::Month.align(d(2024, 2, 29)), d(2024, 2, 1));
        assert_eq!(Granularity::Quarter.align(d(2024, 8, 15)), d(2024, 7, 1));
        assert_eq!(Granularity::Year.align(d(2024, 8, 15)), d(2024, 1, 1));
        // 2024-03-14 is a Thursday
        assert_eq!(Granularity::Week.align(d(2024, 3, 14)), d(2024, 3, 11));
        assert_eq!(Granularity::Day.align(d(2024, 3, 14)), d(2024, 3, 14));
    }

    #[test]
    fn test_advance_crosses_year_boundary() {
        assert_eq!(Granularity::Month.advance(d(2024, 11, 1), 3), d(2025, 2, 1));
        assert_eq!(Granularity::Quarter.advance(d(2024, 10, 1), 1), d(2025, 1, 1));
        assert_eq!(Granularity::Week.advance(d(2024, 12, 30), 1), d(2025, 1, 6));
    }

    #[test]
    fn test_label() {
        assert_eq!(Granularity::Month.label(d(2024, 3, 1)), "2024-03");
        assert_eq!(Granularity::Quarter.label(d(2024, 7, 1)), "2024-Q3");
        assert_eq!(Granularity::Week.label(d(2024, 3, 11)), "2024-W11");
        assert_eq!(Granularity::Year.label(d(2024, 1, 1)), "2024");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Monthly".parse::<Granularity>().unwrap(), Granularity::Month);
        assert_eq!("q".parse::<Granularity>().unwrap(), Granularity::Quarter);
        assert!("fortnight".parse::<Granularity>().is_err());
    }
}
