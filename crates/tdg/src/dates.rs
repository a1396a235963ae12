//! 📅 Date-range resolution: turning `2022`, `2022/02`, `2022/02/28` or a start/end pair
//! into the exact, gap-free run of calendar days we are going to list.
//!
//! 🧠 Knowledge graph:
//! - Output is always ascending, no duplicates, no gaps. Day N+1 follows day N. Always.
//! - The optional trailing day exists because the store's day boundary and the event's
//!   true UTC day disagree near midnight. Events for the last requested day can land in
//!   the NEXT day's partition, so the event walk peeks one day further.
//! - Month length and leap years are chrono's problem. chrono has suffered so we don't have to.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::error::WalkError;
use crate::query::QueryOptions;

/// 📅 One calendar day, no time-of-day. Displays as the partition path segment `YYYY/MM/DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Day(NaiveDate);

impl Day {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Day)
    }

    /// 🔍 Parse a full `YYYY/MM/DD` date. Anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s, "%Y/%m/%d").ok().map(Day)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    /// ➡️ Tomorrow. `None` only at the end of chrono's calendar, which is a long way off.
    pub fn next(self) -> Option<Self> {
        self.0.succ_opt().map(Day)
    }

    /// ⬅️ Yesterday.
    pub fn prev(self) -> Option<Self> {
        self.0.pred_opt().map(Day)
    }

    /// 🗂️ The `YYYY/MM/DD` segment of a partition path.
    pub fn path(self) -> String {
        format!("{:04}/{:02}/{:02}", self.0.year(), self.0.month(), self.0.day())
    }
}

impl From<NaiveDate> for Day {
    fn from(date: NaiveDate) -> Self {
        Day(date)
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// 📅 Resolve the query's date selector into an ordered run of days.
///
/// - start + end set: every day from start to end inclusive.
/// - otherwise `date_path`: one day, one month, or one whole year.
/// - `with_trailing_day`: append the day after the last one, rolling over months and years.
///
/// 💀 `InvalidDate` if anything fails to parse, names a month outside 1..=12, names a day
/// the calendar never had, or ends before it starts.
pub fn resolve_days(opt: &QueryOptions, with_trailing_day: bool) -> Result<Vec<Day>, WalkError> {
    let (first, last) = if opt.has_range() {
        let start = Day::parse(&opt.start_date_path).ok_or_else(|| {
            WalkError::InvalidDate(format!("start date {}", opt.start_date_path))
        })?;
        let end = Day::parse(&opt.end_date_path)
            .ok_or_else(|| WalkError::InvalidDate(format!("end date {}", opt.end_date_path)))?;
        if end < start {
            return Err(WalkError::InvalidDate(format!(
                "end date {} is before start date {}",
                opt.end_date_path, opt.start_date_path
            )));
        }
        (start, end)
    } else {
        bounds_of_date_path(&opt.date_path)?
    };

    let mut days: Vec<Day> = first
        .0
        .iter_days()
        .take_while(|d| *d <= last.0)
        .map(Day)
        .collect();

    if with_trailing_day {
        let trailing = last.next().ok_or_else(|| {
            WalkError::InvalidDate(format!("no calendar day follows {last}"))
        })?;
        days.push(trailing);
    }
    Ok(days)
}

// 🔍 `YYYY`, `YYYY/MM`, `YYYY/MM/DD` → (first day, last day), both inclusive.
fn bounds_of_date_path(date_path: &str) -> Result<(Day, Day), WalkError> {
    let invalid = || WalkError::InvalidDate(date_path.to_string());
    let parts: Vec<&str> = date_path.split('/').collect();
    if parts.len() > 3 || parts[0].is_empty() {
        return Err(invalid());
    }
    let year: i32 = parts[0].parse().map_err(|_| invalid())?;

    let month = match parts.get(1) {
        Some(m) => {
            let month: u32 = m.parse().map_err(|_| invalid())?;
            if !(1..=12).contains(&month) {
                return Err(invalid());
            }
            Some(month)
        }
        None => None,
    };

    match (month, parts.get(2)) {
        (Some(month), Some(day)) => {
            let day: u32 = day.parse().map_err(|_| invalid())?;
            let the_day = Day::from_ymd(year, month, day).ok_or_else(invalid)?;
            Ok((the_day, the_day))
        }
        (Some(month), None) => {
            let first = Day::from_ymd(year, month, 1).ok_or_else(invalid)?;
            let last = last_day_of_month(year, month).ok_or_else(invalid)?;
            Ok((first, last))
        }
        _ => {
            let first = Day::from_ymd(year, 1, 1).ok_or_else(invalid)?;
            let last = Day::from_ymd(year, 12, 31).ok_or_else(invalid)?;
            Ok((first, last))
        }
    }
}

// 🗓️ The first of next month, minus one day. Thirty days hath September, and chrono knows the rest.
fn last_day_of_month(year: i32, month: u32) -> Option<Day> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    Day::from_ymd(next_year, next_month, 1)?.prev()
}
