//! Derived quarter window.
//!
//! A quarter is never persisted. It is recomputed from a date and used to tag
//! goals, filter them, and show a countdown.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar quarter containing a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quarter {
    /// Tag stored on goals, e.g. `Q1-2025`.
    pub key: String,
    /// Display label, e.g. `Q1 2025`.
    pub label: String,
    pub number: u32,
    pub year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Days until the last day of the quarter, floored at zero.
    pub days_left: i64,
    pub total_days: i64,
    /// 1-based week within the quarter.
    pub week: i64,
}

impl Quarter {
    /// Number of planning weeks shown in the countdown.
    pub const WEEKS: i64 = 13;

    pub fn containing(today: NaiveDate) -> Self {
        let number = today.month0() / 3 + 1;
        let year = today.year();
        let start = first_of_month(year, (number - 1) * 3 + 1);
        let end = last_day_of_quarter(year, number);
        let days_left = (end - today).num_days().max(0);
        let total_days = (end - start).num_days();
        let elapsed = total_days - days_left;
        // ceil(elapsed / 7), and week 1 on the first day
        let week = ((elapsed + 6) / 7).max(1);

        Self {
            key: format!("Q{number}-{year}"),
            label: format!("Q{number} {year}"),
            number,
            year,
            start,
            end,
            days_left,
            total_days,
            week,
        }
    }

    /// Human label for a stored key (`Q1-2025` -> `Q1 2025`).
    pub fn label_for_key(key: &str) -> String {
        key.replacen('-', " ", 1)
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn last_day_of_quarter(year: i32, quarter: u32) -> NaiveDate {
    let next = if quarter == 4 {
        first_of_month(year + 1, 1)
    } else {
        first_of_month(year, quarter * 3 + 1)
    };
    next.pred_opt().unwrap_or(next)
}
