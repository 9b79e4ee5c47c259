//! Derived views over goals and logs.
//!
//! Everything here is a pure function recomputed on demand; nothing is
//! cached or persisted.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::model::{find_goal, DayLog, DayStatus, Goal, Quarter};

pub use crate::lifecycle::log_for;

const REFLECTION_PROMPTS: [&str; 4] = [
    "What made today easier or harder?",
    "What did you learn today?",
    "What's one small win?",
    "What would you do differently?",
];

/// Monday-first dates of the week `offset` weeks from the one containing `today`.
pub fn week_dates(today: NaiveDate, offset: i64) -> [NaiveDate; 7] {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
        + Duration::weeks(offset);
    std::array::from_fn(|i| monday + Duration::days(i as i64))
}

pub fn week_label(today: NaiveDate, offset: i64) -> String {
    match offset {
        0 => "This Week".to_string(),
        -1 => "Last Week".to_string(),
        _ => {
            let dates = week_dates(today, offset);
            format!(
                "{} – {}",
                dates[0].format("%b %-d"),
                dates[6].format("%b %-d")
            )
        }
    }
}

/// Status of each day in `dates`, `None` unless that day's log is closed.
pub fn week_activity(logs: &[DayLog], dates: &[NaiveDate]) -> Vec<Option<DayStatus>> {
    dates
        .iter()
        .map(|d| log_for(logs, *d).filter(|l| l.is_closed()).and_then(|l| l.status))
        .collect()
}

/// Mean goal progress, rounded. 0 without goals.
pub fn overall_progress(goals: &[Goal]) -> u8 {
    if goals.is_empty() {
        return 0;
    }
    let sum: u32 = goals.iter().map(|g| u32::from(g.progress())).sum();
    let n = goals.len() as u32;
    ((2 * sum + n) / (2 * n)) as u8
}

/// Outcome counts over closed, non-skipped days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuarterStats {
    pub days: usize,
    pub yes: usize,
    pub partial: usize,
    /// `no` and `missed` together.
    pub no: usize,
    /// Completed objectives across the given goals.
    pub done: usize,
}

pub fn quarter_stats(logs: &[DayLog], goals: &[Goal]) -> QuarterStats {
    let counted = logs
        .iter()
        .filter(|l| l.is_closed() && l.status != Some(DayStatus::Skipped));

    let mut stats = QuarterStats {
        done: goals.iter().map(Goal::completed_count).sum(),
        ..QuarterStats::default()
    };
    for log in counted {
        stats.days += 1;
        match log.status {
            Some(DayStatus::Yes) => stats.yes += 1,
            Some(DayStatus::Partial) => stats.partial += 1,
            Some(DayStatus::No) | Some(DayStatus::Missed) => stats.no += 1,
            _ => {}
        }
    }
    stats
}

/// Share of counted days closed with `yes`, as a rounded percent.
pub fn follow_through_rate(stats: &QuarterStats) -> u8 {
    if stats.days == 0 {
        return 0;
    }
    ((200 * stats.yes + stats.days) / (2 * stats.days)) as u8
}

/// The quarter recap unlocks after a week of counted days.
pub fn recap_available(stats: &QuarterStats) -> bool {
    stats.days >= 7
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insight {
    pub icon: &'static str,
    pub text: String,
}

pub fn insights(stats: &QuarterStats) -> Vec<Insight> {
    let rate = follow_through_rate(stats);
    let mut out = Vec::new();

    if rate >= 70 {
        out.push(Insight {
            icon: "🔥",
            text: format!("{rate}% follow-through. That's real commitment."),
        });
    } else if rate >= 50 {
        out.push(Insight {
            icon: "💪",
            text: format!("{rate}% is solid. Room to grow next quarter."),
        });
    } else if rate > 0 {
        out.push(Insight {
            icon: "🌱",
            text: format!("{rate}% is a start. You showed up, and that matters."),
        });
    }
    if stats.done > 0 {
        out.push(Insight {
            icon: "🎯",
            text: format!("You completed {} objectives. Real progress.", stats.done),
        });
    }
    if stats.partial > 0 {
        out.push(Insight {
            icon: "◐",
            text: format!("{} partial days still count as effort.", stats.partial),
        });
    }
    out
}

fn quarter_sort_key(key: &str) -> Option<(i32, u32)> {
    let (q, year) = key.strip_prefix('Q')?.split_once('-')?;
    Some((year.parse().ok()?, q.parse().ok()?))
}

/// Distinct quarter keys other than `current`, most recent first.
pub fn past_quarters(all_goals: &[Goal], current: &str) -> Vec<String> {
    let keys: BTreeSet<&str> = all_goals
        .iter()
        .map(|g| g.quarter.as_str())
        .filter(|q| *q != current)
        .collect();
    let mut keys: Vec<String> = keys.into_iter().map(str::to_string).collect();
    keys.sort_by_key(|k| Reverse((quarter_sort_key(k), k.clone())));
    keys
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalSummary {
    pub id: String,
    pub name: String,
    pub progress: u8,
    pub completed: usize,
    pub total: usize,
}

impl From<&Goal> for GoalSummary {
    fn from(goal: &Goal) -> Self {
        Self {
            id: goal.id.clone(),
            name: goal.name.clone(),
            progress: goal.progress(),
            completed: goal.completed_count(),
            total: goal.objectives.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PastQuarterSummary {
    pub key: String,
    pub label: String,
    pub goals: Vec<GoalSummary>,
    /// Completed objectives across the quarter's goals.
    pub done: usize,
}

pub fn past_quarter_summary(all_goals: &[Goal], key: &str) -> PastQuarterSummary {
    let goals: Vec<GoalSummary> = all_goals
        .iter()
        .filter(|g| g.quarter == key)
        .map(GoalSummary::from)
        .collect();
    PastQuarterSummary {
        key: key.to_string(),
        label: Quarter::label_for_key(key),
        done: goals.iter().map(|g| g.completed).sum(),
        goals,
    }
}

/// Most recent closed log that referenced a goal.
pub fn last_completed_log(logs: &[DayLog]) -> Option<&DayLog> {
    logs.iter()
        .filter(|l| l.is_closed() && l.goal_id.is_some())
        .max_by_key(|l| l.date)
}

/// Prefill for "same as yesterday".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickStart {
    pub goal_id: String,
    pub objective_id: String,
    pub intention: String,
}

/// Repeat the last completed log's objective, if it still exists and is open.
pub fn quick_start(logs: &[DayLog], goals: &[Goal]) -> Option<QuickStart> {
    let last = last_completed_log(logs)?;
    let goal_id = last.goal_id.as_deref()?;
    let objective_id = last.obj_id.as_deref()?;
    let objective = find_goal(goals, goal_id)?.objective(objective_id)?;
    if objective.completed {
        return None;
    }
    Some(QuickStart {
        goal_id: goal_id.to_string(),
        objective_id: objective_id.to_string(),
        intention: last.intention_text().unwrap_or_default().to_string(),
    })
}

pub fn greeting(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Good morning",
        12..=16 => "Good afternoon",
        _ => "Good evening",
    }
}

/// Evening prompt, stable for a given date.
pub fn reflection_prompt(date: NaiveDate) -> &'static str {
    REFLECTION_PROMPTS[date.ordinal0() as usize % REFLECTION_PROMPTS.len()]
}
