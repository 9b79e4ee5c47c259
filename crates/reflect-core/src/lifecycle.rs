//! Day lifecycle: the per-date state machine over the log collection.
//!
//! Every operation works on the canonical collections passed in by the
//! caller. A rejected operation returns [`ValidationError`] and leaves both
//! collections exactly as they were.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::ValidationError;
use crate::model::{find_goal, DayLog, DayStatus, Goal, Outcome};

/// First log recorded for `date`.
pub fn log_for(logs: &[DayLog], date: NaiveDate) -> Option<&DayLog> {
    logs.iter().find(|l| l.date == date)
}

fn log_for_mut(logs: &mut [DayLog], date: NaiveDate) -> Option<&mut DayLog> {
    logs.iter_mut().find(|l| l.date == date)
}

/// Record (or update) the morning intention for `date`.
///
/// The goal must exist, the objective must belong to it and still be open,
/// and `text` must not be blank. A terminal log is never touched.
pub fn record_intention<'a>(
    logs: &'a mut Vec<DayLog>,
    goals: &[Goal],
    date: NaiveDate,
    goal_id: &str,
    objective_id: &str,
    text: &str,
) -> Result<&'a DayLog, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyIntention);
    }
    let goal =
        find_goal(goals, goal_id).ok_or_else(|| ValidationError::UnknownGoal(goal_id.to_string()))?;
    let objective = goal
        .objective(objective_id)
        .ok_or_else(|| ValidationError::UnknownObjective {
            goal_id: goal_id.to_string(),
            objective_id: objective_id.to_string(),
        })?;
    if objective.completed {
        return Err(ValidationError::ObjectiveCompleted(objective_id.to_string()));
    }

    let index = match logs.iter().position(|l| l.date == date) {
        Some(i) if logs[i].is_closed() => return Err(ValidationError::DayClosed(date)),
        Some(i) => i,
        None => {
            logs.push(DayLog::new(date));
            logs.len() - 1
        }
    };

    let log = &mut logs[index];
    log.intention = Some(text.to_string());
    log.goal_id = Some(goal_id.to_string());
    log.obj_id = Some(objective_id.to_string());
    Ok(&logs[index])
}

/// Skip `date`: Unset or Intended becomes Skipped.
pub fn skip(
    logs: &mut Vec<DayLog>,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<&DayLog, ValidationError> {
    let index = match logs.iter().position(|l| l.date == date) {
        Some(i) if logs[i].is_closed() => return Err(ValidationError::DayClosed(date)),
        Some(i) => i,
        None => {
            logs.push(DayLog::new(date));
            logs.len() - 1
        }
    };

    let log = &mut logs[index];
    log.status = Some(DayStatus::Skipped);
    log.closed = Some(now);
    Ok(&logs[index])
}

/// Close an intended day with the reported outcome.
///
/// `Outcome::Yes` also marks the referenced objective completed.
pub fn close<'a>(
    logs: &'a mut [DayLog],
    goals: &mut [Goal],
    date: NaiveDate,
    outcome: Outcome,
    reflection: Option<&str>,
    now: DateTime<Utc>,
) -> Result<&'a DayLog, ValidationError> {
    let log = log_for_mut(logs, date).ok_or(ValidationError::NotIntended(date))?;
    if log.is_closed() {
        return Err(ValidationError::DayClosed(date));
    }
    if !log.has_intention() {
        return Err(ValidationError::NotIntended(date));
    }

    log.status = Some(outcome.into());
    log.reflection = reflection
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    log.closed = Some(now);

    if outcome == Outcome::Yes {
        if let (Some(goal_id), Some(objective_id)) = (log.goal_id.as_deref(), log.obj_id.as_deref()) {
            let completed = goals
                .iter_mut()
                .find(|g| g.id == goal_id)
                .map(|g| g.complete_objective(objective_id))
                .unwrap_or(false);
            if !completed {
                tracing::debug!(%date, goal_id, objective_id, "closed day references a missing objective");
            }
        }
    }

    Ok(log)
}

/// Whether `log` should roll over to Missed when loaded on `today`.
pub fn is_stale(log: &DayLog, today: NaiveDate) -> bool {
    log.date < today && !log.is_closed() && log.has_intention()
}

/// Transition every stale intended day to Missed, stamping `closed` with `now`.
///
/// Pure and idempotent: expired records are terminal and no longer match.
pub fn expire_stale(today: NaiveDate, logs: &[DayLog], now: DateTime<Utc>) -> Vec<DayLog> {
    logs.iter()
        .map(|log| {
            if is_stale(log, today) {
                DayLog {
                    status: Some(DayStatus::Missed),
                    closed: Some(now),
                    ..log.clone()
                }
            } else {
                log.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DayState, Difficulty};
    use proptest::prelude::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn book_goal() -> Goal {
        let mut goal = Goal::new("Write a book", "Q1-2025");
        goal.add_objective("Outline chapter 1", Difficulty::Easy).unwrap();
        goal.add_objective("Draft chapter 1", Difficulty::Hard).unwrap();
        goal
    }

    #[test]
    fn intention_requires_text_goal_and_open_objective() {
        let mut goals = vec![book_goal()];
        let gid = goals[0].id.clone();
        let oid = goals[0].objectives[0].id.clone();
        let d = date("2025-01-10");
        let mut logs = Vec::new();

        assert_eq!(
            record_intention(&mut logs, &goals, d, &gid, &oid, "  ").unwrap_err(),
            ValidationError::EmptyIntention
        );
        assert!(matches!(
            record_intention(&mut logs, &goals, d, "missing", &oid, "x").unwrap_err(),
            ValidationError::UnknownGoal(_)
        ));
        assert!(matches!(
            record_intention(&mut logs, &goals, d, &gid, "missing", "x").unwrap_err(),
            ValidationError::UnknownObjective { .. }
        ));
        goals[0].objectives[0].completed = true;
        assert!(matches!(
            record_intention(&mut logs, &goals, d, &gid, &oid, "x").unwrap_err(),
            ValidationError::ObjectiveCompleted(_)
        ));
        assert!(logs.is_empty());
    }

    #[test]
    fn intention_updates_same_day_record() {
        let goals = vec![book_goal()];
        let gid = goals[0].id.clone();
        let first = goals[0].objectives[0].id.clone();
        let second = goals[0].objectives[1].id.clone();
        let d = date("2025-01-10");
        let mut logs = Vec::new();

        record_intention(&mut logs, &goals, d, &gid, &first, "Outline after coffee").unwrap();
        let id = logs[0].id.clone();
        record_intention(&mut logs, &goals, d, &gid, &second, "Draft instead").unwrap();

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, id);
        assert_eq!(logs[0].obj_id.as_deref(), Some(second.as_str()));
        assert_eq!(logs[0].state(), DayState::Intended);
    }

    #[test]
    fn close_yes_completes_objective() {
        let mut goals = vec![book_goal()];
        let gid = goals[0].id.clone();
        let oid = goals[0].objectives[0].id.clone();
        let d = date("2025-01-10");
        let mut logs = Vec::new();

        record_intention(&mut logs, &goals, d, &gid, &oid, "Outline").unwrap();
        let log = close(&mut logs, &mut goals, d, Outcome::Yes, Some("  felt good "), Utc::now()).unwrap();
        assert_eq!(log.state(), DayState::Closed(Outcome::Yes));
        assert_eq!(log.reflection.as_deref(), Some("felt good"));
        assert!(goals[0].objectives[0].completed);
        assert_eq!(goals[0].progress(), 20);
    }

    #[test]
    fn close_partial_leaves_objective_open() {
        let mut goals = vec![book_goal()];
        let gid = goals[0].id.clone();
        let oid = goals[0].objectives[1].id.clone();
        let d = date("2025-01-10");
        let mut logs = Vec::new();

        record_intention(&mut logs, &goals, d, &gid, &oid, "Draft").unwrap();
        close(&mut logs, &mut goals, d, Outcome::Partial, Some(""), Utc::now()).unwrap();
        assert!(!goals[0].objectives[1].completed);
        assert_eq!(logs[0].reflection, None);
    }

    #[test]
    fn terminal_days_reject_further_changes() {
        let mut goals = vec![book_goal()];
        let gid = goals[0].id.clone();
        let oid = goals[0].objectives[0].id.clone();
        let d = date("2025-01-10");
        let mut logs = Vec::new();

        record_intention(&mut logs, &goals, d, &gid, &oid, "Outline").unwrap();
        close(&mut logs, &mut goals, d, Outcome::No, None, Utc::now()).unwrap();
        let closed = logs.clone();

        assert_eq!(
            close(&mut logs, &mut goals, d, Outcome::Yes, None, Utc::now()).unwrap_err(),
            ValidationError::DayClosed(d)
        );
        assert_eq!(skip(&mut logs, d, Utc::now()).unwrap_err(), ValidationError::DayClosed(d));
        let oid2 = goals[0].objectives[1].id.clone();
        assert_eq!(
            record_intention(&mut logs, &goals, d, &gid, &oid2, "again").unwrap_err(),
            ValidationError::DayClosed(d)
        );
        assert_eq!(logs, closed);
    }

    #[test]
    fn close_without_intention_is_rejected() {
        let mut goals = vec![book_goal()];
        let d = date("2025-01-10");
        let mut logs: Vec<DayLog> = Vec::new();
        assert_eq!(
            close(&mut logs, &mut goals, d, Outcome::Yes, None, Utc::now()).unwrap_err(),
            ValidationError::NotIntended(d)
        );
    }

    #[test]
    fn skip_from_unset_and_intended() {
        let goals = vec![book_goal()];
        let gid = goals[0].id.clone();
        let oid = goals[0].objectives[0].id.clone();
        let mut logs = Vec::new();

        skip(&mut logs, date("2025-01-10"), Utc::now()).unwrap();
        assert_eq!(logs[0].state(), DayState::Skipped);

        record_intention(&mut logs, &goals, date("2025-01-11"), &gid, &oid, "Outline").unwrap();
        skip(&mut logs, date("2025-01-11"), Utc::now()).unwrap();
        assert_eq!(logs[1].state(), DayState::Skipped);
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn stale_intention_becomes_missed_at_load_time() {
        let mut log = DayLog::new(date("2025-01-10"));
        log.intention = Some("Run 2 miles".into());
        let load_time = Utc::now();

        let expired = expire_stale(date("2025-01-12"), &[log], load_time);
        assert_eq!(expired[0].status, Some(DayStatus::Missed));
        assert_eq!(expired[0].closed, Some(load_time));
        assert_eq!(expired[0].state(), DayState::Missed);
    }

    #[test]
    fn expiry_ignores_today_and_empty_days() {
        let today = date("2025-01-12");
        let mut intended_today = DayLog::new(today);
        intended_today.intention = Some("Now".into());
        let blank_past = DayLog::new(date("2025-01-01"));

        let logs = vec![intended_today, blank_past];
        assert_eq!(expire_stale(today, &logs, Utc::now()), logs);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Intend(u8, usize),
        Skip(u8),
        Close(u8, Outcome),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        let outcome = prop_oneof![Just(Outcome::Yes), Just(Outcome::Partial), Just(Outcome::No)];
        prop_oneof![
            (0u8..4, 0usize..2).prop_map(|(d, o)| Op::Intend(d, o)),
            (0u8..4).prop_map(Op::Skip),
            (0u8..4, outcome).prop_map(|(d, o)| Op::Close(d, o)),
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_log_per_date(ops in prop::collection::vec(arb_op(), 0..40)) {
            let mut goals = vec![book_goal()];
            let gid = goals[0].id.clone();
            let oids: Vec<String> = goals[0].objectives.iter().map(|o| o.id.clone()).collect();
            let base = date("2025-01-01");
            let mut logs: Vec<DayLog> = Vec::new();

            for op in ops {
                let _ = match op {
                    Op::Intend(d, o) => record_intention(
                        &mut logs, &goals, base + chrono::Days::new(d as u64), &gid, &oids[o], "do it",
                    ).map(|_| ()),
                    Op::Skip(d) => skip(&mut logs, base + chrono::Days::new(d as u64), Utc::now()).map(|_| ()),
                    Op::Close(d, outcome) => close(
                        &mut logs, &mut goals, base + chrono::Days::new(d as u64), outcome, None, Utc::now(),
                    ).map(|_| ()),
                };
            }

            let mut dates: Vec<NaiveDate> = logs.iter().map(|l| l.date).collect();
            let total = dates.len();
            dates.sort();
            dates.dedup();
            prop_assert_eq!(dates.len(), total);
        }

        #[test]
        fn expiry_is_idempotent(days_back in 0u64..10, closed in any::<bool>(), intended in any::<bool>()) {
            let today = date("2025-01-12");
            let mut log = DayLog::new(today - chrono::Days::new(days_back));
            if intended {
                log.intention = Some("x".into());
            }
            if closed {
                log.status = Some(DayStatus::No);
                log.closed = Some(Utc::now());
            }
            let once = expire_stale(today, &[log], Utc::now());
            let twice = expire_stale(today, &once, Utc::now());
            prop_assert_eq!(once, twice);
        }
    }
}
