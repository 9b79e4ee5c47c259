//! Application context for one session.
//!
//! A [`Planner`] is bound to a shared [`Reconciler`] and a calendar day. Every
//! action reads the current collections, applies a pure operation from
//! [`crate::lifecycle`] or [`crate::model`], and writes the result back through
//! the reconciler so it is mirrored in the background.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{CoreError, StorageError, ValidationError};
use crate::lifecycle;
use crate::model::{
    self, find_goal_mut, goals_in_quarter, save_quarter_goals, DayLog, Difficulty, Goal,
    GoalsSnapshot, Objective, Outcome, Quarter,
};
use crate::storage::Collection;
use crate::sync::{PullOutcome, Reconciler};
use crate::views::{self, QuickStart};

/// Store key holding the snapshot taken before the last objective deletion.
pub const UNDO_KEY: &str = "undo_goals";

/// Seconds after a deletion during which [`Planner::undo`] is still offered.
pub const UNDO_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct Planner {
    reconciler: Arc<Reconciler>,
    quarter: Quarter,
    today: NaiveDate,
}

impl Planner {
    /// Bind to `today` without touching the store.
    pub fn new(reconciler: Arc<Reconciler>, today: NaiveDate) -> Self {
        Self {
            reconciler,
            quarter: Quarter::containing(today),
            today,
        }
    }

    /// Run the load sequence: optional pull, then roll stale intended days
    /// over to missed and persist only if anything changed.
    pub async fn load(
        reconciler: Arc<Reconciler>,
        today: NaiveDate,
        now: DateTime<Utc>,
        pull: bool,
    ) -> (Self, Option<PullOutcome>) {
        let pulled = if pull {
            Some(reconciler.pull().await)
        } else {
            None
        };

        let planner = Self::new(reconciler, today);
        if let Some(PullOutcome::Merged { goals_added, .. }) = &pulled {
            if *goals_added > 0 {
                if let Err(e) = planner.reconciler.store().kv_delete(UNDO_KEY) {
                    tracing::warn!(error = %e, "failed to drop undo snapshot after pull");
                }
            }
        }
        let logs = planner.reconciler.logs();
        let stale = logs.iter().filter(|l| lifecycle::is_stale(l, today)).count();
        if stale > 0 {
            let expired = lifecycle::expire_stale(today, &logs, now);
            if planner.reconciler.set_logs(&expired) {
                tracing::info!(count = stale, %today, "marked stale days as missed");
            }
        }
        (planner, pulled)
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn quarter(&self) -> &Quarter {
        &self.quarter
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Every goal across all quarters.
    pub fn all_goals(&self) -> Vec<Goal> {
        self.reconciler.goals()
    }

    /// Goals tagged with the current quarter.
    pub fn goals(&self) -> Vec<Goal> {
        let all = self.all_goals();
        goals_in_quarter(&all, &self.quarter.key)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn logs(&self) -> Vec<DayLog> {
        self.reconciler.logs()
    }

    pub fn today_log(&self) -> Option<DayLog> {
        let logs = self.logs();
        views::log_for(&logs, self.today).cloned()
    }

    /// Persist goals. Any pending undo snapshot predates this write, so it
    /// is dropped first.
    fn save_goals(&self, goals: &[Goal]) -> Result<(), CoreError> {
        self.reconciler.store().kv_delete(UNDO_KEY)?;
        if self.reconciler.set_goals(goals) {
            Ok(())
        } else {
            Err(StorageError::WriteFailed(Collection::Goals.name()).into())
        }
    }

    fn save_logs(&self, logs: &[DayLog]) -> Result<(), CoreError> {
        if self.reconciler.set_logs(logs) {
            Ok(())
        } else {
            Err(StorageError::WriteFailed(Collection::Logs.name()).into())
        }
    }

    /// Replace the current quarter's goals with fresh ones named `names`.
    pub fn create_goals<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Goal>, CoreError> {
        let created = model::create_goals(names, &self.quarter.key)?;
        let merged = save_quarter_goals(&self.all_goals(), &self.quarter.key, created.clone());
        self.save_goals(&merged)?;
        Ok(created)
    }

    pub fn add_objective(
        &self,
        goal_id: &str,
        text: &str,
        difficulty: Difficulty,
    ) -> Result<Objective, CoreError> {
        let mut goals = self.all_goals();
        let objective = find_goal_mut(&mut goals, goal_id)?
            .add_objective(text, difficulty)?
            .clone();
        self.save_goals(&goals)?;
        Ok(objective)
    }

    /// Flip an objective, returning its new completion flag.
    pub fn toggle_objective(&self, goal_id: &str, objective_id: &str) -> Result<bool, CoreError> {
        let mut goals = self.all_goals();
        let completed = find_goal_mut(&mut goals, goal_id)?.toggle_objective(objective_id)?;
        self.save_goals(&goals)?;
        Ok(completed)
    }

    /// Delete an objective and keep the prior state for [`Planner::undo`].
    pub fn delete_objective(&self, goal_id: &str, objective_id: &str) -> Result<(), CoreError> {
        let mut goals = self.all_goals();
        let snapshot = model::delete_objective(&mut goals, goal_id, objective_id)?;
        self.save_goals(&goals)?;
        self.reconciler.store().write_json(UNDO_KEY, &snapshot)?;
        Ok(())
    }

    /// Restore the goals captured by the last deletion. Only offered while no
    /// other goal edit has happened since and within [`UNDO_WINDOW_SECS`].
    pub fn undo(&self, now: DateTime<Utc>) -> Result<Vec<Goal>, CoreError> {
        let store = self.reconciler.store();
        let snapshot: GoalsSnapshot = store
            .read_json(UNDO_KEY)?
            .ok_or(ValidationError::NothingToUndo)?;
        if now - snapshot.taken_at() > Duration::seconds(UNDO_WINDOW_SECS) {
            store.kv_delete(UNDO_KEY)?;
            tracing::debug!(taken_at = %snapshot.taken_at(), "undo snapshot expired");
            return Err(ValidationError::NothingToUndo.into());
        }
        let mut goals = self.all_goals();
        snapshot.restore(&mut goals);
        self.save_goals(&goals)?;
        Ok(goals)
    }

    pub fn intend(&self, goal_id: &str, objective_id: &str, text: &str) -> Result<DayLog, CoreError> {
        let goals = self.all_goals();
        let mut logs = self.logs();
        let log = lifecycle::record_intention(
            &mut logs,
            &goals,
            self.today,
            goal_id,
            objective_id,
            text,
        )?
        .clone();
        self.save_logs(&logs)?;
        Ok(log)
    }

    pub fn skip(&self, now: DateTime<Utc>) -> Result<DayLog, CoreError> {
        let mut logs = self.logs();
        let log = lifecycle::skip(&mut logs, self.today, now)?.clone();
        self.save_logs(&logs)?;
        Ok(log)
    }

    /// Close today. A `yes` also completes the objective, so goals are
    /// written before logs.
    pub fn close(
        &self,
        outcome: Outcome,
        reflection: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DayLog, CoreError> {
        let mut goals = self.all_goals();
        let mut logs = self.logs();
        let log = lifecycle::close(&mut logs, &mut goals, self.today, outcome, reflection, now)?
            .clone();
        if outcome == Outcome::Yes {
            self.save_goals(&goals)?;
        }
        self.save_logs(&logs)?;
        Ok(log)
    }

    /// What "same as yesterday" would prefill, if anything.
    pub fn quick_start_candidate(&self) -> Option<QuickStart> {
        views::quick_start(&self.logs(), &self.all_goals())
    }

    /// Repeat the last completed day's objective and intention for today.
    pub fn quick_start(&self) -> Result<DayLog, CoreError> {
        let candidate = self
            .quick_start_candidate()
            .ok_or(ValidationError::NothingToRepeat)?;
        self.intend(&candidate.goal_id, &candidate.objective_id, &candidate.intention)
    }
}
