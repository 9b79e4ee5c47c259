//! Goals and their weighted objectives.
//!
//! Progress is weighted by difficulty (easy 1, medium 2, hard 4), not a simple
//! completed count. A goal holds at most [`MAX_OBJECTIVES`] objectives; adding
//! past the cap is rejected, never truncated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum number of objectives a single goal may hold.
pub const MAX_OBJECTIVES: usize = 7;

/// Objective difficulty. The weight mapping is fixed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Quick win
    Easy,
    /// A few days of work
    Medium,
    /// Major milestone
    Hard,
}

impl Difficulty {
    pub fn weight(&self) -> u32 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 4,
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ValidationError::InvalidValue {
                field: "difficulty".into(),
                message: format!("expected easy, medium or hard, got '{other}'"),
            }),
        }
    }
}

/// A concrete step toward a goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Objective {
    pub id: String,
    pub text: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub completed: bool,
}

impl Objective {
    pub fn new(text: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            difficulty,
            completed: false,
        }
    }
}

/// A quarterly goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    pub id: String,
    pub name: String,
    /// Quarter key, e.g. `Q1-2025`.
    #[serde(alias = "qtr")]
    pub quarter: String,
    #[serde(default, alias = "objs")]
    pub objectives: Vec<Objective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Goal {
    /// Create an empty goal tagged with `quarter`.
    pub fn new(name: impl Into<String>, quarter: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            quarter: quarter.into(),
            objectives: Vec::new(),
            created_at: Some(Utc::now()),
        }
    }

    /// Weighted completion percentage of this goal.
    pub fn progress(&self) -> u8 {
        progress(&self.objectives)
    }

    pub fn objective(&self, objective_id: &str) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.id == objective_id)
    }

    pub fn completed_count(&self) -> usize {
        self.objectives.iter().filter(|o| o.completed).count()
    }

    /// Whether another objective may still be added.
    pub fn has_room(&self) -> bool {
        self.objectives.len() < MAX_OBJECTIVES
    }

    /// Append a new objective.
    ///
    /// Rejected when the goal already holds [`MAX_OBJECTIVES`] objectives or
    /// `text` is blank; the goal is left unchanged in both cases.
    pub fn add_objective(
        &mut self,
        text: &str,
        difficulty: Difficulty,
    ) -> Result<&Objective, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyObjectiveText);
        }
        if !self.has_room() {
            return Err(ValidationError::ObjectiveCapReached {
                goal_id: self.id.clone(),
                max: MAX_OBJECTIVES,
            });
        }
        self.objectives.push(Objective::new(text, difficulty));
        Ok(&self.objectives[self.objectives.len() - 1])
    }

    /// Flip an objective's completion flag, returning the new value.
    pub fn toggle_objective(&mut self, objective_id: &str) -> Result<bool, ValidationError> {
        let goal_id = self.id.clone();
        let objective = self
            .objectives
            .iter_mut()
            .find(|o| o.id == objective_id)
            .ok_or_else(|| ValidationError::UnknownObjective {
                goal_id,
                objective_id: objective_id.to_string(),
            })?;
        objective.completed = !objective.completed;
        Ok(objective.completed)
    }

    /// Mark an objective completed. Idempotent; returns false if it was absent.
    pub fn complete_objective(&mut self, objective_id: &str) -> bool {
        match self.objectives.iter_mut().find(|o| o.id == objective_id) {
            Some(o) => {
                o.completed = true;
                true
            }
            None => false,
        }
    }
}

/// Weighted completion = completed weight / total weight x 100, rounded to
/// the nearest integer. Empty sequences are 0.
pub fn progress(objectives: &[Objective]) -> u8 {
    let total: u32 = objectives.iter().map(|o| o.difficulty.weight()).sum();
    if total == 0 {
        return 0;
    }
    let done: u32 = objectives
        .iter()
        .filter(|o| o.completed)
        .map(|o| o.difficulty.weight())
        .sum();
    // Integer rounding, half up: (200*done + total) / (2*total)
    ((200 * done + total) / (2 * total)) as u8
}

/// Immutable copy of the goal collection taken before a destructive edit.
///
/// Returned by [`delete_objective`]; the caller keeps it for as long as undo
/// is offered and calls [`GoalsSnapshot::restore`] to roll back wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoalsSnapshot {
    goals: Vec<Goal>,
    taken_at: DateTime<Utc>,
}

impl GoalsSnapshot {
    pub fn capture(goals: &[Goal]) -> Self {
        Self {
            goals: goals.to_vec(),
            taken_at: Utc::now(),
        }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    /// Replace `current` with the captured state.
    pub fn restore(self, current: &mut Vec<Goal>) {
        *current = self.goals;
    }
}

/// Find a goal by id.
pub fn find_goal<'a>(goals: &'a [Goal], goal_id: &str) -> Option<&'a Goal> {
    goals.iter().find(|g| g.id == goal_id)
}

/// Find a goal by id for mutation, rejecting unknown ids.
pub fn find_goal_mut<'a>(
    goals: &'a mut [Goal],
    goal_id: &str,
) -> Result<&'a mut Goal, ValidationError> {
    goals
        .iter_mut()
        .find(|g| g.id == goal_id)
        .ok_or_else(|| ValidationError::UnknownGoal(goal_id.to_string()))
}

/// Remove an objective, returning the pre-mutation snapshot for undo.
pub fn delete_objective(
    goals: &mut Vec<Goal>,
    goal_id: &str,
    objective_id: &str,
) -> Result<GoalsSnapshot, ValidationError> {
    let snapshot = GoalsSnapshot::capture(goals);
    let goal = find_goal_mut(goals, goal_id)?;
    let before = goal.objectives.len();
    goal.objectives.retain(|o| o.id != objective_id);
    if goal.objectives.len() == before {
        return Err(ValidationError::UnknownObjective {
            goal_id: goal_id.to_string(),
            objective_id: objective_id.to_string(),
        });
    }
    Ok(snapshot)
}

/// Build goals for `quarter` from onboarding names. Blank names are dropped.
pub fn create_goals<S: AsRef<str>>(
    names: &[S],
    quarter: &str,
) -> Result<Vec<Goal>, ValidationError> {
    let goals: Vec<Goal> = names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .map(|n| Goal::new(n, quarter))
        .collect();
    if goals.is_empty() {
        return Err(ValidationError::NoGoalNames);
    }
    Ok(goals)
}

/// Goals tagged with `quarter`, in stored order.
pub fn goals_in_quarter<'a>(goals: &'a [Goal], quarter: &str) -> Vec<&'a Goal> {
    goals.iter().filter(|g| g.quarter == quarter).collect()
}

/// Replace one quarter's goals inside the full collection, keeping every
/// other quarter untouched.
pub fn save_quarter_goals(all: &[Goal], quarter: &str, quarter_goals: Vec<Goal>) -> Vec<Goal> {
    let mut merged: Vec<Goal> = all
        .iter()
        .filter(|g| g.quarter != quarter)
        .cloned()
        .collect();
    merged.extend(quarter_goals);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn objective(text: &str, difficulty: Difficulty, completed: bool) -> Objective {
        Objective {
            completed,
            ..Objective::new(text, difficulty)
        }
    }

    #[test]
    fn progress_of_empty_is_zero() {
        assert_eq!(progress(&[]), 0);
    }

    #[test]
    fn progress_is_weighted() {
        let mut goal = Goal::new("Write a book", "Q1-2025");
        goal.add_objective("Outline chapter 1", Difficulty::Easy).unwrap();
        goal.add_objective("Draft chapter 1", Difficulty::Hard).unwrap();
        assert_eq!(goal.progress(), 0);

        let outline = goal.objectives[0].id.clone();
        assert!(goal.toggle_objective(&outline).unwrap());
        assert_eq!(goal.progress(), 20);
    }

    #[test]
    fn progress_rounds_to_nearest() {
        // 1 of (1 + 2) = 33.3 -> 33, 2 of 3 = 66.6 -> 67
        let objs = vec![
            objective("a", Difficulty::Easy, true),
            objective("b", Difficulty::Medium, false),
        ];
        assert_eq!(progress(&objs), 33);
        let objs = vec![
            objective("a", Difficulty::Easy, false),
            objective("b", Difficulty::Medium, true),
        ];
        assert_eq!(progress(&objs), 67);
    }

    #[test]
    fn eighth_objective_is_rejected() {
        let mut goal = Goal::new("Fitness", "Q2-2025");
        for i in 0..MAX_OBJECTIVES {
            goal.add_objective(&format!("step {i}"), Difficulty::Medium)
                .unwrap();
        }
        let before = goal.clone();
        let err = goal.add_objective("one more", Difficulty::Easy).unwrap_err();
        assert!(matches!(err, ValidationError::ObjectiveCapReached { max: 7, .. }));
        assert_eq!(goal, before);
    }

    #[test]
    fn blank_objective_is_rejected() {
        let mut goal = Goal::new("Fitness", "Q2-2025");
        assert_eq!(
            goal.add_objective("   ", Difficulty::Easy).unwrap_err(),
            ValidationError::EmptyObjectiveText
        );
        assert!(goal.objectives.is_empty());
    }

    #[test]
    fn delete_then_undo_restores_everything() {
        let mut goal = Goal::new("Fitness", "Q2-2025");
        goal.add_objective("Run 2 miles", Difficulty::Medium).unwrap();
        goal.add_objective("Run 5k", Difficulty::Hard).unwrap();
        let target = goal.objectives[0].id.clone();
        let goal_id = goal.id.clone();
        let mut goals = vec![goal];
        let original = goals.clone();

        let snapshot = delete_objective(&mut goals, &goal_id, &target).unwrap();
        assert_eq!(goals[0].objectives.len(), 1);

        snapshot.restore(&mut goals);
        assert_eq!(goals, original);
    }

    #[test]
    fn delete_unknown_objective_leaves_goals_alone() {
        let mut goals = vec![Goal::new("Fitness", "Q2-2025")];
        let goal_id = goals[0].id.clone();
        let before = goals.clone();
        assert!(delete_objective(&mut goals, &goal_id, "nope").is_err());
        assert!(delete_objective(&mut goals, "nope", "nope").is_err());
        assert_eq!(goals, before);
    }

    #[test]
    fn create_goals_drops_blank_names() {
        let goals = create_goals(&["Write", "  ", ""], "Q3-2025").unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].quarter, "Q3-2025");
        assert_eq!(
            create_goals(&["", " "], "Q3-2025").unwrap_err(),
            ValidationError::NoGoalNames
        );
    }

    #[test]
    fn save_quarter_goals_keeps_other_quarters() {
        let old = Goal::new("Old", "Q4-2024");
        let current = Goal::new("Current", "Q1-2025");
        let replacement = Goal::new("Replacement", "Q1-2025");
        let merged = save_quarter_goals(&[old.clone(), current], "Q1-2025", vec![replacement.clone()]);
        assert_eq!(merged, vec![old, replacement]);
    }

    #[test]
    fn legacy_field_names_deserialize() {
        let json = r#"{"id":"a","name":"Read","qtr":"Q1-2025","objs":[{"id":"o","text":"t","difficulty":"hard","completed":true}]}"#;
        let goal: Goal = serde_json::from_str(json).unwrap();
        assert_eq!(goal.quarter, "Q1-2025");
        assert_eq!(goal.progress(), 100);
    }

    fn arb_objectives() -> impl Strategy<Value = Vec<Objective>> {
        prop::collection::vec(
            (prop_oneof![Just(Difficulty::Easy), Just(Difficulty::Medium), Just(Difficulty::Hard)], any::<bool>()),
            0..=MAX_OBJECTIVES,
        )
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (d, c))| objective(&format!("o{i}"), d, c))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn progress_is_bounded(objs in arb_objectives()) {
            prop_assert!(progress(&objs) <= 100);
        }

        #[test]
        fn all_completed_is_one_hundred(objs in arb_objectives()) {
            prop_assume!(!objs.is_empty());
            let done: Vec<Objective> = objs.into_iter().map(|o| Objective { completed: true, ..o }).collect();
            prop_assert_eq!(progress(&done), 100);
        }

        #[test]
        fn completing_never_lowers_progress(objs in arb_objectives(), pick in any::<prop::sample::Index>()) {
            prop_assume!(!objs.is_empty());
            let before = progress(&objs);
            let mut after = objs.clone();
            let i = pick.index(after.len());
            after[i].completed = true;
            prop_assert!(progress(&after) >= before);
        }
    }
}
