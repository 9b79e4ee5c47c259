//! Domain records: goals with weighted objectives, daily logs, quarters.

pub mod goal;
pub mod log;
pub mod quarter;

pub use goal::{
    create_goals, delete_objective, find_goal, find_goal_mut, goals_in_quarter, progress,
    save_quarter_goals, Difficulty, Goal, GoalsSnapshot, Objective, MAX_OBJECTIVES,
};
pub use log::{DayLog, DayState, DayStatus, Outcome};
pub use quarter::Quarter;
