//! Objective management within a goal.

use std::error::Error;

use chrono::Utc;
use clap::Subcommand;
use reflect_core::{Difficulty, Goal, Planner};

use super::{resolve_id, short_id, CommandResult, Context};

#[derive(Subcommand)]
pub enum ObjectiveAction {
    /// Add an objective to a goal (max 7 per goal)
    Add {
        /// Goal ID (a unique prefix is enough)
        goal_id: String,
        /// Objective text
        text: String,
        /// Difficulty: easy, medium or hard
        #[arg(long, short, default_value = "medium")]
        difficulty: Difficulty,
    },
    /// Flip an objective between open and completed
    Toggle {
        goal_id: String,
        objective_id: String,
    },
    /// Delete an objective (undo with `reflect objective undo`)
    Delete {
        goal_id: String,
        objective_id: String,
    },
    /// Restore goals as they were before the last delete
    Undo,
}

fn resolve_goal(planner: &Planner, prefix: &str) -> Result<Goal, Box<dyn Error>> {
    let goals = planner.all_goals();
    let id = resolve_id(prefix, goals.iter().map(|g| g.id.as_str()))?;
    goals
        .into_iter()
        .find(|g| g.id == id)
        .ok_or_else(|| format!("unknown goal: {prefix}").into())
}

pub async fn run(action: ObjectiveAction, ctx: &Context) -> CommandResult {
    let planner = ctx.planner().await;

    match action {
        ObjectiveAction::Add {
            goal_id,
            text,
            difficulty,
        } => {
            let goal = resolve_goal(&planner, &goal_id)?;
            let objective = planner.add_objective(&goal.id, &text, difficulty)?;
            println!(
                "Added {}  {} ({}) to {}",
                short_id(&objective.id),
                objective.text,
                objective.difficulty,
                goal.name
            );
        }
        ObjectiveAction::Toggle {
            goal_id,
            objective_id,
        } => {
            let goal = resolve_goal(&planner, &goal_id)?;
            let objective_id =
                resolve_id(&objective_id, goal.objectives.iter().map(|o| o.id.as_str()))?;
            let completed = planner.toggle_objective(&goal.id, &objective_id)?;
            let state = if completed { "completed" } else { "open" };
            println!("Objective {} is now {state}", short_id(&objective_id));
        }
        ObjectiveAction::Delete {
            goal_id,
            objective_id,
        } => {
            let goal = resolve_goal(&planner, &goal_id)?;
            let objective_id =
                resolve_id(&objective_id, goal.objectives.iter().map(|o| o.id.as_str()))?;
            planner.delete_objective(&goal.id, &objective_id)?;
            println!("Objective deleted. Run `reflect objective undo` to restore it.");
        }
        ObjectiveAction::Undo => {
            planner.undo(Utc::now())?;
            println!("Restored");
        }
    }

    Ok(())
}
