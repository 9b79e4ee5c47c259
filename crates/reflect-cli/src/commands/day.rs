//! Daily ritual: morning intention, evening close.

use chrono::{Local, Timelike, Utc};
use clap::Subcommand;
use reflect_core::model::find_goal;
use reflect_core::{views, DayState, Outcome};

use super::{print_json, resolve_id, short_id, CommandResult, Context};

#[derive(Subcommand)]
pub enum DayAction {
    /// Show today's state
    Today {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set today's intention for an objective
    Intend {
        goal_id: String,
        objective_id: String,
        /// What you will do today
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Skip today
    Skip,
    /// Close today with an outcome: yes, partial or no
    Close {
        outcome: Outcome,
        /// Optional reflection
        #[arg(long, short)]
        reflection: Option<String>,
    },
    /// Repeat the last completed day's objective and intention
    QuickStart,
}

pub async fn run(action: DayAction, ctx: &Context) -> CommandResult {
    let planner = ctx.planner().await;

    match action {
        DayAction::Today { json } => {
            let log = planner.today_log();
            let state = log.as_ref().map(|l| l.state()).unwrap_or(DayState::Unset);
            if json {
                print_json(&serde_json::json!({
                    "date": planner.today(),
                    "quarter": planner.quarter().key,
                    "state": state.to_string(),
                    "log": log,
                    "quick_start": planner.quick_start_candidate(),
                }))?;
                return Ok(());
            }

            println!(
                "{}. {} · {}",
                views::greeting(Local::now().hour()),
                planner.today().format("%A, %b %-d"),
                planner.quarter().label
            );
            let goals = planner.all_goals();
            match (&log, state) {
                (_, DayState::Unset) => {
                    println!("No intention yet.");
                    if let Some(qs) = planner.quick_start_candidate() {
                        println!("Same as yesterday? `reflect day quick-start` ({})", qs.intention);
                    }
                }
                (Some(log), DayState::Intended) => {
                    let goal = log.goal_id.as_deref().and_then(|id| find_goal(&goals, id));
                    println!("Intention: {}", log.intention_text().unwrap_or_default());
                    if let Some(goal) = goal {
                        println!("Goal: {}", goal.name);
                    }
                    println!("Tonight: {}", views::reflection_prompt(planner.today()));
                }
                (Some(log), state) => {
                    println!("Day is {state}.");
                    if let Some(reflection) = &log.reflection {
                        println!("Reflection: {reflection}");
                    }
                }
                (None, state) => println!("Day is {state}."),
            }
        }
        DayAction::Intend {
            goal_id,
            objective_id,
            text,
        } => {
            let goals = planner.all_goals();
            let goal_id = resolve_id(&goal_id, goals.iter().map(|g| g.id.as_str()))?;
            let objectives = find_goal(&goals, &goal_id)
                .map(|g| g.objectives.as_slice())
                .unwrap_or_default();
            let objective_id =
                resolve_id(&objective_id, objectives.iter().map(|o| o.id.as_str()))?;
            let log = planner.intend(&goal_id, &objective_id, &text.join(" "))?;
            println!(
                "Intention set for {}: {}",
                log.date,
                log.intention_text().unwrap_or_default()
            );
        }
        DayAction::Skip => {
            let log = planner.skip(Utc::now())?;
            println!("Skipped {}", log.date);
        }
        DayAction::Close {
            outcome,
            reflection,
        } => {
            let log = planner.close(outcome, reflection.as_deref(), Utc::now())?;
            println!("Closed {} as {}", log.date, log.state());
            if outcome == Outcome::Yes {
                if let Some(obj) = &log.obj_id {
                    println!("Objective {} completed", short_id(obj));
                }
            }
        }
        DayAction::QuickStart => {
            let log = planner.quick_start()?;
            println!(
                "Intention set for {}: {}",
                log.date,
                log.intention_text().unwrap_or_default()
            );
        }
    }

    Ok(())
}
