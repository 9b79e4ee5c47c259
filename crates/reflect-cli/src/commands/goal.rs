//! Quarter goal commands.

use clap::Subcommand;
use reflect_core::views;

use super::{print_json, short_id, CommandResult, Context};

#[derive(Subcommand)]
pub enum GoalAction {
    /// Set this quarter's goals (replaces the current quarter only)
    Create {
        /// Goal names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List goals with their objectives
    List {
        /// Include goals from past quarters
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show quarter countdown and progress
    Progress {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: GoalAction, ctx: &Context) -> CommandResult {
    let planner = ctx.planner().await;

    match action {
        GoalAction::Create { names } => {
            let goals = planner.create_goals(&names)?;
            println!(
                "Created {} goal(s) for {}",
                goals.len(),
                planner.quarter().label
            );
            for goal in &goals {
                println!("  {}  {}", short_id(&goal.id), goal.name);
            }
        }
        GoalAction::List { all, json } => {
            let goals = if all {
                planner.all_goals()
            } else {
                planner.goals()
            };
            if json {
                print_json(&goals)?;
            } else if goals.is_empty() {
                println!("No goals for {}. Create some with `reflect goal create`.", planner.quarter().label);
            } else {
                for goal in &goals {
                    println!(
                        "{}  {} [{}] {}%",
                        short_id(&goal.id),
                        goal.name,
                        goal.quarter,
                        goal.progress()
                    );
                    for objective in &goal.objectives {
                        let mark = if objective.completed { "x" } else { " " };
                        println!(
                            "    [{mark}] {}  {} ({})",
                            short_id(&objective.id),
                            objective.text,
                            objective.difficulty
                        );
                    }
                }
            }
        }
        GoalAction::Progress { json } => {
            let goals = planner.goals();
            let quarter = planner.quarter();
            let overall = views::overall_progress(&goals);
            if json {
                print_json(&serde_json::json!({
                    "quarter": quarter,
                    "overall": overall,
                    "goals": goals.iter().map(views::GoalSummary::from).collect::<Vec<_>>(),
                }))?;
            } else {
                println!(
                    "{}  week {} of {}  {} days left",
                    quarter.label,
                    quarter.week.min(reflect_core::Quarter::WEEKS),
                    reflect_core::Quarter::WEEKS,
                    quarter.days_left
                );
                println!("Overall: {overall}%");
                for goal in &goals {
                    println!(
                        "  {:>3}%  {} ({}/{})",
                        goal.progress(),
                        goal.name,
                        goal.completed_count(),
                        goal.objectives.len()
                    );
                }
            }
        }
    }
    Ok(())
}
