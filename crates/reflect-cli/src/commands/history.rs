//! History, stats and quarter recaps.

use clap::Subcommand;
use reflect_core::{views, DayStatus, Quarter};

use super::{print_json, CommandResult, Context};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Show a week of closed days
    Week {
        /// Weeks relative to this one (-1 = last week)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow-through statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Quarter recap insights
    Insights,
    /// List past quarters that have goals
    Quarters,
    /// Show a past quarter's goals
    Quarter {
        /// Quarter key, e.g. Q1-2025
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn symbol(status: Option<DayStatus>) -> &'static str {
    match status {
        Some(DayStatus::Yes) => "✓",
        Some(DayStatus::Partial) => "◐",
        Some(DayStatus::No) | Some(DayStatus::Missed) => "✗",
        Some(DayStatus::Skipped) => "–",
        None => "·",
    }
}

pub async fn run(action: HistoryAction, ctx: &Context) -> CommandResult {
    let planner = ctx.planner().await;
    let logs = planner.logs();

    match action {
        HistoryAction::Week { offset, json } => {
            let dates = views::week_dates(planner.today(), offset);
            let activity = views::week_activity(&logs, &dates);
            if json {
                let days: Vec<_> = dates
                    .iter()
                    .zip(&activity)
                    .map(|(date, status)| serde_json::json!({ "date": date, "status": status }))
                    .collect();
                print_json(&serde_json::json!({
                    "label": views::week_label(planner.today(), offset),
                    "days": days,
                }))?;
            } else {
                println!("{}", views::week_label(planner.today(), offset));
                for (date, status) in dates.iter().zip(&activity) {
                    println!("  {}  {}", date.format("%a %b %-d"), symbol(*status));
                }
            }
        }
        HistoryAction::Stats { json } => {
            let stats = views::quarter_stats(&logs, &planner.goals());
            let rate = views::follow_through_rate(&stats);
            if json {
                print_json(&serde_json::json!({
                    "stats": stats,
                    "rate": rate,
                    "recap_available": views::recap_available(&stats),
                }))?;
            } else {
                println!("Days tracked: {}", stats.days);
                println!("  ✓ {}   ◐ {}   ✗ {}", stats.yes, stats.partial, stats.no);
                println!("Follow-through: {rate}%");
                println!("Objectives completed: {}", stats.done);
            }
        }
        HistoryAction::Insights => {
            let stats = views::quarter_stats(&logs, &planner.goals());
            if !views::recap_available(&stats) {
                println!(
                    "Recap unlocks after 7 tracked days ({} so far).",
                    stats.days
                );
                return Ok(());
            }
            let insights = views::insights(&stats);
            if insights.is_empty() {
                println!("Keep going. Insights appear as you close days.");
            }
            for insight in insights {
                println!("{} {}", insight.icon, insight.text);
            }
        }
        HistoryAction::Quarters => {
            let keys = views::past_quarters(&planner.all_goals(), &planner.quarter().key);
            if keys.is_empty() {
                println!("No past quarters yet.");
            }
            for key in keys {
                println!("{key}  {}", Quarter::label_for_key(&key));
            }
        }
        HistoryAction::Quarter { key, json } => {
            let summary = views::past_quarter_summary(&planner.all_goals(), &key);
            if json {
                print_json(&summary)?;
            } else if summary.goals.is_empty() {
                println!("No goals for {}", summary.label);
            } else {
                println!("{}  {} objective(s) completed", summary.label, summary.done);
                for goal in &summary.goals {
                    println!(
                        "  {:>3}%  {} ({}/{})",
                        goal.progress, goal.name, goal.completed, goal.total
                    );
                }
            }
        }
    }

    Ok(())
}
