//! Backend sync commands.
//!
//! Pull and push never fail the command: the outcome is reported and the
//! local data stays authoritative.

use clap::Subcommand;
use reflect_core::{PullOutcome, PushOutcome};

use super::{print_json, CommandResult, Context};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Merge remote goals and logs into local data
    Pull,
    /// Upload local goals and logs
    Push,
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete this user's remote goals and logs (local data is kept)
    ClearRemote {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

pub async fn run(action: SyncAction, ctx: &Context) -> CommandResult {
    let reconciler = &ctx.reconciler;

    match action {
        SyncAction::Pull => match reconciler.pull().await {
            PullOutcome::Merged {
                goals_added,
                logs_added,
            } => println!("Pulled: {goals_added} new goal(s), {logs_added} new log(s)"),
            PullOutcome::Skipped { reason } => println!("Pull skipped: {reason:?}"),
            PullOutcome::Failed { message } => println!("Pull failed, using local data: {message}"),
        },
        SyncAction::Push => {
            let mut outcome = reconciler.push().await;
            if let PushOutcome::SignedIn { user_id: Some(_) } = outcome {
                // First push from this device creates the identity; push again.
                outcome = reconciler.push().await;
            }
            match outcome {
                PushOutcome::Pushed { goals, logs } => {
                    println!("Pushed {goals} goal(s), {logs} log(s)")
                }
                PushOutcome::SignedIn { .. } => println!("Sign-in failed, changes kept locally"),
                PushOutcome::Skipped { reason } => println!("Push skipped: {reason:?}"),
                PushOutcome::Failed { message } => {
                    println!("Push failed, changes kept locally: {message}")
                }
            }
        }
        SyncAction::Status { json } => {
            let status = reconciler.status();
            if json {
                print_json(&status)?;
            } else {
                println!("Configured: {}", status.configured);
                println!("Online: {}", status.online);
                println!("Pending changes: {}", status.pending_count);
                match status.last_sync_at {
                    Some(at) => println!("Last sync: {}", at.to_rfc3339()),
                    None => println!("Last sync: never"),
                }
            }
        }
        SyncAction::ClearRemote { yes } => {
            if !yes {
                return Err("refusing to delete remote data without --yes".into());
            }
            reconciler.clear_remote().await?;
            println!("Remote data cleared");
        }
    }

    Ok(())
}
