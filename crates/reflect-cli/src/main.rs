use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{CommandResult, Context};

#[derive(Parser)]
#[command(name = "reflect", version, about = "Reflect: quarterly goals, one intention a day")]
struct Cli {
    /// Plan for this date instead of today (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quarter goals
    Goal {
        #[command(subcommand)]
        action: commands::goal::GoalAction,
    },
    /// Objectives within a goal
    Objective {
        #[command(subcommand)]
        action: commands::objective::ObjectiveAction,
    },
    /// Today's intention and close
    Day {
        #[command(subcommand)]
        action: commands::day::DayAction,
    },
    /// Weekly activity, stats and past quarters
    History {
        #[command(subcommand)]
        action: commands::history::HistoryAction,
    },
    /// Backend synchronization
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Reminders and push notifications
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(command: Commands, today: Option<NaiveDate>) -> CommandResult {
    // Config edits the file directly and never opens a store session.
    if let Commands::Config { action } = command {
        return commands::config::run(action);
    }
    let ctx = Context::open(today)?;
    let result = match command {
        Commands::Goal { action } => commands::goal::run(action, &ctx).await,
        Commands::Objective { action } => commands::objective::run(action, &ctx).await,
        Commands::Day { action } => commands::day::run(action, &ctx).await,
        Commands::History { action } => commands::history::run(action, &ctx).await,
        Commands::Sync { action } => commands::sync::run(action, &ctx).await,
        Commands::Notify { action } => commands::notify::run(action, &ctx).await,
        Commands::Config { .. } => unreachable!("handled before the session opens"),
    };
    ctx.finish().await;
    result
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Into::into)
        .and_then(|runtime| runtime.block_on(dispatch(cli.command, cli.today)));

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
