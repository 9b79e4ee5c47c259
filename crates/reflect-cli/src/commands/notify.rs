//! Reminder preferences and push subscription commands.

use chrono::{DateTime, FixedOffset, Utc};
use clap::Subcommand;
use reflect_core::notify::{self, PushKeys};
use reflect_core::{PushMessage, PushSubscription, ReminderKind, ReminderSchedule};

use super::{print_json, CommandResult, Context};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Show reminder preferences
    Prefs {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Turn a reminder on or off
    Set {
        /// morning or evening
        kind: ReminderKind,
        /// on or off
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// List reminders due now (or at --at), optionally sending them
    Due {
        /// RFC 3339 timestamp to evaluate instead of now
        #[arg(long)]
        at: Option<DateTime<FixedOffset>>,
        /// Deliver each due reminder
        #[arg(long)]
        send: bool,
    },
    /// Register a browser push endpoint for this user
    Subscribe {
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        p256dh: String,
        #[arg(long)]
        auth: String,
        /// IANA timezone name; defaults to reminders.timezone
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Remove this user's push endpoint
    Unsubscribe,
    /// Send a test notification (or a reminder preset)
    Test {
        /// Send the morning or evening preset instead
        #[arg(long)]
        kind: Option<ReminderKind>,
    },
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

pub async fn run(action: NotifyAction, ctx: &Context) -> CommandResult {
    let reconciler = &ctx.reconciler;

    match action {
        NotifyAction::Prefs { json } => {
            let prefs = notify::load_prefs(reconciler).await;
            if json {
                print_json(&prefs)?;
            } else {
                let schedule = ReminderSchedule::from(&ctx.config.reminders);
                println!(
                    "morning  {:<3}  {:02}:00",
                    on_off(prefs.morning),
                    schedule.morning_hour
                );
                println!(
                    "evening  {:<3}  {:02}:00",
                    on_off(prefs.evening),
                    schedule.evening_hour
                );
            }
        }
        NotifyAction::Set { kind, enabled } => {
            let mut prefs = notify::load_prefs(reconciler).await;
            match kind {
                ReminderKind::Morning => prefs.morning = enabled,
                ReminderKind::Evening => prefs.evening = enabled,
            }
            notify::save_prefs(reconciler, prefs).await?;
            println!("{kind} reminder {}", on_off(enabled));
        }
        NotifyAction::Due { at, send } => {
            let now = at.map(|t| t.with_timezone(&Utc)).unwrap_or_else(Utc::now);
            let prefs = notify::load_prefs(reconciler).await;
            let schedule = ReminderSchedule::from(&ctx.config.reminders);
            let due = schedule.due(prefs, now);
            if due.is_empty() {
                println!("Nothing due");
            }
            for kind in due {
                if send {
                    notify::send(reconciler, &PushMessage::reminder(kind)).await?;
                    println!("{kind}: sent");
                } else {
                    println!("{kind}: due");
                }
            }
        }
        NotifyAction::Subscribe {
            endpoint,
            p256dh,
            auth,
            timezone,
        } => {
            let subscription = PushSubscription {
                endpoint,
                keys: PushKeys { p256dh, auth },
                timezone: timezone.unwrap_or_else(|| ctx.config.reminders.timezone.clone()),
            };
            notify::subscribe(reconciler, &subscription).await?;
            println!("Subscribed");
        }
        NotifyAction::Unsubscribe => {
            notify::unsubscribe(reconciler).await?;
            println!("Unsubscribed");
        }
        NotifyAction::Test { kind } => {
            let message = kind.map(PushMessage::reminder).unwrap_or_else(PushMessage::test);
            notify::send(reconciler, &message).await?;
            println!("Sent: {}", message.body);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_values() {
        assert_eq!(parse_switch("ON"), Ok(true));
        assert_eq!(parse_switch("off"), Ok(false));
        assert!(parse_switch("maybe").is_err());
    }
}
