pub mod config;
pub mod day;
pub mod goal;
pub mod history;
pub mod notify;
pub mod objective;
pub mod sync;

use std::error::Error;
use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use reflect_core::{Config, LocalStore, Planner, Reconciler, RemoteBackend, SupabaseBackend};

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Everything a command needs: configuration, the shared reconciler and the
/// day being planned.
pub struct Context {
    pub config: Config,
    pub reconciler: Arc<Reconciler>,
    pub today: NaiveDate,
}

impl Context {
    pub fn open(today: Option<NaiveDate>) -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let store = LocalStore::open()?;
        let backend = backend_from(&config)?;
        Ok(Self {
            reconciler: Reconciler::new(store, backend),
            config,
            today: today.unwrap_or_else(|| Local::now().date_naive()),
        })
    }

    /// Run the load sequence, pulling first when configured to.
    pub async fn planner(&self) -> Planner {
        let (planner, pulled) = Planner::load(
            Arc::clone(&self.reconciler),
            self.today,
            Utc::now(),
            self.config.sync.pull_on_start,
        )
        .await;
        if let Some(outcome) = pulled {
            tracing::debug!(?outcome, "startup pull");
        }
        planner
    }

    /// Wait for background pushes before the process exits.
    pub async fn finish(&self) {
        self.reconciler.flush().await;
    }
}

fn backend_from(config: &Config) -> Result<Option<Box<dyn RemoteBackend>>, Box<dyn Error>> {
    if !config.sync.enabled {
        return Ok(None);
    }
    match (config.backend_url(), config.backend_anon_key()) {
        (Some(url), Some(key)) => Ok(Some(Box::new(SupabaseBackend::new(&url, key)?))),
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("backend url and anon key must both be set, running local-only");
            Ok(None)
        }
        (None, None) => Ok(None),
    }
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Short id for display; full ids are still accepted as arguments.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Resolve a possibly shortened id against `candidates`.
pub fn resolve_id<'a, I>(prefix: &str, candidates: I) -> Result<String, Box<dyn Error>>
where
    I: IntoIterator<Item = &'a str>,
{
    let matches: Vec<&str> = candidates
        .into_iter()
        .filter(|id| id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [one] => Ok((*one).to_string()),
        [] => Ok(prefix.to_string()),
        _ => Err(format!("ambiguous id prefix: {prefix}").into()),
    }
}
