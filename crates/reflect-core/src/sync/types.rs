//! Core types for backend synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::storage::Collection;

/// A local change waiting to be mirrored to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Which collection changed.
    pub collection: Collection,
    /// Number of records in the collection after the change.
    pub records: usize,
    pub updated_at: DateTime<Utc>,
}

/// Current sync status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Last successful sync timestamp.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Number of pending changes to sync.
    pub pending_count: usize,
    /// Whether a sync is currently in progress.
    pub in_progress: bool,
    pub online: bool,
    /// Whether a backend is configured at all.
    pub configured: bool,
}

/// Why a pull or push did not talk to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotConfigured,
    Offline,
    InFlight,
    NoUser,
}

/// Result of a pull. Never an error: failures degrade to local-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
    Skipped { reason: SkipReason },
    Merged { goals_added: usize, logs_added: usize },
    Failed { message: String },
}

/// Result of a push. Never an error: failures degrade to local-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PushOutcome {
    Skipped { reason: SkipReason },
    /// No user existed; an anonymous sign-in was attempted instead of a push.
    SignedIn { user_id: Option<String> },
    Pushed { goals: usize, logs: usize },
    Failed { message: String },
}

impl PushOutcome {
    pub fn is_pushed(&self) -> bool {
        matches!(self, PushOutcome::Pushed { .. })
    }
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Backend not configured")]
    NotConfigured,

    #[error("Local state error: {0}")]
    Local(String),

    #[error("Injected failure: {0}")]
    Injected(String),
}
