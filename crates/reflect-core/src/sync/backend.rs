//! Remote backend contract and row mapping.
//!
//! The hosted backend stores one row per goal and per day log, keyed by
//! `(id, user_id)`, with snake_case columns. Everything here is transport
//! agnostic; [`super::SupabaseBackend`] speaks it over HTTP and
//! [`super::MemoryBackend`] keeps it in process.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DayLog, DayStatus, Goal, Objective};
use crate::notify::{NotificationPrefs, PushDelivery, PushSubscription};
use crate::sync::types::{Collection, SyncError};

/// Authenticated identity for the current device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// True when the token expires within `margin_secs`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|at| at - chrono::Duration::seconds(margin_secs) <= now)
    }
}

/// Remote `goals` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub quarter: String,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GoalRow {
    pub fn from_goal(goal: &Goal, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: goal.id.clone(),
            user_id: user_id.to_string(),
            name: goal.name.clone(),
            quarter: goal.quarter.clone(),
            objectives: goal.objectives.clone(),
            created_at: Some(goal.created_at.unwrap_or(now)),
            updated_at: Some(now),
        }
    }
}

impl From<GoalRow> for Goal {
    fn from(row: GoalRow) -> Self {
        Goal {
            id: row.id,
            name: row.name,
            quarter: row.quarter,
            objectives: row.objectives,
            created_at: row.created_at,
        }
    }
}

/// Remote `logs` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRow {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub objective_id: Option<String>,
    #[serde(default)]
    pub intention: Option<String>,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub status: Option<DayStatus>,
    #[serde(default)]
    pub closed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LogRow {
    pub fn from_log(log: &DayLog, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: log.id.clone(),
            user_id: user_id.to_string(),
            date: log.date,
            goal_id: log.goal_id.clone(),
            objective_id: log.obj_id.clone(),
            intention: log.intention.clone(),
            reflection: log.reflection.clone(),
            status: log.status,
            closed: log.closed,
            created_at: Some(log.created_at.unwrap_or(now)),
            updated_at: Some(now),
        }
    }
}

impl From<LogRow> for DayLog {
    fn from(row: LogRow) -> Self {
        DayLog {
            id: row.id,
            date: row.date,
            goal_id: row.goal_id,
            obj_id: row.objective_id,
            intention: row.intention,
            status: row.status,
            reflection: row.reflection,
            closed: row.closed,
            created_at: row.created_at,
        }
    }
}

/// Read/write contract of the hosted backend.
///
/// Implementations hold the current session in memory; the reconciler
/// persists it through the local store and hands it back on startup.
#[async_trait]
pub trait RemoteBackend: PushDelivery + Send + Sync {
    /// Current session, if any.
    fn session(&self) -> Option<AuthSession>;

    /// Install a session restored from local storage.
    fn restore_session(&self, session: AuthSession);

    fn user_id(&self) -> Option<String> {
        self.session().map(|s| s.user_id)
    }

    /// Create an anonymous user for this device and make it current.
    async fn sign_in_anonymously(&self, device_id: &str) -> Result<AuthSession, SyncError>;

    /// All goals of `user_id`, oldest first.
    async fn select_goals(&self, user_id: &str) -> Result<Vec<GoalRow>, SyncError>;

    /// All logs of `user_id`, newest date first.
    async fn select_logs(&self, user_id: &str) -> Result<Vec<LogRow>, SyncError>;

    /// Insert or merge rows on `(id, user_id)`.
    async fn upsert_goals(&self, rows: &[GoalRow]) -> Result<(), SyncError>;

    /// Insert or merge rows on `(id, user_id)`.
    async fn upsert_logs(&self, rows: &[LogRow]) -> Result<(), SyncError>;

    /// Remove every row of `collection` owned by `user_id`.
    async fn delete_for_user(&self, collection: Collection, user_id: &str)
        -> Result<(), SyncError>;

    /// Stored reminder preferences, `None` when the user has no subscription row.
    async fn get_prefs(&self, user_id: &str) -> Result<Option<NotificationPrefs>, SyncError>;

    async fn update_prefs(&self, user_id: &str, prefs: NotificationPrefs)
        -> Result<(), SyncError>;

    /// Register the device's push endpoint, one per user.
    async fn upsert_subscription(
        &self,
        user_id: &str,
        subscription: &PushSubscription,
        prefs: NotificationPrefs,
    ) -> Result<(), SyncError>;

    async fn delete_subscription(&self, user_id: &str) -> Result<(), SyncError>;
}
