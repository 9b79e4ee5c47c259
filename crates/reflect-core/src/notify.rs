//! Reminder preferences and the gate that decides whether a reminder may fire.
//!
//! Preferences live on the backend (one `push_subscriptions` row per user)
//! when a backend is configured, and in two local keys otherwise. Delivery
//! itself is a black box behind [`PushDelivery`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ValidationError};
use crate::storage::RemindersConfig;
use crate::sync::{Reconciler, SyncError};

pub const MORNING_KEY: &str = "notif_morning";
pub const EVENING_KEY: &str = "notif_evening";

/// Per-user reminder switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub morning: bool,
    pub evening: bool,
}

impl NotificationPrefs {
    pub fn enabled(&self, kind: ReminderKind) -> bool {
        match kind {
            ReminderKind::Morning => self.morning,
            ReminderKind::Evening => self.evening,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Morning,
    Evening,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::Morning, ReminderKind::Evening];
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderKind::Morning => write!(f, "morning"),
            ReminderKind::Evening => write!(f, "evening"),
        }
    }
}

impl FromStr for ReminderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(ReminderKind::Morning),
            "evening" => Ok(ReminderKind::Evening),
            other => Err(ValidationError::InvalidValue {
                field: "reminder".into(),
                message: format!("expected morning or evening, got '{other}'"),
            }),
        }
    }
}

/// When reminders fire, in the user's wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSchedule {
    pub morning_hour: u32,
    pub evening_hour: u32,
    pub window_minutes: u32,
    pub utc_offset_minutes: i32,
}

impl Default for ReminderSchedule {
    fn default() -> Self {
        Self {
            morning_hour: 8,
            evening_hour: 20,
            window_minutes: 1,
            utc_offset_minutes: 0,
        }
    }
}

impl From<&RemindersConfig> for ReminderSchedule {
    fn from(cfg: &RemindersConfig) -> Self {
        Self {
            morning_hour: cfg.morning_hour,
            evening_hour: cfg.evening_hour,
            window_minutes: cfg.window_minutes,
            utc_offset_minutes: cfg.utc_offset_minutes,
        }
    }
}

impl ReminderSchedule {
    pub fn hour(&self, kind: ReminderKind) -> u32 {
        match kind {
            ReminderKind::Morning => self.morning_hour,
            ReminderKind::Evening => self.evening_hour,
        }
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or(Utc.fix())
    }

    /// Local wall-clock time of `now`.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.offset()).time()
    }

    /// True inside `[hour:00, hour:00 + window)` local time.
    pub fn in_window(&self, kind: ReminderKind, now: DateTime<Utc>) -> bool {
        let local = self.local_time(now);
        local.hour() == self.hour(kind) && local.minute() < self.window_minutes
    }

    /// A reminder may fire only when enabled and inside its window.
    pub fn may_fire(&self, kind: ReminderKind, prefs: NotificationPrefs, now: DateTime<Utc>) -> bool {
        prefs.enabled(kind) && self.in_window(kind, now)
    }

    /// Every reminder that may fire at `now`.
    pub fn due(&self, prefs: NotificationPrefs, now: DateTime<Utc>) -> Vec<ReminderKind> {
        ReminderKind::ALL
            .into_iter()
            .filter(|kind| self.may_fire(*kind, prefs, now))
            .collect()
    }
}

/// Extra fields a notification click handler reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_title: Option<String>,
}

/// Payload handed to the delivery function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub data: PushData,
}

impl PushMessage {
    pub fn reminder(kind: ReminderKind) -> Self {
        match kind {
            ReminderKind::Morning => Self {
                title: "Reflect".into(),
                body: "Set your 60-second intention".into(),
                tag: "morning-reminder".into(),
                data: PushData {
                    kind: "morning".into(),
                    url: "/?view=morning".into(),
                    action: Some("morning".into()),
                    action_title: Some("Set Intention".into()),
                },
            },
            ReminderKind::Evening => Self {
                title: "Reflect".into(),
                body: "How did today go? Close your day".into(),
                tag: "evening-reminder".into(),
                data: PushData {
                    kind: "evening".into(),
                    url: "/?view=evening".into(),
                    action: Some("evening".into()),
                    action_title: Some("Close Day".into()),
                },
            },
        }
    }

    pub fn test() -> Self {
        Self {
            title: "Reflect - Test".into(),
            body: "This is a test notification!".into(),
            tag: "test-notification".into(),
            data: PushData {
                kind: "test".into(),
                url: "/?view=home".into(),
                action: None,
                action_title: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A browser push endpoint registered for the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
    pub timezone: String,
}

impl PushSubscription {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let endpoint_ok = url::Url::parse(&self.endpoint)
            .map(|u| u.scheme() == "https" || u.scheme() == "http")
            .unwrap_or(false);
        if !endpoint_ok {
            return Err(ValidationError::InvalidValue {
                field: "endpoint".into(),
                message: format!("not an http(s) URL: {}", self.endpoint),
            });
        }
        if self.keys.p256dh.trim().is_empty() || self.keys.auth.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "keys".into(),
                message: "p256dh and auth keys are required".into(),
            });
        }
        Ok(())
    }
}

/// Hands a message to the push service. Only success or failure matters.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    async fn deliver(&self, user_id: &str, message: &PushMessage) -> Result<(), SyncError>;
}

/// Current preferences.
///
/// Backend configured: the user's subscription row, or both off when there
/// is no user, no row, or the read fails. Otherwise the local keys.
pub async fn load_prefs(reconciler: &Reconciler) -> NotificationPrefs {
    let Some(backend) = reconciler.backend() else {
        let store = reconciler.store();
        let flag = |key: &str| {
            store
                .kv_get(key)
                .ok()
                .flatten()
                .is_some_and(|v| v == "true")
        };
        return NotificationPrefs {
            morning: flag(MORNING_KEY),
            evening: flag(EVENING_KEY),
        };
    };

    let Some(user_id) = backend.user_id() else {
        return NotificationPrefs::default();
    };
    match backend.get_prefs(&user_id).await {
        Ok(prefs) => prefs.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read notification preferences");
            NotificationPrefs::default()
        }
    }
}

/// Persist preferences.
///
/// # Errors
/// `AuthenticationRequired` when a backend is configured but no user exists,
/// backend failures, or local write failures.
pub async fn save_prefs(reconciler: &Reconciler, prefs: NotificationPrefs) -> Result<(), CoreError> {
    let Some(backend) = reconciler.backend() else {
        let store = reconciler.store();
        store.kv_set(MORNING_KEY, if prefs.morning { "true" } else { "false" })?;
        store.kv_set(EVENING_KEY, if prefs.evening { "true" } else { "false" })?;
        return Ok(());
    };

    let user_id = backend.user_id().ok_or(SyncError::AuthenticationRequired)?;
    backend.update_prefs(&user_id, prefs).await?;
    tracing::info!(morning = prefs.morning, evening = prefs.evening, "notification preferences saved");
    Ok(())
}

/// Register a push endpoint for the current user, signing in first if needed.
pub async fn subscribe(reconciler: &Reconciler, subscription: &PushSubscription) -> Result<(), CoreError> {
    subscription.validate()?;
    let backend = reconciler.backend().ok_or(SyncError::NotConfigured)?;
    let user_id = reconciler.ensure_user().await?;
    let prefs = load_prefs(reconciler).await;
    backend
        .upsert_subscription(&user_id, subscription, prefs)
        .await?;
    tracing::info!(endpoint = %subscription.endpoint, "push subscription registered");
    Ok(())
}

/// Remove the current user's push endpoint. No-op without a backend or user.
pub async fn unsubscribe(reconciler: &Reconciler) -> Result<(), CoreError> {
    let Some(backend) = reconciler.backend() else {
        return Ok(());
    };
    if let Some(user_id) = backend.user_id() {
        backend.delete_subscription(&user_id).await?;
    }
    Ok(())
}

/// Deliver `message` to the current user.
pub async fn send(reconciler: &Reconciler, message: &PushMessage) -> Result<(), CoreError> {
    let backend = reconciler.backend().ok_or(SyncError::NotConfigured)?;
    let user_id = backend.user_id().ok_or(SyncError::AuthenticationRequired)?;
    backend.deliver(&user_id, message).await?;
    Ok(())
}
