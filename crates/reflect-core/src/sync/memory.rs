//! In-process backend for offline development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use crate::notify::{NotificationPrefs, PushDelivery, PushMessage, PushSubscription};
use crate::sync::backend::{AuthSession, GoalRow, LogRow, RemoteBackend};
use crate::sync::types::{Collection, SyncError};

#[derive(Debug, Default)]
struct State {
    session: Option<AuthSession>,
    goals: Vec<GoalRow>,
    logs: Vec<LogRow>,
    subscriptions: HashMap<String, (PushSubscription, NotificationPrefs)>,
    delivered: Vec<(String, PushMessage)>,
    fail_next: Option<String>,
    fail_sign_in: bool,
}

/// Backend that keeps rows in memory.
///
/// Rows are keyed by `(id, user_id)` like the hosted tables. Failures can be
/// injected, and upserts can be held behind a gate to observe a sync in
/// flight.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    gate: Option<Arc<Semaphore>>,
    upserts: Arc<AtomicUsize>,
    sign_ins: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend with a signed-in user.
    pub fn signed_in(user_id: &str) -> Self {
        let backend = Self::new();
        backend.lock().session = Some(session_for(user_id));
        backend
    }

    /// Hold every upsert until a permit is added to the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next backend call fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.lock().fail_next = Some(message.into());
    }

    pub fn fail_sign_in(&self, fail: bool) {
        self.lock().fail_sign_in = fail;
    }

    pub fn sign_out(&self) {
        self.lock().session = None;
    }

    pub fn seed_goals(&self, rows: Vec<GoalRow>) {
        self.lock().goals.extend(rows);
    }

    pub fn seed_logs(&self, rows: Vec<LogRow>) {
        self.lock().logs.extend(rows);
    }

    pub fn goals(&self) -> Vec<GoalRow> {
        self.lock().goals.clone()
    }

    pub fn logs(&self) -> Vec<LogRow> {
        self.lock().logs.clone()
    }

    pub fn subscription(&self, user_id: &str) -> Option<(PushSubscription, NotificationPrefs)> {
        self.lock().subscriptions.get(user_id).cloned()
    }

    pub fn delivered(&self) -> Vec<(String, PushMessage)> {
        self.lock().delivered.clone()
    }

    /// Number of upsert calls that reached the store.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn sign_in_count(&self) -> usize {
        self.sign_ins.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), SyncError> {
        match self.lock().fail_next.take() {
            Some(message) => Err(SyncError::Injected(message)),
            None => Ok(()),
        }
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

fn session_for(user_id: &str) -> AuthSession {
    AuthSession {
        user_id: user_id.to_string(),
        access_token: format!("memory-{user_id}"),
        refresh_token: None,
        expires_at: None,
    }
}

fn upsert_by<T: Clone>(rows: &mut Vec<T>, incoming: &[T], same: impl Fn(&T, &T) -> bool) {
    for row in incoming {
        match rows.iter_mut().find(|existing| same(existing, row)) {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn session(&self) -> Option<AuthSession> {
        self.lock().session.clone()
    }

    fn restore_session(&self, session: AuthSession) {
        self.lock().session = Some(session);
    }

    async fn sign_in_anonymously(&self, _device_id: &str) -> Result<AuthSession, SyncError> {
        self.sign_ins.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let mut state = self.lock();
        if state.fail_sign_in {
            return Err(SyncError::Status {
                status: 422,
                body: "anonymous sign-ins are disabled".into(),
            });
        }
        let session = session_for(&uuid::Uuid::new_v4().to_string());
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn select_goals(&self, user_id: &str) -> Result<Vec<GoalRow>, SyncError> {
        self.check_failure()?;
        let mut rows: Vec<GoalRow> = self
            .lock()
            .goals
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    async fn select_logs(&self, user_id: &str) -> Result<Vec<LogRow>, SyncError> {
        self.check_failure()?;
        let mut rows: Vec<LogRow> = self
            .lock()
            .logs
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn upsert_goals(&self, rows: &[GoalRow]) -> Result<(), SyncError> {
        self.pass_gate().await;
        self.check_failure()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        upsert_by(&mut self.lock().goals, rows, |a, b| {
            a.id == b.id && a.user_id == b.user_id
        });
        Ok(())
    }

    async fn upsert_logs(&self, rows: &[LogRow]) -> Result<(), SyncError> {
        self.pass_gate().await;
        self.check_failure()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        upsert_by(&mut self.lock().logs, rows, |a, b| {
            a.id == b.id && a.user_id == b.user_id
        });
        Ok(())
    }

    async fn delete_for_user(&self, collection: Collection, user_id: &str) -> Result<(), SyncError> {
        self.check_failure()?;
        let mut state = self.lock();
        match collection {
            Collection::Goals => state.goals.retain(|r| r.user_id != user_id),
            Collection::Logs => state.logs.retain(|r| r.user_id != user_id),
        }
        Ok(())
    }

    async fn get_prefs(&self, user_id: &str) -> Result<Option<NotificationPrefs>, SyncError> {
        self.check_failure()?;
        Ok(self.lock().subscriptions.get(user_id).map(|(_, prefs)| *prefs))
    }

    async fn update_prefs(&self, user_id: &str, prefs: NotificationPrefs) -> Result<(), SyncError> {
        self.check_failure()?;
        // Like a filtered UPDATE: no row, nothing changes.
        if let Some(entry) = self.lock().subscriptions.get_mut(user_id) {
            entry.1 = prefs;
        }
        Ok(())
    }

    async fn upsert_subscription(
        &self,
        user_id: &str,
        subscription: &PushSubscription,
        prefs: NotificationPrefs,
    ) -> Result<(), SyncError> {
        self.check_failure()?;
        self.lock()
            .subscriptions
            .insert(user_id.to_string(), (subscription.clone(), prefs));
        Ok(())
    }

    async fn delete_subscription(&self, user_id: &str) -> Result<(), SyncError> {
        self.check_failure()?;
        self.lock().subscriptions.remove(user_id);
        Ok(())
    }
}

#[async_trait]
impl PushDelivery for MemoryBackend {
    async fn deliver(&self, user_id: &str, message: &PushMessage) -> Result<(), SyncError> {
        self.check_failure()?;
        let mut state = self.lock();
        if !state.subscriptions.contains_key(user_id) {
            return Err(SyncError::Status {
                status: 500,
                body: "Subscription not found".into(),
            });
        }
        state.delivered.push((user_id.to_string(), message.clone()));
        tracing::debug!(user_id, tag = %message.tag, at = %Utc::now(), "push delivered");
        Ok(())
    }
}
