//! Offline-first reconciler between the local store and the hosted backend.
//!
//! Local state is authoritative. Every local write lands in the store first,
//! is enqueued, and triggers a background push; a pull only ever appends
//! remote records that are absent locally. Sync failures never reach the
//! caller as errors: they are logged and the app keeps working locally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::model::{DayLog, Goal};
use crate::storage::{Collection, LocalStore};
use crate::sync::backend::{AuthSession, GoalRow, LogRow, RemoteBackend};
use crate::sync::device_id::get_or_create_device_id;
use crate::sync::merge::{merge_goals, merge_logs};
use crate::sync::sync_queue::SyncQueue;
use crate::sync::types::{PullOutcome, PushOutcome, SkipReason, SyncError, SyncStatus};

const SESSION_KEY: &str = "auth_session";
const LAST_SYNC_KEY: &str = "last_sync_at";

/// Held while a pull or push talks to the backend.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared sync context. Construct once and pass around as `Arc<Reconciler>`.
pub struct Reconciler {
    store: LocalStore,
    backend: Option<Box<dyn RemoteBackend>>,
    queue: Mutex<SyncQueue>,
    online: AtomicBool,
    syncing: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<PushOutcome>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("configured", &self.backend.is_some())
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Reconciler {
    /// Create a reconciler, restoring any saved backend session.
    pub fn new(store: LocalStore, backend: Option<Box<dyn RemoteBackend>>) -> Arc<Self> {
        if let Some(backend) = &backend {
            match store.read_json::<AuthSession>(SESSION_KEY) {
                Ok(Some(session)) => backend.restore_session(session),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "ignoring unreadable auth session"),
            }
        }
        Arc::new(Self {
            store,
            backend,
            queue: Mutex::new(SyncQueue::new()),
            online: AtomicBool::new(true),
            syncing: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// A reconciler with no backend: every sync is a no-op.
    pub fn local_only(store: LocalStore) -> Arc<Self> {
        Self::new(store, None)
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn backend(&self) -> Option<&dyn RemoteBackend> {
        self.backend.as_deref()
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record connectivity. Coming back online triggers a push.
    pub fn set_online(self: &Arc<Self>, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            tracing::debug!("back online, pushing local state");
            self.spawn_push();
        }
    }

    pub fn goals(&self) -> Vec<Goal> {
        self.store.goals()
    }

    pub fn logs(&self) -> Vec<DayLog> {
        self.store.logs()
    }

    /// Write goals locally, then mirror them in the background.
    pub fn set_goals(self: &Arc<Self>, goals: &[Goal]) -> bool {
        self.write(Collection::Goals, goals)
    }

    /// Write logs locally, then mirror them in the background.
    pub fn set_logs(self: &Arc<Self>, logs: &[DayLog]) -> bool {
        self.write(Collection::Logs, logs)
    }

    fn write<T: serde::Serialize>(self: &Arc<Self>, collection: Collection, records: &[T]) -> bool {
        if !self.store.set(collection, records) {
            return false;
        }
        if self.backend.is_some() {
            lock(&self.queue).enqueue(collection, records.len());
            self.spawn_push();
        }
        true
    }

    /// Fire-and-forget push. Needs a tokio runtime; without one the change
    /// stays queued for the next explicit push.
    fn spawn_push(self: &Arc<Self>) {
        if self.backend.is_none() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no async runtime, push deferred");
            return;
        };
        let this = Arc::clone(self);
        let task = handle.spawn(async move { this.push().await });
        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Wait for every background push spawned so far.
    pub async fn flush(&self) {
        loop {
            let pending = std::mem::take(&mut *lock(&self.tasks));
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "background push task failed");
                }
            }
        }
    }

    fn persist_session(&self, backend: &dyn RemoteBackend) {
        let Some(session) = backend.session() else {
            return;
        };
        let stored = self.store.read_json::<AuthSession>(SESSION_KEY).ok().flatten();
        if stored.as_ref() != Some(&session) {
            if let Err(e) = self.store.write_json(SESSION_KEY, &session) {
                tracing::warn!(error = %e, "failed to persist auth session");
            }
        }
    }

    async fn sign_in(&self, backend: &dyn RemoteBackend) -> Result<String, SyncError> {
        let device_id =
            get_or_create_device_id(&self.store).map_err(|e| SyncError::Local(e.to_string()))?;
        let session = backend.sign_in_anonymously(&device_id).await?;
        tracing::info!(user_id = %session.user_id, "signed in anonymously");
        self.persist_session(backend);
        Ok(session.user_id)
    }

    /// Current user id, signing in anonymously when there is none.
    pub async fn ensure_user(&self) -> Result<String, SyncError> {
        let backend = self.backend().ok_or(SyncError::NotConfigured)?;
        match backend.user_id() {
            Some(user_id) => Ok(user_id),
            None => self.sign_in(backend).await,
        }
    }

    fn mark_synced(&self, at: DateTime<Utc>) {
        if let Err(e) = self.store.write_json(LAST_SYNC_KEY, &at) {
            tracing::warn!(error = %e, "failed to record sync time");
        }
    }

    fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.store.read_json(LAST_SYNC_KEY).ok().flatten()
    }

    fn preflight(&self) -> Result<(&dyn RemoteBackend, SyncGuard<'_>), SkipReason> {
        let backend = self.backend().ok_or(SkipReason::NotConfigured)?;
        if !self.is_online() {
            return Err(SkipReason::Offline);
        }
        let guard = SyncGuard::acquire(&self.syncing).ok_or(SkipReason::InFlight)?;
        Ok((backend, guard))
    }

    /// Merge remote goals and logs into local state. Local always wins.
    pub async fn pull(&self) -> PullOutcome {
        let (backend, _guard) = match self.preflight() {
            Ok(ready) => ready,
            Err(reason) => {
                tracing::debug!(?reason, "pull skipped");
                return PullOutcome::Skipped { reason };
            }
        };
        let Some(user_id) = backend.user_id() else {
            tracing::debug!("pull skipped, no user");
            return PullOutcome::Skipped {
                reason: SkipReason::NoUser,
            };
        };

        let remote = async {
            let goals = backend.select_goals(&user_id).await?;
            let logs = backend.select_logs(&user_id).await?;
            Ok::<_, SyncError>((goals, logs))
        };
        let (remote_goals, remote_logs) = match remote.await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "pull failed, continuing with local data");
                return PullOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        // Read local only now, so writes made while fetching are kept.
        let (goals, goals_added) = merge_goals(
            self.store.goals(),
            remote_goals.into_iter().map(Goal::from).collect(),
        );
        let (logs, logs_added) = merge_logs(
            self.store.logs(),
            remote_logs.into_iter().map(DayLog::from).collect(),
        );
        if goals_added > 0 && !self.store.set(Collection::Goals, &goals) {
            return PullOutcome::Failed {
                message: "could not store merged goals".into(),
            };
        }
        if logs_added > 0 && !self.store.set(Collection::Logs, &logs) {
            return PullOutcome::Failed {
                message: "could not store merged logs".into(),
            };
        }

        self.persist_session(backend);
        self.mark_synced(Utc::now());
        tracing::info!(goals_added, logs_added, "pull complete");
        PullOutcome::Merged {
            goals_added,
            logs_added,
        }
    }

    /// Upsert the full local collections. A request while another sync is
    /// running is dropped, not queued.
    pub async fn push(&self) -> PushOutcome {
        let (backend, _guard) = match self.preflight() {
            Ok(ready) => ready,
            Err(reason) => {
                tracing::debug!(?reason, "push skipped");
                return PushOutcome::Skipped { reason };
            }
        };
        let Some(user_id) = backend.user_id() else {
            // The next trigger pushes under the new identity.
            return match self.sign_in(backend).await {
                Ok(user_id) => PushOutcome::SignedIn {
                    user_id: Some(user_id),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "anonymous sign-in failed");
                    PushOutcome::SignedIn { user_id: None }
                }
            };
        };

        let started = Utc::now();
        let goals: Vec<GoalRow> = self
            .store
            .goals()
            .iter()
            .map(|g| GoalRow::from_goal(g, &user_id, started))
            .collect();
        let logs: Vec<LogRow> = self
            .store
            .logs()
            .iter()
            .map(|l| LogRow::from_log(l, &user_id, started))
            .collect();

        let upload = async {
            if !goals.is_empty() {
                backend.upsert_goals(&goals).await?;
            }
            if !logs.is_empty() {
                backend.upsert_logs(&logs).await?;
            }
            Ok::<_, SyncError>(())
        };
        if let Err(e) = upload.await {
            tracing::warn!(error = %e, "push failed, changes stay local");
            return PushOutcome::Failed {
                message: e.to_string(),
            };
        }

        lock(&self.queue).clear_through(started);
        self.persist_session(backend);
        self.mark_synced(Utc::now());
        tracing::info!(goals = goals.len(), logs = logs.len(), "push complete");
        PushOutcome::Pushed {
            goals: goals.len(),
            logs: logs.len(),
        }
    }

    /// Delete every remote goal and log of the current user. Local data is
    /// untouched.
    pub async fn clear_remote(&self) -> Result<(), SyncError> {
        let backend = self.backend().ok_or(SyncError::NotConfigured)?;
        let user_id = backend.user_id().ok_or(SyncError::AuthenticationRequired)?;
        let _guard = SyncGuard::acquire(&self.syncing)
            .ok_or_else(|| SyncError::Local("a sync is in progress".into()))?;
        backend.delete_for_user(Collection::Goals, &user_id).await?;
        backend.delete_for_user(Collection::Logs, &user_id).await?;
        tracing::info!(%user_id, "remote data cleared");
        Ok(())
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            last_sync_at: self.last_sync_at(),
            pending_count: lock(&self.queue).len(),
            in_progress: self.syncing.load(Ordering::SeqCst),
            online: self.is_online(),
            configured: self.is_configured(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::MemoryBackend;

    fn reconciler(backend: MemoryBackend) -> Arc<Reconciler> {
        Reconciler::new(LocalStore::open_memory().unwrap(), Some(Box::new(backend)))
    }

    #[test]
    fn guard_is_single_flight() {
        let flag = AtomicBool::new(false);
        let first = SyncGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(SyncGuard::acquire(&flag).is_none());
        drop(first);
        assert!(SyncGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn local_only_sync_is_noop() {
        let r = Reconciler::local_only(LocalStore::open_memory().unwrap());
        assert!(r.set_goals(&[Goal::new("Solo", "Q1-2025")]));
        assert_eq!(
            r.pull().await,
            PullOutcome::Skipped {
                reason: SkipReason::NotConfigured
            }
        );
        assert_eq!(r.status().pending_count, 0);
        assert_eq!(r.goals().len(), 1);
    }

    #[tokio::test]
    async fn offline_push_is_skipped() {
        let backend = MemoryBackend::signed_in("u1");
        let r = reconciler(backend.clone());
        r.online.store(false, Ordering::SeqCst);
        assert_eq!(
            r.push().await,
            PushOutcome::Skipped {
                reason: SkipReason::Offline
            }
        );
        assert_eq!(backend.upsert_count(), 0);
    }

    #[tokio::test]
    async fn push_without_user_signs_in_and_returns() {
        let backend = MemoryBackend::new();
        let r = reconciler(backend.clone());
        r.store.set(Collection::Goals, &[Goal::new("G", "Q1-2025")]);

        let outcome = r.push().await;
        assert!(matches!(outcome, PushOutcome::SignedIn { user_id: Some(_) }));
        assert_eq!(backend.upsert_count(), 0);
        assert!(r.store.kv_get(SESSION_KEY).unwrap().is_some());

        assert!(r.push().await.is_pushed());
        assert_eq!(backend.goals().len(), 1);
    }

    #[tokio::test]
    async fn empty_collections_are_not_upserted() {
        let backend = MemoryBackend::signed_in("u1");
        let r = reconciler(backend.clone());
        assert_eq!(r.push().await, PushOutcome::Pushed { goals: 0, logs: 0 });
        assert_eq!(backend.upsert_count(), 0);
    }

    #[tokio::test]
    async fn failed_push_keeps_queue() {
        let backend = MemoryBackend::signed_in("u1");
        let r = reconciler(backend.clone());
        lock(&r.queue).enqueue(Collection::Goals, 1);
        r.store.set(Collection::Goals, &[Goal::new("G", "Q1-2025")]);
        backend.fail_next("503");

        assert!(matches!(r.push().await, PushOutcome::Failed { .. }));
        assert_eq!(r.status().pending_count, 1);
        assert!(r.status().last_sync_at.is_none());
    }

    #[tokio::test]
    async fn writes_push_in_background() {
        let backend = MemoryBackend::signed_in("u1");
        let r = reconciler(backend.clone());
        assert!(r.set_goals(&[Goal::new("Background", "Q1-2025")]));
        r.flush().await;

        assert_eq!(backend.goals()[0].name, "Background");
        assert_eq!(r.status().pending_count, 0);
        assert!(r.status().last_sync_at.is_some());
    }

    #[tokio::test]
    async fn session_survives_restart() {
        let store = LocalStore::open_memory().unwrap();
        store
            .write_json(
                SESSION_KEY,
                &AuthSession {
                    user_id: "persisted".into(),
                    access_token: "t".into(),
                    refresh_token: None,
                    expires_at: None,
                },
            )
            .unwrap();
        let r = Reconciler::new(store, Some(Box::new(MemoryBackend::new())));
        assert_eq!(r.backend().and_then(|b| b.user_id()).as_deref(), Some("persisted"));
    }
}
