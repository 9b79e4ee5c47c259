//! # Reflect Core Library
//!
//! Core logic for Reflect, a quarterly goal tracker with a daily
//! intention/reflection ritual. Everything is usable offline; an optional
//! hosted backend mirrors the data across devices. The `reflect` CLI is a thin
//! layer over this crate.
//!
//! ## Architecture
//!
//! - **Model**: goals with weighted objectives, one log per calendar day, and
//!   the derived quarter window
//! - **Lifecycle**: the per-day state machine (intend, skip, close, expire)
//! - **Storage**: SQLite key/value documents and TOML configuration
//! - **Sync**: local-first reconciliation against a remote backend
//! - **Notify**: reminder windows, preferences and push payloads
//!
//! ## Key Components
//!
//! - [`Planner`]: session context that runs every user action
//! - [`Reconciler`]: shared store handle plus pull/push against the backend
//! - [`LocalStore`]: persisted goals, logs and small settings
//! - [`Config`]: application configuration management

pub mod error;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod planner;
pub mod storage;
pub mod sync;
pub mod views;

pub use error::{ConfigError, CoreError, StorageError, ValidationError};
pub use model::{
    progress, DayLog, DayState, DayStatus, Difficulty, Goal, GoalsSnapshot, Objective, Outcome,
    Quarter, MAX_OBJECTIVES,
};
pub use notify::{NotificationPrefs, PushMessage, PushSubscription, ReminderKind, ReminderSchedule};
pub use planner::Planner;
pub use storage::{Collection, Config, LocalStore};
pub use sync::{
    MemoryBackend, PullOutcome, PushOutcome, Reconciler, RemoteBackend, SupabaseBackend,
    SyncError, SyncStatus,
};
