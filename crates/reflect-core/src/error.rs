//! Core error types for reflect-core.
//!
//! This module defines the error hierarchy using thiserror. Validation
//! rejections, storage failures and configuration failures each get their
//! own enum; sync failures live in [`crate::sync::SyncError`] because the
//! reconciler swallows them instead of propagating.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncError;

/// Core error type for reflect-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors (user input rejected, state untouched)
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Sync errors surfaced by explicit backend calls (preferences, subscriptions)
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored document could not be encoded or decoded
    #[error("Corrupt value for key '{key}': {source}")]
    Encoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A collection write was rejected; the previous value is kept
    #[error("Failed to save {0}")]
    WriteFailed(&'static str),

    /// Could not resolve the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Validation errors.
///
/// Every variant is a rejected user action: the operation did not mutate
/// anything and the caller may re-present the same affordance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Intention text is empty")]
    EmptyIntention,

    #[error("Objective text is empty")]
    EmptyObjectiveText,

    #[error("Max {max} objectives per goal")]
    ObjectiveCapReached { goal_id: String, max: usize },

    #[error("Unknown goal: {0}")]
    UnknownGoal(String),

    #[error("Unknown objective '{objective_id}' in goal '{goal_id}'")]
    UnknownObjective {
        goal_id: String,
        objective_id: String,
    },

    #[error("Objective '{0}' is already completed")]
    ObjectiveCompleted(String),

    #[error("Day {0} is already closed")]
    DayClosed(NaiveDate),

    #[error("No intention recorded for {0}")]
    NotIntended(NaiveDate),

    #[error("At least one goal name is required")]
    NoGoalNames,

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Previous objective done!")]
    NothingToRepeat,

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
