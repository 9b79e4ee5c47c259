mod config;
pub mod migrations;
pub mod store;

pub use config::{BackendConfig, Config, RemindersConfig, SyncConfig};
pub use store::{Collection, LocalStore};

use std::path::PathBuf;

use crate::error::StorageError;

/// Returns `~/.config/reflect[-dev]/` based on REFLECT_ENV.
///
/// Set REFLECT_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("REFLECT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("reflect-dev")
    } else {
        base_dir.join("reflect")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| StorageError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
