//! TOML-based application configuration.
//!
//! Stores:
//! - Backend endpoint and public key (empty means local-only)
//! - Sync switches
//! - Reminder hours and the local UTC offset
//!
//! Configuration is stored at `~/.config/reflect/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

pub const ENV_BACKEND_URL: &str = "REFLECT_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "REFLECT_SUPABASE_ANON_KEY";

/// Hosted backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub pull_on_start: bool,
}

/// Reminder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_morning_hour")]
    pub morning_hour: u32,
    #[serde(default = "default_evening_hour")]
    pub evening_hour: u32,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    /// Offset of local wall-clock time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// IANA name reported with push subscriptions.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/reflect/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
}

// Default functions
fn default_true() -> bool {
    true
}
fn default_morning_hour() -> u32 {
    8
}
fn default_evening_hour() -> u32 {
    20
}
fn default_window_minutes() -> u32 {
    1
}
fn default_timezone() -> String {
    "UTC".into()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pull_on_start: true,
        }
    }
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            morning_hour: default_morning_hour(),
            evening_hour: default_evening_hour(),
            window_minutes: default_window_minutes(),
            utc_offset_minutes: 0,
            timezone: default_timezone(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<i64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(unknown());
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or return (and write) the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Returns error if key is unknown
    /// or the value does not fit the field.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// All leaf keys with their current values, in dot-path form.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let path = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&path, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.reminders;
        for (key, hour) in [
            ("reminders.morning_hour", r.morning_hour),
            ("reminders.evening_hour", r.evening_hour),
        ] {
            if hour > 23 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!("hour must be 0-23, got {hour}"),
                });
            }
        }
        if r.window_minutes == 0 || r.window_minutes > 60 {
            return Err(ConfigError::InvalidValue {
                key: "reminders.window_minutes".into(),
                message: format!("window must be 1-60 minutes, got {}", r.window_minutes),
            });
        }
        if r.utc_offset_minutes.abs() > 14 * 60 {
            return Err(ConfigError::InvalidValue {
                key: "reminders.utc_offset_minutes".into(),
                message: format!("offset out of range: {}", r.utc_offset_minutes),
            });
        }
        Ok(())
    }

    /// Backend URL after environment override; `None` means local-only.
    pub fn backend_url(&self) -> Option<String> {
        env_or(ENV_BACKEND_URL, &self.backend.url)
    }

    pub fn backend_anon_key(&self) -> Option<String> {
        env_or(ENV_ANON_KEY, &self.backend.anon_key)
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }
}

fn env_or(var: &str, configured: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| Some(configured.trim().to_string()).filter(|v| !v.is_empty()))
}
