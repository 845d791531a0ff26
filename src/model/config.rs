use serde::{Deserialize, Serialize};

use super::task::{Priority, SortBy};

/// Configuration from taskpad.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub undo: UndoConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Prefix for every key written to the backend (`<prefix>.tasks`, ...)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            key_prefix: default_key_prefix(),
        }
    }
}

impl StorageConfig {
    pub fn keys(&self) -> StorageKeys {
        StorageKeys::with_prefix(&self.key_prefix)
    }
}

fn default_key_prefix() -> String {
    "taskpad".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Priority for tasks added without one
    #[serde(default)]
    pub priority: Priority,
    /// Sort mode used until the view state says otherwise
    #[serde(default)]
    pub sort_by: SortBy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoConfig {
    /// Maximum number of undo steps kept in memory. 0 disables undo.
    #[serde(default = "default_undo_limit")]
    pub limit: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        UndoConfig {
            limit: default_undo_limit(),
        }
    }
}

fn default_undo_limit() -> usize {
    100
}

/// The fixed keys the persistence adapter reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub tasks: String,
    pub state: String,
    pub version: String,
}

impl StorageKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        StorageKeys {
            tasks: format!("{}.tasks", prefix),
            state: format!("{}.state", prefix),
            version: format!("{}.version", prefix),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.tasks, &self.state, &self.version]
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        StorageConfig::default().keys()
    }
}
