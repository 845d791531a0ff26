use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::io::recovery::{RecoveryCategory, RecoveryEntry, log_recovery};
use crate::io::storage::{KeyValueStore, StorageError};
use crate::model::config::StorageKeys;
use crate::model::task::{Priority, SortBy, Subtask, Task, TaskFilter};
use crate::model::view::ViewState;
use crate::util::unicode::is_blank;

/// Schema version written alongside every successful save
pub const CURRENT_VERSION: &str = "1.0.0";

/// Error type for export/import and other fallible persistence calls
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("import data has no tasks array")]
    MissingTasks,
}

/// Why a persisted task element was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("not an object")]
    NotAnObject,
    #[error("missing or non-string id")]
    MissingId,
    #[error("missing or non-string title")]
    MissingTitle,
    #[error("title is blank")]
    BlankTitle,
    #[error("duplicate id {0}")]
    DuplicateId(String),
}

/// Backend availability and stored byte sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub available: bool,
    pub tasks_size: usize,
    pub state_size: usize,
    pub total_size: usize,
}

/// Backup envelope produced by [`TaskRepository::export`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportEnvelope<T> {
    version: String,
    export_date: DateTime<Utc>,
    tasks: T,
}

/// Reads and writes the task collection and view state through a backend.
pub struct TaskRepository {
    backend: Box<dyn KeyValueStore>,
    keys: StorageKeys,
    recovery_dir: Option<PathBuf>,
}

impl TaskRepository {
    pub fn new(backend: impl KeyValueStore + 'static, keys: StorageKeys) -> Self {
        TaskRepository {
            backend: Box::new(backend),
            keys,
            recovery_dir: None,
        }
    }

    /// Copy unreadable or unsaved payloads into the recovery log under `dir`.
    pub fn with_recovery_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recovery_dir = Some(dir.into());
        self
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Persist the whole collection. Returns false on any failure.
    pub fn save(&self, tasks: &[Task]) -> bool {
        let payload = match serde_json::to_string(tasks) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("could not serialize tasks: {}", e);
                return false;
            }
        };

        if !self.backend.is_available() {
            tracing::warn!(key = %self.keys.tasks, "storage unavailable, tasks not saved");
            self.record(
                RecoveryEntry::new(RecoveryCategory::Write, "tasks not saved", payload)
                    .field("Key", self.keys.tasks.clone())
                    .field("Error", StorageError::Unavailable.to_string()),
            );
            return false;
        }

        let written = self
            .backend
            .set(&self.keys.tasks, &payload)
            .and_then(|()| self.backend.set(&self.keys.version, CURRENT_VERSION));
        match written {
            Ok(()) => {
                tracing::debug!(count = tasks.len(), "saved tasks");
                true
            }
            Err(e) => {
                tracing::warn!(key = %self.keys.tasks, "could not save tasks: {}", e);
                self.record(
                    RecoveryEntry::new(RecoveryCategory::Write, "tasks not saved", payload)
                        .field("Key", self.keys.tasks.clone())
                        .field("Error", e.to_string()),
                );
                false
            }
        }
    }

    /// Load the persisted collection. Never fails: anything unreadable
    /// yields an empty (or partial) collection.
    pub fn load(&self) -> Vec<Task> {
        self.try_load().unwrap_or_else(|e| {
            tracing::warn!(key = %self.keys.tasks, "could not read tasks: {}", e);
            Vec::new()
        })
    }

    /// Like `load`, but a backend that cannot be read is an error rather
    /// than an empty collection. Corrupt payloads are still moved to the
    /// recovery log and cleared.
    pub fn try_load(&self) -> Result<Vec<Task>, StorageError> {
        let stored = match self.backend.get(&self.keys.tasks) {
            Ok(Some(s)) => s,
            Ok(None) => return Ok(Vec::new()),
            Err(StorageError::NotUtf8 { lossy, .. }) => {
                return Ok(self.discard_corrupt(lossy, "not valid UTF-8"));
            }
            Err(e) => return Err(e),
        };

        let parsed: Value = match serde_json::from_str(&stored) {
            Ok(v) => v,
            Err(e) => return Ok(self.discard_corrupt(stored, &e.to_string())),
        };

        Ok(match parsed {
            Value::Array(items) => validate_tasks(&items),
            Value::Null => Vec::new(),
            _ => {
                tracing::warn!(key = %self.keys.tasks, "stored tasks are not an array");
                Vec::new()
            }
        })
    }

    /// Copy an unreadable payload to the recovery log and clear the key.
    fn discard_corrupt(&self, payload: String, error: &str) -> Vec<Task> {
        tracing::warn!(key = %self.keys.tasks, "stored tasks are unreadable: {}", error);
        self.record(
            RecoveryEntry::new(RecoveryCategory::Parse, "unreadable tasks cleared", payload)
                .field("Key", self.keys.tasks.clone())
                .field("Error", error),
        );
        if let Err(e) = self.backend.remove(&self.keys.tasks) {
            tracing::warn!(key = %self.keys.tasks, "could not clear corrupt tasks: {}", e);
        }
        Vec::new()
    }

    // -----------------------------------------------------------------------
    // View state
    // -----------------------------------------------------------------------

    pub fn save_view(&self, view: &ViewState) -> bool {
        let payload = match serde_json::to_string(view) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("could not serialize view state: {}", e);
                return false;
            }
        };
        match self.backend.set(&self.keys.state, &payload) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %self.keys.state, "could not save view state: {}", e);
                false
            }
        }
    }

    /// Load the view state; each unreadable field falls back to `defaults`.
    pub fn load_view(&self, defaults: &ViewState) -> ViewState {
        let stored = match self.backend.get(&self.keys.state) {
            Ok(Some(s)) => s,
            Ok(None) => return defaults.clone(),
            Err(e) => {
                tracing::warn!(key = %self.keys.state, "could not read view state: {}", e);
                return defaults.clone();
            }
        };
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&stored) else {
            tracing::warn!(key = %self.keys.state, "stored view state is unreadable");
            return defaults.clone();
        };

        let str_field = |name: &str| map.get(name).and_then(Value::as_str);
        ViewState {
            filter: str_field("filter")
                .and_then(TaskFilter::parse)
                .unwrap_or(defaults.filter),
            sort_by: str_field("sortBy")
                .and_then(SortBy::parse)
                .unwrap_or(defaults.sort_by),
            search_query: str_field("searchQuery")
                .map(str::to_string)
                .unwrap_or_else(|| defaults.search_query.clone()),
        }
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Remove every key this repository owns.
    pub fn clear(&self) -> bool {
        if !self.backend.is_available() {
            return false;
        }
        let mut ok = true;
        for key in self.keys.all() {
            if let Err(e) = self.backend.remove(key) {
                tracing::warn!(key, "could not remove key: {}", e);
                ok = false;
            }
        }
        ok
    }

    pub fn storage_info(&self) -> StorageInfo {
        if !self.backend.is_available() {
            return StorageInfo::default();
        }
        let size_of = |key: &str| {
            self.backend
                .get(key)
                .ok()
                .flatten()
                .map_or(0, |value| value.len())
        };
        let tasks_size = size_of(&self.keys.tasks);
        let state_size = size_of(&self.keys.state);
        StorageInfo {
            available: true,
            tasks_size,
            state_size,
            total_size: tasks_size + state_size,
        }
    }

    pub fn stored_version(&self) -> Option<String> {
        self.backend.get(&self.keys.version).ok().flatten()
    }

    pub fn needs_migration(&self) -> bool {
        self.backend.is_available() && self.stored_version().as_deref() != Some(CURRENT_VERSION)
    }

    /// Bring stored data up to [`CURRENT_VERSION`]. Only stamps the version
    /// for now; there is a single schema.
    pub fn migrate(&self) -> bool {
        if !self.backend.is_available() {
            return false;
        }
        let from = self.stored_version();
        match self.backend.set(&self.keys.version, CURRENT_VERSION) {
            Ok(()) => {
                tracing::debug!(from = from.as_deref().unwrap_or("none"), to = CURRENT_VERSION, "migrated storage");
                true
            }
            Err(e) => {
                tracing::warn!(key = %self.keys.version, "could not migrate storage: {}", e);
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Backup
    // -----------------------------------------------------------------------

    /// Serialize `tasks` into a versioned backup envelope.
    pub fn export(&self, tasks: &[Task]) -> Result<String, PersistError> {
        let envelope = ExportEnvelope {
            version: CURRENT_VERSION.to_string(),
            export_date: Utc::now(),
            tasks,
        };
        Ok(serde_json::to_string_pretty(&envelope)?)
    }

    /// Parse a backup envelope, validating tasks like [`TaskRepository::load`].
    pub fn import(&self, json: &str) -> Result<Vec<Task>, PersistError> {
        let parsed: Value = serde_json::from_str(json)?;
        match parsed.get("tasks") {
            Some(Value::Array(items)) => Ok(validate_tasks(items)),
            _ => Err(PersistError::MissingTasks),
        }
    }

    fn record(&self, entry: RecoveryEntry) {
        if let Some(dir) = &self.recovery_dir {
            log_recovery(dir, entry);
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a list of persisted elements, skipping (and logging) rejects.
/// Ids seen earlier in the list win over later duplicates.
pub fn validate_tasks(items: &[Value]) -> Vec<Task> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let result = validate_task(item).and_then(|task| {
            if seen.insert(task.id.clone()) {
                Ok(task)
            } else {
                Err(Rejection::DuplicateId(task.id))
            }
        });
        match result {
            Ok(task) => tasks.push(task),
            Err(reason) => tracing::warn!(index, "skipping stored task: {}", reason),
        }
    }
    tasks
}

/// Validate one persisted task element, applying lenient defaults.
pub fn validate_task(value: &Value) -> Result<Task, Rejection> {
    let obj = value.as_object().ok_or(Rejection::NotAnObject)?;
    let id = obj.get("id").and_then(Value::as_str).ok_or(Rejection::MissingId)?;
    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .ok_or(Rejection::MissingTitle)?;
    if is_blank(title) {
        return Err(Rejection::BlankTitle);
    }

    let created_at = obj
        .get("createdAt")
        .and_then(parse_timestamp)
        .unwrap_or(DateTime::UNIX_EPOCH);
    let mut task = Task::new(id.to_string(), title.to_string(), created_at);
    task.subtitle = optional_text(obj.get("subtitle"));
    task.description = optional_text(obj.get("description"));
    task.notes = optional_text(obj.get("notes"));
    task.priority = obj
        .get("priority")
        .and_then(Value::as_str)
        .and_then(Priority::parse)
        .unwrap_or_default();
    task.completed = obj.get("completed").and_then(Value::as_bool).unwrap_or(false);
    task.updated_at = obj.get("updatedAt").and_then(parse_timestamp);

    if let Some(Value::Array(subs)) = obj.get("subtasks") {
        let mut seen = HashSet::new();
        task.subtasks = subs
            .iter()
            .filter_map(validate_subtask)
            .filter(|s| seen.insert(s.id.clone()))
            .collect();
    }

    Ok(task)
}

fn validate_subtask(value: &Value) -> Option<Subtask> {
    let obj = value.as_object()?;
    let id = obj.get("id").and_then(Value::as_str)?;
    let title = obj.get("title").and_then(Value::as_str)?;
    if is_blank(title) {
        return None;
    }
    let created_at = obj
        .get("createdAt")
        .and_then(parse_timestamp)
        .unwrap_or(DateTime::UNIX_EPOCH);
    let mut sub = Subtask::new(id.to_string(), title.to_string(), created_at);
    sub.completed = obj.get("completed").and_then(Value::as_bool).unwrap_or(false);
    sub.updated_at = obj.get("updatedAt").and_then(parse_timestamp);
    Some(sub)
}

/// RFC 3339 strings, or milliseconds since the epoch.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !is_blank(s))
        .map(str::to_string)
}
