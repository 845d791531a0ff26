use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::io::persistence::StorageInfo;
use crate::io::recovery::RecoveryEntry;
use crate::model::task::{Priority, Subtask, Task, TaskStats};
use crate::util::unicode::{fit_to_width, truncate_to_width};

/// Title column width in one-line listings
pub const TITLE_WIDTH: usize = 48;

/// Characters of an id shown in listings
pub const SHORT_ID_LEN: usize = 8;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskJson {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub priority: Priority,
    pub completed: bool,
    pub created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<SubtaskJson>,
    /// Fields that matched the active search on their own
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct SubtaskJson {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

#[derive(Serialize)]
pub struct TaskListJson {
    pub filter: String,
    pub sort: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub search: String,
    pub tasks: Vec<TaskJson>,
}

#[derive(Serialize)]
pub struct StatsJson {
    #[serde(flatten)]
    pub stats: TaskStats,
    pub storage: StorageInfo,
}

#[derive(Serialize)]
pub struct ChangedJson {
    pub changed: usize,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn task_to_json(task: &Task) -> TaskJson {
    TaskJson {
        id: task.id.clone(),
        title: task.title.clone(),
        subtitle: task.subtitle.clone(),
        description: task.description.clone(),
        notes: task.notes.clone(),
        priority: task.priority,
        completed: task.completed,
        created: format_timestamp(task.created_at),
        updated: task.updated_at.map(format_timestamp),
        subtasks: task.subtasks.iter().map(subtask_to_json).collect(),
        matched: Vec::new(),
    }
}

fn subtask_to_json(sub: &Subtask) -> SubtaskJson {
    SubtaskJson {
        id: sub.id.clone(),
        title: sub.title.clone(),
        completed: sub.completed,
    }
}

pub fn recovery_to_json(entries: &[RecoveryEntry]) -> serde_json::Value {
    serde_json::Value::Array(entries.iter().map(RecoveryEntry::to_json).collect())
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn check_char(completed: bool) -> char {
    if completed { 'x' } else { ' ' }
}

fn subtask_progress(task: &Task) -> String {
    if task.subtasks.is_empty() {
        return String::new();
    }
    let done = task.subtasks.iter().filter(|s| s.completed).count();
    format!("  ({}/{})", done, task.subtasks.len())
}

/// Format a single task as a one-line summary
pub fn format_task_line(task: &Task) -> String {
    let line = format!(
        "[{}] {} {:<6} {}{}",
        check_char(task.completed),
        short_id(&task.id),
        task.priority.as_str(),
        fit_to_width(&task.title, TITLE_WIDTH),
        subtask_progress(task),
    );
    line.trim_end().to_string()
}

/// One-line summaries prefixed with the task's stored position
pub fn format_positioned_lines(tasks: &[Task]) -> Vec<String> {
    let width = tasks.len().saturating_sub(1).to_string().len();
    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| format!("{:>width$}  {}", i, format_task_line(task), width = width))
        .collect()
}

/// Format detailed task view
pub fn format_task_detail(task: &Task) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!("[{}] {}", check_char(task.completed), task.title));
    if let Some(subtitle) = &task.subtitle {
        lines.push(format!("    {}", subtitle));
    }
    lines.push(format!("id: {}", task.id));
    lines.push(format!("priority: {}", task.priority));
    lines.push(format!("created: {}", format_timestamp(task.created_at)));
    if let Some(updated) = task.updated_at {
        lines.push(format!("updated: {}", format_timestamp(updated)));
    }

    for (label, text) in [("description", &task.description), ("notes", &task.notes)] {
        if let Some(text) = text {
            lines.push(format!("{}:", label));
            for line in text.lines() {
                lines.push(format!("  {}", line));
            }
        }
    }

    if !task.subtasks.is_empty() {
        lines.push(String::new());
        lines.push("subtasks:".to_string());
        for sub in &task.subtasks {
            lines.push(format!(
                "  [{}] {} {}",
                check_char(sub.completed),
                short_id(&sub.id),
                truncate_to_width(&sub.title, TITLE_WIDTH)
            ));
        }
    }

    lines
}

pub fn format_stats(stats: &TaskStats, storage: &StorageInfo) -> Vec<String> {
    let mut lines = vec![format!(
        "{} tasks: {} active, {} done",
        stats.total, stats.active, stats.completed
    )];
    if storage.available {
        lines.push(format!(
            "storage: {} bytes ({} tasks, {} view)",
            storage.total_size, storage.tasks_size, storage.state_size
        ));
    } else {
        lines.push("storage: unavailable".to_string());
    }
    lines
}

pub fn format_recovery_entry(entry: &RecoveryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{}  {}  {}",
        format_timestamp(entry.timestamp),
        entry.category,
        entry.description
    )];
    for (key, value) in &entry.fields {
        lines.push(format!("  {}: {}", key, value));
    }
    for line in entry.body.lines() {
        lines.push(format!("  | {}", line));
    }
    lines
}
