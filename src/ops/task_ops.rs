use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::task::{Priority, Subtask, SubtaskPatch, Task, TaskDraft, TaskPatch};
use crate::util::unicode::clean_text;

/// Error type for task operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("subtask not found: {0}")]
    SubtaskNotFound(String),
    #[error("ambiguous id prefix {0}: matches {1} tasks")]
    Ambiguous(String, usize),
    #[error("title is empty")]
    BlankTitle,
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("nothing to change")]
    Unchanged,
}

// ---------------------------------------------------------------------------
// Task CRUD
// ---------------------------------------------------------------------------

/// Prepend a new task built from `draft`. Returns the assigned ID.
pub fn add_task(
    tasks: &mut Vec<Task>,
    draft: &TaskDraft,
    default_priority: Priority,
    now: DateTime<Utc>,
) -> Result<String, TaskError> {
    let title = clean_text(&draft.title).ok_or(TaskError::BlankTitle)?;
    let id = generate_id(|candidate| tasks.iter().any(|t| t.id == candidate));

    let mut task = Task::new(id.clone(), title, now);
    task.subtitle = draft.subtitle.as_deref().and_then(clean_text);
    task.description = draft.description.as_deref().and_then(clean_text);
    task.notes = draft.notes.as_deref().and_then(clean_text);
    task.priority = draft.priority.unwrap_or(default_priority);

    tasks.insert(0, task);
    Ok(id)
}

/// Apply a partial update. A blank title rejects the whole patch.
pub fn update_task(
    tasks: &mut [Task],
    task_id: &str,
    patch: &TaskPatch,
    now: DateTime<Utc>,
) -> Result<(), TaskError> {
    let new_title = match &patch.title {
        Some(t) => Some(clean_text(t).ok_or(TaskError::BlankTitle)?),
        None => None,
    };
    let task = find_task_mut(tasks, task_id).ok_or_else(|| TaskError::NotFound(task_id.into()))?;

    let mut changed = false;
    if let Some(title) = new_title {
        changed |= replace(&mut task.title, title);
    }
    if let Some(s) = &patch.subtitle {
        changed |= replace(&mut task.subtitle, clean_text(s));
    }
    if let Some(s) = &patch.description {
        changed |= replace(&mut task.description, clean_text(s));
    }
    if let Some(s) = &patch.notes {
        changed |= replace(&mut task.notes, clean_text(s));
    }
    if let Some(p) = patch.priority {
        changed |= replace(&mut task.priority, p);
    }
    if let Some(c) = patch.completed {
        changed |= replace(&mut task.completed, c);
    }

    if !changed {
        return Err(TaskError::Unchanged);
    }
    task.touch(now);
    Ok(())
}

/// Flip completion. Returns the new value.
pub fn toggle_task(tasks: &mut [Task], task_id: &str, now: DateTime<Utc>) -> Result<bool, TaskError> {
    let task = find_task_mut(tasks, task_id).ok_or_else(|| TaskError::NotFound(task_id.into()))?;
    task.completed = !task.completed;
    task.touch(now);
    Ok(task.completed)
}

/// Remove a task, returning its former index and the task itself.
pub fn delete_task(tasks: &mut Vec<Task>, task_id: &str) -> Result<(usize, Task), TaskError> {
    let idx = position_of(tasks, task_id).ok_or_else(|| TaskError::NotFound(task_id.into()))?;
    Ok((idx, tasks.remove(idx)))
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Move the task at `from` so it ends up at index `to`.
pub fn move_task(tasks: &mut Vec<Task>, from: usize, to: usize) -> Result<(), TaskError> {
    let len = tasks.len();
    if from >= len || to >= len {
        return Err(TaskError::InvalidPosition(format!(
            "{} -> {} out of range for {} tasks",
            from, to, len
        )));
    }
    if from == to {
        return Err(TaskError::Unchanged);
    }
    let task = tasks.remove(from);
    tasks.insert(to, task);
    Ok(())
}

/// Reorder to match `ids`. Unknown and repeated ids are ignored; tasks not
/// named keep their relative order after the named ones.
pub fn reorder_by_ids(tasks: &mut Vec<Task>, ids: &[String]) -> Result<(), TaskError> {
    let before: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let mut remaining: Vec<Option<Task>> = std::mem::take(tasks).into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    for id in ids {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|t| t.id == *id))
        {
            ordered.extend(slot.take());
        }
    }
    ordered.extend(remaining.into_iter().flatten());
    *tasks = ordered;

    if tasks.iter().map(|t| &t.id).eq(before.iter()) {
        return Err(TaskError::Unchanged);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subtasks
// ---------------------------------------------------------------------------

/// Append a subtask to `task_id`. Returns the subtask ID.
pub fn add_subtask(
    tasks: &mut [Task],
    task_id: &str,
    title: &str,
    now: DateTime<Utc>,
) -> Result<String, TaskError> {
    let title = clean_text(title).ok_or(TaskError::BlankTitle)?;
    let parent = find_task_mut(tasks, task_id).ok_or_else(|| TaskError::NotFound(task_id.into()))?;

    let sub_id = generate_id(|candidate| parent.find_subtask(candidate).is_some());
    parent.subtasks.push(Subtask::new(sub_id.clone(), title, now));
    parent.touch(now);
    Ok(sub_id)
}

pub fn update_subtask(
    tasks: &mut [Task],
    task_id: &str,
    subtask_id: &str,
    patch: &SubtaskPatch,
    now: DateTime<Utc>,
) -> Result<(), TaskError> {
    let new_title = match &patch.title {
        Some(t) => Some(clean_text(t).ok_or(TaskError::BlankTitle)?),
        None => None,
    };
    let parent = find_task_mut(tasks, task_id).ok_or_else(|| TaskError::NotFound(task_id.into()))?;
    let sub = parent
        .find_subtask_mut(subtask_id)
        .ok_or_else(|| TaskError::SubtaskNotFound(subtask_id.into()))?;

    let mut changed = false;
    if let Some(title) = new_title {
        changed |= replace(&mut sub.title, title);
    }
    if let Some(c) = patch.completed {
        changed |= replace(&mut sub.completed, c);
    }
    if !changed {
        return Err(TaskError::Unchanged);
    }
    sub.updated_at = Some(now);
    parent.touch(now);
    Ok(())
}

/// Flip a subtask's completion. Returns the new value.
pub fn toggle_subtask(
    tasks: &mut [Task],
    task_id: &str,
    subtask_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, TaskError> {
    let parent = find_task_mut(tasks, task_id).ok_or_else(|| TaskError::NotFound(task_id.into()))?;
    let sub = parent
        .find_subtask_mut(subtask_id)
        .ok_or_else(|| TaskError::SubtaskNotFound(subtask_id.into()))?;
    sub.completed = !sub.completed;
    sub.updated_at = Some(now);
    let completed = sub.completed;
    parent.touch(now);
    Ok(completed)
}

pub fn delete_subtask(
    tasks: &mut [Task],
    task_id: &str,
    subtask_id: &str,
    now: DateTime<Utc>,
) -> Result<Subtask, TaskError> {
    let parent = find_task_mut(tasks, task_id).ok_or_else(|| TaskError::NotFound(task_id.into()))?;
    let idx = parent
        .subtasks
        .iter()
        .position(|s| s.id == subtask_id)
        .ok_or_else(|| TaskError::SubtaskNotFound(subtask_id.into()))?;
    let removed = parent.subtasks.remove(idx);
    parent.touch(now);
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Bulk operations
// ---------------------------------------------------------------------------

/// Set completion on every listed task. Returns how many actually changed.
pub fn set_completed(tasks: &mut [Task], ids: &[String], completed: bool, now: DateTime<Utc>) -> usize {
    let mut changed = 0;
    for task in tasks.iter_mut() {
        if task.completed != completed && ids.iter().any(|id| *id == task.id) {
            task.completed = completed;
            task.touch(now);
            changed += 1;
        }
    }
    changed
}

/// Remove every task matching `pred`. Returns the removed tasks in order.
pub fn delete_where(tasks: &mut Vec<Task>, mut pred: impl FnMut(&Task) -> bool) -> Vec<Task> {
    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(tasks.len());
    for task in std::mem::take(tasks) {
        if pred(&task) {
            removed.push(task);
        } else {
            kept.push(task);
        }
    }
    *tasks = kept;
    removed
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

pub fn find_task<'a>(tasks: &'a [Task], task_id: &str) -> Option<&'a Task> {
    tasks.iter().find(|t| t.id == task_id)
}

pub fn find_task_mut<'a>(tasks: &'a mut [Task], task_id: &str) -> Option<&'a mut Task> {
    tasks.iter_mut().find(|t| t.id == task_id)
}

pub fn position_of(tasks: &[Task], task_id: &str) -> Option<usize> {
    tasks.iter().position(|t| t.id == task_id)
}

/// Resolve a full ID or a unique ID prefix to the full task ID.
pub fn resolve_id<'a>(tasks: &'a [Task], prefix: &str) -> Result<&'a str, TaskError> {
    if let Some(task) = find_task(tasks, prefix) {
        return Ok(&task.id);
    }
    let mut matches = tasks.iter().filter(|t| t.id.starts_with(prefix));
    match (matches.next(), matches.count()) {
        (Some(task), 0) if !prefix.is_empty() => Ok(&task.id),
        (Some(_), rest) if !prefix.is_empty() => Err(TaskError::Ambiguous(prefix.into(), rest + 1)),
        _ => Err(TaskError::NotFound(prefix.into())),
    }
}

/// Resolve a subtask ID or unique prefix within one task.
pub fn resolve_subtask_id<'a>(task: &'a Task, prefix: &str) -> Result<&'a str, TaskError> {
    if let Some(sub) = task.find_subtask(prefix) {
        return Ok(&sub.id);
    }
    let mut matches = task.subtasks.iter().filter(|s| s.id.starts_with(prefix));
    match (matches.next(), matches.count()) {
        (Some(sub), 0) if !prefix.is_empty() => Ok(&sub.id),
        (Some(_), rest) if !prefix.is_empty() => Err(TaskError::Ambiguous(prefix.into(), rest + 1)),
        _ => Err(TaskError::SubtaskNotFound(prefix.into())),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A fresh random ID not already `taken`.
fn generate_id(taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = Uuid::new_v4().simple().to_string();
        if !taken(&id) {
            return id;
        }
    }
}

/// Assign if different; reports whether the value changed.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
