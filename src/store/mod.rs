pub mod listeners;
pub mod undo;

use chrono::{DateTime, Utc};

use crate::io::persistence::TaskRepository;
use crate::io::storage::file_stem_for_key;
use crate::io::watcher::StorageEvent;
use crate::model::config::AppConfig;
use crate::model::task::{
    Priority, SortBy, SubtaskPatch, Task, TaskDraft, TaskFilter, TaskPatch, TaskStats,
};
use crate::model::view::ViewState;
use crate::ops::query::{derive_view, task_stats};
use crate::ops::task_ops::{self, TaskError};

pub use listeners::{ListenerId, ListenerRegistry};
pub use undo::UndoStack;

/// The in-memory task collection plus its persistence and change listeners.
///
/// Every mutation either succeeds, in which case the collection is saved,
/// an undo step is recorded and listeners run once, or it is a no-op that
/// returns `false`/`None` and touches nothing.
pub struct TaskStore {
    repo: TaskRepository,
    tasks: Vec<Task>,
    view: ViewState,
    view_defaults: ViewState,
    default_priority: Priority,
    history: UndoStack,
    listeners: ListenerRegistry,
    persisted: bool,
}

impl TaskStore {
    /// Load the persisted collection and view state. Never fails: corrupt
    /// data is handled by the repository and yields an empty store.
    pub fn open(repo: TaskRepository, config: &AppConfig) -> Self {
        let view_defaults = ViewState {
            sort_by: config.defaults.sort_by,
            ..ViewState::default()
        };
        let tasks = repo.load();
        let view = repo.load_view(&view_defaults);
        tracing::debug!(count = tasks.len(), "opened task store");
        TaskStore {
            repo,
            tasks,
            view,
            view_defaults,
            default_priority: config.defaults.priority,
            history: UndoStack::new(config.undo.limit),
            listeners: ListenerRegistry::new(),
            persisted: true,
        }
    }

    pub fn repository(&self) -> &TaskRepository {
        &self.repo
    }

    /// False when the last successful mutation could not be saved.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    // -----------------------------------------------------------------------
    // Task mutations
    // -----------------------------------------------------------------------

    /// Prepend a new task. Returns its id, or None for a blank title.
    pub fn add_task(&mut self, draft: &TaskDraft) -> Option<String> {
        let priority = self.default_priority;
        self.mutate("add task", |tasks, now| {
            task_ops::add_task(tasks, draft, priority, now)
        })
    }

    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> bool {
        self.mutate("edit task", |tasks, now| {
            task_ops::update_task(tasks, id, patch, now)
        })
        .is_some()
    }

    pub fn toggle_task(&mut self, id: &str) -> bool {
        self.mutate("toggle task", |tasks, now| {
            task_ops::toggle_task(tasks, id, now)
        })
        .is_some()
    }

    pub fn delete_task(&mut self, id: &str) -> bool {
        self.mutate("delete task", |tasks, _| task_ops::delete_task(tasks, id))
            .is_some()
    }

    /// Move the task at index `from` to index `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        self.mutate("move task", |tasks, _| task_ops::move_task(tasks, from, to))
            .is_some()
    }

    pub fn reorder_by_ids(&mut self, ids: &[String]) -> bool {
        self.mutate("reorder tasks", |tasks, _| {
            task_ops::reorder_by_ids(tasks, ids)
        })
        .is_some()
    }

    /// Replace the whole collection, e.g. with imported tasks.
    pub fn replace_tasks(&mut self, replacement: Vec<Task>) -> bool {
        self.mutate("replace tasks", |tasks, _| {
            if *tasks == replacement {
                return Err(TaskError::Unchanged);
            }
            *tasks = replacement;
            Ok(())
        })
        .is_some()
    }

    // -----------------------------------------------------------------------
    // Subtask mutations
    // -----------------------------------------------------------------------

    pub fn add_subtask(&mut self, task_id: &str, title: &str) -> Option<String> {
        self.mutate("add subtask", |tasks, now| {
            task_ops::add_subtask(tasks, task_id, title, now)
        })
    }

    pub fn update_subtask(&mut self, task_id: &str, subtask_id: &str, patch: &SubtaskPatch) -> bool {
        self.mutate("edit subtask", |tasks, now| {
            task_ops::update_subtask(tasks, task_id, subtask_id, patch, now)
        })
        .is_some()
    }

    pub fn toggle_subtask(&mut self, task_id: &str, subtask_id: &str) -> bool {
        self.mutate("toggle subtask", |tasks, now| {
            task_ops::toggle_subtask(tasks, task_id, subtask_id, now)
        })
        .is_some()
    }

    pub fn delete_subtask(&mut self, task_id: &str, subtask_id: &str) -> bool {
        self.mutate("delete subtask", |tasks, now| {
            task_ops::delete_subtask(tasks, task_id, subtask_id, now)
        })
        .is_some()
    }

    // -----------------------------------------------------------------------
    // Bulk mutations
    // -----------------------------------------------------------------------

    /// Returns how many tasks changed.
    pub fn bulk_set_completed(&mut self, ids: &[String], completed: bool) -> usize {
        let label = if completed { "complete tasks" } else { "reopen tasks" };
        self.mutate(label, |tasks, now| {
            nonzero(task_ops::set_completed(tasks, ids, completed, now))
        })
        .unwrap_or(0)
    }

    /// Returns how many tasks were removed.
    pub fn bulk_delete(&mut self, ids: &[String]) -> usize {
        self.mutate("delete tasks", |tasks, _| {
            nonzero(task_ops::delete_where(tasks, |t| ids.contains(&t.id)).len())
        })
        .unwrap_or(0)
    }

    /// Remove every completed task. Returns how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        self.mutate("clear completed", |tasks, _| {
            nonzero(task_ops::delete_where(tasks, |t| t.completed).len())
        })
        .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------------

    /// Restore the collection as it was before the last mutation.
    /// Returns the label of the undone step.
    pub fn undo(&mut self) -> Option<String> {
        let (label, previous) = self.history.undo(&self.tasks)?;
        self.tasks = previous;
        tracing::debug!(label = %label, "undo");
        self.commit();
        Some(label)
    }

    pub fn redo(&mut self) -> Option<String> {
        let (label, next) = self.history.redo(&self.tasks)?;
        self.tasks = next;
        tracing::debug!(label = %label, "redo");
        self.commit();
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        task_ops::find_task(&self.tasks, id)
    }

    /// Filtered and searched, sorted by the current sort mode.
    pub fn filtered_tasks(&self, filter: TaskFilter, query: &str) -> Vec<Task> {
        derive_view(&self.tasks, filter, query, self.view.sort_by)
    }

    /// The collection as the current view state shows it.
    pub fn visible_tasks(&self) -> Vec<Task> {
        derive_view(
            &self.tasks,
            self.view.filter,
            &self.view.search_query,
            self.view.sort_by,
        )
    }

    pub fn stats(&self) -> TaskStats {
        task_stats(&self.tasks)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    // -----------------------------------------------------------------------
    // View state
    // -----------------------------------------------------------------------

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.view.filter = filter;
        self.repo.save_view(&self.view);
    }

    pub fn set_sort_by(&mut self, sort_by: SortBy) {
        self.view.sort_by = sort_by;
        self.repo.save_view(&self.view);
    }

    pub fn set_search_query(&mut self, query: &str) {
        self.view.search_query = query.to_string();
        self.repo.save_view(&self.view);
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register a callback run after every successful mutation.
    pub fn subscribe(&mut self, listener: impl FnMut() + 'static) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // External changes
    // -----------------------------------------------------------------------

    /// Reload the persisted collection. If it differs from memory, adopt it
    /// and notify. Nothing is written back. A backend that cannot be read
    /// leaves memory untouched.
    pub fn sync_from_storage(&mut self) -> bool {
        let loaded = match self.repo.try_load() {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!("could not reload tasks, keeping memory: {}", e);
                return false;
            }
        };
        if loaded == self.tasks {
            return false;
        }
        tracing::debug!(count = loaded.len(), "reloaded tasks from storage");
        self.tasks = loaded;
        self.persisted = true;
        self.history.push_sync_marker();
        self.listeners.notify();
        true
    }

    /// React to a change of one backend key made elsewhere.
    /// Returns true if the task collection changed.
    pub fn handle_storage_change(&mut self, key: &str) -> bool {
        let stem = file_stem_for_key(key);
        let keys = self.repo.keys();
        if stem == file_stem_for_key(&keys.tasks) {
            self.sync_from_storage()
        } else {
            if stem == file_stem_for_key(&keys.state) {
                self.view = self.repo.load_view(&self.view_defaults);
            }
            false
        }
    }

    /// Apply a batch reported by a `StorageWatcher`.
    pub fn handle_storage_event(&mut self, event: &StorageEvent) -> bool {
        let StorageEvent::Changed(keys) = event;
        let mut changed = false;
        for key in keys {
            changed |= self.handle_storage_change(key);
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn mutate<T>(
        &mut self,
        label: &str,
        op: impl FnOnce(&mut Vec<Task>, DateTime<Utc>) -> Result<T, TaskError>,
    ) -> Option<T> {
        let before = self.tasks.clone();
        match op(&mut self.tasks, Utc::now()) {
            Ok(value) => {
                tracing::debug!(label, count = self.tasks.len(), "mutation");
                self.history.record(label, before);
                self.commit();
                Some(value)
            }
            Err(e) => {
                tracing::debug!(label, "ignored: {}", e);
                self.tasks = before;
                None
            }
        }
    }

    /// Persist, then notify. A failed save keeps the in-memory state.
    fn commit(&mut self) {
        self.persisted = self.repo.save(&self.tasks);
        if !self.persisted {
            tracing::warn!("changes kept in memory only");
        }
        self.listeners.notify();
    }
}

fn nonzero(count: usize) -> Result<usize, TaskError> {
    if count == 0 {
        Err(TaskError::Unchanged)
    } else {
        Ok(count)
    }
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks.len())
            .field("view", &self.view)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::storage::{KeyValueStore, MemoryStorage};
    use crate::model::config::StorageKeys;
    use std::cell::Cell;
    use std::rc::Rc;

    fn open(storage: &MemoryStorage) -> TaskStore {
        let repo = TaskRepository::new(storage.clone(), StorageKeys::default());
        TaskStore::open(repo, &AppConfig::default())
    }

    fn counter(store: &mut TaskStore) -> Rc<Cell<usize>> {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        store.subscribe(move || c.set(c.get() + 1));
        count
    }

    #[test]
    fn failed_ops_do_not_notify_or_record() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let calls = counter(&mut store);

        assert_eq!(store.add_task(&TaskDraft::new("  ")), None);
        assert!(!store.toggle_task("missing"));
        assert!(!store.delete_task("missing"));
        assert!(!store.reorder(0, 0));
        assert_eq!(store.add_subtask("missing", "step"), None);
        assert_eq!(store.clear_completed(), 0);

        assert_eq!(calls.get(), 0);
        assert!(!store.can_undo());
        assert_eq!(storage.get("taskpad.tasks").unwrap(), None);
    }

    #[test]
    fn add_uses_configured_default_priority() {
        let storage = MemoryStorage::new();
        let repo = TaskRepository::new(storage.clone(), StorageKeys::default());
        let mut config = AppConfig::default();
        config.defaults.priority = Priority::Low;
        let mut store = TaskStore::open(repo, &config);

        let id = store.add_task(&TaskDraft::new("Water plants")).unwrap();
        assert_eq!(store.get_task(&id).unwrap().priority, Priority::Low);
        let id = store
            .add_task(&TaskDraft::new("Pay rent").priority(Priority::High))
            .unwrap();
        assert_eq!(store.get_task(&id).unwrap().priority, Priority::High);
    }

    #[test]
    fn undo_redo_label_and_persist() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let id = store.add_task(&TaskDraft::new("Buy milk")).unwrap();
        store.toggle_task(&id);

        assert_eq!(store.undo().as_deref(), Some("toggle task"));
        assert!(!store.get_task(&id).unwrap().completed);
        assert_eq!(store.undo().as_deref(), Some("add task"));
        assert!(store.is_empty());
        assert_eq!(store.undo(), None);

        assert_eq!(store.redo().as_deref(), Some("add task"));
        assert_eq!(open(&storage).tasks().len(), 1);
    }

    #[test]
    fn view_setters_persist_without_notifying() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let calls = counter(&mut store);

        store.set_filter(TaskFilter::Done);
        store.set_sort_by(SortBy::Created);
        store.set_search_query("milk");
        assert_eq!(calls.get(), 0);

        let reopened = open(&storage);
        assert_eq!(reopened.view().filter, TaskFilter::Done);
        assert_eq!(reopened.view().sort_by, SortBy::Created);
        assert_eq!(reopened.view().search_query, "milk");
    }

    #[test]
    fn visible_tasks_follow_view_state() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let milk = store.add_task(&TaskDraft::new("Buy milk")).unwrap();
        store.add_task(&TaskDraft::new("Buy bread")).unwrap();
        store.toggle_task(&milk);

        store.set_filter(TaskFilter::Active);
        let titles: Vec<String> = store.visible_tasks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["Buy bread"]);

        store.set_filter(TaskFilter::All);
        store.set_search_query("MILK");
        let titles: Vec<String> = store.visible_tasks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["Buy milk"]);
    }

    #[test]
    fn state_key_change_reloads_view_only() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let mut other = open(&storage);
        other.set_filter(TaskFilter::Active);

        assert!(!store.handle_storage_change("taskpad.state"));
        assert_eq!(store.view().filter, TaskFilter::Active);
        assert!(!store.handle_storage_change("unrelated"));
    }

    #[test]
    fn sync_blocks_undo_across_reload() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        store.add_task(&TaskDraft::new("Mine")).unwrap();

        let mut other = open(&storage);
        other.add_task(&TaskDraft::new("Theirs")).unwrap();

        assert!(store.sync_from_storage());
        assert_eq!(store.tasks().len(), 2);
        assert_eq!(store.undo(), None);
        assert_eq!(store.tasks().len(), 2);
    }

    #[test]
    fn handle_storage_event_batches_keys() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let mut other = open(&storage);
        other.add_task(&TaskDraft::new("Elsewhere")).unwrap();

        let event = StorageEvent::Changed(vec!["taskpad.version".into(), "taskpad.tasks".into()]);
        assert!(store.handle_storage_event(&event));
        assert!(!store.handle_storage_event(&event));
    }
}
