use crate::model::task::Task;

/// One step of history: the collection as it was before a labelled mutation.
#[derive(Debug, Clone)]
enum Entry {
    Snapshot { label: String, tasks: Vec<Task> },
    /// Barrier left by a reload from storage. Undo never crosses it, so a
    /// local undo cannot overwrite changes made elsewhere.
    SyncMarker,
}

/// Snapshot-based undo/redo history bounded by `limit` steps.
#[derive(Debug, Clone)]
pub struct UndoStack {
    undo: Vec<Entry>,
    redo: Vec<Entry>,
    limit: usize,
}

impl UndoStack {
    pub fn new(limit: usize) -> Self {
        UndoStack {
            undo: Vec::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Record the state before a mutation. Clears the redo stack.
    pub fn record(&mut self, label: &str, before: Vec<Task>) {
        self.push(Entry::Snapshot {
            label: label.to_string(),
            tasks: before,
        });
    }

    /// Push a sync marker. Clears the redo stack.
    pub fn push_sync_marker(&mut self) {
        if self.undo.last().is_some_and(|e| matches!(e, Entry::SyncMarker)) {
            self.redo.clear();
            return;
        }
        self.push(Entry::SyncMarker);
    }

    fn push(&mut self, entry: Entry) {
        self.redo.clear();
        if self.limit == 0 {
            return;
        }
        self.undo.push(entry);
        if self.undo.len() > self.limit {
            self.undo.drain(..self.undo.len() - self.limit);
        }
    }

    /// Step back. Returns the label and the collection to restore;
    /// `current` is kept for redo.
    pub fn undo(&mut self, current: &[Task]) -> Option<(String, Vec<Task>)> {
        let (label, tasks) = match self.undo.pop()? {
            Entry::Snapshot { label, tasks } => (label, tasks),
            Entry::SyncMarker => {
                self.undo.push(Entry::SyncMarker);
                return None;
            }
        };
        self.redo.push(Entry::Snapshot {
            label: label.clone(),
            tasks: current.to_vec(),
        });
        Some((label, tasks))
    }

    /// Re-apply the last undone step.
    pub fn redo(&mut self, current: &[Task]) -> Option<(String, Vec<Task>)> {
        let (label, tasks) = match self.redo.pop()? {
            Entry::Snapshot { label, tasks } => (label, tasks),
            Entry::SyncMarker => return None,
        };
        self.undo.push(Entry::Snapshot {
            label: label.clone(),
            tasks: current.to_vec(),
        });
        Some((label, tasks))
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.undo.last(), Some(Entry::Snapshot { .. }))
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}
