use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::io::lock::LOCK_FILE;

/// Events sent from the directory watcher to the owning thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    /// Files for these backend key stems changed on disk.
    Changed(Vec<String>),
}

/// Watches a `FileStorage` directory for writes made by other processes.
pub struct StorageWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<StorageEvent>,
}

impl StorageWatcher {
    /// Start watching the given storage directory.
    /// Call `poll()` from the owning loop to collect changes.
    pub fn start(dir: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();
        let dir_owned = watch_target(dir);
        let target = dir_owned.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(_) => return,
                };

                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
                    _ => return,
                }

                let mut stems: Vec<String> = event
                    .paths
                    .iter()
                    .filter(|p| p.parent() == Some(dir_owned.as_path()))
                    .filter_map(|p| key_stem(p))
                    .collect();
                stems.dedup();

                if !stems.is_empty() {
                    let _ = tx.send(StorageEvent::Changed(stems));
                }
            },
            Config::default(),
        )?;

        watcher.watch(&target, RecursiveMode::NonRecursive)?;
        Ok(StorageWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Non-blocking poll for pending events (may be empty).
    pub fn poll(&self) -> Vec<StorageEvent> {
        let mut events = Vec::new();
        while let Ok(evt) = self.rx.try_recv() {
            events.push(evt);
        }
        events
    }
}

/// The key stem a path stores, or None for lock, temp and non-JSON files.
fn key_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name == LOCK_FILE || name.starts_with(".tmp") {
        return None;
    }
    name.strip_suffix(".json")
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// Event paths arrive resolved, so compare against the resolved directory.
fn watch_target(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf())
}
