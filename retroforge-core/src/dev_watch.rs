//! Development-mode hot reload (§4.13 "Development-mode loading").
//!
//! Out of scope per §1: filesystem change *notification* is an external collaborator.
//! What's specified here is the interface the façade polls on the main thread each
//! tick, and a debounced, mtime-polling implementation of it — no OS file-event APIs,
//! just `std::fs::metadata` checked once per frame, which is enough to demonstrate
//! the debounce/reload contract deterministically in tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Debounce window: a reload fires at most once per this much wall time since the
/// last detected change (§4.13 "on debounced write events (>=500ms since last reload)").
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Something the façade can poll once per tick to learn "has this cart folder
/// changed since the last reload, and is the debounce window clear". Filesystem
/// watching itself is an external collaborator (§1); this trait is the seam.
pub trait DevWatcher: Send {
    /// Called once per tick from the main thread (never from a background watch
    /// thread, per §5). Returns `true` exactly once per debounced change.
    fn poll(&mut self, now: SystemTime) -> bool;

    /// The folder being watched.
    fn root(&self) -> &Path;
}

/// Polls `manifest.json` and every file under `assets/` for an mtime change,
/// debounced by `DEBOUNCE`. This stands in for a real filesystem-event watcher: the
/// façade still only ever reloads from its own tick, satisfying §5's "the file-watch
/// thread only sets an event drained on the next tick" even though there is no
/// separate thread here.
pub struct PollingWatcher {
    root: PathBuf,
    last_seen: HashMap<PathBuf, SystemTime>,
    last_reload: Option<SystemTime>,
}

impl PollingWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut watcher = PollingWatcher {
            root,
            last_seen: HashMap::new(),
            last_reload: None,
        };
        watcher.snapshot();
        watcher
    }

    fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.root.join("manifest.json")];
        let assets = self.root.join("assets");
        if let Ok(entries) = std::fs::read_dir(&assets) {
            for entry in entries.flatten() {
                paths.push(entry.path());
            }
        }
        paths
    }

    fn snapshot(&mut self) {
        self.last_seen.clear();
        for path in self.watched_paths() {
            if let Ok(meta) = std::fs::metadata(&path) {
                if let Ok(modified) = meta.modified() {
                    self.last_seen.insert(path, modified);
                }
            }
        }
    }

    fn changed_since_snapshot(&self) -> bool {
        for path in self.watched_paths() {
            let current = std::fs::metadata(&path).ok().and_then(|m| m.modified().ok());
            if current != self.last_seen.get(&path).copied() {
                return true;
            }
        }
        false
    }
}

impl DevWatcher for PollingWatcher {
    fn poll(&mut self, now: SystemTime) -> bool {
        if !self.changed_since_snapshot() {
            return false;
        }
        if let Some(last) = self.last_reload {
            if now.duration_since(last).unwrap_or(Duration::ZERO) < DEBOUNCE {
                return false;
            }
        }
        self.snapshot();
        self.last_reload = Some(now);
        true
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn unchanged_folder_never_fires() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("manifest.json"), "{}").unwrap();
        let mut watcher = PollingWatcher::new(dir.path());
        assert!(!watcher.poll(SystemTime::now()));
    }

    #[test]
    fn touched_file_fires_once_then_debounces() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("manifest.json"), "{}").unwrap();
        let mut watcher = PollingWatcher::new(dir.path());

        std::thread::sleep(Duration::from_millis(10));
        fs::write(dir.path().join("manifest.json"), "{\"title\":\"x\"}").unwrap();

        let t0 = SystemTime::now();
        assert!(watcher.poll(t0));
        assert!(!watcher.poll(t0 + Duration::from_millis(100)));
    }
}
