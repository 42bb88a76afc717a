//! Detects the Riot Client starting and stopping by watching its lockfile.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::trigger::{Trigger, TriggerSender};

/// Tracks lockfile existence and reports only actual transitions
struct LockfileTracker {
    path: PathBuf,
    present: AtomicBool,
    tx: TriggerSender,
}

impl LockfileTracker {
    fn reconcile(&self) -> Option<Trigger> {
        let exists = self.path.exists();
        if self.present.swap(exists, Ordering::SeqCst) == exists {
            return None;
        }

        let trigger = if exists {
            tracing::info!("Riot Client launched");
            Trigger::Launched
        } else {
            tracing::info!("Riot Client exited");
            Trigger::Exited
        };
        let _ = self.tx.send(trigger);
        Some(trigger)
    }

    fn concerns(&self, path: &Path) -> bool {
        path == self.path || path.file_name() == self.path.file_name()
    }
}

/// Raises `Launched` / `Exited` triggers as the lockfile comes and goes
pub struct GameClientWatcher {
    tracker: Arc<LockfileTracker>,
    _watcher: Option<RecommendedWatcher>,
}

impl GameClientWatcher {
    /// Start watching `path`. The initial state is read synchronously and is
    /// not announced as a trigger; query it with [`Self::is_running`].
    pub fn start(path: PathBuf, tx: TriggerSender) -> Self {
        let present = path.exists();
        let tracker = Arc::new(LockfileTracker {
            path,
            present: AtomicBool::new(present),
            tx,
        });

        let watcher = match Self::watch(Arc::clone(&tracker)) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(
                    "Failed to watch {}, relying on polling: {}",
                    tracker.path.display(),
                    e
                );
                None
            }
        };

        tracing::debug!(
            "Watching lockfile {} (present: {})",
            tracker.path.display(),
            present
        );

        Self {
            tracker,
            _watcher: watcher,
        }
    }

    fn watch(tracker: Arc<LockfileTracker>) -> notify::Result<RecommendedWatcher> {
        // The lockfile itself cannot be watched while it does not exist
        let dir = tracker
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let callback_tracker = Arc::clone(&tracker);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    if event.paths.iter().any(|p| callback_tracker.concerns(p)) {
                        callback_tracker.reconcile();
                    }
                }
                Err(e) => tracing::warn!("Lockfile watcher error: {}", e),
            })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    pub fn is_running(&self) -> bool {
        self.tracker.present.load(Ordering::SeqCst)
    }

    /// Re-check the lockfile in case a filesystem event was missed
    pub fn reconcile(&self) -> Option<Trigger> {
        self.tracker.reconcile()
    }
}
