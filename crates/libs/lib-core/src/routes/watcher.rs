//! File watcher that reloads the route table when the document changes.

use super::{ConfigError, RouteTableHandle};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Debounce for editors that write a file in several steps.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Background reload task fed by a `notify` watcher.
///
/// The notify callback filters events down to the watched file and bumps a `watch` counter,
/// so any burst of changes coalesces into one pending reload and none is lost. Dropping the
/// watcher (via [`RouteWatcher::stop`] or drop) drops the sender and the task exits.
pub struct RouteWatcher {
    watcher: Option<notify::RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl RouteWatcher {
    /// Watch `path` (through its parent directory, so atomic renames are seen) and reload
    /// `handle` on every modify/create event for that file.
    pub fn spawn(handle: Arc<RouteTableHandle>, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| ConfigError::Io(format!("{}: not a file path", path.display())))?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = tokio::sync::watch::channel(0u64);

        let mut watcher = notify::recommended_watcher(move |event: Result<Event, notify::Error>| {
            let Ok(event) = event else { return };
            if is_relevant(&event, &file_name) {
                tx.send_modify(|pending| *pending = pending.wrapping_add(1));
            }
        })
        .map_err(|e| ConfigError::Io(format!("failed to create file watcher: {e}")))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Io(format!("failed to watch {}: {e}", dir.display())))?;

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                tokio::time::sleep(DEBOUNCE).await;
                rx.borrow_and_update();

                match handle.reload_from_file(&path) {
                    Ok(version) => {
                        tracing::debug!(version, "[ROUTES] Document change handled");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "[ROUTES] Auto-reload failed, continuing with current table");
                    }
                }
            }
            tracing::info!("[ROUTES] Watcher stopped");
        });

        tracing::info!(dir = %dir.display(), "[ROUTES] Auto-reload enabled");

        Ok(Self {
            watcher: Some(watcher),
            task,
        })
    }

    /// Stop watching and wait for the reload task to finish.
    pub async fn stop(mut self) {
        self.watcher.take();
        let _ = (&mut self.task).await;
    }
}

fn is_relevant(event: &Event, file_name: &OsStr) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event.paths.iter().any(|p| p.file_name() == Some(file_name))
}
