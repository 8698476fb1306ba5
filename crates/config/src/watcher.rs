//! Filesystem watcher for the active config file.
//!
//! Watches the directory holding the config file (editors usually replace the
//! file rather than write it in place) and reports changes to that one file.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    anyhow::Result,
    notify_debouncer_full::{
        DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
        notify::{EventKind, RecommendedWatcher, RecursiveMode},
    },
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

/// Events emitted by the config watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWatchEvent {
    /// The config file was created, modified, or removed.
    Changed(PathBuf),
}

/// Watches one config file with debouncing.
pub struct ConfigWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl ConfigWatcher {
    /// Start watching `path`. Returns the watcher and a receiver for events.
    ///
    /// The watcher must be kept alive (not dropped) for events to continue.
    pub fn start(path: PathBuf) -> Result<(Self, mpsc::UnboundedReceiver<ConfigWatchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| anyhow::anyhow!("config path has no file name: {}", path.display()))?;
        let dir = watched_dir(&path);

        let target = path.clone();
        let debouncer = new_debouncer(
            Duration::from_millis(300),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let changed = events.iter().any(|event| {
                        matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    });
                    if changed {
                        debug!(path = %target.display(), "config watcher event");
                        let _ = tx.send(ConfigWatchEvent::Changed(target.clone()));
                    }
                },
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "config watcher error");
                    }
                },
            },
        )?;

        let mut watcher = Self {
            _debouncer: debouncer,
        };

        if dir.exists() {
            watcher._debouncer.watch(&dir, RecursiveMode::NonRecursive)?;
            info!(path = %path.display(), "watching config file for changes");
        } else {
            warn!(dir = %dir.display(), "config directory missing, hot reload disabled");
        }

        Ok((watcher, rx))
    }
}

fn watched_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
