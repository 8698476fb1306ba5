use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::error::{Context, Result};

/// The active `(provider, model)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Selection {
    pub provider_type: String,
    pub model: String,
}

impl Selection {
    pub fn new(provider_type: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            model: model.into(),
        }
    }
}

/// Caller-owned storage for the selection.
///
/// The resolver reads through the getters and proposes writes through the
/// setters; it never caches the values itself.
pub trait SelectionStore: Send {
    fn provider_type(&self) -> String;
    fn model(&self) -> String;
    fn set_provider_type(&mut self, provider_type: String);
    fn set_model(&mut self, model: String);

    fn snapshot(&self) -> Selection {
        Selection {
            provider_type: self.provider_type(),
            model: self.model(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySelection {
    inner: Selection,
}

impl InMemorySelection {
    pub fn new(selection: Selection) -> Self {
        Self { inner: selection }
    }
}

impl SelectionStore for InMemorySelection {
    fn provider_type(&self) -> String {
        self.inner.provider_type.clone()
    }

    fn model(&self) -> String {
        self.inner.model.clone()
    }

    fn set_provider_type(&mut self, provider_type: String) {
        self.inner.provider_type = provider_type;
    }

    fn set_model(&mut self, model: String) {
        self.inner.model = model;
    }
}

/// Selection persisted as JSON at `~/.config/modelswitch/selection.json`.
///
/// Writes go straight to disk. A failed write is logged and the in-memory
/// value still changes, so the session never sees an error.
#[derive(Debug, Clone)]
pub struct FileSelectionStore {
    inner: Arc<Mutex<FileSelectionInner>>,
}

#[derive(Debug)]
struct FileSelectionInner {
    path: PathBuf,
    current: Selection,
}

impl FileSelectionStore {
    /// Open the store at the default location.
    pub fn open_default() -> Self {
        let path = modelswitch_config::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config/modelswitch"))
            .join("selection.json");
        Self::open(path)
    }

    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let current = match read_selection(&path) {
            Ok(Some(selection)) => selection,
            Ok(None) => Selection::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable selection file");
                Selection::default()
            },
        };
        Self {
            inner: Arc::new(Mutex::new(FileSelectionInner { path, current })),
        }
    }

    /// Seed an empty store with an initial selection without touching disk.
    #[must_use]
    pub fn with_fallback(self, fallback: Selection) -> Self {
        {
            let mut guard = self.lock();
            if guard.current.provider_type.is_empty() {
                guard.current.provider_type = fallback.provider_type;
            }
            if guard.current.model.is_empty() {
                guard.current.model = fallback.model;
            }
        }
        self
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FileSelectionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut Selection)) {
        let mut guard = self.lock();
        f(&mut guard.current);
        if let Err(e) = write_selection(&guard.path, &guard.current) {
            warn!(path = %guard.path.display(), error = %e, "failed to persist selection");
        }
    }
}

impl SelectionStore for FileSelectionStore {
    fn provider_type(&self) -> String {
        self.lock().current.provider_type.clone()
    }

    fn model(&self) -> String {
        self.lock().current.model.clone()
    }

    fn set_provider_type(&mut self, provider_type: String) {
        self.update(|s| s.provider_type = provider_type);
    }

    fn set_model(&mut self, model: String) {
        self.update(|s| s.model = model);
    }
}

fn read_selection(path: &Path) -> Result<Option<Selection>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    let selection = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(selection))
}

fn write_selection(path: &Path, selection: &Selection) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(selection)?;
    // Atomic replace via a sibling temp file.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    debug!(path = %path.display(), "selection persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_round_trip() {
        let mut store = InMemorySelection::default();
        store.set_provider_type("kiro".into());
        store.set_model("claude-sonnet-4".into());
        assert_eq!(store.snapshot(), Selection::new("kiro", "claude-sonnet-4"));
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("selection.json");

        let mut store = FileSelectionStore::open(path.clone());
        assert_eq!(store.snapshot(), Selection::default());
        store.set_provider_type("gemini".into());
        store.set_model("gemini-2.5-pro".into());

        let reopened = FileSelectionStore::open(path.clone());
        assert_eq!(reopened.snapshot(), Selection::new("gemini", "gemini-2.5-pro"));
        assert_eq!(reopened.path(), path);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileSelectionStore::open(path);
        assert_eq!(store.snapshot(), Selection::default());
    }

    #[test]
    fn fallback_only_fills_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.json");
        std::fs::write(&path, r#"{"providerType": "qwen"}"#).unwrap();

        let store = FileSelectionStore::open(path.clone())
            .with_fallback(Selection::new("kiro", "qwen-max"));
        assert_eq!(store.snapshot(), Selection::new("qwen", "qwen-max"));
        // Seeding does not write.
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"providerType": "qwen"}"#
        );
    }

    #[test]
    fn write_failure_still_updates_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("selection.json");
        std::fs::create_dir_all(&path).unwrap();

        let mut store = FileSelectionStore::open(path);
        store.set_model("gpt-5".into());
        assert_eq!(store.model(), "gpt-5");
    }
}
