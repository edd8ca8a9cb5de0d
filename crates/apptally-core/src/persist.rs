use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::lock;

/// Outcome of reading one persisted document. A document that cannot be used
/// is never an error: the store starts empty and the reason is kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Missing,
    Corrupt(String),
}

impl LoadStatus {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, LoadStatus::Corrupt(_))
    }
}

/// A JSON document on disk. Writes go through a temp file and a rename, and
/// are serialized by a write lock so an older snapshot can never land after a
/// newer one.
///
/// The owner calls [`Self::mark_changed`] after every in-memory mutation;
/// the file then knows whether the state it was last written with is behind.
pub struct DocumentFile {
    path: PathBuf,
    write_lock: Mutex<()>,
    revision: AtomicU64,
    saved_revision: AtomicU64,
}

impl DocumentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            revision: AtomicU64::new(0),
            saved_revision: AtomicU64::new(0),
        }
    }

    /// Must be called after the mutation lands, never before.
    pub fn mark_changed(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts every [`Self::mark_changed`] call.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.saved_revision.load(Ordering::SeqCst) < self.revision()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document. Whatever the outcome, the caller is expected to
    /// replace its state with the returned value, so nothing counts as
    /// unsaved afterwards.
    pub fn load<T>(&self) -> (T, LoadStatus)
    where
        T: DeserializeOwned + Default,
    {
        let loaded = self.read::<T>();
        self.mark_saved(self.revision());
        loaded
    }

    fn read<T>(&self) -> (T, LoadStatus)
    where
        T: DeserializeOwned + Default,
    {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("{} not found, starting empty", self.path.display());
                return (T::default(), LoadStatus::Missing);
            }
            Err(err) => {
                let reason = format!("failed to read {}: {err}", self.path.display());
                log::warn!("{reason}; starting empty");
                return (T::default(), LoadStatus::Corrupt(reason));
            }
        };

        match serde_json::from_str::<T>(&text) {
            Ok(value) => (value, LoadStatus::Loaded),
            Err(err) => {
                let reason = format!("malformed document {}: {err}", self.path.display());
                log::warn!("{reason}; starting empty");
                (T::default(), LoadStatus::Corrupt(reason))
            }
        }
    }

    /// Holds the write lock while `render` produces the bytes, so callers can
    /// snapshot their state inside it and release their own lock before I/O.
    pub fn save_with(&self, render: impl FnOnce() -> Result<Vec<u8>>) -> Result<()> {
        let _guard = lock(&self.write_lock);
        // Read before rendering: a change that slips in between is written
        // but still reported as unsaved.
        let revision = self.revision();
        let bytes = render()?;
        write_replacing(&self.path, &bytes)?;
        self.mark_saved(revision);
        Ok(())
    }

    fn mark_saved(&self, revision: u64) {
        self.saved_revision.fetch_max(revision, Ordering::SeqCst);
    }
}

fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
    }

    let tmp_path = temp_path(path);
    fs::write(&tmp_path, bytes)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_default() {
        let dir = tempdir().unwrap();
        let file = DocumentFile::new(dir.path().join("absent.json"));

        let (value, status): (BTreeMap<String, u64>, _) = file.load();

        assert!(value.is_empty());
        assert_eq!(status, LoadStatus::Missing);
    }

    #[test]
    fn malformed_file_loads_default_and_reports() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let file = DocumentFile::new(&path);

        let (value, status): (BTreeMap<String, u64>, _) = file.load();

        assert!(value.is_empty());
        assert!(status.is_corrupt());
    }

    #[test]
    fn save_replaces_file_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let file = DocumentFile::new(&path);

        file.save_with(|| Ok(b"{\"a\": 1}".to_vec())).unwrap();
        file.save_with(|| Ok(b"{\"a\": 2}".to_vec())).unwrap();

        let (value, status): (BTreeMap<String, u64>, _) = file.load();
        assert_eq!(status, LoadStatus::Loaded);
        assert_eq!(value.get("a"), Some(&2));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn tracks_unsaved_changes_until_a_write_succeeds() {
        let dir = tempdir().unwrap();
        let blocked = dir.path().join("blocked");
        fs::create_dir(&blocked).unwrap();
        let file = DocumentFile::new(&blocked);
        assert!(!file.has_unsaved_changes());

        file.mark_changed();
        assert!(file.save_with(|| Ok(b"{}".to_vec())).is_err());
        assert!(file.has_unsaved_changes());

        let file = DocumentFile::new(dir.path().join("doc.json"));
        file.mark_changed();
        file.save_with(|| Ok(b"{}".to_vec())).unwrap();
        assert!(!file.has_unsaved_changes());
        assert_eq!(file.revision(), 1);
    }

    #[test]
    fn render_failure_leaves_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let file = DocumentFile::new(&path);
        file.save_with(|| Ok(b"{\"a\": 1}".to_vec())).unwrap();

        let result = file.save_with(|| anyhow::bail!("serialization failed"));

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\": 1}");
    }
}
