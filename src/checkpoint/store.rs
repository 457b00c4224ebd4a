//! On-disk checkpoint file.
//!
//! The file holds a single JSON object, `{"current": <index|null>}`. There is
//! no locking: one runner per checkpoint path is assumed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{CkupError, Result};

#[derive(Debug, Serialize)]
struct CheckpointFile {
    current: Option<usize>,
}

/// Reads and writes the persisted position of one workflow.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted position. A missing file means nothing completed.
    pub fn load(&self) -> Result<Option<usize>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CkupError::io(&self.path, e)),
        };

        let value: Value = serde_json::from_str(&content).map_err(|source| CkupError::Json {
            context: self.path.display().to_string(),
            output: content.clone(),
            source,
        })?;

        // serde would default a missing Option to None; a missing key is corruption
        let current = value
            .as_object()
            .ok_or_else(|| self.corrupt("expected a JSON object"))?
            .get("current")
            .ok_or_else(|| self.corrupt("missing `current` key"))?;

        match current {
            Value::Null => Ok(None),
            other => other
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.corrupt(format!("invalid `current` value: {other}"))),
        }
    }

    /// Persist `current`, creating the parent directory if needed.
    ///
    /// Written to a sibling temp file and renamed so a crash never leaves a
    /// truncated checkpoint behind.
    pub fn save(&self, current: usize) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| CkupError::io(parent, e))?;
        }

        let body = serde_json::to_string(&CheckpointFile {
            current: Some(current),
        })
        .map_err(|source| CkupError::Json {
            context: self.path.display().to_string(),
            output: String::new(),
            source,
        })?;

        let tmp = self.tmp_path();
        fs::write(&tmp, body).map_err(|e| CkupError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| CkupError::io(&self.path, e))?;

        debug!("Saved checkpoint {} to {}", current, self.path.display());
        Ok(())
    }

    /// Remove the checkpoint file. Already absent is fine.
    pub fn destroy(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed checkpoint {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CkupError::io(&self.path, e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: impl Into<String>) -> CkupError {
        CkupError::CheckpointCorrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("upgrade.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_creates_parent_and_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("upgrade.json");
        let store = CheckpointStore::new(&path);

        store.save(2).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"current":2}"#);
        assert_eq!(store.load().unwrap(), Some(2));
        assert!(!path.with_file_name("upgrade.json.tmp").exists());
    }

    #[test]
    fn test_load_null_current() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        fs::write(&path, r#"{"current": null}"#).unwrap();
        assert_eq!(CheckpointStore::new(&path).load().unwrap(), None);
    }

    #[test]
    fn test_load_missing_key_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        fs::write(&path, "{}").unwrap();
        let err = CheckpointStore::new(&path).load().unwrap_err();
        assert!(matches!(err, CkupError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        fs::write(&path, "{not json").unwrap();
        let err = CheckpointStore::new(&path).load().unwrap_err();
        assert!(matches!(err, CkupError::Json { .. }));
    }

    #[test]
    fn test_load_negative_current_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upgrade.json");
        fs::write(&path, r#"{"current": -1}"#).unwrap();
        let err = CheckpointStore::new(&path).load().unwrap_err();
        assert!(matches!(err, CkupError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_destroy_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("absent.json"));
        assert!(store.destroy().is_ok());
    }

    #[test]
    fn test_destroy_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("upgrade.json"));
        store.save(0).unwrap();
        store.destroy().unwrap();
        assert!(!store.path().exists());
    }
}
