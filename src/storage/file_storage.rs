use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::RecordStorage;
use crate::storage::types::StoredCapture;

/// Environment variable naming the storage directory.
pub const STORAGE_DIR_ENV: &str = "SIGCAP_STORAGE_DIR";

/// One JSON document per session under `<base>/captures/<session-id>.json`.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        let captures_dir = base_path.join("captures");
        fs::create_dir_all(&captures_dir).map_err(|e| {
            error!(
                "Failed to create captures dir {}: {}",
                captures_dir.display(),
                e
            );
            StorageError::WriteFailed {
                path: captures_dir.clone(),
                source: e,
            }
        })?;
        info!("FileStorage initialized at {}", base_path.display());
        Ok(Self { base_path })
    }

    /// FileStorage at `SIGCAP_STORAGE_DIR`, or `None` when it is unset.
    pub fn from_env() -> Result<Option<Self>, StorageError> {
        match std::env::var(STORAGE_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => {
                info!("Using FileStorage from {}: {}", STORAGE_DIR_ENV, dir);
                Self::new(PathBuf::from(dir)).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn captures_dir(&self) -> PathBuf {
        self.base_path.join("captures")
    }

    fn capture_path(&self, id: Uuid) -> PathBuf {
        self.captures_dir().join(format!("{}.json", id))
    }

    fn read_capture(&self, path: &Path) -> Result<StoredCapture, StorageError> {
        let content = fs::read(path).map_err(|e| StorageError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn stored_files(&self) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.captures_dir();
        let entries = fs::read_dir(&dir).map_err(|e| StorageError::ReadFailed {
            path: dir.clone(),
            source: e,
        })?;
        Ok(entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect())
    }
}

impl RecordStorage for FileStorage {
    fn save_capture(&self, capture: &StoredCapture) -> Result<(), StorageError> {
        let path = self.capture_path(capture.report.session_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(capture)?;

        fs::write(&tmp, body)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| {
                error!("Failed to write capture {}: {}", path.display(), e);
                StorageError::WriteFailed {
                    path: path.clone(),
                    source: e,
                }
            })?;
        info!(
            "Saved capture {} ({} record(s)) to {}",
            capture.report.session_id,
            capture.report.records.len(),
            path.display()
        );
        Ok(())
    }

    fn get_capture(&self, session_id: Uuid) -> Result<StoredCapture, StorageError> {
        let path = self.capture_path(session_id);
        if !path.exists() {
            return Err(StorageError::NotFound(session_id));
        }
        self.read_capture(&path)
    }

    fn list_captures(&self) -> Result<Vec<StoredCapture>, StorageError> {
        let mut captures = Vec::new();
        for path in self.stored_files()? {
            match self.read_capture(&path) {
                Ok(capture) => captures.push(capture),
                Err(e) => warn!("Skipping unreadable capture {}: {}", path.display(), e),
            }
        }
        captures.sort_by_key(|c| c.report.started_at);
        debug!("Loaded {} capture(s)", captures.len());
        Ok(captures)
    }

    fn cleanup_older_than(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut removed = 0usize;
        for path in self.stored_files()? {
            let Ok(capture) = self.read_capture(&path) else {
                continue;
            };
            if capture.report.finished_at < older_than {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
        info!(
            "Removed {} old capture(s) (cutoff: {})",
            removed,
            older_than.to_rfc3339()
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_management::{CaptureReport, SessionEnd};
    use chrono::Duration;
    use serial_test::serial;
    use tempfile::TempDir;

    fn capture(finished_at: DateTime<Utc>) -> StoredCapture {
        StoredCapture::new(
            CaptureReport {
                session_id: Uuid::new_v4(),
                end: SessionEnd::StopSignal,
                started_at: finished_at - Duration::seconds(3),
                finished_at,
                records: vec!["hello".into(), "world".into()],
                capture_file: None,
            },
            "127.0.0.1",
        )
    }

    #[test]
    fn test_save_and_get_capture() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let stored = capture(Utc::now());

        storage.save_capture(&stored).unwrap();
        let got = storage.get_capture(stored.report.session_id).unwrap();
        assert_eq!(got, stored);
        assert!(dir
            .path()
            .join("captures")
            .join(format!("{}.json", stored.report.session_id))
            .exists());
    }

    #[test]
    fn test_missing_capture_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let id = Uuid::new_v4();
        assert!(matches!(
            storage.get_capture(id),
            Err(StorageError::NotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn test_list_skips_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let older = capture(Utc::now() - Duration::hours(1));
        let newer = capture(Utc::now());
        storage.save_capture(&newer).unwrap();
        storage.save_capture(&older).unwrap();
        fs::write(dir.path().join("captures").join("broken.json"), b"{").unwrap();

        let all = storage.list_captures().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].report.session_id, older.report.session_id);
    }

    #[test]
    fn test_cleanup_older_than() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let old = capture(Utc::now() - Duration::days(3));
        let fresh = capture(Utc::now());
        storage.save_capture(&old).unwrap();
        storage.save_capture(&fresh).unwrap();

        let removed = storage
            .cleanup_older_than(Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(storage.get_capture(fresh.report.session_id).is_ok());
        assert!(storage.get_capture(old.report.session_id).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let dir = TempDir::new().unwrap();
        std::env::remove_var(STORAGE_DIR_ENV);
        assert!(FileStorage::from_env().unwrap().is_none());

        std::env::set_var(STORAGE_DIR_ENV, dir.path());
        let storage = FileStorage::from_env().unwrap().unwrap();
        std::env::remove_var(STORAGE_DIR_ENV);
        assert_eq!(storage.base_path(), dir.path());
    }
}
