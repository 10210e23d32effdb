use std::sync::Arc;

use log::error;

use crate::session_management::{CaptureReport, SessionObserver};
use crate::storage::storage_trait::RecordStorage;
use crate::storage::types::StoredCapture;

/// Persists every completed session. Failures are logged, never raised:
/// storage is downstream of the session's single delivery.
pub struct StorageObserver {
    storage: Arc<dyn RecordStorage>,
    host: String,
}

impl StorageObserver {
    pub fn new(storage: Arc<dyn RecordStorage>, host: &str) -> Self {
        Self {
            storage,
            host: host.to_string(),
        }
    }
}

impl SessionObserver for StorageObserver {
    fn on_stop(&self, report: &CaptureReport) {
        let stored = StoredCapture::new(report.clone(), &self.host);
        if let Err(e) = self.storage.save_capture(&stored) {
            error!("[{}] Unable to persist capture: {}", report.session_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_management::SessionEnd;
    use crate::storage::file_storage::FileStorage;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_completed_report_is_persisted() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage: Arc<dyn RecordStorage> = Arc::new(FileStorage::new(dir.path()).unwrap());
        let observer = StorageObserver::new(storage.clone(), "127.0.0.1");
        let report = CaptureReport {
            session_id: Uuid::new_v4(),
            end: SessionEnd::AutoStop,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            records: vec!["hello".into()],
            capture_file: None,
        };

        observer.on_data(&report.records);
        observer.on_stop(&report);

        let stored = storage.get_capture(report.session_id).unwrap();
        assert_eq!(stored.report, report);
        assert_eq!(stored.host, "127.0.0.1");
    }
}
