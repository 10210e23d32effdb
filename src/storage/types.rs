use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session_management::CaptureReport;

/// A completed session as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCapture {
    #[serde(flatten)]
    pub report: CaptureReport,
    /// Host the session listened on.
    pub host: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredCapture {
    pub fn new(report: CaptureReport, host: &str) -> Self {
        Self {
            report,
            host: host.to_string(),
            saved_at: Utc::now(),
        }
    }
}
