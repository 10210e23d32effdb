use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error_handling::types::SessionError;

/// Why a successful session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    StopSignal,
    /// The budget ran out after data had started.
    AutoStop,
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureReport {
    pub session_id: Uuid,
    pub end: SessionEnd,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Decoded records in capture order.
    pub records: Vec<String>,
    /// Raw capture, when kept on disk.
    pub capture_file: Option<PathBuf>,
}

pub type SessionOutcome = Result<CaptureReport, SessionError>;
