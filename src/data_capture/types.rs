//! Common data types used across the data_capture subsystem.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::configuration::OutputFormat;

/// Configured sentinel tokens written around the decoded records.
///
/// The stop marker is written whenever a stop token is configured, including
/// sessions that ended through auto-stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMarkers {
    pub start: Option<String>,
    pub stop: Option<String>,
}

impl SignalMarkers {
    pub fn start_line(&self) -> Option<String> {
        self.start.as_ref().map(|s| format!("Start Signal: {}", s))
    }

    pub fn stop_line(&self) -> Option<String> {
        self.stop.as_ref().map(|s| format!("Stop Signal: {}", s))
    }
}

/// Files produced by one capture.
///
/// For [`OutputFormat::Hex`] the capture file is read directly and
/// `hex_file == capture_file`. For [`OutputFormat::Pcap`] the export step
/// writes the hex lines next to the raw capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureArtifacts {
    pub session_id: Uuid,
    pub format: OutputFormat,
    pub capture_file: PathBuf,
    pub hex_file: PathBuf,
}

impl CaptureArtifacts {
    /// Names the files as `capture_<YYYYmmdd_HHMMSS>_<short-id>.<ext>`.
    pub fn new(
        session_id: Uuid,
        output_dir: &Path,
        format: OutputFormat,
        started_at: DateTime<Utc>,
    ) -> Self {
        let short_id = session_id.simple().to_string();
        let stem = format!(
            "capture_{}_{}",
            started_at.format("%Y%m%d_%H%M%S"),
            &short_id[..8]
        );
        let capture_file = output_dir.join(format!("{}.{}", stem, format.extension()));
        let hex_file = capture_file.with_extension(OutputFormat::Hex.extension());
        Self {
            session_id,
            format,
            capture_file,
            hex_file,
        }
    }

    pub fn needs_export(&self) -> bool {
        self.format == OutputFormat::Pcap
    }

    /// Removes whatever capture files exist. Missing files are fine.
    pub fn remove_files(&self) {
        let mut paths = vec![&self.capture_file];
        if self.hex_file != self.capture_file {
            paths.push(&self.hex_file);
        }
        for path in paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("[{}] Removed {}", self.session_id, path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    "[{}] Unable to remove {}: {}",
                    self.session_id,
                    path.display(),
                    e
                ),
            }
        }
    }
}
