//! Turns a raw packet capture into hex payload lines.

use std::process::Stdio;

use log::debug;
use uuid::Uuid;

use super::command::CommandTemplate;
use super::types::CaptureArtifacts;
use crate::error_handling::types::{CaptureError, DecodeError, SessionError};

/// Runs `template` on the raw capture and writes its stdout to the hex file.
///
/// # Errors
///
/// * `SessionError::Spawn` if the export tool cannot be launched
/// * `SessionError::Decode` when the tool exits non-zero or its output
///   cannot be written
pub async fn export_capture(
    session_id: Uuid,
    template: &CommandTemplate,
    artifacts: &CaptureArtifacts,
) -> Result<(), SessionError> {
    let input = artifacts.capture_file.to_string_lossy();
    let (program, mut cmd) = template.to_command(&[("input", input.as_ref())]);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("[{}] Exporting capture: {:?}", session_id, cmd);
    let output = cmd
        .output()
        .await
        .map_err(|e| SessionError::Spawn(CaptureError::SpawnFailed { program, source: e }))?;

    let export_failed = |reason: String| {
        SessionError::Decode(DecodeError::Export(CaptureError::ExportFailed {
            input: artifacts.capture_file.clone(),
            reason,
        }))
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(export_failed(format!("{} ({})", output.status, stderr.trim())));
    }

    if let Err(e) = tokio::fs::write(&artifacts.hex_file, &output.stdout).await {
        return Err(export_failed(format!(
            "unable to write {}: {}",
            artifacts.hex_file.display(),
            e
        )));
    }

    debug!(
        "[{}] Exported {} byte(s) of hex lines to {}",
        session_id,
        output.stdout.len(),
        artifacts.hex_file.display()
    );
    Ok(())
}
