use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use super::SessionState;
use crate::data_capture::{CaptureArtifacts, CaptureProcess};

/// Mutable state of one capture session.
///
/// The capture handle is present exactly while the session is `Capturing` or
/// `Stopping`. Only [`Session::begin_capture`] installs it and only
/// [`Session::finish`] releases it, so the pairing cannot drift.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    state: SessionState,
    message_started: bool,
    capture: Option<CaptureProcess>,
    artifacts: Option<CaptureArtifacts>,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(id: Uuid, state_tx: watch::Sender<SessionState>) -> Self {
        state_tx.send_replace(SessionState::AwaitingStart);
        Self {
            id,
            started_at: Utc::now(),
            state: SessionState::AwaitingStart,
            message_started: false,
            capture: None,
            artifacts: None,
            state_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn message_started(&self) -> bool {
        self.message_started
    }

    /// Records that data arrived, in any non-terminal state.
    /// Returns `true` the first time.
    pub fn mark_message_started(&mut self) -> bool {
        if self.state.is_terminal() || self.message_started {
            return false;
        }
        self.message_started = true;
        true
    }

    pub fn begin_capture(&mut self, process: CaptureProcess, artifacts: CaptureArtifacts) {
        self.capture = Some(process);
        self.artifacts = Some(artifacts);
        self.transition(SessionState::Capturing);
    }

    /// Moves a running capture to `Stopping`. No-op without a capture.
    pub fn begin_stopping(&mut self) {
        if self.capture.is_some() && self.state == SessionState::Capturing {
            self.transition(SessionState::Stopping);
        }
    }

    pub fn capture_mut(&mut self) -> Option<&mut CaptureProcess> {
        self.capture.as_mut()
    }

    pub fn artifacts(&self) -> Option<&CaptureArtifacts> {
        self.artifacts.as_ref()
    }

    /// Terminal transition. Drops the (already reaped) capture handle.
    pub fn finish(&mut self, succeeded: bool) {
        self.capture = None;
        self.transition(if succeeded {
            SessionState::Completed
        } else {
            SessionState::Failed
        });
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = next;
        self.state_tx.send_replace(next);
    }
}
