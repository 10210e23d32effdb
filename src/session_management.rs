//! Session management core module.
//!
//! A capture session listens for control datagrams, brackets an external
//! capture process between the start and stop signals, and delivers the
//! decoded capture exactly once.
//!
//! ```text
//! AwaitingStart --start--> Capturing --stop/timeout--> Stopping --> Completed | Failed
//!       |                                                              ^
//!       +--------------- bind error, spawn error, timeout -------------+
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod governor;
pub mod observer;
pub mod session;
pub mod session_controller;
pub mod session_handle;
pub mod types;

#[cfg(test)]
pub mod tests;

pub use governor::{decide, Decision, TimeoutGovernor};
pub use observer::{NoopObserver, SessionObserver};
pub use session_controller::{run_session, spawn_session};
pub use session_handle::{CancelHandle, SessionHandle};
pub use types::{CaptureReport, SessionEnd, SessionOutcome};

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    AwaitingStart,
    Capturing,
    Stopping,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingStart => "awaiting start",
            SessionState::Capturing => "capturing",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}
