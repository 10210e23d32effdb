//! Signal-gated UDP capture sessions.
//!
//! A session binds a UDP control socket, starts an external packet capture
//! when the start token arrives, stops it on the stop token or when the
//! session budget runs out, and delivers the decoded capture exactly once.

pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod error_handling;
pub mod network;
pub mod session_management;
pub mod storage;

pub use configuration::{Config, SessionConfig};
pub use error_handling::types::{SessionError, SessionErrorKind};
pub use session_management::{
    run_session, spawn_session, CaptureReport, SessionEnd, SessionHandle, SessionObserver,
    SessionState,
};
