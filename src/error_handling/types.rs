use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlError(String),
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("Address error: {0}")]
    BadAddress(String),
    #[error("Signal configuration error: {0}")]
    BadSignal(String),
    #[error("Command template error: {0}")]
    BadCommand(String),
    #[error("Value out of range: {0}")]
    NotInRange(String),
}

/// Errors raised by the UDP signal channel.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Unable to resolve signal address {0}")]
    Resolve(String),
    #[error("Network bind error on {addr}: {source}")]
    BindError {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// The caller-supplied deadline elapsed before a datagram arrived.
    #[error("Timed out waiting for a datagram")]
    Timeout,
    #[error("Socket receive error: {0}")]
    ReceiveError(#[source] std::io::Error),
    #[error("Signal channel already closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to spawn `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to prepare capture directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Best-effort termination failed. Never fatal to a session.
    #[error("Failed to terminate capture process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },
    #[error("Failed waiting on capture process: {0}")]
    WaitFailed(#[source] std::io::Error),
    #[error("Capture process did not exit within {0:?}")]
    ExitTimeout(std::time::Duration),
    #[error("Export of {input} failed: {reason}")]
    ExportFailed { input: PathBuf, reason: String },
}

/// Malformed capture output. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unable to read capture file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Line {line}: odd number of hex digits ({len})")]
    OddLength { line: usize, len: usize },
    #[error("Line {line}: invalid hex character {character:?} at offset {index}")]
    InvalidHex {
        line: usize,
        character: char,
        index: usize,
    },
    #[error("Capture export produced unusable output: {0}")]
    Export(#[source] CaptureError),
}

/// Plain discriminant of [`SessionError`] for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    Config,
    Bind,
    Spawn,
    Timeout,
    Decode,
    Cancelled,
    Receive,
    Aborted,
}

/// Terminal failure of a capture session, delivered exactly once.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session configuration: {0}")]
    Config(#[source] ConfigError),
    #[error("Unable to open signal channel: {0}")]
    Bind(#[source] NetworkError),
    #[error("Unable to launch capture: {0}")]
    Spawn(#[source] CaptureError),
    #[error("Timeout reached after {seconds} seconds")]
    Timeout { seconds: u64 },
    #[error("Unable to decode capture output: {0}")]
    Decode(#[source] DecodeError),
    #[error("Session cancelled")]
    Cancelled,
    #[error("Signal channel failed: {0}")]
    Receive(#[source] NetworkError),
    #[error("Session worker aborted: {0}")]
    Aborted(String),
}

impl SessionError {
    pub fn kind(&self) -> SessionErrorKind {
        match self {
            SessionError::Config(_) => SessionErrorKind::Config,
            SessionError::Bind(_) => SessionErrorKind::Bind,
            SessionError::Spawn(_) => SessionErrorKind::Spawn,
            SessionError::Timeout { .. } => SessionErrorKind::Timeout,
            SessionError::Decode(_) => SessionErrorKind::Decode,
            SessionError::Cancelled => SessionErrorKind::Cancelled,
            SessionError::Receive(_) => SessionErrorKind::Receive,
            SessionError::Aborted(_) => SessionErrorKind::Aborted,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage write failed for {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Storage read failed for {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Stored capture is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No capture stored for session {0}")]
    NotFound(Uuid),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),
    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Output error: {0}")]
    OutputError(#[from] std::io::Error),
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

