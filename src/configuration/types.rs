use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Immutable settings for one capture session.
///
/// Either signal may be absent, in which case the matching transition is
/// disabled: without a start signal the session never leaves
/// `AwaitingStart` and always ends through the timeout governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bind host for control datagrams, also used to scope the capture filter.
    pub host: String,
    /// Bind port for control datagrams. `0` lets the OS pick one.
    pub port: u16,
    pub start_signal: Option<String>,
    pub stop_signal: Option<String>,
    /// Wall-clock budget for the whole session, in seconds.
    pub timeout_seconds: u64,
    /// Treat a timeout as a normal stop when data had already started.
    pub auto_stop_after_timeout: bool,
    /// Wrap the decoded records with the literal start/stop tokens.
    pub include_signals_in_message: bool,
    /// Raise diagnostic events from `debug` to `info`.
    pub verbose: bool,
    /// Read from the `[capture]` table of the config file, not from `[session]`.
    #[serde(skip)]
    pub capture: CaptureSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5005,
            start_signal: None,
            stop_signal: None,
            timeout_seconds: 30,
            auto_stop_after_timeout: true,
            include_signals_in_message: false,
            verbose: false,
            capture: CaptureSettings::default(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Format of the file the capture command leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Raw packet capture; an export command turns it into hex lines.
    Pcap,
    /// One hex-encoded payload per line, written directly by the capture command.
    Hex,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pcap => "pcap",
            OutputFormat::Hex => "hex",
        }
    }
}

/// How the external capture tool is launched, stopped and read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Capture argv with `{host}`, `{port}` and `{output}` placeholders.
    /// `None` selects the platform default at capture start.
    pub command: Option<Vec<String>>,
    pub output_format: OutputFormat,
    /// Export argv with an `{input}` placeholder, used for [`OutputFormat::Pcap`].
    pub export_command: Option<Vec<String>>,
    pub output_dir: PathBuf,
    /// Poll step while waiting for the capture process to exit.
    pub poll_interval_ms: u64,
    /// Watchdog on wait-for-exit; past it the process is killed hard.
    pub exit_timeout_ms: u64,
    pub keep_capture_files: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            command: None,
            output_format: OutputFormat::Pcap,
            export_command: None,
            output_dir: PathBuf::from("captures"),
            poll_interval_ms: 10,
            exit_timeout_ms: 5_000,
            keep_capture_files: true,
        }
    }
}

impl CaptureSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Where successful sessions are persisted. Unset disables persistence.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Sessions to run back to back. `0` keeps going until interrupted.
    pub max_sessions: usize,
    pub output: OutputMode,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_sessions: 1,
            output: OutputMode::Text,
        }
    }
}
