use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration, read from a TOML file and refined by CLI flags.
///
/// # File layout
///
/// ```toml
/// [session]
/// host = "127.0.0.1"
/// port = 5005
/// start_signal = "START"
/// stop_signal = "STOP"
/// timeout_seconds = 30
/// auto_stop_after_timeout = true
/// include_signals_in_message = false
///
/// [capture]
/// output_format = "pcap"
/// output_dir = "captures"
///
/// [storage]
/// directory = "/var/lib/sigcap"
///
/// [controller]
/// max_sessions = 1
/// output = "text"
/// ```
///
/// Every table and every key is optional; missing values fall back to the
/// defaults of the corresponding type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub capture: CaptureSettings,
    pub storage: StorageSettings,
    pub controller: ControllerSettings,
}

/// Command-line interface of the `sigcap` binary.
///
/// Flags override the matching keys of the configuration file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "sigcap")]
#[command(version)]
#[command(about = "Signal-gated UDP capture session controller")]
pub struct CliArgs {
    /// Path to a TOML configuration file
    pub config_file: Option<PathBuf>,

    /// Host the control socket binds to
    #[arg(long, env = "SIGCAP_HOST")]
    pub host: Option<String>,

    /// Port the control socket binds to
    #[arg(long, env = "SIGCAP_PORT")]
    pub port: Option<u16>,

    /// Datagram that starts the capture
    #[arg(long)]
    pub start_signal: Option<String>,

    /// Datagram that stops the capture
    #[arg(long)]
    pub stop_signal: Option<String>,

    /// Session budget in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Treat a timeout after data started as a normal stop
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "no_auto_stop")]
    pub auto_stop: bool,

    /// Treat every timeout as a failure
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_auto_stop: bool,

    /// Wrap the decoded records with the start/stop tokens
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub include_signals: bool,

    /// Emit diagnostic events
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    /// Persist successful sessions into this directory
    #[arg(long, env = "SIGCAP_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Number of sessions to run, 0 for unlimited
    #[arg(long)]
    pub sessions: Option<usize>,
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration for the binary: file (if any), then flags.
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Overrides file values with the flags that were actually given.
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(host) = &args.host {
            self.session.host = host.clone();
        }
        if let Some(port) = args.port {
            self.session.port = port;
        }
        if let Some(start) = &args.start_signal {
            self.session.start_signal = Some(start.clone());
        }
        if let Some(stop) = &args.stop_signal {
            self.session.stop_signal = Some(stop.clone());
        }
        if let Some(timeout) = args.timeout {
            self.session.timeout_seconds = timeout;
        }
        if args.auto_stop {
            self.session.auto_stop_after_timeout = true;
        }
        if args.no_auto_stop {
            self.session.auto_stop_after_timeout = false;
        }
        if args.include_signals {
            self.session.include_signals_in_message = true;
        }
        if args.verbose {
            self.session.verbose = true;
        }
        if let Some(dir) = &args.storage_dir {
            self.storage.directory = Some(dir.clone());
        }
        if args.json {
            self.controller.output = OutputMode::Json;
        }
        if let Some(sessions) = args.sessions {
            self.controller.max_sessions = sessions;
        }
    }

    /// The per-session settings, with the `[capture]` table folded in.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            capture: self.capture.clone(),
            ..self.session.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_session(&self.session_config())
    }
}

/// Checks the invariants a session relies on before it is spawned.
pub fn validate_session(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.timeout_seconds == 0 {
        return Err(ConfigError::InvalidTimeout(
            "timeout_seconds must be greater than 0".to_string(),
        ));
    }
    if config.host.trim().is_empty() {
        return Err(ConfigError::BadAddress("host must not be empty".to_string()));
    }
    for (name, signal) in [
        ("start_signal", &config.start_signal),
        ("stop_signal", &config.stop_signal),
    ] {
        if let Some(s) = signal {
            if s.trim().is_empty() {
                return Err(ConfigError::BadSignal(format!("{} must not be blank", name)));
            }
            if s.trim() != s {
                return Err(ConfigError::BadSignal(format!(
                    "{} must not carry surrounding whitespace",
                    name
                )));
            }
        }
    }
    if let (Some(start), Some(stop)) = (&config.start_signal, &config.stop_signal) {
        if start == stop {
            return Err(ConfigError::BadSignal(format!(
                "start and stop signals are both {:?}",
                start
            )));
        }
    }
    for (name, argv) in [
        ("command", &config.capture.command),
        ("export_command", &config.capture.export_command),
    ] {
        if let Some(argv) = argv {
            if argv.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(ConfigError::BadCommand(format!(
                    "{} needs at least a program name",
                    name
                )));
            }
        }
    }
    if config.capture.poll_interval_ms == 0 {
        return Err(ConfigError::NotInRange(
            "poll_interval_ms must be greater than 0".to_string(),
        ));
    }
    if config.capture.exit_timeout_ms < config.capture.poll_interval_ms {
        return Err(ConfigError::NotInRange(
            "exit_timeout_ms must be at least poll_interval_ms".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
        [session]
        host = "0.0.0.0"
        port = 6006
        start_signal = "START"
        stop_signal = "STOP"
        timeout_seconds = 12
        auto_stop_after_timeout = false
        include_signals_in_message = true
        verbose = true

        [capture]
        command = ["sh", "-c", "cat > {output}"]
        output_format = "hex"
        output_dir = "/tmp/sigcap"
        poll_interval_ms = 25
        exit_timeout_ms = 1000
        keep_capture_files = false

        [storage]
        directory = "/tmp/sigcap-store"

        [controller]
        max_sessions = 3
        output = "json"
    "#;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["sigcap"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap_or_else(|e| panic!("{}", e))
    }

    #[test]
    fn test_full_file_is_parsed() {
        let config = Config::from_toml_str(FULL).unwrap();
        assert_eq!(config.session.host, "0.0.0.0");
        assert_eq!(config.session.port, 6006);
        assert_eq!(config.session.start_signal.as_deref(), Some("START"));
        assert_eq!(config.session.stop_signal.as_deref(), Some("STOP"));
        assert_eq!(config.session.timeout_seconds, 12);
        assert!(!config.session.auto_stop_after_timeout);
        assert!(config.session.include_signals_in_message);
        assert_eq!(config.capture.output_format, OutputFormat::Hex);
        assert_eq!(config.capture.poll_interval_ms, 25);
        assert!(!config.capture.keep_capture_files);
        assert_eq!(
            config.storage.directory,
            Some(PathBuf::from("/tmp/sigcap-store"))
        );
        assert_eq!(config.controller.max_sessions, 3);
        assert_eq!(config.controller.output, OutputMode::Json);

        let session = config.session_config();
        assert_eq!(session.capture.output_format, OutputFormat::Hex);
        assert_eq!(
            session.capture.command.as_deref().map(|c| c[0].as_str()),
            Some("sh")
        );
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.session.host, "127.0.0.1");
        assert_eq!(config.session.timeout_seconds, 30);
        assert!(config.session.auto_stop_after_timeout);
        assert!(config.session.start_signal.is_none());
        assert_eq!(config.capture.output_format, OutputFormat::Pcap);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.session.port, 6006);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::from_file(Path::new("/nonexistent/sigcap.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = Config::from_toml_str("[session]\ntimeout_seconds = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));
    }

    #[test]
    fn test_identical_signals_are_rejected() {
        let err = Config::from_toml_str(
            "[session]\nstart_signal = \"GO\"\nstop_signal = \"GO\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::BadSignal(_)));
    }

    #[test]
    fn test_blank_signal_is_rejected() {
        let err = Config::from_toml_str("[session]\nstart_signal = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadSignal(_)));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let err = Config::from_toml_str("[capture]\ncommand = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadCommand(_)));
    }

    #[test]
    fn test_bad_toml_is_reported() {
        let err = Config::from_toml_str("[session\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_args_override_file_values() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = cli(&[
            path.as_str(),
            "--host",
            "127.0.0.1",
            "--port",
            "7007",
            "--timeout",
            "3",
            "--auto-stop",
            "--json",
            "--sessions",
            "0",
        ]);
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.session.host, "127.0.0.1");
        assert_eq!(config.session.port, 7007);
        assert_eq!(config.session.timeout_seconds, 3);
        assert!(config.session.auto_stop_after_timeout);
        // untouched keys keep their file values
        assert_eq!(config.session.start_signal.as_deref(), Some("START"));
        assert_eq!(config.controller.max_sessions, 0);
        assert_eq!(config.controller.output, OutputMode::Json);
    }

    #[test]
    fn test_args_without_file() {
        let args = cli(&[
            "--start-signal",
            "BEGIN",
            "--stop-signal",
            "END",
            "--no-auto-stop",
            "--include-signals",
            "-v",
        ]);
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.session.start_signal.as_deref(), Some("BEGIN"));
        assert_eq!(config.session.stop_signal.as_deref(), Some("END"));
        assert!(!config.session.auto_stop_after_timeout);
        assert!(config.session.include_signals_in_message);
        assert!(config.session.verbose);
    }

    #[test]
    fn test_conflicting_auto_stop_flags() {
        let result = CliArgs::try_parse_from(["sigcap", "--auto-stop", "--no-auto-stop"]);
        assert!(result.is_err());
    }
}
