//! Command construction for the external capture tool.
//!
//! The invocation and the way the process is terminated depend on the host
//! operating system. Both are resolved through [`Platform::current`] when a
//! capture starts, never baked into the session state machine.
//!
//! Privileges: opening a raw capture needs elevated capability on most
//! systems (`CAP_NET_RAW` or membership of the capture group for `dumpcap`
//! on Unix, Npcap access on Windows). That capability has to be granted to
//! the tool or to the account running `sigcap`; no credential is ever placed
//! in a command line.

use std::path::Path;

use tokio::process::Command;

use crate::error_handling::types::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    OtherUnix,
}

/// How a running capture is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// POSIX `SIGTERM`, which lets the tool flush its capture file.
    Signal,
    /// `TerminateProcess` on Windows.
    TerminateProcess,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::OtherUnix
        }
    }

    /// Interface that carries traffic to a local bind address.
    pub fn loopback_interface(&self) -> &'static str {
        match self {
            Platform::Linux => "lo",
            Platform::MacOs | Platform::OtherUnix => "lo0",
            // first Npcap adapter; the loopback adapter when installed with Npcap defaults
            Platform::Windows => "1",
        }
    }

    pub fn termination(&self) -> Termination {
        match self {
            Platform::Windows => Termination::TerminateProcess,
            _ => Termination::Signal,
        }
    }

    pub fn default_capture_command(&self) -> CommandTemplate {
        CommandTemplate::new(
            "tshark",
            [
                "-i",
                self.loopback_interface(),
                "-f",
                "host {host} and udp port {port}",
                "-w",
                "{output}",
            ],
        )
    }

    /// One hex payload per frame; `occurrence=f` keeps frames with several
    /// `data` fields from being joined with commas.
    pub fn default_export_command(&self) -> CommandTemplate {
        CommandTemplate::new(
            "tshark",
            [
                "-r",
                "{input}",
                "-Y",
                "udp",
                "-T",
                "fields",
                "-E",
                "occurrence=f",
                "-e",
                "data",
            ],
        )
    }
}

/// Program plus argument list with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a template from a configured argv (`[program, args...]`).
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Substitutes every `{key}` in the program and arguments.
    pub fn render(&self, vars: &[(&str, &str)]) -> (String, Vec<String>) {
        let substitute = |s: &str| {
            vars.iter().fold(s.to_string(), |acc, (key, value)| {
                acc.replace(&format!("{{{}}}", key), value)
            })
        };
        (
            substitute(&self.program),
            self.args.iter().map(|a| substitute(a)).collect(),
        )
    }

    /// Rendered, ready-to-spawn command.
    pub fn to_command(&self, vars: &[(&str, &str)]) -> (String, Command) {
        let (program, args) = self.render(vars);
        let mut cmd = Command::new(&program);
        cmd.args(&args);
        (program, cmd)
    }
}

/// Capture command for a session: the configured one, or the platform default.
pub fn capture_command(configured: Option<&[String]>, platform: Platform) -> CommandTemplate {
    configured
        .and_then(CommandTemplate::from_argv)
        .unwrap_or_else(|| platform.default_capture_command())
}

/// Export command for a session: the configured one, or the platform default.
pub fn export_command(configured: Option<&[String]>, platform: Platform) -> CommandTemplate {
    configured
        .and_then(CommandTemplate::from_argv)
        .unwrap_or_else(|| platform.default_export_command())
}

/// Creates the directory a capture file will be written into.
pub fn prepare_output_dir(output: &Path) -> Result<(), CaptureError> {
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| CaptureError::OutputDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}
