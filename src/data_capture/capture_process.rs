//! Lifecycle of the external capture subprocess.
//!
//! A [`CaptureProcess`] is owned by exactly one session. It is started when
//! the start signal matches, asked to stop with [`CaptureProcess::force_stop`],
//! and always reaped with [`CaptureProcess::wait_for_exit`] before the
//! session reaches a terminal state. The child is spawned with
//! `kill_on_drop(true)`, so a handle dropped on an unexpected path still takes
//! the tool down with it.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::time::Instant;
use uuid::Uuid;

use super::command::{prepare_output_dir, CommandTemplate, Platform, Termination};
use crate::error_handling::types::CaptureError;

/// Bounded wait after a hard kill.
const HARD_KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct CaptureProcess {
    session_id: Uuid,
    program: String,
    pid: Option<u32>,
    child: Child,
    output_path: PathBuf,
    termination: Termination,
    exit_status: Option<ExitStatus>,
}

impl CaptureProcess {
    /// Launches the capture tool scoped to `host:port`, writing to `output_path`.
    ///
    /// The termination strategy is taken from `platform` at this point.
    ///
    /// # Errors
    ///
    /// * `CaptureError::OutputDirectory` if the capture directory cannot be created
    /// * `CaptureError::SpawnFailed` if the tool cannot be launched (missing
    ///   binary, missing capture privileges surfacing at exec time)
    pub fn start(
        session_id: Uuid,
        template: &CommandTemplate,
        host: &str,
        port: u16,
        output_path: &Path,
        platform: Platform,
    ) -> Result<Self, CaptureError> {
        prepare_output_dir(output_path)?;

        let port = port.to_string();
        let output = output_path.to_string_lossy();
        let (program, mut cmd) = template.to_command(&[
            ("host", host),
            ("port", port.as_str()),
            ("output", output.as_ref()),
        ]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("[{}] Spawning capture process: {:?}", session_id, cmd);
        let mut child = cmd.spawn().map_err(|e| CaptureError::SpawnFailed {
            program: program.clone(),
            source: e,
        })?;

        if let Some(stdout) = child.stdout.take() {
            forward_lines(session_id, "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(session_id, "stderr", stderr);
        }

        let pid = child.id();
        info!(
            "[{}] Capture process `{}` started with pid {}",
            session_id,
            program,
            pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
        );

        Ok(Self {
            session_id,
            program,
            pid,
            child,
            output_path: output_path.to_path_buf(),
            termination: platform.termination(),
            exit_status: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Non-blocking check whether the process has already exited.
    pub fn has_exited(&mut self) -> bool {
        if self.exit_status.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                true
            }
            _ => false,
        }
    }

    /// Asks the process to stop without waiting for it.
    ///
    /// Stopping a process that has already exited is a no-op: death racing
    /// with the stop signal is expected.
    ///
    /// # Errors
    ///
    /// * `CaptureError::KillFailed` if the termination request itself failed.
    ///   Callers log it and carry on.
    pub fn force_stop(&mut self) -> Result<(), CaptureError> {
        if self.has_exited() {
            debug!(
                "[{}] Capture process already exited, nothing to stop",
                self.session_id
            );
            return Ok(());
        }
        let Some(pid) = self.child.id() else {
            return Ok(());
        };

        debug!(
            "[{}] Stopping capture process {} ({:?})",
            self.session_id, pid, self.termination
        );
        match self.termination {
            Termination::Signal => self.send_terminate(pid),
            Termination::TerminateProcess => self.kill(pid),
        }
    }

    /// Waits until the process has exited, in `poll_interval` steps.
    ///
    /// Once `watchdog` has elapsed the process is killed hard and reaped, so
    /// a hung tool cannot wedge the session. The wait is cancel safe: dropping
    /// the future leaves the process untouched.
    pub async fn wait_for_exit(
        &mut self,
        poll_interval: Duration,
        watchdog: Duration,
    ) -> Result<ExitStatus, CaptureError> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }

        let started = Instant::now();
        loop {
            match tokio::time::timeout(poll_interval, self.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(
                        "[{}] Capture process exited with {}",
                        self.session_id, status
                    );
                    self.exit_status = Some(status);
                    return Ok(status);
                }
                Ok(Err(e)) => return Err(CaptureError::WaitFailed(e)),
                Err(_) => {
                    trace!(
                        "[{}] Waiting for capture process to terminate...",
                        self.session_id
                    );
                    if started.elapsed() >= watchdog {
                        warn!(
                            "[{}] Capture process `{}` still running after {:?}, killing it",
                            self.session_id, self.program, watchdog
                        );
                        return self.kill_and_reap().await;
                    }
                }
            }
        }
    }

    /// Stops and reaps the process, logging instead of failing.
    pub async fn shutdown(&mut self, poll_interval: Duration, watchdog: Duration) {
        if let Err(e) = self.force_stop() {
            warn!("[{}] {}", self.session_id, e);
        }
        if let Err(e) = self.wait_for_exit(poll_interval, watchdog).await {
            warn!("[{}] {}", self.session_id, e);
        }
    }

    /// Kills the process outright and reaps it within a short grace period.
    pub async fn kill_and_reap(&mut self) -> Result<ExitStatus, CaptureError> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        if let Some(pid) = self.child.id() {
            if let Err(e) = self.kill(pid) {
                warn!("[{}] {}", self.session_id, e);
            }
        }
        match tokio::time::timeout(HARD_KILL_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                Ok(status)
            }
            Ok(Err(e)) => Err(CaptureError::WaitFailed(e)),
            Err(_) => Err(CaptureError::ExitTimeout(HARD_KILL_GRACE)),
        }
    }

    fn kill(&mut self, pid: u32) -> Result<(), CaptureError> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(CaptureError::KillFailed {
                pid,
                reason: e.to_string(),
            }),
        }
    }

    #[cfg(unix)]
    fn send_terminate(&mut self, pid: u32) -> Result<(), CaptureError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(CaptureError::KillFailed {
                pid,
                reason: e.to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&mut self, pid: u32) -> Result<(), CaptureError> {
        self.kill(pid)
    }
}

fn forward_lines<R>(session_id: Uuid, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}][capture][{}] {}", session_id, stream, line);
        }
        trace!("[{}] capture {} closed", session_id, stream);
    });
}
