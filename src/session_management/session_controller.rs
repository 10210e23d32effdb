//! Run loop of a capture session.
//!
//! Each session runs on its own Tokio task and owns exactly one signal socket
//! and at most one capture process. The task pulls datagrams from the
//! [`SignalChannel`], consults the [`TimeoutGovernor`] before every receive,
//! drives the [`CaptureProcess`] on signal matches and decodes the capture
//! once at the end.
//!
//! Whatever way the run loop exits, [`SessionWorker::drive`] releases the
//! capture before the terminal state is published and the observer is
//! called. The socket is released when the loop returns.

use std::net::SocketAddr;

use chrono::Utc;
use log::{debug, info, log, trace, warn, Level};
use tokio::sync::watch;
use uuid::Uuid;

use super::governor::{Decision, TimeoutGovernor};
use super::observer::{NoopObserver, SessionObserver};
use super::session::Session;
use super::session_handle::{cancel_pair, CancelSignal, SessionHandle};
use super::types::{CaptureReport, SessionEnd, SessionOutcome};
use super::SessionState;
use crate::configuration::{validate_session, SessionConfig};
use crate::data_capture::{
    capture_command, export_capture, export_command, CaptureArtifacts, CaptureProcess,
    OutputDecoder, Platform, SignalMarkers,
};
use crate::error_handling::types::{NetworkError, SessionError, SessionErrorKind};
use crate::network::{SignalChannel, SignalKind, SignalTokens};

/// Diagnostic event at the session's verbosity.
macro_rules! diag {
    ($worker:expr, $($arg:tt)+) => {
        log!($worker.diag, $($arg)+)
    };
}

/// Starts a session on a new task and returns immediately.
///
/// `observer` receives exactly one terminal delivery. Must be called from
/// within a Tokio runtime.
pub fn run_session<O: SessionObserver>(config: SessionConfig, observer: O) -> SessionHandle {
    let id = Uuid::new_v4();
    let (cancel, signal) = cancel_pair();
    let (state_tx, state_rx) = watch::channel(SessionState::AwaitingStart);
    let (addr_tx, addr_rx) = watch::channel(None);

    let worker = SessionWorker::new(id, config, signal, state_tx, addr_tx);
    let join = tokio::spawn(worker.drive(observer));
    SessionHandle::new(id, cancel, state_rx, addr_rx, join)
}

/// [`run_session`] without callbacks; the outcome is read from
/// [`SessionHandle::wait`].
pub fn spawn_session(config: SessionConfig) -> SessionHandle {
    run_session(config, NoopObserver)
}

struct SessionWorker {
    session: Session,
    config: SessionConfig,
    tokens: SignalTokens,
    cancel: CancelSignal,
    addr_tx: watch::Sender<Option<SocketAddr>>,
    diag: Level,
}

impl SessionWorker {
    fn new(
        id: Uuid,
        config: SessionConfig,
        cancel: CancelSignal,
        state_tx: watch::Sender<SessionState>,
        addr_tx: watch::Sender<Option<SocketAddr>>,
    ) -> Self {
        let tokens = SignalTokens::new(config.start_signal.clone(), config.stop_signal.clone());
        let diag = if config.verbose {
            Level::Info
        } else {
            Level::Debug
        };
        Self {
            session: Session::new(id, state_tx),
            config,
            tokens,
            cancel,
            addr_tx,
            diag,
        }
    }

    async fn drive<O: SessionObserver>(mut self, observer: O) -> SessionOutcome {
        let id = self.session.id;
        info!(
            "[{}] Session started on {}:{} (start: {:?}, stop: {:?}, timeout: {}s)",
            id,
            self.config.host,
            self.config.port,
            self.tokens.start,
            self.tokens.stop,
            self.config.timeout_seconds
        );

        let outcome = self.run().await;
        self.release_capture().await;
        self.session.finish(outcome.is_ok());

        match &outcome {
            Ok(report) => {
                info!(
                    "[{}] Session completed ({:?}) with {} record(s)",
                    id,
                    report.end,
                    report.records.len()
                );
                observer.on_data(&report.records);
                observer.on_stop(report);
            }
            Err(e) => {
                if e.kind() == SessionErrorKind::Cancelled {
                    info!("[{}] Session cancelled", id);
                } else {
                    warn!("[{}] Session failed: {}", id, e);
                }
                observer.on_error(e);
            }
        }
        outcome
    }

    async fn run(&mut self) -> SessionOutcome {
        let id = self.session.id;
        validate_session(&self.config).map_err(SessionError::Config)?;
        let governor =
            TimeoutGovernor::start(self.config.timeout(), self.config.auto_stop_after_timeout);

        let mut channel = SignalChannel::open(&self.config.host, self.config.port)
            .await
            .map_err(SessionError::Bind)?;
        let local_addr = channel.local_addr();
        self.addr_tx.send_replace(Some(local_addr));
        diag!(self, "[{}] Listening for signals on {}", id, local_addr);

        loop {
            match governor.check(self.session.message_started()) {
                Decision::Continue => {}
                Decision::GracefulStop => {
                    diag!(self, "[{}] Budget spent after data started, stopping", id);
                    channel.close();
                    return self.complete(SessionEnd::AutoStop).await;
                }
                Decision::TimeoutFailure => {
                    diag!(
                        self,
                        "[{}] Budget spent in state {}",
                        id,
                        self.session.state()
                    );
                    return Err(SessionError::Timeout {
                        seconds: self.config.timeout_seconds,
                    });
                }
            }

            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                received = channel.receive(governor.deadline()) => received,
            };
            let message = match received {
                Ok(message) => message,
                Err(NetworkError::Timeout) => continue,
                Err(e) => return Err(SessionError::Receive(e)),
            };

            let state = self.session.state();
            match self.tokens.classify(&message) {
                SignalKind::Start if state == SessionState::AwaitingStart => {
                    diag!(self, "[{}] Start signal received", id);
                    self.start_capture(local_addr.port())?;
                }
                SignalKind::Start => debug!("[{}] Repeated start signal ignored", id),
                SignalKind::Stop if state == SessionState::Capturing => {
                    diag!(self, "[{}] Stop signal received", id);
                    channel.close();
                    return self.complete(SessionEnd::StopSignal).await;
                }
                SignalKind::Stop => debug!("[{}] Stop signal before start ignored", id),
                SignalKind::Empty => trace!("[{}] Empty datagram ignored", id),
                SignalKind::Data => {
                    if self.session.mark_message_started() {
                        diag!(self, "[{}] Message started in state {}", id, state);
                    } else {
                        trace!("[{}] Data datagram", id);
                    }
                }
            }
        }
    }

    fn start_capture(&mut self, port: u16) -> Result<(), SessionError> {
        let platform = Platform::current();
        let settings = &self.config.capture;
        let template = capture_command(settings.command.as_deref(), platform);
        let artifacts = CaptureArtifacts::new(
            self.session.id,
            &settings.output_dir,
            settings.output_format,
            Utc::now(),
        );

        let process = CaptureProcess::start(
            self.session.id,
            &template,
            &self.config.host,
            port,
            &artifacts.capture_file,
            platform,
        )
        .map_err(SessionError::Spawn)?;

        diag!(
            self,
            "[{}] Capturing to {}",
            self.session.id,
            artifacts.capture_file.display()
        );
        self.session.begin_capture(process, artifacts);
        Ok(())
    }

    /// Stop, decode and build the report. Without a capture (data arrived
    /// before any start signal) the report has no records.
    async fn complete(&mut self, end: SessionEnd) -> SessionOutcome {
        self.session.begin_stopping();
        self.stop_capture().await?;

        let decoded = self.decode().await;
        let keep = self.config.capture.keep_capture_files;
        let capture_file = match self.session.artifacts() {
            Some(artifacts) if keep => Some(artifacts.capture_file.clone()),
            Some(artifacts) => {
                artifacts.remove_files();
                None
            }
            None => None,
        };

        Ok(CaptureReport {
            session_id: self.session.id,
            end,
            started_at: self.session.started_at,
            finished_at: Utc::now(),
            records: decoded?,
            capture_file,
        })
    }

    /// Asks the capture to stop and waits until it has exited, so the
    /// capture file is flushed before it is read.
    async fn stop_capture(&mut self) -> Result<(), SessionError> {
        let id = self.session.id;
        let poll = self.config.capture.poll_interval();
        let watchdog = self.config.capture.exit_timeout();
        let Some(process) = self.session.capture_mut() else {
            return Ok(());
        };

        if let Err(e) = process.force_stop() {
            warn!("[{}] {}", id, e);
        }
        let waited = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            waited = process.wait_for_exit(poll, watchdog) => Some(waited),
        };

        match waited {
            Some(Ok(status)) => {
                diag!(self, "[{}] Capture process exited with {}", id, status);
                Ok(())
            }
            Some(Err(e)) => {
                warn!("[{}] {}, decoding what was written", id, e);
                Ok(())
            }
            None => {
                if let Err(e) = process.kill_and_reap().await {
                    warn!("[{}] {}", id, e);
                }
                Err(SessionError::Cancelled)
            }
        }
    }

    async fn decode(&mut self) -> Result<Vec<String>, SessionError> {
        let Some(artifacts) = self.session.artifacts().cloned() else {
            return Ok(Vec::new());
        };

        if artifacts.needs_export() {
            let template = export_command(
                self.config.capture.export_command.as_deref(),
                Platform::current(),
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                exported = export_capture(self.session.id, &template, &artifacts) => exported?,
            }
        }

        let mut decoder = OutputDecoder::new(self.tokens.stop.as_deref());
        if self.config.include_signals_in_message {
            let markers = SignalMarkers {
                start: self.tokens.start.clone(),
                stop: self.tokens.stop.clone(),
            };
            decoder = decoder.with_markers(self.tokens.start.as_deref(), markers);
        }
        let records = decoder
            .decode_file(&artifacts.hex_file)
            .map_err(SessionError::Decode)?;
        diag!(
            self,
            "[{}] Decoded {} record(s) from {}",
            self.session.id,
            records.len(),
            artifacts.hex_file.display()
        );
        Ok(records)
    }

    /// Reaps a capture still running after the loop exited on a failure path.
    /// Cancellation skips the graceful stop and kills outright.
    async fn release_capture(&mut self) {
        let id = self.session.id;
        let poll = self.config.capture.poll_interval();
        let watchdog = self.config.capture.exit_timeout();
        let cancelled = self.cancel.is_cancelled();

        self.session.begin_stopping();
        let Some(process) = self.session.capture_mut() else {
            return;
        };
        if process.has_exited() {
            return;
        }

        debug!("[{}] Releasing capture process", id);
        if cancelled {
            if let Err(e) = process.kill_and_reap().await {
                warn!("[{}] {}", id, e);
            }
            return;
        }

        let released = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = process.shutdown(poll, watchdog) => true,
        };
        if !released {
            if let Err(e) = process.kill_and_reap().await {
                warn!("[{}] {}", id, e);
            }
        }
    }
}
