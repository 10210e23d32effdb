use std::io::{self, Write};
use std::sync::Arc;

use log::{error, info, warn};

use crate::configuration::config::Config;
use crate::configuration::OutputMode;
use crate::error_handling::types::*;
use crate::session_management::{run_session, spawn_session, CaptureReport, SessionHandle};
use crate::storage::{FileStorage, RecordStorage, StorageObserver};

/// Tally of a controller run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    /// Stopped by Ctrl-C.
    pub interrupted: bool,
}

/// Runs capture sessions back to back and prints their reports.
pub struct Controller {
    pub config: Config,
    storage: Option<Arc<dyn RecordStorage>>,
}

impl Controller {
    /// Validates the configuration and opens storage when one is configured
    /// (`[storage] directory`, else `SIGCAP_STORAGE_DIR`).
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing controller");
        config.validate()?;

        let storage: Option<Arc<dyn RecordStorage>> = match &config.storage.directory {
            Some(dir) => Some(Arc::new(FileStorage::new(dir)?)),
            None => match FileStorage::from_env()? {
                Some(storage) => Some(Arc::new(storage)),
                None => None,
            },
        };
        if storage.is_none() {
            info!("No storage directory configured, captures are not persisted");
        }

        Ok(Self { config, storage })
    }

    /// Runs the configured number of sessions, printing reports to stdout.
    pub async fn run(&mut self) -> Result<RunSummary, ControllerError> {
        let mut stdout = io::stdout();
        self.run_with_output(&mut stdout).await
    }

    pub async fn run_with_output<W: Write + Send>(
        &mut self,
        out: &mut W,
    ) -> Result<RunSummary, ControllerError> {
        let max_sessions = self.config.controller.max_sessions;
        let mode = self.config.controller.output;
        let mut summary = RunSummary::default();
        let mut index = 0usize;

        while max_sessions == 0 || index < max_sessions {
            index += 1;
            let handle = self.start_session();
            info!(
                "[{}] Session {} of {} waiting for signals on {}:{}",
                handle.id(),
                index,
                if max_sessions == 0 {
                    "unlimited".to_string()
                } else {
                    max_sessions.to_string()
                },
                self.config.session.host,
                self.config.session.port
            );

            let canceller = handle.canceller();
            let wait = handle.wait();
            tokio::pin!(wait);
            let outcome = tokio::select! {
                outcome = &mut wait => outcome,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, cancelling the active session");
                    summary.interrupted = true;
                    canceller.cancel();
                    wait.await
                }
            };

            match outcome {
                Ok(report) => {
                    summary.completed += 1;
                    write_report(out, &report, mode)?;
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("Session failed: {}", e);
                }
            }

            if summary.interrupted {
                break;
            }
        }

        info!(
            "Controller finished: {} completed, {} failed",
            summary.completed, summary.failed
        );
        Ok(summary)
    }

    fn start_session(&self) -> SessionHandle {
        let session_config = self.config.session_config();
        match &self.storage {
            Some(storage) => {
                let observer = StorageObserver::new(storage.clone(), &self.config.session.host);
                run_session(session_config, observer)
            }
            None => spawn_session(session_config),
        }
    }
}

/// Prints a report: one record per line, or one JSON document per line.
pub fn write_report<W: Write>(
    out: &mut W,
    report: &CaptureReport,
    mode: OutputMode,
) -> io::Result<()> {
    match mode {
        OutputMode::Text => {
            for record in &report.records {
                writeln!(out, "{}", record)?;
            }
        }
        OutputMode::Json => {
            serde_json::to_writer(&mut *out, report)?;
            writeln!(out)?;
        }
    }
    out.flush()
}
