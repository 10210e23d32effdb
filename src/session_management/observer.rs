use std::sync::Arc;

use super::types::CaptureReport;
use crate::error_handling::types::SessionError;

/// Callbacks fired by a session worker.
///
/// Exactly one terminal delivery happens per session: either `on_data`
/// followed by `on_stop`, or `on_error`. All methods run on the session's
/// worker task and default to doing nothing.
pub trait SessionObserver: Send + Sync + 'static {
    fn on_data(&self, _records: &[String]) {}

    /// Marks graceful completion, after `on_data`.
    fn on_stop(&self, _report: &CaptureReport) {}

    fn on_error(&self, _error: &SessionError) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

impl<T: SessionObserver + ?Sized> SessionObserver for Arc<T> {
    fn on_data(&self, records: &[String]) {
        (**self).on_data(records)
    }

    fn on_stop(&self, report: &CaptureReport) {
        (**self).on_stop(report)
    }

    fn on_error(&self, error: &SessionError) {
        (**self).on_error(error)
    }
}
