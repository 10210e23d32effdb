use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::types::SessionOutcome;
use super::SessionState;
use crate::error_handling::types::SessionError;

/// Cloneable trigger for cancelling one session.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Worker side of a [`CancelHandle`].
#[derive(Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelHandle {
    /// Requests cancellation. Calling it more than once has no further effect.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    ///
    /// Never resolves when every [`CancelHandle`] is dropped without
    /// cancelling: a detached session runs to its own end.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Caller side of a running session.
///
/// Dropping the handle detaches the session; it keeps running until it
/// reaches a terminal state on its own.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancelHandle,
    state: watch::Receiver<SessionState>,
    local_addr: watch::Receiver<Option<SocketAddr>>,
    join: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: Uuid,
        cancel: CancelHandle,
        state: watch::Receiver<SessionState>,
        local_addr: watch::Receiver<Option<SocketAddr>>,
        join: JoinHandle<SessionOutcome>,
    ) -> Self {
        Self {
            id,
            cancel,
            state,
            local_addr,
            join,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancels the session. The capture is stopped, the socket released and
    /// the session fails with `SessionError::Cancelled`, unless it already
    /// reached a terminal state.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn canceller(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// State updates for a presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Address the signal channel is bound to, once it is.
    ///
    /// `None` when binding failed.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut rx = self.local_addr.clone();
        // the sender is dropped when the worker ends, bound or not
        let _ = rx.wait_for(Option::is_some).await;
        let bound = *rx.borrow();
        bound
    }

    /// Waits for the terminal outcome, after the observer has been called.
    pub async fn wait(self) -> SessionOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SessionError::Aborted(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_the_worker() {
        let (handle, mut signal) = cancel_pair();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
            signal.is_cancelled()
        });
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (handle, mut signal) = cancel_pair();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(waited.is_err());
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_clones_share_the_signal() {
        let (handle, mut signal) = cancel_pair();
        let other = handle.clone();
        drop(handle);
        other.cancel();
        tokio::time::timeout(Duration::from_millis(200), signal.cancelled())
            .await
            .expect("cancelled through the clone");
    }
}
