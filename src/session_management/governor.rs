//! Timeout policy of a capture session.
//!
//! A timeout on its own is ambiguous. A session that never saw data is
//! reported as a failure, while one that already captured data and simply ran
//! past its budget is closed cleanly so the partial capture is delivered.

use std::time::Duration;

use tokio::time::Instant;

/// Deadline used when the configured budget does not fit an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    GracefulStop,
    TimeoutFailure,
}

/// Pure decision on elapsed time.
///
/// `auto_stop_after_timeout` only matters once a message has started: a
/// timeout without data is always a failure.
pub fn decide(
    elapsed_ms: u64,
    timeout_ms: u64,
    message_started: bool,
    auto_stop_after_timeout: bool,
) -> Decision {
    if elapsed_ms < timeout_ms {
        Decision::Continue
    } else if auto_stop_after_timeout && message_started {
        Decision::GracefulStop
    } else {
        Decision::TimeoutFailure
    }
}

/// Session clock bound to [`decide`].
#[derive(Debug, Clone)]
pub struct TimeoutGovernor {
    started: Instant,
    timeout: Duration,
    auto_stop_after_timeout: bool,
}

impl TimeoutGovernor {
    /// Starts the clock now.
    pub fn start(timeout: Duration, auto_stop_after_timeout: bool) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            auto_stop_after_timeout,
        }
    }

    pub fn check(&self, message_started: bool) -> Decision {
        decide(
            duration_ms(self.started.elapsed()),
            duration_ms(self.timeout),
            message_started,
            self.auto_stop_after_timeout,
        )
    }

    /// Absolute deadline for the next receive.
    pub fn deadline(&self) -> Instant {
        self.started
            .checked_add(self.timeout)
            .unwrap_or_else(|| self.started + FAR_FUTURE)
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
