//! Network subsystem: the UDP control plane that brackets a capture.
//!
//! - `signal_channel`: binds the control socket and yields decoded datagrams.
//! - `types`: classification of datagrams against the configured tokens.

pub mod signal_channel;
pub mod types;

pub use signal_channel::SignalChannel;
pub use types::{SignalKind, SignalTokens};
