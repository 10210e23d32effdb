/// What a control datagram means to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    Start,
    Stop,
    Empty,
    /// Any other payload. Only marks that a message has started; the
    /// payload itself is never part of the decoded output.
    Data,
}

/// Sentinel tokens a session reacts to. `None` disables that transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalTokens {
    pub start: Option<String>,
    pub stop: Option<String>,
}

impl SignalTokens {
    pub fn new(start: Option<String>, stop: Option<String>) -> Self {
        Self { start, stop }
    }

    /// Exact-match classification of a decoded datagram.
    pub fn classify(&self, message: &str) -> SignalKind {
        if self.start.as_deref() == Some(message) {
            SignalKind::Start
        } else if self.stop.as_deref() == Some(message) {
            SignalKind::Stop
        } else if message.is_empty() {
            SignalKind::Empty
        } else {
            SignalKind::Data
        }
    }
}
