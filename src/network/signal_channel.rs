//! # Signal Channel
//!
//! UDP control plane of a capture session. A [`SignalChannel`] binds one
//! socket and hands out one decoded text payload per received datagram.
//!
//! Every [`SignalChannel::receive`] call takes an absolute deadline instead of
//! a fixed read timeout: the session recomputes it from its remaining budget
//! on each iteration, so the timeout governor's clock stays authoritative.
//!
//! ```rust,no_run
//! use sigcap::network::SignalChannel;
//! use tokio::time::{Duration, Instant};
//!
//! # async fn run() -> Result<(), sigcap::error_handling::types::NetworkError> {
//! let mut channel = SignalChannel::open("127.0.0.1", 5005).await?;
//! let message = channel.receive(Instant::now() + Duration::from_secs(5)).await?;
//! println!("received {:?}", message);
//! channel.close();
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;

use log::{debug, error, trace};
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::error_handling::types::NetworkError;

/// Largest payload a UDP datagram can carry.
const MAX_DATAGRAM: usize = 65_535;

pub struct SignalChannel {
    socket: Option<UdpSocket>,
    local_addr: SocketAddr,
    buf: Vec<u8>,
}

impl SignalChannel {
    /// Binds the control socket on `host:port`.
    ///
    /// # Errors
    ///
    /// * `NetworkError::Resolve` if `host` does not resolve to any address
    /// * `NetworkError::BindError` if the socket cannot be bound (port in use,
    ///   address not local, insufficient privileges)
    pub async fn open(host: &str, port: u16) -> Result<Self, NetworkError> {
        let target = format!("{}:{}", host, port);
        let addr = tokio::net::lookup_host(target.as_str())
            .await
            .map_err(|_| NetworkError::Resolve(target.clone()))?
            .next()
            .ok_or_else(|| NetworkError::Resolve(target.clone()))?;

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            error!("[!] Unable to bind signal socket on {}: {}", addr, e);
            NetworkError::BindError {
                addr: addr.to_string(),
                source: e,
            }
        })?;
        let local_addr = socket.local_addr().map_err(|e| NetworkError::BindError {
            addr: addr.to_string(),
            source: e,
        })?;

        debug!("Signal channel bound on {}", local_addr);
        Ok(Self {
            socket: Some(socket),
            local_addr,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Address the socket is actually bound to (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Waits for the next datagram until `deadline`.
    ///
    /// The payload is decoded as UTF-8 (invalid sequences replaced) and
    /// trimmed of surrounding whitespace, so `echo START | nc -u` matches the
    /// token `START`. Datagrams are returned in the order the OS delivers them.
    ///
    /// # Errors
    ///
    /// * `NetworkError::Timeout` if the deadline elapses first
    /// * `NetworkError::ReceiveError` on a socket failure
    /// * `NetworkError::Closed` after [`close`](Self::close)
    pub async fn receive(&mut self, deadline: Instant) -> Result<String, NetworkError> {
        let socket = self.socket.as_ref().ok_or(NetworkError::Closed)?;

        let (n, peer) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut self.buf)).await
        {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => return Err(NetworkError::ReceiveError(e)),
            Err(_) => return Err(NetworkError::Timeout),
        };

        let message = decode_payload(&self.buf[..n]);
        let preview: String = message.chars().take(64).collect();
        trace!(
            "received {} byte(s) from {}: {:?}{}",
            n,
            peer,
            preview,
            if n > 64 { " ..." } else { "" }
        );
        Ok(message)
    }

    /// Releases the socket. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Signal channel on {} closed", self.local_addr);
        }
    }
}

impl Drop for SignalChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Turns a raw datagram payload into the text token it carries.
pub fn decode_payload(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).trim().to_string()
}
