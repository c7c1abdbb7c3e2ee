//! TCP socket session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rflink_core::constants::{INTEGRATED_READER_ADDR, INTEGRATED_READER_PORT};
use rflink_core::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::session::{READ_POLL_TIMEOUT, TransportSession};

/// Session over a TCP connection to a network-attached or integrated reader.
///
/// The pseudo-host [`INTEGRATED_READER_ADDR`] resolves to `localhost` and
/// the integrated reader's fixed port, so callers can hand the integrated
/// pseudo-address straight through.
///
/// A [`SocketProbe`] taken before the session is installed into the reader
/// lets the owning controller keep polling liveness afterwards.
#[derive(Debug)]
pub struct SocketSession {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    connected: Arc<AtomicBool>,
}

/// Cheap liveness handle onto a [`SocketSession`].
#[derive(Debug, Clone)]
pub struct SocketProbe {
    connected: Arc<AtomicBool>,
}

impl SocketProbe {
    /// Whether the probed session is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl SocketSession {
    /// Create a disconnected session for the given endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let (host, port) = if host.eq_ignore_ascii_case(INTEGRATED_READER_ADDR) {
            ("localhost".to_string(), INTEGRATED_READER_PORT)
        } else {
            (host, port)
        };
        Self {
            host,
            port,
            stream: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take a liveness probe that stays valid after the session moves into
    /// the reader.
    pub fn probe(&self) -> SocketProbe {
        SocketProbe {
            connected: self.connected.clone(),
        }
    }

    /// Resolved target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Resolved target port.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn mark_disconnected(&mut self) {
        self.stream = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl TransportSession for SocketSession {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        debug!(host = %self.host, port = self.port, "dialing reader");
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.stream.is_some() {
            debug!(host = %self.host, port = self.port, "closing reader socket");
        }
        self.mark_disconnected();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };
        match tokio::time::timeout(READ_POLL_TIMEOUT, stream.read(buf)).await {
            Err(_) => Ok(0),
            Ok(Ok(0)) => {
                // EOF: peer closed the connection.
                self.mark_disconnected();
                Err(Error::disconnected("socket peer closed"))
            }
            Ok(Ok(n)) => {
                trace!(bytes = n, "socket read");
                Ok(n)
            }
            Ok(Err(e)) => {
                self.mark_disconnected();
                Err(e.into())
            }
        }
    }

    async fn write_data(&mut self, buf: &[u8]) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };
        if let Err(e) = stream.write_all(buf).await {
            self.mark_disconnected();
            return Err(e.into());
        }
        Ok(buf.len())
    }
}
