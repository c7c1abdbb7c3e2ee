//! Transport sessions and the dispatch enum over them.
//!
//! A session is one byte stream to a reader. The reader API owns at most one
//! session at a time; auto-connect controllers build sessions and install
//! them with [`ReaderApi::set_transport`](crate::ReaderApi::set_transport).
//!
//! Reads are poll-style: `read_data` returning `Ok(0)` means no data arrived
//! within the poll window and the caller should retry, while a dropped link
//! surfaces as [`Error::Disconnected`](rflink_core::Error).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use rflink_core::{Error, Result};
use tracing::trace;

use crate::pipe::PipeEnd;
use crate::socket::SocketSession;

/// Poll window for `read_data` before it reports `Ok(0)`.
pub const READ_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// One byte-stream session to a reader.
pub trait TransportSession: Send {
    /// Open the stream. On a medium-backed session this only validates that
    /// the underlying link is up; on a socket session it dials the peer.
    async fn connect(&mut self) -> Result<()>;

    /// Close the stream. Idempotent.
    async fn disconnect(&mut self);

    /// Whether the stream is currently usable.
    fn is_connected(&self) -> bool;

    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing arrived within
    /// the poll window; a closed link is an error.
    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer, returning the number of bytes written.
    async fn write_data(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Shared mechanics of pipe-backed sessions (radio and bus).
///
/// `live` is owned by the medium and flips to `false` the moment the OS
/// link drops, so reads fail fast instead of draining stale chunks.
#[derive(Debug)]
struct PipeSession {
    end: PipeEnd,
    live: Arc<AtomicBool>,
    opened: bool,
    /// Remainder of a chunk larger than the caller's buffer.
    pending: Bytes,
    label: &'static str,
}

impl PipeSession {
    fn new(end: PipeEnd, live: Arc<AtomicBool>, label: &'static str) -> Self {
        Self {
            end,
            live,
            opened: false,
            pending: Bytes::new(),
            label,
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn connect(&mut self) -> Result<()> {
        if !self.is_live() {
            return Err(Error::medium_unavailable(format!(
                "{} link is down",
                self.label
            )));
        }
        self.opened = true;
        trace!(label = self.label, "session opened");
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.opened = false;
        trace!(label = self.label, "session closed");
    }

    fn is_connected(&self) -> bool {
        self.opened && self.is_live()
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending = self.pending.slice(n..);
        n
    }

    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.is_connected() {
            return Err(Error::disconnected(self.label));
        }
        if !self.pending.is_empty() {
            return Ok(self.take_pending(buf));
        }
        match tokio::time::timeout(READ_POLL_TIMEOUT, self.end.recv()).await {
            Err(_) => Ok(0),
            Ok(None) => Err(Error::disconnected(self.label)),
            Ok(Some(chunk)) => {
                self.pending = chunk;
                Ok(self.take_pending(buf))
            }
        }
    }

    async fn write_data(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.is_connected() {
            return Err(Error::disconnected(self.label));
        }
        self.end.send(Bytes::copy_from_slice(buf)).await?;
        Ok(buf.len())
    }
}

macro_rules! pipe_session_type {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name(PipeSession);

        impl $name {
            /// Wrap a pipe end handed out by the medium. `live` must be the
            /// medium's link-state flag for this pipe.
            pub fn new(end: PipeEnd, live: Arc<AtomicBool>) -> Self {
                Self(PipeSession::new(end, live, $label))
            }
        }

        impl TransportSession for $name {
            async fn connect(&mut self) -> Result<()> {
                self.0.connect().await
            }

            async fn disconnect(&mut self) {
                self.0.disconnect().await;
            }

            fn is_connected(&self) -> bool {
                self.0.is_connected()
            }

            async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
                self.0.read_data(buf).await
            }

            async fn write_data(&mut self, buf: &[u8]) -> Result<usize> {
                self.0.write_data(buf).await
            }
        }
    };
}

pipe_session_type!(
    /// Session over an established short-range radio link.
    RadioSession,
    "radio"
);
pipe_session_type!(
    /// Session over an opened bus device.
    BusSession,
    "bus"
);

/// Dispatch enum over every session type the SDK can install.
#[derive(Debug)]
pub enum AnyTransportSession {
    Socket(SocketSession),
    Radio(RadioSession),
    Bus(BusSession),
}

impl TransportSession for AnyTransportSession {
    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Socket(s) => s.connect().await,
            Self::Radio(s) => s.connect().await,
            Self::Bus(s) => s.connect().await,
        }
    }

    async fn disconnect(&mut self) {
        match self {
            Self::Socket(s) => s.disconnect().await,
            Self::Radio(s) => s.disconnect().await,
            Self::Bus(s) => s.disconnect().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Socket(s) => s.is_connected(),
            Self::Radio(s) => s.is_connected(),
            Self::Bus(s) => s.is_connected(),
        }
    }

    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::Socket(s) => s.read_data(buf).await,
            Self::Radio(s) => s.read_data(buf).await,
            Self::Bus(s) => s.read_data(buf).await,
        }
    }

    async fn write_data(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            Self::Socket(s) => s.write_data(buf).await,
            Self::Radio(s) => s.write_data(buf).await,
            Self::Bus(s) => s.write_data(buf).await,
        }
    }
}

impl From<SocketSession> for AnyTransportSession {
    fn from(session: SocketSession) -> Self {
        Self::Socket(session)
    }
}

impl From<RadioSession> for AnyTransportSession {
    fn from(session: RadioSession) -> Self {
        Self::Radio(session)
    }
}

impl From<BusSession> for AnyTransportSession {
    fn from(session: BusSession) -> Self {
        Self::Bus(session)
    }
}
