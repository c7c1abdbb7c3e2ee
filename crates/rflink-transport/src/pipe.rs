//! In-process byte pipes backing radio and bus sessions.
//!
//! Radio and bus mediums deliver reader traffic through OS callbacks rather
//! than a socket, so their sessions read from an in-process duplex pipe: the
//! medium holds one end and shovels bytes between it and the OS stack, the
//! session installed into the reader holds the other.

use bytes::Bytes;
use rflink_core::{Error, Result};
use tokio::sync::mpsc;

/// Default capacity (in chunks) of one pipe direction.
pub const PIPE_CAPACITY: usize = 64;

/// One end of a duplex byte pipe.
///
/// Created in pairs by [`duplex`]. Dropping an end closes both directions
/// for the peer: its sends fail and its receives drain then report
/// disconnection.
#[derive(Debug)]
pub struct PipeEnd {
    tx: mpsc::Sender<Bytes>,
    rx: mpsc::Receiver<Bytes>,
}

/// Create a connected pair of pipe ends.
pub fn duplex(capacity: usize) -> (PipeEnd, PipeEnd) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (PipeEnd { tx: a_tx, rx: a_rx }, PipeEnd { tx: b_tx, rx: b_rx })
}

impl PipeEnd {
    /// Send one chunk to the peer.
    pub async fn send(&self, chunk: Bytes) -> Result<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| Error::disconnected("pipe peer closed"))
    }

    /// Receive one chunk, or `None` once the peer has closed and the
    /// buffered chunks are drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Whether the peer end is still open.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
