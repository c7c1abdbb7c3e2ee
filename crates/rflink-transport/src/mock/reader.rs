//! Scriptable [`ReaderApi`] implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use rflink_core::{Error, Result};
use tokio::sync::Mutex;

use crate::reader::ReaderApi;
use crate::session::{AnyTransportSession, TransportSession};

/// Mock reader protocol stack.
///
/// Owns one installed session like a real reader API would, and exposes
/// counters so tests can assert how controllers drove it.
#[derive(Debug, Default)]
pub struct MockReader {
    transport: Mutex<Option<AnyTransportSession>>,
    has_transport: AtomicBool,
    connected: AtomicBool,
    connect_calls: AtomicU32,
    install_count: AtomicU32,
    fail_connects: AtomicU32,
}

impl MockReader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` connect calls fail before touching the session.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Total `connect` calls so far.
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Total sessions installed so far (uninstalls not counted).
    pub fn installs(&self) -> u32 {
        self.install_count.load(Ordering::SeqCst)
    }

    /// Whether a session is currently installed.
    pub fn has_transport(&self) -> bool {
        self.has_transport.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReaderApi for MockReader {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let scripted_failure = self
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(Error::other("scripted connect failure"));
        }
        let mut guard = self.transport.lock().await;
        let Some(session) = guard.as_mut() else {
            return Err(Error::NotConnected);
        };
        session.connect().await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.transport.lock().await;
        if let Some(session) = guard.as_mut() {
            session.disconnect().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn set_transport(&self, session: Option<AnyTransportSession>) -> Result<()> {
        let mut guard = self.transport.lock().await;
        if let Some(mut old) = guard.take() {
            old.disconnect().await;
        }
        // Installing (or uninstalling) always leaves the protocol down
        // until the next connect.
        self.connected.store(false, Ordering::SeqCst);
        self.has_transport.store(session.is_some(), Ordering::SeqCst);
        if let Some(new) = session {
            self.install_count.fetch_add(1, Ordering::SeqCst);
            *guard = Some(new);
        }
        Ok(())
    }
}
