//! Scriptable [`RadioMedium`] implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rflink_core::{Error, Result};
use tokio::sync::mpsc;

use crate::medium::{MediumEvent, RadioMedium};
use crate::mock::lock;
use crate::pipe::{self, PIPE_CAPACITY, PipeEnd};
use crate::session::RadioSession;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Mock short-range radio stack.
///
/// Link establishment is fully test-driven: [`open_link`] only records the
/// request and reports `LinkConnecting`; the test then calls
/// [`complete_link`] or [`drop_link`] to walk the lifecycle.
///
/// [`open_link`]: RadioMedium::open_link
/// [`complete_link`]: MockRadioMedium::complete_link
/// [`drop_link`]: MockRadioMedium::drop_link
#[derive(Debug)]
pub struct MockRadioMedium {
    events: mpsc::Sender<MediumEvent>,
    inner: Mutex<Inner>,
    available: AtomicBool,
    powered: AtomicBool,
    fail_opens: AtomicU32,
}

#[derive(Debug, Default)]
struct Inner {
    link_live: Option<Arc<AtomicBool>>,
    session: Option<RadioSession>,
    /// Device-side pipe end of the current link, for traffic emulation.
    peer: Option<PipeEnd>,
    open_requests: Vec<String>,
}

impl MockRadioMedium {
    /// Create a powered, available medium plus the event stream the
    /// controller under test should consume.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<MediumEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let medium = Arc::new(Self {
            events,
            inner: Mutex::new(Inner::default()),
            available: AtomicBool::new(true),
            powered: AtomicBool::new(true),
            fail_opens: AtomicU32::new(0),
        });
        (medium, events_rx)
    }

    async fn emit(&self, event: MediumEvent) {
        let _ = self.events.send(event).await;
    }

    /// Pretend the host has no radio adapter.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Toggle adapter power, emitting the matching event. Powering off
    /// silently kills any current link, like a real adapter would.
    pub async fn set_powered(&self, powered: bool) {
        self.powered.store(powered, Ordering::SeqCst);
        if !powered {
            self.kill_link();
        }
        self.emit(if powered {
            MediumEvent::PowerOn
        } else {
            MediumEvent::PowerOff
        })
        .await;
    }

    /// Make the next `n` open requests fail immediately.
    pub fn fail_next_opens(&self, n: u32) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Addresses passed to [`RadioMedium::open_link`] so far.
    pub fn open_requests(&self) -> Vec<String> {
        lock(&self.inner).open_requests.clone()
    }

    /// Establish the link: wire up a fresh session and report
    /// `LinkConnected`.
    pub async fn complete_link(&self) {
        {
            let mut inner = lock(&self.inner);
            let (host_end, device_end) = pipe::duplex(PIPE_CAPACITY);
            let live = Arc::new(AtomicBool::new(true));
            inner.session = Some(RadioSession::new(host_end, live.clone()));
            inner.peer = Some(device_end);
            inner.link_live = Some(live);
        }
        self.emit(MediumEvent::LinkConnected).await;
    }

    /// Drop the link out from under the controller and report it.
    pub async fn drop_link(&self) {
        self.kill_link();
        self.emit(MediumEvent::LinkDisconnected).await;
    }

    /// Report a signal-strength reading.
    pub async fn emit_rssi(&self, value: i32) {
        self.emit(MediumEvent::RssiRead(value)).await;
    }

    /// Take the device-side pipe end of the current link.
    pub fn peer(&self) -> Option<PipeEnd> {
        lock(&self.inner).peer.take()
    }

    fn kill_link(&self) {
        let mut inner = lock(&self.inner);
        if let Some(live) = inner.link_live.take() {
            live.store(false, Ordering::SeqCst);
        }
        inner.session = None;
        inner.peer = None;
    }
}

#[async_trait]
impl RadioMedium for MockRadioMedium {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    async fn open_link(&self, addr: &str) -> Result<()> {
        lock(&self.inner).open_requests.push(addr.to_string());
        let scripted_failure = self
            .fail_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(Error::medium_unavailable("scripted open failure"));
        }
        self.emit(MediumEvent::LinkConnecting).await;
        Ok(())
    }

    async fn close_link(&self) {
        // Told to close, so no LinkDisconnected event back.
        self.kill_link();
    }

    fn is_link_up(&self) -> bool {
        lock(&self.inner)
            .link_live
            .as_ref()
            .is_some_and(|live| live.load(Ordering::SeqCst))
    }

    fn take_session(&self) -> Option<RadioSession> {
        lock(&self.inner).session.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_lifecycle() {
        let (medium, mut events) = MockRadioMedium::new();
        assert!(!medium.is_link_up());

        medium.open_link("AA:BB").await.unwrap();
        assert_eq!(events.recv().await, Some(MediumEvent::LinkConnecting));
        assert_eq!(medium.open_requests(), vec!["AA:BB".to_string()]);

        medium.complete_link().await;
        assert_eq!(events.recv().await, Some(MediumEvent::LinkConnected));
        assert!(medium.is_link_up());
        let session = medium.take_session().unwrap();
        assert!(medium.take_session().is_none());

        medium.drop_link().await;
        assert_eq!(events.recv().await, Some(MediumEvent::LinkDisconnected));
        assert!(!medium.is_link_up());
        drop(session);
    }

    #[tokio::test]
    async fn test_power_off_kills_link() {
        let (medium, mut events) = MockRadioMedium::new();
        medium.complete_link().await;
        assert!(medium.is_link_up());

        medium.set_powered(false).await;
        assert!(!medium.is_powered());
        assert!(!medium.is_link_up());
        assert_eq!(events.recv().await, Some(MediumEvent::LinkConnected));
        assert_eq!(events.recv().await, Some(MediumEvent::PowerOff));
    }
}
