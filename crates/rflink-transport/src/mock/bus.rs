//! Scriptable [`BusMedium`] implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rflink_core::{Error, Result};
use tokio::sync::mpsc;

use crate::medium::{BusDeviceInfo, BusMedium, MediumEvent};
use crate::mock::lock;
use crate::pipe::{self, PIPE_CAPACITY, PipeEnd};
use crate::session::BusSession;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Mock local bus stack.
///
/// Attach and detach are test-driven, and the OS permission dialog is
/// scripted: requests are granted unless [`deny_requests`] was called.
///
/// [`deny_requests`]: MockBusMedium::deny_requests
#[derive(Debug)]
pub struct MockBusMedium {
    events: mpsc::Sender<MediumEvent>,
    inner: Mutex<Inner>,
    deny: AtomicBool,
}

#[derive(Debug, Default)]
struct Inner {
    attached: Vec<BusDeviceInfo>,
    granted: HashSet<BusDeviceInfo>,
    lives: HashMap<BusDeviceInfo, Arc<AtomicBool>>,
    /// Device-side pipe ends of opened devices, for traffic emulation.
    peers: HashMap<BusDeviceInfo, PipeEnd>,
}

impl MockBusMedium {
    /// Create an empty bus plus the event stream the controller under
    /// test should consume.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<MediumEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let medium = Arc::new(Self {
            events,
            inner: Mutex::new(Inner::default()),
            deny: AtomicBool::new(false),
        });
        (medium, events_rx)
    }

    async fn emit(&self, event: MediumEvent) {
        let _ = self.events.send(event).await;
    }

    /// Plug a device in and report it.
    pub async fn attach(&self, device: BusDeviceInfo) {
        {
            let mut inner = lock(&self.inner);
            inner.attached.push(device);
            inner
                .lives
                .insert(device, Arc::new(AtomicBool::new(true)));
        }
        self.emit(MediumEvent::DeviceAttached(device)).await;
    }

    /// Unplug a device, killing any open session over it, and report it.
    pub async fn detach(&self, device: BusDeviceInfo) {
        {
            let mut inner = lock(&self.inner);
            inner.attached.retain(|d| *d != device);
            if let Some(live) = inner.lives.remove(&device) {
                live.store(false, Ordering::SeqCst);
            }
            inner.peers.remove(&device);
        }
        self.emit(MediumEvent::DeviceDetached(device)).await;
    }

    /// Pre-grant permission, skipping the request flow.
    pub fn grant(&self, device: BusDeviceInfo) {
        lock(&self.inner).granted.insert(device);
    }

    /// Make every subsequent permission request come back denied.
    pub fn deny_requests(&self) {
        self.deny.store(true, Ordering::SeqCst);
    }

    /// Take the device-side pipe end of an opened device.
    pub fn peer(&self, device: &BusDeviceInfo) -> Option<PipeEnd> {
        lock(&self.inner).peers.remove(device)
    }
}

#[async_trait]
impl BusMedium for MockBusMedium {
    fn attached_devices(&self) -> Vec<BusDeviceInfo> {
        lock(&self.inner).attached.clone()
    }

    fn has_permission(&self, device: &BusDeviceInfo) -> bool {
        lock(&self.inner).granted.contains(device)
    }

    async fn request_permission(&self, device: &BusDeviceInfo) {
        let granted = !self.deny.load(Ordering::SeqCst);
        if granted {
            lock(&self.inner).granted.insert(*device);
        }
        self.emit(MediumEvent::PermissionResult { granted }).await;
    }

    fn open(&self, device: &BusDeviceInfo) -> Result<BusSession> {
        let mut inner = lock(&self.inner);
        if !inner.granted.contains(device) {
            return Err(Error::permission_denied(device.to_string()));
        }
        let Some(live) = inner.lives.get(device).cloned() else {
            return Err(Error::disconnected("device not attached"));
        };
        let (host_end, device_end) = pipe::duplex(PIPE_CAPACITY);
        inner.peers.insert(*device, device_end);
        Ok(BusSession::new(host_end, live))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supported() -> BusDeviceInfo {
        BusDeviceInfo::new(3589, 274)
    }

    #[tokio::test]
    async fn test_open_requires_permission() {
        let (medium, mut events) = MockBusMedium::new();
        let device = supported();
        medium.attach(device).await;
        assert_eq!(
            events.recv().await,
            Some(MediumEvent::DeviceAttached(device))
        );

        assert!(medium.open(&device).is_err());
        medium.request_permission(&device).await;
        assert_eq!(
            events.recv().await,
            Some(MediumEvent::PermissionResult { granted: true })
        );
        assert!(medium.open(&device).is_ok());
    }

    #[tokio::test]
    async fn test_denied_requests_grant_nothing() {
        let (medium, mut events) = MockBusMedium::new();
        let device = supported();
        medium.attach(device).await;
        let _ = events.recv().await;

        medium.deny_requests();
        medium.request_permission(&device).await;
        assert_eq!(
            events.recv().await,
            Some(MediumEvent::PermissionResult { granted: false })
        );
        assert!(!medium.has_permission(&device));
    }

    #[tokio::test]
    async fn test_detach_kills_session() {
        let (medium, _events) = MockBusMedium::new();
        let device = supported();
        medium.attach(device).await;
        medium.grant(device);
        let session = medium.open(&device).unwrap();

        use crate::session::TransportSession;
        let mut session = session;
        session.connect().await.unwrap();
        medium.detach(device).await;
        assert!(!session.is_connected());
    }
}
