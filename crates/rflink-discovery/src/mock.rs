//! Mock discovery providers for tests and host-app bring-up.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use rflink_core::{Error, Result};
use tokio::sync::{mpsc, oneshot};

use crate::provider::{
    AttachedBusDevice, BroadcastProbe, BusEnumerator, ProbeRecord, RadioScanProvider,
    ResolvedService, ScanHit, ServiceDiscovery, ServiceRecord,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Scriptable radio scan provider. Sightings are emitted by the test
/// while a scan is active; emissions outside a scan go nowhere, like a
/// real stack's would.
#[derive(Debug, Default)]
pub struct MockRadioScanProvider {
    inner: Mutex<RadioInner>,
    unsupported: AtomicBool,
    unpowered: AtomicBool,
    starts: AtomicU32,
}

#[derive(Debug, Default)]
struct RadioInner {
    sink: Option<mpsc::Sender<ScanHit>>,
    bonded: Vec<ScanHit>,
}

impl MockRadioScanProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_supported(&self, supported: bool) {
        self.unsupported.store(!supported, Ordering::SeqCst);
    }

    pub fn set_powered(&self, powered: bool) {
        self.unpowered.store(!powered, Ordering::SeqCst);
    }

    /// Add a peer to the bonded list.
    pub fn add_bonded(&self, hit: ScanHit) {
        lock(&self.inner).bonded.push(hit);
    }

    /// Deliver a sighting into the active scan, if any.
    pub async fn emit(&self, hit: ScanHit) {
        let sink = lock(&self.inner).sink.clone();
        if let Some(sink) = sink {
            let _ = sink.send(hit).await;
        }
    }

    /// Whether a scan is currently active.
    pub fn is_scanning(&self) -> bool {
        lock(&self.inner).sink.is_some()
    }

    /// How many scans were started so far.
    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

impl RadioScanProvider for MockRadioScanProvider {
    fn is_supported(&self) -> bool {
        !self.unsupported.load(Ordering::SeqCst)
    }

    fn is_powered(&self) -> bool {
        !self.unpowered.load(Ordering::SeqCst)
    }

    fn bonded_peers(&self) -> Vec<ScanHit> {
        lock(&self.inner).bonded.clone()
    }

    fn start_scan(&self, sink: mpsc::Sender<ScanHit>) -> Result<()> {
        if !self.is_powered() {
            return Err(Error::medium_unavailable("radio powered off"));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner).sink = Some(sink);
        Ok(())
    }

    fn stop_scan(&self) {
        lock(&self.inner).sink = None;
    }
}

/// Scriptable service discovery. Announcements are pushed by the test;
/// resolutions are answered from a per-name script, in order.
#[derive(Debug, Default)]
pub struct MockServiceDiscovery {
    inner: Mutex<ServiceInner>,
}

#[derive(Debug, Default)]
struct ServiceInner {
    sink: Option<mpsc::Sender<ServiceRecord>>,
    resolutions: HashMap<String, VecDeque<Result<ResolvedService>>>,
    resolve_calls: u32,
}

impl MockServiceDiscovery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one resolution answer for services named `name`.
    pub fn script_resolution(&self, name: &str, answer: Result<ResolvedService>) {
        lock(&self.inner)
            .resolutions
            .entry(name.to_string())
            .or_default()
            .push_back(answer);
    }

    /// Announce a service instance into the active browse, if any.
    pub async fn announce(&self, record: ServiceRecord) {
        let sink = lock(&self.inner).sink.clone();
        if let Some(sink) = sink {
            let _ = sink.send(record).await;
        }
    }

    pub fn is_browsing(&self) -> bool {
        lock(&self.inner).sink.is_some()
    }

    pub fn resolve_calls(&self) -> u32 {
        lock(&self.inner).resolve_calls
    }
}

impl ServiceDiscovery for MockServiceDiscovery {
    fn discover(&self, _service_type: &str, sink: mpsc::Sender<ServiceRecord>) -> Result<()> {
        lock(&self.inner).sink = Some(sink);
        Ok(())
    }

    fn stop_discovery(&self) {
        lock(&self.inner).sink = None;
    }

    fn resolve(&self, record: &ServiceRecord, reply: oneshot::Sender<Result<ResolvedService>>) {
        let mut inner = lock(&self.inner);
        inner.resolve_calls += 1;
        let answer = inner
            .resolutions
            .get_mut(&record.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(Error::other("no resolution scripted")));
        let _ = reply.send(answer);
    }
}

/// Broadcast probe answering every round with a fixed record set.
#[derive(Debug, Default)]
pub struct MockBroadcastProbe {
    records: Mutex<Vec<ProbeRecord>>,
    rounds: AtomicU32,
}

impl MockBroadcastProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_record(&self, record: ProbeRecord) {
        lock(&self.records).push(record);
    }

    pub fn rounds(&self) -> u32 {
        self.rounds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BroadcastProbe for MockBroadcastProbe {
    async fn query(&self, sink: mpsc::Sender<ProbeRecord>) {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        let records = lock(&self.records).clone();
        for record in records {
            if sink.send(record).await.is_err() {
                return;
            }
        }
    }
}

/// Bus enumerator over a fixed device list.
#[derive(Debug, Default)]
pub struct MockBusEnumerator {
    devices: Mutex<Vec<AttachedBusDevice>>,
}

impl MockBusEnumerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(&self, device: AttachedBusDevice) {
        lock(&self.devices).push(device);
    }
}

impl BusEnumerator for MockBusEnumerator {
    fn attached_devices(&self) -> Vec<AttachedBusDevice> {
        lock(&self.devices).clone()
    }
}
