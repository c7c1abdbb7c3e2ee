//! Shared radio scan service.
//!
//! Platform radio stacks throttle apps that start and stop scans too
//! often, so all interested parties share one scan through this service:
//! the scan runs while at least one listener is registered, in rolling
//! windows with a short pause between them to stay under the throttling
//! radar.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use rflink_core::constants::{RADIO_SCAN_RESTART_DELAY, RADIO_SCAN_WINDOW};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::provider::{PeerKind, RadioScanProvider, ScanHit};

const HIT_CHANNEL_CAPACITY: usize = 64;
const CTL_CHANNEL_CAPACITY: usize = 16;

/// Handle to a registered listener, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Shared, reference-counted radio scan.
///
/// Cheap to clone; all clones drive the same underlying scan. Sightings
/// are filtered before delivery: classic-only peers and advertisements
/// without a name never reach listeners, and hits that arrive after the
/// scan stopped are dropped.
#[derive(Clone)]
pub struct ScanService {
    inner: Arc<Inner>,
    ctl_tx: mpsc::Sender<Ctl>,
}

struct Inner {
    provider: Arc<dyn RadioScanProvider>,
    listeners: Mutex<HashMap<ListenerId, mpsc::Sender<ScanHit>>>,
    next_id: AtomicU64,
    scanning: AtomicBool,
}

#[derive(Debug)]
enum Ctl {
    Recheck,
}

impl Inner {
    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, HashMap<ListenerId, mpsc::Sender<ScanHit>>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn has_listeners(&self) -> bool {
        !self.lock_listeners().is_empty()
    }

    fn deliver(&self, hit: &ScanHit) {
        // Closed listeners are pruned as they are discovered.
        self.lock_listeners()
            .retain(|_, sink| match sink.try_send(hit.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!("listener lagging, dropping sighting for it");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
    }
}

impl ScanService {
    pub fn new(provider: Arc<dyn RadioScanProvider>) -> Self {
        let inner = Arc::new(Inner {
            provider,
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            scanning: AtomicBool::new(false),
        });
        let (ctl_tx, ctl_rx) = mpsc::channel(CTL_CHANNEL_CAPACITY);
        tokio::spawn(run(inner.clone(), ctl_rx));
        Self { inner, ctl_tx }
    }

    /// Register a listener; the scan starts with the first one. Dropping
    /// the receiving end unregisters lazily, but callers that care about
    /// stopping the scan promptly should call
    /// [`remove_listener`](ScanService::remove_listener).
    pub fn add_listener(&self, sink: mpsc::Sender<ScanHit>) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.lock_listeners().insert(id, sink);
        self.recheck();
        id
    }

    /// Unregister a listener; the scan stops with the last one.
    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.lock_listeners().remove(&id);
        self.recheck();
    }

    /// Whether a scan window is currently open.
    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::SeqCst)
    }

    /// Nudge the service to re-evaluate, e.g. after the host reports an
    /// adapter power change.
    pub fn recheck(&self) {
        let _ = self.ctl_tx.try_send(Ctl::Recheck);
    }
}

async fn run(inner: Arc<Inner>, mut ctl_rx: mpsc::Receiver<Ctl>) {
    debug!("scan service started");
    let mut fan_out: Option<JoinHandle<()>> = None;
    loop {
        let want = inner.has_listeners()
            && inner.provider.is_supported()
            && inner.provider.is_powered();
        let scanning = inner.scanning.load(Ordering::SeqCst);

        if want && !scanning {
            let (hit_tx, hit_rx) = mpsc::channel(HIT_CHANNEL_CAPACITY);
            match inner.provider.start_scan(hit_tx) {
                Ok(()) => {
                    debug!("scan window opened");
                    inner.scanning.store(true, Ordering::SeqCst);
                    fan_out = Some(tokio::spawn(fan_out_hits(inner.clone(), hit_rx)));
                }
                Err(e) => {
                    warn!(error = %e, "failed to start radio scan");
                }
            }
        } else if !want && scanning {
            close_window(&inner, &mut fan_out);
        }

        if inner.scanning.load(Ordering::SeqCst) {
            tokio::select! {
                msg = ctl_rx.recv() => {
                    if msg.is_none() {
                        break;
                    }
                }
                _ = tokio::time::sleep(RADIO_SCAN_WINDOW) => {
                    // Roll the window: stop, breathe, loop back to restart.
                    debug!("scan window expired, rolling");
                    close_window(&inner, &mut fan_out);
                    tokio::time::sleep(RADIO_SCAN_RESTART_DELAY).await;
                }
            }
        } else {
            match ctl_rx.recv().await {
                Some(_) => {}
                None => break,
            }
        }
    }
    if inner.scanning.load(Ordering::SeqCst) {
        close_window(&inner, &mut fan_out);
    }
    debug!("scan service exit");
}

fn close_window(inner: &Inner, fan_out: &mut Option<JoinHandle<()>>) {
    inner.provider.stop_scan();
    inner.scanning.store(false, Ordering::SeqCst);
    if let Some(task) = fan_out.take() {
        task.abort();
    }
    debug!("scan window closed");
}

async fn fan_out_hits(inner: Arc<Inner>, mut hit_rx: mpsc::Receiver<ScanHit>) {
    while let Some(hit) = hit_rx.recv().await {
        if !inner.scanning.load(Ordering::SeqCst) {
            trace!(addr = %hit.addr, "dropping sighting after scan stop");
            continue;
        }
        if hit.kind == PeerKind::Classic {
            continue;
        }
        if hit.name.is_none() {
            continue;
        }
        inner.deliver(&hit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRadioScanProvider;
    use std::time::Duration;

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    fn hit(addr: &str, name: Option<&str>, kind: PeerKind) -> ScanHit {
        ScanHit {
            addr: addr.to_string(),
            name: name.map(str::to_string),
            kind,
            rssi: -50,
            bonded: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_follows_listener_count() {
        let provider = MockRadioScanProvider::new();
        let service = ScanService::new(provider.clone());
        assert!(!service.is_scanning());

        let (tx, _rx) = mpsc::channel(16);
        let id = service.add_listener(tx);
        wait_for(|| service.is_scanning()).await;
        assert_eq!(provider.start_count(), 1);

        service.remove_listener(id);
        wait_for(|| !service.is_scanning()).await;
        assert!(!provider.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls_while_listeners_remain() {
        let provider = MockRadioScanProvider::new();
        let service = ScanService::new(provider.clone());

        let (tx, _rx) = mpsc::channel(16);
        let _id = service.add_listener(tx);
        wait_for(|| provider.start_count() == 1).await;

        tokio::time::sleep(RADIO_SCAN_WINDOW + RADIO_SCAN_RESTART_DELAY * 2).await;
        wait_for(|| provider.start_count() >= 2).await;
        assert!(service.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_classic_and_nameless_peers() {
        let provider = MockRadioScanProvider::new();
        let service = ScanService::new(provider.clone());

        let (tx, mut rx) = mpsc::channel(16);
        let _id = service.add_listener(tx);
        wait_for(|| service.is_scanning()).await;

        provider.emit(hit("11:11", Some("Classic"), PeerKind::Classic)).await;
        provider.emit(hit("22:22", None, PeerKind::Le)).await;
        provider.emit(hit("33:33", Some("Reader"), PeerKind::Le)).await;
        provider.emit(hit("44:44", Some("Maybe"), PeerKind::Unknown)).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.addr, "33:33");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.addr, "44:44");
    }

    #[tokio::test(start_paused = true)]
    async fn test_powered_off_adapter_never_scans() {
        let provider = MockRadioScanProvider::new();
        provider.set_powered(false);
        let service = ScanService::new(provider.clone());

        let (tx, _rx) = mpsc::channel(16);
        let _id = service.add_listener(tx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!service.is_scanning());
        assert_eq!(provider.start_count(), 0);
    }
}
