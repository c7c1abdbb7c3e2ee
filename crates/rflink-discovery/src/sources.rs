//! Per-source scan tasks.
//!
//! Each function here runs as one task for the duration of a scan,
//! translating whatever its provider reports into [`DeviceSpec`]s on the
//! scanner's shared funnel channel. Tasks are cancelled wholesale when
//! the scan ends; anything needing cleanup on cancellation does it in a
//! guard's `Drop`.

use std::sync::Arc;
use std::time::Duration;

use rflink_core::DeviceSpec;
use rflink_core::constants::NETWORK_SERVICE_TYPE;
use rflink_core::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::provider::{
    BroadcastProbe, BusEnumerator, ProbeRecord, RadioScanProvider, ResolvedService,
    ServiceDiscovery, ServiceRecord,
};
use crate::scan_service::{ListenerId, ScanService};

const SOURCE_CHANNEL_CAPACITY: usize = 64;

/// Attempts against a busy resolver before a record is given up.
const RESOLVE_RETRY_LIMIT: u32 = 10;
const RESOLVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Pause between legacy broadcast probe rounds.
const PROBE_ROUND_DELAY: Duration = Duration::from_millis(100);

/// Radio source: bonded peers first, then live sightings from the shared
/// scan until cancelled.
pub(crate) async fn radio_source(
    service: ScanService,
    provider: Arc<dyn RadioScanProvider>,
    found: mpsc::Sender<DeviceSpec>,
) {
    for peer in provider.bonded_peers() {
        let name = peer.name.unwrap_or_default();
        let spec = DeviceSpec::radio(&peer.addr, &name, true, peer.rssi);
        if found.send(spec).await.is_err() {
            return;
        }
    }

    let (hit_tx, mut hit_rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
    let id = service.add_listener(hit_tx);
    let _guard = ListenerGuard {
        service: service.clone(),
        id,
    };
    while let Some(hit) = hit_rx.recv().await {
        let name = hit.name.unwrap_or_default();
        let spec = DeviceSpec::radio(&hit.addr, &name, hit.bonded, hit.rssi);
        if found.send(spec).await.is_err() {
            return;
        }
    }
}

/// Unregisters the scan listener even when the source task is cancelled.
struct ListenerGuard {
    service: ScanService,
    id: ListenerId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.service.remove_listener(self.id);
    }
}

/// Service-discovery source: browse, resolve each announcement, report
/// the endpoint. IPv6-only services are skipped, matching what the
/// readers' own clients can dial.
pub(crate) async fn service_source(
    services: Arc<dyn ServiceDiscovery>,
    found: mpsc::Sender<DeviceSpec>,
) {
    let (record_tx, mut record_rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
    if let Err(e) = services.discover(NETWORK_SERVICE_TYPE, record_tx) {
        debug!(error = %e, "service discovery unavailable");
        return;
    }
    while let Some(record) = record_rx.recv().await {
        match resolve_with_retry(services.as_ref(), &record).await {
            Ok(resolved) => {
                if resolved.host.is_ipv6() {
                    trace!(name = %record.name, "skipping ipv6-only service");
                    continue;
                }
                let transport = resolved.transport.as_deref().unwrap_or("LAN");
                let spec = DeviceSpec::network(
                    &resolved.host.to_string(),
                    resolved.port,
                    &resolved.name,
                    transport,
                );
                if found.send(spec).await.is_err() {
                    return;
                }
            }
            Err(e) => debug!(name = %record.name, error = %e, "failed to resolve service"),
        }
    }
}

/// Resolve one record, retrying while the platform resolver is busy with
/// another request.
async fn resolve_with_retry(
    services: &dyn ServiceDiscovery,
    record: &ServiceRecord,
) -> Result<ResolvedService> {
    for _ in 0..RESOLVE_RETRY_LIMIT {
        let (reply_tx, reply_rx) = oneshot::channel();
        services.resolve(record, reply_tx);
        match reply_rx.await {
            Ok(Ok(resolved)) => return Ok(resolved),
            Ok(Err(Error::Busy { .. })) => {
                tokio::time::sleep(RESOLVE_RETRY_DELAY).await;
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(Error::channel_closed("service resolver")),
        }
    }
    Err(Error::busy("service resolver"))
}

/// Legacy broadcast probe source: query rounds back to back until
/// cancelled. Devices in client mode (`host_mode != 0`) do not accept
/// connections and are skipped.
pub(crate) async fn probe_source(probe: Arc<dyn BroadcastProbe>, found: mpsc::Sender<DeviceSpec>) {
    loop {
        let (answer_tx, mut answer_rx) = mpsc::channel::<ProbeRecord>(SOURCE_CHANNEL_CAPACITY);
        let drain = async {
            while let Some(answer) = answer_rx.recv().await {
                if answer.host_mode != 0 {
                    trace!(title = %answer.title, "skipping client-mode device");
                    continue;
                }
                let spec = DeviceSpec::network(
                    &answer.ip,
                    answer.server_port,
                    &answer.title,
                    &answer.transport,
                );
                if found.send(spec).await.is_err() {
                    break;
                }
            }
        };
        tokio::join!(probe.query(answer_tx), drain);
        if found.is_closed() {
            return;
        }
        tokio::time::sleep(PROBE_ROUND_DELAY).await;
    }
}

/// Bus source: one enumeration pass. The bus spec carries no per-device
/// routing, so one supported device is enough.
pub(crate) async fn bus_source(bus: Arc<dyn BusEnumerator>, found: mpsc::Sender<DeviceSpec>) {
    if bus
        .attached_devices()
        .iter()
        .any(|device| device.is_supported())
    {
        let _ = found.send(DeviceSpec::bus()).await;
    }
}
