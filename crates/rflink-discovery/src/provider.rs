//! Discovery provider seams.
//!
//! Each discovery source wraps one platform capability behind a small
//! trait: an active radio scan, local-network service discovery, the
//! legacy broadcast probe and bus enumeration. The host injects whichever
//! it supports; a scan simply skips sources with no backend.
//!
//! Providers report through channels rather than return values because
//! the platforms behind them are callback-driven: results trickle in for
//! the whole lifetime of a scan.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rflink_core::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Advertised peer class seen by a radio scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    /// Low-energy advertisement.
    Le,
    /// Classic-only peer.
    Classic,
    /// The stack could not classify the peer.
    Unknown,
}

/// One sighting of a peer during a radio scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHit {
    pub addr: String,
    /// Advertised name; `None` when the advertisement carried none.
    pub name: Option<String>,
    pub kind: PeerKind,
    pub rssi: i32,
    pub bonded: bool,
}

/// Active short-range radio scanning plus the bonded-peer list.
pub trait RadioScanProvider: Send + Sync {
    /// Whether the host has a scanning-capable radio stack.
    fn is_supported(&self) -> bool;

    /// Whether the adapter is powered on.
    fn is_powered(&self) -> bool;

    /// Peers bonded to the host, reported without scanning.
    fn bonded_peers(&self) -> Vec<ScanHit>;

    /// Start an active scan, delivering sightings into `sink` until
    /// [`stop_scan`](RadioScanProvider::stop_scan) is called.
    fn start_scan(&self, sink: mpsc::Sender<ScanHit>) -> Result<()>;

    /// Stop the active scan. Idempotent.
    fn stop_scan(&self);
}

/// One service instance announced on the local network, not yet resolved
/// to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub service_type: String,
}

/// A resolved service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub host: IpAddr,
    pub port: u16,
    pub name: String,
    /// `LAN`/`WLAN` marker from the service metadata, when present.
    pub transport: Option<String>,
}

/// Local-network service discovery (mDNS-style).
pub trait ServiceDiscovery: Send + Sync {
    /// Start browsing for `service_type`, announcing instances into
    /// `sink` until [`stop_discovery`](ServiceDiscovery::stop_discovery).
    fn discover(&self, service_type: &str, sink: mpsc::Sender<ServiceRecord>) -> Result<()>;

    /// Stop browsing. Idempotent.
    fn stop_discovery(&self);

    /// Resolve one announced instance to an endpoint. Platform resolvers
    /// are typically single-flight: a busy resolver answers
    /// [`Error::Busy`](rflink_core::Error) and the caller retries.
    fn resolve(&self, record: &ServiceRecord, reply: oneshot::Sender<Result<ResolvedService>>);
}

/// One answer to a legacy broadcast probe round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub title: String,
    pub ip: String,
    pub server_port: u16,
    /// 0 means the device runs in server mode and accepts connections.
    pub host_mode: u32,
    /// `LAN` or `WLAN`, as reported by the device.
    pub transport: String,
}

/// Legacy subnet broadcast probe for readers that predate service
/// discovery.
#[async_trait]
pub trait BroadcastProbe: Send + Sync {
    /// Run one probe round, delivering answers into `sink` as they
    /// arrive, and return once the round's listen window closes.
    async fn query(&self, sink: mpsc::Sender<ProbeRecord>);
}

/// One bus-attached device as seen by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachedBusDevice {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl AttachedBusDevice {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Whether this device is on the supported-reader allow-list.
    pub fn is_supported(&self) -> bool {
        rflink_core::constants::is_supported_bus_device(self.vendor_id, self.product_id)
    }
}

/// Bus device enumeration.
pub trait BusEnumerator: Send + Sync {
    fn attached_devices(&self) -> Vec<AttachedBusDevice>;
}

/// The provider bundle a scanner draws from. Absent backends simply take
/// their source out of play.
#[derive(Default, Clone)]
pub struct DiscoveryBackends {
    pub radio: Option<Arc<dyn RadioScanProvider>>,
    pub services: Option<Arc<dyn ServiceDiscovery>>,
    pub probe: Option<Arc<dyn BroadcastProbe>>,
    pub bus: Option<Arc<dyn BusEnumerator>>,
}

impl DiscoveryBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_radio(mut self, radio: Arc<dyn RadioScanProvider>) -> Self {
        self.radio = Some(radio);
        self
    }

    pub fn with_services(mut self, services: Arc<dyn ServiceDiscovery>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn BroadcastProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn BusEnumerator>) -> Self {
        self.bus = Some(bus);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attached_device_allow_list() {
        assert!(AttachedBusDevice::new(3589, 274).is_supported());
        assert!(!AttachedBusDevice::new(3589, 1).is_supported());
    }

    #[test]
    fn test_empty_backends() {
        let backends = DiscoveryBackends::new();
        assert!(backends.radio.is_none());
        assert!(backends.services.is_none());
        assert!(backends.probe.is_none());
        assert!(backends.bus.is_none());
    }
}
