//! Multi-source reader discovery for RFLink.
//!
//! Readers show up in very different places: advertising over short-range
//! radio, announcing themselves on the local network, answering legacy
//! broadcast probes, sitting on the local bus, or built into the host
//! device itself. This crate aggregates all of them behind one scan:
//!
//! - [`provider`]: the seams the host implements per platform capability.
//! - [`ScanService`]: the shared, reference-counted radio scan with its
//!   rolling window.
//! - [`DeviceScanner`]: the aggregator running one clamped-period scan
//!   over every configured source, deduplicating by address and streaming
//!   [`ScanEvent`]s to the registered listener.
//!
//! Discovered devices are [`DeviceSpec`](rflink_core::DeviceSpec) values;
//! their `addr` field is what the auto-connect controllers in
//! `rflink-transport` take as a target.

pub mod mock;
pub mod provider;
pub mod scan_service;
pub mod scanner;
mod sources;

pub use provider::{
    AttachedBusDevice, BroadcastProbe, BusEnumerator, DiscoveryBackends, PeerKind, ProbeRecord,
    RadioScanProvider, ResolvedService, ScanHit, ServiceDiscovery, ServiceRecord,
};
pub use scan_service::{ListenerId, ScanService};
pub use scanner::{DeviceScanner, ScanEvent, ScannerConfig};
