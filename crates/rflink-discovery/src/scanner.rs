//! The aggregating device scanner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rflink_core::constants::{DEFAULT_SCAN_PERIOD, clamp_scan_period, is_reader_host};
use rflink_core::{DeviceKinds, DeviceSpec};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::provider::DiscoveryBackends;
use crate::scan_service::ScanService;
use crate::sources;

const CMD_CHANNEL_CAPACITY: usize = 16;
const EVENT_CHANNEL_CAPACITY: usize = 64;
const FOUND_CHANNEL_CAPACITY: usize = 64;

/// Static scanner configuration.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Which discovery sources to run.
    pub kinds: DeviceKinds,
    /// Manufacturer string of the host device, used to decide whether to
    /// offer the integrated reader.
    pub host_manufacturer: String,
    /// Whether the host application ships the assisted-pairing extension;
    /// gates the pairing pseudo device.
    pub pairing_extension: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            kinds: DeviceKinds::ALL,
            host_manufacturer: String::new(),
            pairing_extension: false,
        }
    }
}

/// Progress of one scan, delivered to the registered listener.
///
/// `Started` and `Finished` are always delivered, even to a listener that
/// has fallen behind; `DeviceFound` events may be dropped for a lagging
/// listener, with the device still recorded in the scanner's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A scan began.
    Started,
    /// A device passed filtering and deduplication.
    DeviceFound(DeviceSpec),
    /// The scan ended, by period expiry or by an explicit stop. Fired
    /// exactly once per started scan.
    Finished,
}

#[derive(Debug)]
enum Cmd {
    Register(oneshot::Sender<mpsc::Receiver<ScanEvent>>),
    Scan {
        period: Option<Duration>,
        filter: Option<String>,
        reply: oneshot::Sender<bool>,
    },
    Stop(oneshot::Sender<()>),
    Purge,
    Devices(oneshot::Sender<Vec<DeviceSpec>>),
}

/// Aggregates every configured discovery source into one deduplicated
/// device list with a single progress event stream.
///
/// A scan runs for a clamped period, fanning sources out as concurrent
/// tasks and funnelling everything they find through one channel, so the
/// device list and event ordering stay consistent no matter which source
/// reports first. Devices are deduplicated by address; a name filter, when
/// given, is matched case-insensitively against device names.
///
/// # Examples
///
/// ```no_run
/// use rflink_discovery::{DeviceScanner, DiscoveryBackends, ScanEvent, ScannerConfig};
///
/// # async fn demo() {
/// let scanner = DeviceScanner::new(DiscoveryBackends::new(), ScannerConfig::default());
/// let mut events = scanner.register_listener().await;
/// scanner.scan().await;
/// while let Some(event) = events.recv().await {
///     match event {
///         ScanEvent::DeviceFound(spec) => println!("found {spec}"),
///         ScanEvent::Finished => break,
///         ScanEvent::Started => {}
///     }
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct DeviceScanner {
    cmd_tx: mpsc::Sender<Cmd>,
    scanning: Arc<AtomicBool>,
}

impl DeviceScanner {
    /// Spawn the scanner. Must be called inside a tokio runtime.
    pub fn new(backends: DiscoveryBackends, config: ScannerConfig) -> Self {
        let scanning = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (found_tx, found_rx) = mpsc::channel(FOUND_CHANNEL_CAPACITY);
        let scan_service = backends
            .radio
            .as_ref()
            .map(|provider| ScanService::new(provider.clone()));
        let worker = ScannerWorker {
            backends,
            config,
            scan_service,
            scanning: scanning.clone(),
            devices: Vec::new(),
            listener: None,
            filter: None,
            sources: JoinSet::new(),
            found_tx,
            deadline: None,
        };
        tokio::spawn(worker.run(cmd_rx, found_rx));
        Self { cmd_tx, scanning }
    }

    /// Register the progress listener, replacing any previous one.
    ///
    /// When the scanner is gone the returned channel is already closed.
    pub async fn register_listener(&self) -> mpsc::Receiver<ScanEvent> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(Cmd::Register(reply_tx)).await.is_ok() {
            if let Ok(events) = reply_rx.await {
                return events;
            }
        }
        warn!("scanner task is gone");
        mpsc::channel(1).1
    }

    /// Start a scan with the default period and no name filter. Returns
    /// `false` when a scan is already in progress or no listener is
    /// registered.
    pub async fn scan(&self) -> bool {
        self.scan_with(None, None).await
    }

    /// Start a scan. `period` is clamped to the allowed range; `None`
    /// means the default. `name_filter` keeps only devices whose name
    /// contains the given fragment, case-insensitively.
    ///
    /// Returns `false` when a scan is already in progress or no listener
    /// is registered to receive its results.
    pub async fn scan_with(&self, period: Option<Duration>, name_filter: Option<&str>) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = Cmd::Scan {
            period,
            filter: name_filter.map(str::to_string),
            reply: reply_tx,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!("scanner task is gone");
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Stop the current scan, if any. Returns once `Finished` has been
    /// emitted; stopping an idle scanner does nothing.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(Cmd::Stop(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Forget every device found so far. This is the only way the device
    /// list is ever reset; it survives across scans otherwise, so a device
    /// seen in an earlier scan is not reported again.
    pub async fn purge(&self) {
        let _ = self.cmd_tx.send(Cmd::Purge).await;
    }

    /// Snapshot of the devices found so far, across scans.
    pub async fn devices(&self) -> Vec<DeviceSpec> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(Cmd::Devices(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Whether a scan is in progress.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }
}

struct ScannerWorker {
    backends: DiscoveryBackends,
    config: ScannerConfig,
    scan_service: Option<ScanService>,
    scanning: Arc<AtomicBool>,
    devices: Vec<DeviceSpec>,
    listener: Option<mpsc::Sender<ScanEvent>>,
    filter: Option<String>,
    sources: JoinSet<()>,
    found_tx: mpsc::Sender<DeviceSpec>,
    deadline: Option<tokio::time::Instant>,
}

/// Sleep until the deadline, or forever when there is none.
async fn until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl ScannerWorker {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Cmd>,
        mut found_rx: mpsc::Receiver<DeviceSpec>,
    ) {
        debug!("device scanner started");
        loop {
            let deadline = self.deadline;
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => break,
                },
                // Never yields `None`: this worker holds a sender too.
                Some(spec) = found_rx.recv() => self.add_device(spec),
                _ = until(deadline), if deadline.is_some() => {
                    debug!("scan period elapsed");
                    self.finish().await;
                }
            }
        }
        self.finish().await;
        debug!("device scanner exit");
    }

    async fn on_command(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::Register(reply) => {
                let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
                self.listener = Some(event_tx);
                let _ = reply.send(event_rx);
            }
            Cmd::Scan {
                period,
                filter,
                reply,
            } => {
                let accepted = self.start_scan(period, filter).await;
                let _ = reply.send(accepted);
            }
            Cmd::Stop(ack) => {
                self.finish().await;
                let _ = ack.send(());
            }
            Cmd::Purge => self.devices.clear(),
            Cmd::Devices(reply) => {
                let _ = reply.send(self.devices.clone());
            }
        }
    }

    async fn start_scan(&mut self, period: Option<Duration>, filter: Option<String>) -> bool {
        if self.scanning.load(Ordering::SeqCst) {
            debug!("scan already in progress");
            return false;
        }
        if self.listener.as_ref().is_none_or(mpsc::Sender::is_closed) {
            self.listener = None;
            debug!("scan refused: no listener registered");
            return false;
        }
        let period = clamp_scan_period(period.unwrap_or(DEFAULT_SCAN_PERIOD));
        self.filter = filter.map(|f| f.to_lowercase());
        self.scanning.store(true, Ordering::SeqCst);
        self.deadline = Some(tokio::time::Instant::now() + period);
        info!(?period, kinds = self.config.kinds.bits(), "device scan started");
        self.emit_lifecycle(ScanEvent::Started).await;

        // Pseudo devices go through the same funnel as real sightings, so
        // filtering and deduplication treat them uniformly. The integrated
        // reader is offered whenever the host qualifies, regardless of the
        // requested kinds.
        if is_reader_host(&self.config.host_manufacturer) {
            self.add_device(DeviceSpec::integrated());
        }
        if self.config.pairing_extension {
            self.add_device(DeviceSpec::assisted_pair());
        }

        let kinds = self.config.kinds;
        if kinds.contains(DeviceKinds::RADIO) {
            if let (Some(service), Some(provider)) = (&self.scan_service, &self.backends.radio) {
                self.sources.spawn(sources::radio_source(
                    service.clone(),
                    provider.clone(),
                    self.found_tx.clone(),
                ));
            }
        }
        if kinds.contains(DeviceKinds::NETWORK) {
            if let Some(services) = &self.backends.services {
                self.sources
                    .spawn(sources::service_source(services.clone(), self.found_tx.clone()));
            }
            if let Some(probe) = &self.backends.probe {
                self.sources
                    .spawn(sources::probe_source(probe.clone(), self.found_tx.clone()));
            }
        }
        if kinds.contains(DeviceKinds::BUS) {
            if let Some(bus) = &self.backends.bus {
                self.sources
                    .spawn(sources::bus_source(bus.clone(), self.found_tx.clone()));
            }
        }
        true
    }

    async fn finish(&mut self) {
        if !self.scanning.load(Ordering::SeqCst) {
            return;
        }
        self.scanning.store(false, Ordering::SeqCst);
        self.deadline = None;
        self.sources.abort_all();
        // Drain so cancelled sources run their cleanup guards before the
        // scan is declared over.
        while self.sources.join_next().await.is_some() {}
        if let Some(services) = &self.backends.services {
            services.stop_discovery();
        }
        info!(devices = self.devices.len(), "device scan finished");
        self.emit_lifecycle(ScanEvent::Finished).await;
    }

    fn add_device(&mut self, spec: DeviceSpec) {
        if !self.scanning.load(Ordering::SeqCst) {
            trace!(%spec, "dropping device reported after scan end");
            return;
        }
        let Some(name) = spec.name() else {
            trace!(%spec, "dropping device spec without a name");
            return;
        };
        if let Some(filter) = &self.filter {
            if !name.to_lowercase().contains(filter.as_str()) {
                trace!(%spec, "device filtered out by name");
                return;
            }
        }
        if self.devices.iter().any(|known| known.is_same_device(&spec)) {
            return;
        }
        debug!(%spec, "device found");
        self.devices.push(spec.clone());
        self.emit_device(spec);
    }

    /// Best-effort delivery for per-device events. A lagging listener
    /// loses events rather than stalling the scan.
    fn emit_device(&mut self, spec: DeviceSpec) {
        if let Some(listener) = &self.listener {
            match listener.try_send(ScanEvent::DeviceFound(spec)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!(?event, "listener lagging, dropping scan event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.listener = None;
                }
            }
        }
    }

    /// Guaranteed delivery for `Started`/`Finished`: waits for channel
    /// capacity instead of dropping, so the listener always sees the scan
    /// lifecycle even when it lost device events in between.
    async fn emit_lifecycle(&mut self, event: ScanEvent) {
        if let Some(listener) = &self.listener {
            if listener.send(event).await.is_err() {
                self.listener = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanning_worker() -> ScannerWorker {
        let (found_tx, _) = mpsc::channel(FOUND_CHANNEL_CAPACITY);
        ScannerWorker {
            backends: DiscoveryBackends::new(),
            config: ScannerConfig::default(),
            scan_service: None,
            scanning: Arc::new(AtomicBool::new(true)),
            devices: Vec::new(),
            listener: None,
            filter: None,
            sources: JoinSet::new(),
            found_tx,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_nameless_spec_is_dropped() {
        let mut worker = scanning_worker();
        worker.add_device(DeviceSpec::new("TCP", "10.0.0.9:6734"));
        assert!(worker.devices.is_empty());

        let named = DeviceSpec::new("TCP", "10.0.0.9:6734").with("name", "Dock");
        worker.add_device(named);
        assert_eq!(worker.devices.len(), 1);
    }

    #[tokio::test]
    async fn test_dedup_spans_filter_and_identity() {
        let mut worker = scanning_worker();
        worker.filter = Some("dock".to_string());
        worker.add_device(DeviceSpec::network("10.0.0.9", 6734, "Dock", "LAN"));
        worker.add_device(DeviceSpec::network("10.0.0.9", 6734, "Dock", "WLAN"));
        worker.add_device(DeviceSpec::network("10.0.0.10", 6734, "Shelf", "LAN"));
        assert_eq!(worker.devices.len(), 1);
    }
}
