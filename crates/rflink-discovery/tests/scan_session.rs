//! End-to-end scan sessions over the full mock provider bundle.
//!
//! Runs under a paused clock so default-length scan periods elapse
//! instantly once every task is idle.

use std::sync::Arc;
use std::time::Duration;

use rflink_core::{DeviceKinds, DeviceSpec, Error};
use rflink_discovery::mock::{
    MockBroadcastProbe, MockBusEnumerator, MockRadioScanProvider, MockServiceDiscovery,
};
use rflink_discovery::{
    AttachedBusDevice, DeviceScanner, DiscoveryBackends, PeerKind, ProbeRecord, ResolvedService,
    ScanEvent, ScanHit, ScannerConfig, ServiceRecord,
};
use tokio::sync::mpsc;

struct Rig {
    radio: Arc<MockRadioScanProvider>,
    services: Arc<MockServiceDiscovery>,
    probe: Arc<MockBroadcastProbe>,
    bus: Arc<MockBusEnumerator>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Rig {
    fn new() -> Self {
        init_tracing();
        Self {
            radio: MockRadioScanProvider::new(),
            services: MockServiceDiscovery::new(),
            probe: MockBroadcastProbe::new(),
            bus: MockBusEnumerator::new(),
        }
    }

    fn backends(&self) -> DiscoveryBackends {
        DiscoveryBackends::new()
            .with_radio(self.radio.clone())
            .with_services(self.services.clone())
            .with_probe(self.probe.clone())
            .with_bus(self.bus.clone())
    }
}

fn le_hit(addr: &str, name: &str, rssi: i32) -> ScanHit {
    ScanHit {
        addr: addr.to_string(),
        name: Some(name.to_string()),
        kind: PeerKind::Le,
        rssi,
        bonded: false,
    }
}

fn record(name: &str) -> ServiceRecord {
    ServiceRecord {
        name: name.to_string(),
        service_type: "_rflink._tcp.".to_string(),
    }
}

fn resolved(name: &str, host: &str, port: u16) -> ResolvedService {
    ResolvedService {
        host: host.parse().unwrap(),
        port,
        name: name.to_string(),
        transport: None,
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(120), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn collect_until_finished(events: &mut mpsc::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut out = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(120), events.recv())
            .await
            .expect("no event in time")
            .expect("event stream closed");
        let finished = event == ScanEvent::Finished;
        out.push(event);
        if finished {
            return out;
        }
    }
}

fn found_addrs(events: &[ScanEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ScanEvent::DeviceFound(spec) => Some(spec.address().to_string()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_aggregates_all_sources_with_dedup() {
    let rig = Rig::new();
    rig.radio.add_bonded(ScanHit {
        bonded: true,
        ..le_hit("AA:01", "EXA51-0001", -40)
    });
    rig.services
        .script_resolution("Cabinet", Ok(resolved("Cabinet", "10.0.0.7", 6734)));
    // The probe sees the same endpoint as service discovery, plus one
    // device in client mode that must not be offered.
    rig.probe.add_record(ProbeRecord {
        title: "Cabinet".to_string(),
        ip: "10.0.0.7".to_string(),
        server_port: 6734,
        host_mode: 0,
        transport: "LAN".to_string(),
    });
    rig.probe.add_record(ProbeRecord {
        title: "ClientModeBox".to_string(),
        ip: "10.0.0.8".to_string(),
        server_port: 6734,
        host_mode: 1,
        transport: "WLAN".to_string(),
    });
    rig.bus.attach(AttachedBusDevice::new(3589, 274));

    let config = ScannerConfig {
        kinds: DeviceKinds::ALL,
        host_manufacturer: "Nordic ID Oyj".to_string(),
        pairing_extension: true,
    };
    let scanner = DeviceScanner::new(rig.backends(), config);
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan().await);
    assert!(scanner.is_scanning());

    let radio = rig.radio.clone();
    wait_for(move || radio.is_scanning()).await;
    rig.radio.emit(le_hit("AA:02", "EXA51-0002", -55)).await;
    // A second sighting of a known device must not produce a duplicate.
    rig.radio.emit(le_hit("AA:02", "EXA51-0002", -61)).await;
    let services = rig.services.clone();
    wait_for(move || services.is_browsing()).await;
    rig.services.announce(record("Cabinet")).await;

    let events = collect_until_finished(&mut events).await;
    assert_eq!(events.first(), Some(&ScanEvent::Started));
    assert_eq!(events.last(), Some(&ScanEvent::Finished));

    let addrs = found_addrs(&events);
    assert!(addrs.contains(&"integrated_reader".to_string()));
    assert!(addrs.contains(&"assisted_pair".to_string()));
    assert!(addrs.contains(&"AA:01".to_string()));
    assert!(addrs.contains(&"AA:02".to_string()));
    assert!(addrs.contains(&"10.0.0.7:6734".to_string()));
    assert!(addrs.contains(&"USB".to_string()));
    assert!(!addrs.contains(&"10.0.0.8:6734".to_string()));

    // Deduplication: every address exactly once.
    let mut unique = addrs.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), addrs.len());

    assert!(!scanner.is_scanning());
    assert_eq!(scanner.devices().await.len(), addrs.len());
}

#[tokio::test(start_paused = true)]
async fn test_scan_period_is_clamped() {
    let rig = Rig::new();
    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;

    let started = tokio::time::Instant::now();
    assert!(
        scanner
            .scan_with(Some(Duration::from_millis(100)), None)
            .await
    );
    collect_until_finished(&mut events).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_scan_is_refused() {
    let rig = Rig::new();
    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan().await);
    assert!(!scanner.scan().await);
    collect_until_finished(&mut events).await;

    // Once finished, a new scan is accepted again.
    assert!(scanner.scan().await);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_finishes_once() {
    let rig = Rig::new();
    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan().await);
    scanner.stop().await;
    scanner.stop().await;

    let collected = collect_until_finished(&mut events).await;
    let finished = collected
        .iter()
        .filter(|event| **event == ScanEvent::Finished)
        .count();
    assert_eq!(finished, 1);

    // Nothing further arrives from the stopped scan.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_name_filter_matches_case_insensitively() {
    let rig = Rig::new();
    let scanner = DeviceScanner::new(
        rig.backends(),
        ScannerConfig {
            host_manufacturer: "Nordic ID".to_string(),
            ..ScannerConfig::default()
        },
    );
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan_with(None, Some("exa")).await);
    let radio = rig.radio.clone();
    wait_for(move || radio.is_scanning()).await;
    rig.radio.emit(le_hit("AA:01", "EXA51-1234", -48)).await;
    rig.radio.emit(le_hit("AA:02", "Office Printer", -50)).await;

    let events = collect_until_finished(&mut events).await;
    let addrs = found_addrs(&events);
    // The filter also screens out the integrated pseudo device.
    assert_eq!(addrs, vec!["AA:01".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_busy_resolver_is_retried() {
    let rig = Rig::new();
    rig.services
        .script_resolution("Dock", Err(Error::busy("resolver")));
    rig.services
        .script_resolution("Dock", Err(Error::busy("resolver")));
    rig.services
        .script_resolution("Dock", Ok(resolved("Dock", "10.0.0.5", 6734)));

    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;
    assert!(scanner.scan().await);

    let services = rig.services.clone();
    wait_for(move || services.is_browsing()).await;
    rig.services.announce(record("Dock")).await;

    let events = collect_until_finished(&mut events).await;
    assert!(found_addrs(&events).contains(&"10.0.0.5:6734".to_string()));
    assert_eq!(rig.services.resolve_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ipv6_services_are_skipped() {
    let rig = Rig::new();
    rig.services
        .script_resolution("V6Box", Ok(resolved("V6Box", "fe80::1", 6734)));

    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;
    assert!(scanner.scan().await);

    let services = rig.services.clone();
    wait_for(move || services.is_browsing()).await;
    rig.services.announce(record("V6Box")).await;

    let events = collect_until_finished(&mut events).await;
    assert!(found_addrs(&events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_late_sightings_are_dropped() {
    let rig = Rig::new();
    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan().await);
    let radio = rig.radio.clone();
    wait_for(move || radio.is_scanning()).await;
    rig.radio.emit(le_hit("AA:01", "EXA51-0001", -40)).await;
    tokio::time::timeout(Duration::from_secs(120), async {
        while scanner.devices().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sighting never registered");
    scanner.stop().await;
    collect_until_finished(&mut events).await;

    let before = scanner.devices().await;
    rig.radio.emit(le_hit("BB:02", "EXA51-0002", -40)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scanner.devices().await, before);
}

#[tokio::test(start_paused = true)]
async fn test_scan_without_listener_is_refused() {
    let rig = Rig::new();
    rig.bus.attach(AttachedBusDevice::new(3589, 274));
    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());

    // No listener yet: nothing would see the results.
    assert!(!scanner.scan().await);
    assert!(!scanner.is_scanning());
    assert!(scanner.devices().await.is_empty());

    // A listener whose receiver was dropped counts as unregistered too.
    drop(scanner.register_listener().await);
    assert!(!scanner.scan().await);

    let mut events = scanner.register_listener().await;
    assert!(scanner.scan().await);
    let events = collect_until_finished(&mut events).await;
    assert_eq!(found_addrs(&events), vec!["USB".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_device_list_survives_between_scans() {
    let rig = Rig::new();
    rig.bus.attach(AttachedBusDevice::new(3589, 274));
    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan().await);
    let first = collect_until_finished(&mut events).await;
    assert_eq!(found_addrs(&first), vec!["USB".to_string()]);

    // The same device in a second scan is old news: the list persists
    // until an explicit purge.
    assert!(scanner.scan().await);
    let second = collect_until_finished(&mut events).await;
    assert!(found_addrs(&second).is_empty());
    assert_eq!(scanner.devices().await.len(), 1);

    scanner.purge().await;
    assert!(scanner.scan().await);
    let third = collect_until_finished(&mut events).await;
    assert_eq!(found_addrs(&third), vec!["USB".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_finished_reaches_a_lagging_listener() {
    let rig = Rig::new();
    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan().await);
    let radio = rig.radio.clone();
    wait_for(move || radio.is_scanning()).await;
    // More sightings than the event channel holds, with nobody reading.
    for i in 0..80u32 {
        rig.radio
            .emit(le_hit(&format!("AA:{i:02}"), &format!("EXA51-{i:04}"), -40))
            .await;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let collected = collect_until_finished(&mut events).await;
    assert_eq!(collected.first(), Some(&ScanEvent::Started));
    assert_eq!(collected.last(), Some(&ScanEvent::Finished));
    let finished = collected
        .iter()
        .filter(|event| **event == ScanEvent::Finished)
        .count();
    assert_eq!(finished, 1);

    // Device events were shed under pressure; the device list was not.
    assert!(found_addrs(&collected).len() < 80);
    assert_eq!(scanner.devices().await.len(), 80);
}

#[tokio::test(start_paused = true)]
async fn test_purge_clears_found_devices() {
    let rig = Rig::new();
    rig.bus.attach(AttachedBusDevice::new(1254, 2321));
    let scanner = DeviceScanner::new(rig.backends(), ScannerConfig::default());
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan().await);
    collect_until_finished(&mut events).await;
    assert!(!scanner.devices().await.is_empty());

    scanner.purge().await;
    assert!(scanner.devices().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_integrated_reader_ignores_kind_mask() {
    let rig = Rig::new();
    let scanner = DeviceScanner::new(
        rig.backends(),
        ScannerConfig {
            kinds: DeviceKinds::NONE,
            host_manufacturer: "nordicid".to_string(),
            pairing_extension: false,
        },
    );
    let mut events = scanner.register_listener().await;

    assert!(scanner.scan().await);
    let events = collect_until_finished(&mut events).await;
    let addrs = found_addrs(&events);
    assert_eq!(addrs, vec!["integrated_reader".to_string()]);

    let specs = scanner.devices().await;
    assert_eq!(specs, vec![DeviceSpec::integrated()]);
}
