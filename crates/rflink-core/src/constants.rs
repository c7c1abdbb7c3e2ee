//! Protocol and policy constants shared across the SDK.
//!
//! Values here mirror the behavior of the shipped reader firmware and host
//! SDKs: the fixed server port of the integrated reader, the USB vendor and
//! product ids the bus controller is allowed to open, and the timing policy
//! of discovery scans and auto-connect retries.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Discovery scan periods
// ---------------------------------------------------------------------------

/// Shortest allowed discovery scan; shorter requests are clamped up.
pub const MIN_SCAN_PERIOD: Duration = Duration::from_secs(1);

/// Longest allowed discovery scan; longer requests are clamped down.
pub const MAX_SCAN_PERIOD: Duration = Duration::from_secs(60);

/// Scan period used when the caller does not specify one.
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_secs(10);

/// Length of one rolling radio scan window in the shared scan service.
pub const RADIO_SCAN_WINDOW: Duration = Duration::from_secs(20);

/// Pause before the shared scan service reopens an expired scan window.
pub const RADIO_SCAN_RESTART_DELAY: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Pseudo-address of the reader integrated into the host device.
///
/// The socket controller resolves this to `localhost` and
/// [`INTEGRATED_READER_PORT`].
pub const INTEGRATED_READER_ADDR: &str = "integrated_reader";

/// Sentinel address that forces a controller to stay disconnected.
///
/// Matched case-insensitively.
pub const DISABLED_ADDR: &str = "disabled";

/// TCP port the integrated reader listens on.
pub const INTEGRATED_READER_PORT: u16 = 6734;

/// Service type advertised by network-attached readers for local-network
/// service discovery.
pub const NETWORK_SERVICE_TYPE: &str = "_rflink._tcp.";

// ---------------------------------------------------------------------------
// Bus device allow-list
// ---------------------------------------------------------------------------

/// USB vendor ids of supported reader modules.
pub const BUS_VENDOR_IDS: [u16; 2] = [3589, 1254];

/// USB product ids of supported reader modules.
pub const BUS_PRODUCT_IDS: [u16; 2] = [274, 2321];

/// Check whether a (vendor, product) id pair identifies a supported reader.
pub fn is_supported_bus_device(vendor_id: u16, product_id: u16) -> bool {
    BUS_VENDOR_IDS.contains(&vendor_id) && BUS_PRODUCT_IDS.contains(&product_id)
}

// ---------------------------------------------------------------------------
// Integrated reader host detection
// ---------------------------------------------------------------------------

/// Manufacturer-string markers identifying hosts with an integrated reader.
pub const READER_HOST_MARKERS: [&str; 2] = ["nordicid", "nordic id"];

/// Heuristic: does the given host manufacturer string identify a
/// reader-branded device with an integrated reader module?
pub fn is_reader_host(manufacturer: &str) -> bool {
    let manufacturer = manufacturer.to_lowercase();
    READER_HOST_MARKERS
        .iter()
        .any(|marker| manufacturer.contains(marker))
}

// ---------------------------------------------------------------------------
// Auto-connect timing
// ---------------------------------------------------------------------------

/// Debounce between a radio link reporting connected and the controller
/// installing the session, to absorb link flaps.
pub const RADIO_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Delay after the radio powers on before reconnecting, letting the medium
/// stack stabilize.
pub const RADIO_POWER_ON_DELAY: Duration = Duration::from_secs(2);

/// Delay between picking a bus device and opening it.
pub const BUS_CONNECT_DELAY: Duration = Duration::from_millis(200);

/// Interval between socket connect attempts and liveness polls.
pub const SOCKET_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Bound on waiting for a controller worker to exit during teardown; after
/// this the worker is aborted and teardown proceeds.
pub const TEARDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Clamp a requested scan period into `[MIN_SCAN_PERIOD, MAX_SCAN_PERIOD]`.
pub fn clamp_scan_period(requested: Duration) -> Duration {
    requested.clamp(MIN_SCAN_PERIOD, MAX_SCAN_PERIOD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::from_millis(500), Duration::from_secs(1))]
    #[case(Duration::from_millis(1000), Duration::from_secs(1))]
    #[case(Duration::from_secs(10), Duration::from_secs(10))]
    #[case(Duration::from_secs(60), Duration::from_secs(60))]
    #[case(Duration::from_millis(120_000), Duration::from_secs(60))]
    fn test_clamp_scan_period(#[case] requested: Duration, #[case] expected: Duration) {
        assert_eq!(clamp_scan_period(requested), expected);
    }

    #[rstest]
    #[case(3589, 274, true)]
    #[case(3589, 2321, true)]
    #[case(1254, 274, true)]
    #[case(1254, 2321, true)]
    #[case(1254, 999, false)]
    #[case(4660, 274, false)]
    fn test_bus_allow_list(#[case] vendor: u16, #[case] product: u16, #[case] expected: bool) {
        assert_eq!(is_supported_bus_device(vendor, product), expected);
    }

    #[test]
    fn test_reader_host_markers() {
        assert!(is_reader_host("NordicID"));
        assert!(is_reader_host("Nordic ID Oyj"));
        assert!(!is_reader_host("samsung"));
        assert!(!is_reader_host(""));
    }
}
