//! Socket (TCP) auto-connect controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rflink_core::constants::{
    DISABLED_ADDR, INTEGRATED_READER_ADDR, SOCKET_RETRY_INTERVAL, TEARDOWN_JOIN_TIMEOUT,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::controller::{AutoConnectTransport, ConnState, SharedConnState, TransportKind};
use crate::reader::ReaderApi;
use crate::socket::{SocketProbe, SocketSession};

/// Keeps a reader connected over TCP to a fixed `host:port` endpoint.
///
/// A background worker retries the connection once per second for as long
/// as an address is set, and keeps polling liveness once connected so a
/// dropped link is re-dialed without host involvement. The pseudo-address
/// `integrated_reader` targets the reader module built into the host
/// device; `disabled` (or an empty address) parks the controller.
pub struct SocketAutoConnect {
    reader: Arc<dyn ReaderApi>,
    shared: Arc<SocketShared>,
    worker: Option<JoinHandle<()>>,
    address: String,
    host: String,
    port: u16,
    invalid: bool,
}

#[derive(Debug)]
struct SocketShared {
    state: SharedConnState,
    running: AtomicBool,
    shutdown: Notify,
}

impl SocketAutoConnect {
    pub fn new(reader: Arc<dyn ReaderApi>) -> Self {
        Self {
            reader,
            shared: Arc::new(SocketShared {
                state: SharedConnState::new(),
                running: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
            worker: None,
            address: String::new(),
            host: String::new(),
            port: 0,
            invalid: false,
        }
    }

    /// Whether the connect worker task is alive. The worker is expected to
    /// stay alive for as long as a valid address is configured, even while
    /// the endpoint is unreachable.
    pub fn is_worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn is_parked_addr(addr: &str) -> bool {
        addr.is_empty() || addr.eq_ignore_ascii_case(DISABLED_ADDR)
    }

    /// Split `host:port`, accepting the bare integrated pseudo-address.
    /// Rejects empty hosts and hosts containing further colons, so an
    /// un-bracketed IPv6 literal cannot silently target the wrong port.
    fn parse_endpoint(addr: &str) -> Option<(String, u16)> {
        if addr.eq_ignore_ascii_case(INTEGRATED_READER_ADDR) {
            return Some((addr.to_string(), 0));
        }
        let (host, port) = addr.rsplit_once(':')?;
        if host.is_empty() || host.contains(':') {
            return None;
        }
        let port: u16 = port.parse().ok()?;
        Some((host.to_string(), port))
    }

    fn start_worker(&mut self) {
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.state.set(ConnState::Connecting);
        let reader = self.reader.clone();
        let shared = self.shared.clone();
        let host = self.host.clone();
        let port = self.port;
        self.worker = Some(tokio::spawn(run_worker(reader, shared, host, port)));
    }

    async fn stop_worker(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.shutdown.notify_waiters();
        if let Some(mut handle) = self.worker.take() {
            if tokio::time::timeout(TEARDOWN_JOIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("socket worker did not stop in time, aborting");
                handle.abort();
            }
        }
    }

    async fn teardown(&mut self) {
        self.stop_worker().await;
        let _ = self.reader.set_transport(None).await;
        self.shared.state.set(ConnState::Disconnected);
    }
}

impl AutoConnectTransport for SocketAutoConnect {
    fn transport_type(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn details(&self) -> String {
        if self.invalid {
            return "Invalid connection URL".to_string();
        }
        if Self::is_parked_addr(&self.address) {
            return "Disabled".to_string();
        }
        match self.shared.state.get() {
            ConnState::Connected => format!("Connected to {}", self.address),
            ConnState::Connecting => format!("Connecting to {}", self.address),
            ConnState::Disconnected => format!("Disconnected from {}", self.address),
        }
    }

    fn state(&self) -> ConnState {
        self.shared.state.get()
    }

    async fn set_address(&mut self, addr: &str) {
        if addr == self.address && !Self::is_parked_addr(addr) && !self.invalid {
            // Same target: just make sure the worker is alive.
            if !self.is_worker_running() {
                debug!(%addr, "restarting socket worker for current address");
                self.start_worker();
            }
            return;
        }

        self.teardown().await;
        self.invalid = false;
        self.address = addr.to_string();

        if Self::is_parked_addr(addr) {
            debug!("socket auto-connect disabled");
            return;
        }
        match Self::parse_endpoint(addr) {
            Some((host, port)) => {
                self.host = host;
                self.port = port;
                self.start_worker();
            }
            None => {
                warn!(%addr, "invalid connection URL");
                self.invalid = true;
            }
        }
    }

    async fn resume(&mut self) {
        if !Self::is_parked_addr(&self.address) && !self.invalid && !self.is_worker_running() {
            self.start_worker();
        }
    }

    async fn dispose(&mut self) {
        self.teardown().await;
        self.address.clear();
        self.invalid = false;
    }
}

async fn run_worker(reader: Arc<dyn ReaderApi>, shared: Arc<SocketShared>, host: String, port: u16) {
    debug!(%host, port, "socket auto-connect worker started");
    let mut probe: Option<SocketProbe> = None;
    while shared.running.load(Ordering::SeqCst) {
        let live = probe.as_ref().is_some_and(SocketProbe::is_connected) && reader.is_connected();
        if live {
            shared.state.set(ConnState::Connected);
            idle(&shared).await;
            continue;
        }

        probe = None;
        shared.state.set(ConnState::Connecting);
        let session = SocketSession::new(host.as_str(), port);
        let next_probe = session.probe();
        let attempt = async {
            reader.set_transport(Some(session.into())).await?;
            reader.connect().await
        };
        match attempt.await {
            Ok(()) => {
                info!(%host, port, "reader connected");
                shared.state.set(ConnState::Connected);
                probe = Some(next_probe);
            }
            Err(e) => {
                debug!(error = %e, "connect attempt failed");
                shared.state.set(ConnState::Disconnected);
                let _ = reader.set_transport(None).await;
                if shared.running.load(Ordering::SeqCst) {
                    idle(&shared).await;
                }
            }
        }
    }
    shared.state.set(ConnState::Disconnected);
    debug!(%host, port, "socket auto-connect worker exit");
}

async fn idle(shared: &SocketShared) {
    tokio::select! {
        _ = tokio::time::sleep(SOCKET_RETRY_INTERVAL) => {}
        _ = shared.shutdown.notified() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("192.168.1.10:6734", Some(("192.168.1.10", 6734)))]
    #[case("reader.local:80", Some(("reader.local", 80)))]
    #[case("integrated_reader", Some(("integrated_reader", 0)))]
    #[case("Integrated_Reader", Some(("Integrated_Reader", 0)))]
    #[case("noport", None)]
    #[case(":6734", None)]
    #[case("host:notaport", None)]
    #[case("host:99999", None)]
    #[case("fe80::1:6734", None)]
    fn test_parse_endpoint(#[case] addr: &str, #[case] expected: Option<(&str, u16)>) {
        let parsed = SocketAutoConnect::parse_endpoint(addr);
        assert_eq!(
            parsed,
            expected.map(|(host, port)| (host.to_string(), port))
        );
    }

    #[rstest]
    #[case("", true)]
    #[case("disabled", true)]
    #[case("Disabled", true)]
    #[case("DISABLED", true)]
    #[case("192.168.1.10:6734", false)]
    fn test_parked_addresses(#[case] addr: &str, #[case] parked: bool) {
        assert_eq!(SocketAutoConnect::is_parked_addr(addr), parked);
    }
}
