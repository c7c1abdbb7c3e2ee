//! Socket auto-connect controller against a real local listener.

use std::sync::Arc;
use std::time::Duration;

use rflink_transport::mock::MockReader;
use rflink_transport::{AutoConnectTransport, ConnState, ReaderApi, SocketAutoConnect};
use tokio::net::TcpListener;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Listener that accepts and parks connections so sessions stay open.
async fn parked_listener() -> (String, tokio::task::JoinHandle<()>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (sock, _) = listener.accept().await.unwrap();
            held.push(sock);
        }
    });
    (format!("127.0.0.1:{}", addr.port()), server)
}

#[tokio::test]
async fn test_connects_and_reports_details() {
    let (addr, server) = parked_listener().await;
    let reader: Arc<dyn ReaderApi> = MockReader::new();
    let mut auto = SocketAutoConnect::new(reader.clone());

    auto.set_address(&addr).await;
    wait_for(|| auto.state() == ConnState::Connected).await;

    assert_eq!(auto.address(), addr);
    assert_eq!(auto.details(), format!("Connected to {addr}"));
    assert!(auto.is_worker_running());
    assert!(reader.is_connected());

    auto.dispose().await;
    assert!(!auto.is_worker_running());
    server.abort();
}

#[tokio::test]
async fn test_disabled_sentinel_parks_controller() {
    let (addr, server) = parked_listener().await;
    let reader = MockReader::new();
    let mut auto = SocketAutoConnect::new(reader.clone());

    auto.set_address(&addr).await;
    wait_for(|| auto.state() == ConnState::Connected).await;

    auto.set_address("Disabled").await;
    assert_eq!(auto.state(), ConnState::Disconnected);
    assert_eq!(auto.details(), "Disabled");
    assert!(!auto.is_worker_running());
    assert!(!auto.address().is_empty());
    wait_for(|| !reader.has_transport()).await;

    auto.dispose().await;
    server.abort();
}

#[tokio::test]
async fn test_invalid_url_is_reported_not_retried() {
    init_tracing();
    let reader = MockReader::new();
    let mut auto = SocketAutoConnect::new(reader.clone());

    auto.set_address("no-port-here").await;
    assert_eq!(auto.details(), "Invalid connection URL");
    assert_eq!(auto.state(), ConnState::Disconnected);
    assert!(!auto.is_worker_running());
    assert_eq!(reader.connect_calls(), 0);

    auto.dispose().await;
}

#[tokio::test]
async fn test_worker_stays_alive_while_unreachable() {
    init_tracing();
    // Grab a port with no listener behind it: connects fail immediately.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    drop(listener);

    let reader = MockReader::new();
    let mut auto = SocketAutoConnect::new(reader.clone());
    auto.set_address(&addr).await;

    wait_for(|| reader.connect_calls() >= 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(auto.is_worker_running());
    assert_ne!(auto.state(), ConnState::Connected);

    // Re-setting the same address must not kill the retry loop.
    auto.set_address(&addr).await;
    assert!(auto.is_worker_running());

    auto.dispose().await;
    assert!(!auto.is_worker_running());
}

#[tokio::test]
async fn test_resume_restarts_dead_worker() {
    let (addr, server) = parked_listener().await;
    let reader = MockReader::new();
    let mut auto = SocketAutoConnect::new(reader.clone());

    auto.set_address(&addr).await;
    wait_for(|| auto.state() == ConnState::Connected).await;

    auto.dispose().await;
    assert!(!auto.is_worker_running());

    // Dispose also forgets the address, so resume alone stays parked.
    auto.resume().await;
    assert!(!auto.is_worker_running());

    auto.set_address(&addr).await;
    wait_for(|| auto.state() == ConnState::Connected).await;
    auto.dispose().await;
    server.abort();
}
