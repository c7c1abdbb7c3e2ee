//! Short-range radio auto-connect controller.
//!
//! Unlike the socket worker, the radio controller is event-driven: the
//! medium owns link establishment and reports progress as
//! [`MediumEvent`]s, and the controller's job is sequencing: debounce the
//! link-up report, install the session, and tear everything down in the
//! right order on power or link loss.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use rflink_core::constants::{
    RADIO_POWER_ON_DELAY, RADIO_SETTLE_DELAY, TEARDOWN_JOIN_TIMEOUT,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::controller::{AutoConnectTransport, ConnState, SharedConnState, TransportKind};
use crate::medium::{MediumEvent, RadioMedium};
use crate::reader::ReaderApi;
use crate::retry::{Retry, RetryPolicy};

const CMD_CHANNEL_CAPACITY: usize = 32;

/// Keeps a reader connected over a short-range radio link.
///
/// The controller reacts to medium events: once the medium reports the
/// link up, it waits out a settle delay (links often flap right after
/// establishment), uninstalls any stale session, installs the fresh one
/// and connects the reader. Power-off tears everything down; power-on with
/// an address configured re-opens the link after the medium has had time
/// to stabilize.
pub struct RadioAutoConnect {
    shared: Arc<RadioShared>,
    cmd_tx: mpsc::Sender<RadioCmd>,
    task: Option<JoinHandle<()>>,
}

struct RadioShared {
    state: SharedConnState,
    addr: std::sync::Mutex<String>,
    rssi: AtomicI32,
    medium: Arc<dyn RadioMedium>,
}

impl RadioShared {
    fn addr(&self) -> String {
        match self.addr.lock() {
            Ok(addr) => addr.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_addr(&self, value: &str) {
        match self.addr.lock() {
            Ok(mut addr) => *addr = value.to_string(),
            Err(poisoned) => *poisoned.into_inner() = value.to_string(),
        }
    }

    fn reset_rssi(&self) {
        self.rssi.store(0, Ordering::SeqCst);
    }
}

#[derive(Debug)]
enum RadioCmd {
    SetAddress(String),
    Resume,
    /// Settle delay elapsed: install the link's session into the reader.
    InstallSession,
    /// Re-check the target and reopen the link if needed.
    Reevaluate,
    Dispose(oneshot::Sender<()>),
}

impl RadioAutoConnect {
    /// `events` is the medium's notification channel; the controller owns
    /// the receiving end for its whole lifetime.
    pub fn new(
        medium: Arc<dyn RadioMedium>,
        reader: Arc<dyn ReaderApi>,
        events: mpsc::Receiver<MediumEvent>,
    ) -> Self {
        let shared = Arc::new(RadioShared {
            state: SharedConnState::new(),
            addr: std::sync::Mutex::new(String::new()),
            rssi: AtomicI32::new(0),
            medium: medium.clone(),
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let worker = RadioWorker {
            medium,
            reader,
            shared: shared.clone(),
            cmd_tx: cmd_tx.clone(),
            settle: None,
            delayed: None,
            retry: Retry::new(RetryPolicy::radio()),
        };
        let task = tokio::spawn(worker.run(cmd_rx, events));
        Self {
            shared,
            cmd_tx,
            task: Some(task),
        }
    }

    /// Last RSSI reading for the current link, 0 when unknown.
    pub fn rssi(&self) -> i32 {
        self.shared.rssi.load(Ordering::SeqCst)
    }

    async fn send(&self, cmd: RadioCmd) {
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!("radio controller task is gone");
        }
    }
}

impl AutoConnectTransport for RadioAutoConnect {
    fn transport_type(&self) -> TransportKind {
        TransportKind::Radio
    }

    fn address(&self) -> String {
        self.shared.addr()
    }

    fn details(&self) -> String {
        if !self.shared.medium.is_available() {
            return "No radio adapter found".to_string();
        }
        if !self.shared.medium.is_powered() {
            return "Radio powered off".to_string();
        }
        let addr = self.shared.addr();
        match self.shared.state.get() {
            ConnState::Connected => {
                let rssi = self.rssi();
                if rssi != 0 {
                    format!("Connected to {addr} ({rssi} dBm)")
                } else {
                    format!("Connected to {addr}")
                }
            }
            ConnState::Connecting => format!("Connecting to {addr}"),
            ConnState::Disconnected => {
                if addr.is_empty() {
                    "Disconnected".to_string()
                } else {
                    format!("Searching for {addr}")
                }
            }
        }
    }

    fn state(&self) -> ConnState {
        self.shared.state.get()
    }

    async fn set_address(&mut self, addr: &str) {
        self.send(RadioCmd::SetAddress(addr.to_string())).await;
    }

    async fn resume(&mut self) {
        self.send(RadioCmd::Resume).await;
    }

    async fn dispose(&mut self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(RadioCmd::Dispose(ack_tx)).await;
        if tokio::time::timeout(TEARDOWN_JOIN_TIMEOUT, ack_rx)
            .await
            .is_err()
        {
            warn!("radio controller did not stop in time, aborting");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct RadioWorker {
    medium: Arc<dyn RadioMedium>,
    reader: Arc<dyn ReaderApi>,
    shared: Arc<RadioShared>,
    cmd_tx: mpsc::Sender<RadioCmd>,
    /// Pending settle timer after a link-up report.
    settle: Option<JoinHandle<()>>,
    /// Pending power-on or retry timer.
    delayed: Option<JoinHandle<()>>,
    retry: Retry,
}

impl RadioWorker {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<RadioCmd>,
        mut events: mpsc::Receiver<MediumEvent>,
    ) {
        debug!("radio auto-connect task started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(RadioCmd::Dispose(ack)) => {
                        self.teardown_link().await;
                        self.shared.set_addr("");
                        let _ = ack.send(());
                        break;
                    }
                    Some(cmd) => self.on_command(cmd).await,
                    None => {
                        self.teardown_link().await;
                        break;
                    }
                },
                ev = events.recv() => match ev {
                    Some(ev) => self.on_event(ev).await,
                    None => {
                        debug!("radio medium event channel closed");
                        self.teardown_link().await;
                        break;
                    }
                },
            }
        }
        debug!("radio auto-connect task exit");
    }

    async fn on_command(&mut self, cmd: RadioCmd) {
        match cmd {
            RadioCmd::SetAddress(addr) => {
                debug!(%addr, "radio target changed");
                self.cancel_timers();
                self.retry.reset();
                self.shared.set_addr(&addr);
                if addr.is_empty() {
                    self.teardown_link().await;
                } else {
                    self.open_current().await;
                }
            }
            RadioCmd::Resume | RadioCmd::Reevaluate => {
                if self.medium.is_link_up() && self.reader.is_connected() {
                    return;
                }
                self.open_current().await;
            }
            RadioCmd::InstallSession => self.install_session().await,
            RadioCmd::Dispose(_) => {} // handled in run()
        }
    }

    async fn on_event(&mut self, event: MediumEvent) {
        match event {
            MediumEvent::PowerOff => {
                debug!("radio powered off");
                self.cancel_timers();
                self.teardown_link().await;
            }
            MediumEvent::PowerOn => {
                if !self.shared.addr().is_empty() {
                    debug!("radio powered on, scheduling reconnect");
                    self.schedule_delayed(RadioCmd::Reevaluate, RADIO_POWER_ON_DELAY);
                }
            }
            MediumEvent::LinkConnecting => {
                self.shared.reset_rssi();
                self.shared.state.set(ConnState::Connecting);
            }
            MediumEvent::LinkConnected => {
                self.shared.reset_rssi();
                self.cancel_settle();
                // Let the link settle before trusting it with a session.
                let tx = self.cmd_tx.clone();
                self.settle = Some(tokio::spawn(async move {
                    tokio::time::sleep(RADIO_SETTLE_DELAY).await;
                    let _ = tx.send(RadioCmd::InstallSession).await;
                }));
            }
            MediumEvent::LinkDisconnected => {
                self.cancel_settle();
                self.shared.reset_rssi();
                self.drop_session().await;
                self.open_current().await;
            }
            MediumEvent::RssiRead(value) => {
                self.shared.rssi.store(value, Ordering::SeqCst);
            }
            other => trace!(?other, "ignoring medium event"),
        }
    }

    async fn open_current(&mut self) {
        let addr = self.shared.addr();
        if addr.is_empty() {
            self.shared.state.set(ConnState::Disconnected);
            return;
        }
        if !self.medium.is_powered() {
            self.shared.state.set(ConnState::Disconnected);
            return;
        }
        self.shared.state.set(ConnState::Connecting);
        if let Err(e) = self.medium.open_link(&addr).await {
            warn!(%addr, error = %e, "failed to start radio link");
            self.shared.state.set(ConnState::Disconnected);
        }
    }

    async fn install_session(&mut self) {
        // Any stale session must go before the fresh one comes in.
        let _ = self.reader.set_transport(None).await;
        if !self.medium.is_link_up() {
            self.teardown_link().await;
            return;
        }
        let Some(session) = self.medium.take_session() else {
            warn!("link is up but no session was available");
            self.teardown_link().await;
            return;
        };
        let install = async {
            self.reader.set_transport(Some(session.into())).await?;
            self.reader.connect().await
        }
        .await;
        match install {
            Ok(()) => {
                info!(addr = %self.shared.addr(), "reader connected over radio");
                self.retry.reset();
                self.shared.state.set(ConnState::Connected);
            }
            Err(e) => {
                warn!(error = %e, "radio session install failed");
                let _ = self.reader.set_transport(None).await;
                match self.retry.next_delay() {
                    Some(delay) if !self.shared.addr().is_empty() => {
                        self.shared.state.set(ConnState::Connecting);
                        self.schedule_delayed(RadioCmd::Reevaluate, delay);
                    }
                    _ => {
                        debug!("giving the link up after repeated install failures");
                        self.retry.reset();
                        self.teardown_link().await;
                    }
                }
            }
        }
    }

    /// Uninstall the session and mark disconnected, keeping the medium
    /// link alone.
    async fn drop_session(&mut self) {
        if self.reader.is_connected() {
            let _ = self.reader.disconnect().await;
        }
        let _ = self.reader.set_transport(None).await;
        self.shared.state.set(ConnState::Disconnected);
    }

    async fn teardown_link(&mut self) {
        self.cancel_timers();
        self.drop_session().await;
        self.medium.close_link().await;
        self.shared.reset_rssi();
    }

    fn schedule_delayed(&mut self, cmd: RadioCmd, delay: Duration) {
        if let Some(handle) = self.delayed.take() {
            handle.abort();
        }
        let tx = self.cmd_tx.clone();
        self.delayed = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(cmd).await;
        }));
    }

    fn cancel_settle(&mut self) {
        if let Some(handle) = self.settle.take() {
            handle.abort();
        }
    }

    fn cancel_timers(&mut self) {
        self.cancel_settle();
        if let Some(handle) = self.delayed.take() {
            handle.abort();
        }
    }
}
