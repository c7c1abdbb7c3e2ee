//! Bus (USB) auto-connect controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rflink_core::constants::{BUS_CONNECT_DELAY, DISABLED_ADDR, TEARDOWN_JOIN_TIMEOUT};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::controller::{AutoConnectTransport, ConnState, SharedConnState, TransportKind};
use crate::medium::{BusDeviceInfo, BusMedium, MediumEvent};
use crate::reader::ReaderApi;

const CMD_CHANNEL_CAPACITY: usize = 32;

/// Keeps a reader connected over a bus-attached (USB) module.
///
/// The bus carries no routing information, so the address degenerates to
/// an on/off switch: any non-empty, non-`disabled` address enables the
/// controller. When enabled it watches attach/detach events, picks the
/// first device on the supported-reader allow-list, walks the OS
/// permission flow and connects. A denied permission is terminal until
/// the controller is re-enabled through [`set_address`].
///
/// [`set_address`]: AutoConnectTransport::set_address
#[derive(Debug)]
pub struct UsbAutoConnect {
    shared: Arc<UsbShared>,
    cmd_tx: mpsc::Sender<UsbCmd>,
    task: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct UsbShared {
    state: SharedConnState,
    enabled: AtomicBool,
    permission_denied: AtomicBool,
}

#[derive(Debug)]
enum UsbCmd {
    SetAddress(String),
    Resume,
    /// Connect delay elapsed: open the picked device.
    Connect,
    Dispose(oneshot::Sender<()>),
}

impl UsbAutoConnect {
    /// `events` is the medium's notification channel; the controller owns
    /// the receiving end for its whole lifetime.
    pub fn new(
        medium: Arc<dyn BusMedium>,
        reader: Arc<dyn ReaderApi>,
        events: mpsc::Receiver<MediumEvent>,
    ) -> Self {
        let shared = Arc::new(UsbShared {
            state: SharedConnState::new(),
            enabled: AtomicBool::new(false),
            permission_denied: AtomicBool::new(false),
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let worker = UsbWorker {
            medium,
            reader,
            shared: shared.clone(),
            cmd_tx: cmd_tx.clone(),
            device: None,
            connect_timer: None,
        };
        let task = tokio::spawn(worker.run(cmd_rx, events));
        Self {
            shared,
            cmd_tx,
            task: Some(task),
        }
    }

    fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    async fn send(&self, cmd: UsbCmd) {
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!("usb controller task is gone");
        }
    }
}

impl AutoConnectTransport for UsbAutoConnect {
    fn transport_type(&self) -> TransportKind {
        TransportKind::Bus
    }

    /// The bus has no per-device addressing; an enabled controller reports
    /// the fixed address `USB`.
    fn address(&self) -> String {
        if self.is_enabled() {
            "USB".to_string()
        } else {
            String::new()
        }
    }

    fn details(&self) -> String {
        if self.shared.permission_denied.load(Ordering::SeqCst) {
            return "USB permission denied".to_string();
        }
        if !self.is_enabled() {
            return "Disabled".to_string();
        }
        match self.shared.state.get() {
            ConnState::Connected => "Connected to USB".to_string(),
            ConnState::Connecting => "Connecting to USB".to_string(),
            ConnState::Disconnected => "Disconnected from USB".to_string(),
        }
    }

    fn state(&self) -> ConnState {
        self.shared.state.get()
    }

    async fn set_address(&mut self, addr: &str) {
        self.send(UsbCmd::SetAddress(addr.to_string())).await;
    }

    async fn resume(&mut self) {
        self.send(UsbCmd::Resume).await;
    }

    async fn dispose(&mut self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(UsbCmd::Dispose(ack_tx)).await;
        if tokio::time::timeout(TEARDOWN_JOIN_TIMEOUT, ack_rx)
            .await
            .is_err()
        {
            warn!("usb controller did not stop in time, aborting");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct UsbWorker {
    medium: Arc<dyn BusMedium>,
    reader: Arc<dyn ReaderApi>,
    shared: Arc<UsbShared>,
    cmd_tx: mpsc::Sender<UsbCmd>,
    /// The allow-listed device currently being pursued.
    device: Option<BusDeviceInfo>,
    connect_timer: Option<JoinHandle<()>>,
}

impl UsbWorker {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<UsbCmd>,
        mut events: mpsc::Receiver<MediumEvent>,
    ) {
        debug!("usb auto-connect task started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(UsbCmd::Dispose(ack)) => {
                        self.disable().await;
                        let _ = ack.send(());
                        break;
                    }
                    Some(cmd) => self.on_command(cmd).await,
                    None => {
                        self.disable().await;
                        break;
                    }
                },
                ev = events.recv() => match ev {
                    Some(ev) => self.on_event(ev).await,
                    None => {
                        debug!("usb medium event channel closed");
                        self.disable().await;
                        break;
                    }
                },
            }
        }
        debug!("usb auto-connect task exit");
    }

    async fn on_command(&mut self, cmd: UsbCmd) {
        match cmd {
            UsbCmd::SetAddress(addr) => {
                let enable = !addr.is_empty() && !addr.eq_ignore_ascii_case(DISABLED_ADDR);
                debug!(enable, "usb target changed");
                self.shared.permission_denied.store(false, Ordering::SeqCst);
                self.shared.enabled.store(enable, Ordering::SeqCst);
                self.cancel_connect_timer();
                if enable {
                    self.evaluate_attached().await;
                } else {
                    self.disconnect_device().await;
                    self.device = None;
                }
            }
            UsbCmd::Resume => {
                if self.enabled() && !self.reader.is_connected() {
                    self.evaluate_attached().await;
                }
            }
            UsbCmd::Connect => self.open_and_connect().await,
            UsbCmd::Dispose(_) => {} // handled in run()
        }
    }

    async fn on_event(&mut self, event: MediumEvent) {
        match event {
            MediumEvent::DeviceAttached(info) => {
                if !info.is_supported() {
                    trace!(device = %info, "ignoring unsupported bus device");
                    return;
                }
                if self.enabled() && self.device.is_none() {
                    debug!(device = %info, "supported bus device attached");
                    self.shared.permission_denied.store(false, Ordering::SeqCst);
                    self.device = Some(info);
                    self.begin_connect(info).await;
                }
            }
            MediumEvent::DeviceDetached(info) => {
                if self.device == Some(info) {
                    debug!(device = %info, "bus device detached");
                    self.cancel_connect_timer();
                    self.disconnect_device().await;
                    self.device = None;
                }
            }
            MediumEvent::PermissionResult { granted } => {
                if granted {
                    if self.enabled() && self.device.is_some() {
                        self.open_and_connect().await;
                    }
                } else {
                    warn!("usb permission denied, staying disconnected until re-enabled");
                    self.shared.permission_denied.store(true, Ordering::SeqCst);
                    self.shared.state.set(ConnState::Disconnected);
                }
            }
            other => trace!(?other, "ignoring medium event"),
        }
    }

    fn enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Look for an already-attached supported device and start connecting
    /// to it.
    async fn evaluate_attached(&mut self) {
        self.device = self
            .medium
            .attached_devices()
            .into_iter()
            .find(BusDeviceInfo::is_supported);
        match self.device {
            Some(device) => self.begin_connect(device).await,
            None => self.shared.state.set(ConnState::Disconnected),
        }
    }

    async fn begin_connect(&mut self, device: BusDeviceInfo) {
        self.shared.state.set(ConnState::Connecting);
        if self.medium.has_permission(&device) {
            // Give the OS a moment to finish enumerating before opening.
            let tx = self.cmd_tx.clone();
            self.cancel_connect_timer();
            self.connect_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(BUS_CONNECT_DELAY).await;
                let _ = tx.send(UsbCmd::Connect).await;
            }));
        } else {
            debug!(device = %device, "requesting usb permission");
            self.medium.request_permission(&device).await;
        }
    }

    async fn open_and_connect(&mut self) {
        if !self.enabled() {
            return;
        }
        let Some(device) = self.device else {
            return;
        };
        let _ = self.reader.set_transport(None).await;
        let session = match self.medium.open(&device) {
            Ok(session) => session,
            Err(e) => {
                warn!(device = %device, error = %e, "failed to open bus device");
                self.shared.state.set(ConnState::Disconnected);
                return;
            }
        };
        let install = async {
            self.reader.set_transport(Some(session.into())).await?;
            self.reader.connect().await
        }
        .await;
        match install {
            Ok(()) => {
                info!(device = %device, "reader connected over usb");
                self.shared.state.set(ConnState::Connected);
            }
            Err(e) => {
                warn!(device = %device, error = %e, "usb connect failed");
                let _ = self.reader.set_transport(None).await;
                self.shared.state.set(ConnState::Disconnected);
            }
        }
    }

    async fn disconnect_device(&mut self) {
        if self.reader.is_connected() {
            let _ = self.reader.disconnect().await;
        }
        let _ = self.reader.set_transport(None).await;
        self.shared.state.set(ConnState::Disconnected);
    }

    async fn disable(&mut self) {
        self.cancel_connect_timer();
        self.disconnect_device().await;
        self.device = None;
        self.shared.enabled.store(false, Ordering::SeqCst);
    }

    fn cancel_connect_timer(&mut self) {
        if let Some(handle) = self.connect_timer.take() {
            handle.abort();
        }
    }
}
