//! Auto-connect controllers.
//!
//! A controller binds one transport kind to one target address and keeps
//! the reader connected to it until told otherwise. Controllers never
//! return connection errors to the caller: failures fold into the
//! observable [`ConnState`] and human-readable details, and the controller
//! keeps retrying or waiting as its policy dictates.

mod radio;
mod socket;
mod usb;

pub use radio::RadioAutoConnect;
pub use socket::SocketAutoConnect;
pub use usb::UsbAutoConnect;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Connection state a controller exposes to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Connected,
            1 => Self::Connecting,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        };
        f.write_str(name)
    }
}

/// Lock-free [`ConnState`] cell shared between a controller and its worker.
#[derive(Debug)]
pub(crate) struct SharedConnState(AtomicU8);

impl SharedConnState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnState::Disconnected as u8))
    }

    pub(crate) fn get(&self) -> ConnState {
        ConnState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: ConnState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Transport kind a controller manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Radio,
    Bus,
    Socket,
}

impl TransportKind {
    /// Wire name, matching the `type` field of spec strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Radio => rflink_core::spec::TYPE_RADIO,
            Self::Bus => rflink_core::spec::TYPE_BUS,
            Self::Socket => rflink_core::spec::TYPE_NETWORK,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common surface of the three auto-connect controllers.
pub trait AutoConnectTransport: Send {
    /// Which transport this controller manages.
    fn transport_type(&self) -> TransportKind;

    /// The currently configured address.
    fn address(&self) -> String;

    /// One human-readable line describing the controller's situation, for
    /// settings UIs.
    fn details(&self) -> String;

    /// Current connection state.
    fn state(&self) -> ConnState;

    /// Re-target the controller. An empty or `disabled` address tears the
    /// connection down; setting the current address again is a no-op apart
    /// from restarting a dead worker. Failures fold into [`state`] and
    /// [`details`], never into a return value.
    ///
    /// [`state`]: AutoConnectTransport::state
    /// [`details`]: AutoConnectTransport::details
    async fn set_address(&mut self, addr: &str);

    /// Re-evaluate the current target, e.g. after the host application
    /// returns to the foreground.
    async fn resume(&mut self);

    /// Tear everything down: stop workers, uninstall the session, forget
    /// the address.
    async fn dispose(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnState::Connected.to_string(), "Connected");
    }

    #[test]
    fn test_shared_state_round_trip() {
        let shared = SharedConnState::new();
        assert_eq!(shared.get(), ConnState::Disconnected);
        shared.set(ConnState::Connecting);
        assert_eq!(shared.get(), ConnState::Connecting);
        shared.set(ConnState::Connected);
        assert_eq!(shared.get(), ConnState::Connected);
    }

    #[test]
    fn test_kind_names_match_spec_types() {
        assert_eq!(TransportKind::Radio.to_string(), "BLE");
        assert_eq!(TransportKind::Bus.to_string(), "USB");
        assert_eq!(TransportKind::Socket.to_string(), "TCP");
    }
}
