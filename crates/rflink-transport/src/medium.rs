//! Medium seams: the OS-facing collaborators controllers listen to.
//!
//! A medium wraps one OS connectivity stack (short-range radio, local bus)
//! behind a small trait plus an event channel. Controllers never touch OS
//! handles directly; they react to [`MediumEvent`]s and call back into the
//! medium to open links or devices.

use std::fmt;

use async_trait::async_trait;
use rflink_core::Result;
use serde::{Deserialize, Serialize};

use crate::session::{BusSession, RadioSession};

/// Identity of one bus-attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl BusDeviceInfo {
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

impl fmt::Display for BusDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Asynchronous notifications from a medium to its controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediumEvent {
    /// The medium's adapter was switched on.
    PowerOn,
    /// The medium's adapter was switched off. Any link is gone.
    PowerOff,
    /// A link to the configured peer is being established.
    LinkConnecting,
    /// The link is established; a session can be taken after the settle
    /// delay.
    LinkConnected,
    /// The link dropped.
    LinkDisconnected,
    /// A signal-strength reading for the current link.
    RssiRead(i32),
    /// A bus device was plugged in.
    DeviceAttached(BusDeviceInfo),
    /// A bus device was unplugged.
    DeviceDetached(BusDeviceInfo),
    /// The host OS answered a device permission request.
    PermissionResult { granted: bool },
}

/// Short-range radio stack (one peer link at a time).
#[async_trait]
pub trait RadioMedium: Send + Sync {
    /// Whether the host has a radio adapter at all.
    fn is_available(&self) -> bool;

    /// Whether the adapter is powered on.
    fn is_powered(&self) -> bool;

    /// Start establishing a link to `addr`. Progress arrives as
    /// [`MediumEvent`]s; an immediate error means the attempt could not
    /// even start.
    async fn open_link(&self, addr: &str) -> Result<()>;

    /// Tear down the current link, if any.
    async fn close_link(&self);

    /// Whether a link is currently established.
    fn is_link_up(&self) -> bool;

    /// Take the session for the current link. Each established link yields
    /// one session; `None` when the link is down or the session was
    /// already taken.
    fn take_session(&self) -> Option<RadioSession>;
}

/// Local bus stack (USB-attached reader modules).
#[async_trait]
pub trait BusMedium: Send + Sync {
    /// Devices currently attached, unfiltered.
    fn attached_devices(&self) -> Vec<BusDeviceInfo>;

    /// Whether the host OS already granted access to `device`.
    fn has_permission(&self, device: &BusDeviceInfo) -> bool;

    /// Ask the host OS for access to `device`. The answer arrives as
    /// [`MediumEvent::PermissionResult`].
    async fn request_permission(&self, device: &BusDeviceInfo);

    /// Open `device`, yielding a session over it. Requires permission.
    fn open(&self, device: &BusDeviceInfo) -> Result<BusSession>;
}
