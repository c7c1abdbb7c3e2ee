//! Shared error type for discovery and transport operations.
//!
//! Discovery sources and auto-connect controllers are designed so that no
//! error here is fatal to the process: transient link errors are retried by
//! the owning controller, malformed discovery payloads drop the single
//! offending candidate, and medium unavailability is surfaced through
//! controller details rather than propagated.

/// Result type alias for RFLink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering or connecting to a reader.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Target address could not be parsed (malformed host:port, empty host).
    #[error("Invalid address: {addr}")]
    InvalidAddress { addr: String },

    /// Underlying medium is not usable (radio powered off, no adapter).
    #[error("Medium unavailable: {medium}")]
    MediumUnavailable { medium: String },

    /// The host OS refused access to a device.
    #[error("Permission denied: {device}")]
    PermissionDenied { device: String },

    /// Link or session dropped.
    #[error("Disconnected: {context}")]
    Disconnected { context: String },

    /// No session is installed or the session is not connected.
    #[error("Not connected")]
    NotConnected,

    /// Operation timed out after the specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A collaborator reported it is busy with a conflicting request.
    #[error("Busy: {what}")]
    Busy { what: String },

    /// An internal channel closed while an operation was in flight.
    #[error("Channel closed: {channel}")]
    ChannelClosed { channel: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new invalid address error.
    pub fn invalid_address(addr: impl Into<String>) -> Self {
        Self::InvalidAddress { addr: addr.into() }
    }

    /// Create a new medium unavailable error.
    pub fn medium_unavailable(medium: impl Into<String>) -> Self {
        Self::MediumUnavailable {
            medium: medium.into(),
        }
    }

    /// Create a new permission denied error.
    pub fn permission_denied(device: impl Into<String>) -> Self {
        Self::PermissionDenied {
            device: device.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(context: impl Into<String>) -> Self {
        Self::Disconnected {
            context: context.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new busy error.
    pub fn busy(what: impl Into<String>) -> Self {
        Self::Busy { what: what.into() }
    }

    /// Create a new channel closed error.
    pub fn channel_closed(channel: impl Into<String>) -> Self {
        Self::ChannelClosed {
            channel: channel.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether this error is transient and worth retrying automatically.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Busy { .. } | Self::Disconnected { .. } | Self::Io(_)
        )
    }
}
