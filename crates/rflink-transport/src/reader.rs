//! Reader API seam.
//!
//! Auto-connect controllers do not speak the reader protocol themselves;
//! they build transport sessions and drive a host-supplied [`ReaderApi`]
//! handle. The handle owns at most one installed session at a time and is
//! shared (`Arc`) between the host application and the controllers.

use async_trait::async_trait;
use rflink_core::Result;

use crate::session::AnyTransportSession;

/// Handle to the host's reader protocol stack.
///
/// Methods take `&self`: implementations are expected to use interior
/// mutability so one handle can be shared between the host application and
/// a controller's worker task.
#[async_trait]
pub trait ReaderApi: Send + Sync {
    /// Connect over the installed session. Fails when no session is
    /// installed or the session cannot be opened.
    async fn connect(&self) -> Result<()>;

    /// Disconnect the reader protocol, keeping the session installed.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the reader protocol is currently connected.
    fn is_connected(&self) -> bool;

    /// Install a session, disposing any previously installed one first.
    /// `None` uninstalls and disposes.
    async fn set_transport(&self, session: Option<AnyTransportSession>) -> Result<()>;
}
