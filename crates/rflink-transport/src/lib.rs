//! Transport sessions and auto-connect controllers for RFLink readers.
//!
//! This crate turns a chosen address into a maintained connection. It has
//! three layers:
//!
//! - [`session`]: byte-stream sessions over TCP ([`SocketSession`]), a
//!   radio link ([`RadioSession`]) or a bus device ([`BusSession`]), plus
//!   the [`AnyTransportSession`] dispatch enum the reader API accepts.
//! - seams: the host injects its reader protocol stack as a [`ReaderApi`]
//!   and its OS connectivity stacks as [`RadioMedium`] / [`BusMedium`],
//!   which notify controllers through [`MediumEvent`] channels.
//! - [`controller`]: one auto-connect controller per transport kind, each
//!   implementing [`AutoConnectTransport`]. Controllers never surface
//!   connection errors; failures fold into their observable state and
//!   details while they keep retrying per policy.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use rflink_transport::{AutoConnectTransport, ConnState, SocketAutoConnect};
//! use rflink_transport::mock::MockReader;
//!
//! # async fn demo() {
//! let reader: Arc<dyn rflink_transport::ReaderApi> = MockReader::new();
//! let mut auto = SocketAutoConnect::new(reader);
//! auto.set_address("192.168.1.10:6734").await;
//! // ... the worker now dials and re-dials in the background ...
//! assert_ne!(auto.state(), ConnState::Connected);
//! auto.dispose().await;
//! # }
//! ```

pub mod controller;
pub mod medium;
pub mod mock;
pub mod pipe;
pub mod reader;
pub mod retry;
pub mod session;
pub mod socket;

pub use controller::{
    AutoConnectTransport, ConnState, RadioAutoConnect, SocketAutoConnect, TransportKind,
    UsbAutoConnect,
};
pub use medium::{BusDeviceInfo, BusMedium, MediumEvent, RadioMedium};
pub use reader::ReaderApi;
pub use retry::{Retry, RetryPolicy};
pub use session::{AnyTransportSession, BusSession, RadioSession, TransportSession};
pub use socket::{SocketProbe, SocketSession};
