//! Core value types for the RFLink reader connectivity SDK.
//!
//! This crate holds the leaf types shared by the discovery and transport
//! layers: the [`DeviceSpec`] interchange value describing one discovered
//! reader endpoint, the [`DeviceKinds`] filter bitmask used to select which
//! discovery sources run, the shared [`Error`] type, and the protocol
//! constants (scan period bounds, sentinel addresses, the bus device
//! allow-list).
//!
//! # Spec strings
//!
//! A discovered device is exchanged between layers and with the host
//! application as a single semicolon-delimited "spec string":
//!
//! ```
//! use rflink_core::DeviceSpec;
//!
//! let spec = DeviceSpec::parse("type=BLE;addr=AA:BB:CC:DD:EE:FF;name=Reader1;rssi=-52");
//! assert_eq!(spec.address(), "AA:BB:CC:DD:EE:FF");
//! assert_eq!(spec.get("rssi", "0"), "-52");
//! ```
//!
//! The spec string is the canonical form: `DeviceSpec` serializes back to it
//! with field order preserved, so values can round-trip through settings
//! storage or UI layers without loss.

pub mod constants;
pub mod error;
pub mod kinds;
pub mod spec;

pub use error::{Error, Result};
pub use kinds::DeviceKinds;
pub use spec::DeviceSpec;
