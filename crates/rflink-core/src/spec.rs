//! Device spec strings.
//!
//! Every discovery source reports endpoints as a [`DeviceSpec`]: an ordered
//! set of `key=value` string fields serialized to a single
//! semicolon-delimited "spec string". The spec string is the canonical
//! interchange form handed back to the host application, which typically
//! persists the chosen one and later feeds its `addr` field to the matching
//! auto-connect controller.

use serde::{Deserialize, Serialize};

use crate::constants::{INTEGRATED_READER_ADDR, INTEGRATED_READER_PORT};

/// Well-known value of the `type` field for radio (BLE) endpoints.
pub const TYPE_RADIO: &str = "BLE";
/// Well-known value of the `type` field for network (TCP) endpoints.
pub const TYPE_NETWORK: &str = "TCP";
/// Well-known value of the `type` field for bus (USB) endpoints.
pub const TYPE_BUS: &str = "USB";
/// Well-known value of the `type` field for the integrated reader.
pub const TYPE_INTEGRATED: &str = "INT";
/// Well-known value of the `type` field for the assisted-pairing pseudo
/// device.
pub const TYPE_ASSISTED_PAIR: &str = "PAIR";

/// One discovered reader endpoint.
///
/// Immutable after creation by a discovery source. Fields keep insertion
/// order; `type` and `addr` are always present. Two specs describe the same
/// device iff their `addr` fields match; other fields such as `rssi` may
/// differ between sightings of one device.
///
/// # Examples
///
/// ```
/// use rflink_core::DeviceSpec;
///
/// let spec = DeviceSpec::radio("AA:BB:CC:DD:EE:FF", "Reader1", false, -52);
/// assert_eq!(
///     spec.to_string(),
///     "type=BLE;addr=AA:BB:CC:DD:EE:FF;name=Reader1;bonded=false;rssi=-52"
/// );
///
/// let parsed = DeviceSpec::parse(&spec.to_string());
/// assert_eq!(parsed, spec);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    fields: Vec<(String, String)>,
}

impl DeviceSpec {
    /// Create an empty spec with the given `type` and `addr` fields.
    pub fn new(kind: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            fields: vec![
                ("type".to_string(), kind.into()),
                ("addr".to_string(), addr.into()),
            ],
        }
    }

    /// Parse a spec string.
    ///
    /// Splits on `;`, then on the first `=` of each pair. A fragment without
    /// `=` is skipped, not fatal: a truncated spec string still yields the
    /// fields that survived.
    ///
    /// # Examples
    ///
    /// ```
    /// use rflink_core::DeviceSpec;
    ///
    /// let spec = DeviceSpec::parse("type=TCP;addr=192.168.1.10:6734;garbage;name=Dock");
    /// assert_eq!(spec.address(), "192.168.1.10:6734");
    /// assert_eq!(spec.get("name", ""), "Dock");
    /// assert_eq!(spec.get("garbage", "absent"), "absent");
    /// ```
    pub fn parse(spec: &str) -> Self {
        let fields = spec
            .split(';')
            .filter_map(|pair| {
                pair.split_once('=')
                    .map(|(key, value)| (key.to_string(), value.to_string()))
            })
            .collect();
        Self { fields }
    }

    /// Exact-key field lookup, returning `default` when the key is absent.
    ///
    /// Key matching is case-sensitive.
    pub fn get<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or(default)
    }

    /// Set a field, updating in place if the key exists and appending
    /// otherwise, preserving insertion order for serialization.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// The `type` field, or `""` when absent.
    pub fn type_name(&self) -> &str {
        self.get("type", "")
    }

    /// The `addr` field, or `""` when absent.
    pub fn address(&self) -> &str {
        self.get("addr", "")
    }

    /// The `name` field, if present.
    pub fn name(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.as_str())
    }

    /// Whether `other` describes the same physical device.
    ///
    /// Identity is the `addr` field alone; other fields (such as `rssi`)
    /// may legitimately differ between sightings.
    pub fn is_same_device(&self, other: &DeviceSpec) -> bool {
        self.address() == other.address()
    }

    // -- Source-specific constructors -------------------------------------

    /// Spec for a radio-discovered reader.
    ///
    /// A peer advertising without a usable name is identified by its
    /// address instead.
    pub fn radio(addr: &str, name: &str, bonded: bool, rssi: i32) -> Self {
        let name = if name.is_empty() { addr } else { name };
        Self::new(TYPE_RADIO, addr)
            .with("name", name)
            .with("bonded", bonded.to_string())
            .with("rssi", rssi.to_string())
    }

    /// Spec for a network-discovered reader.
    ///
    /// `transport` distinguishes `LAN` from `WLAN` endpoints when the
    /// advertising service supplies it.
    pub fn network(host: &str, port: u16, name: &str, transport: &str) -> Self {
        Self::new(TYPE_NETWORK, format!("{host}:{port}"))
            .with("port", port.to_string())
            .with("name", name)
            .with("transport", transport)
    }

    /// Spec for a bus-attached reader.
    ///
    /// The bus controller treats any non-empty address as "enabled", so the
    /// address carries no routing information.
    pub fn bus() -> Self {
        Self::new(TYPE_BUS, "USB").with("name", "USB Device")
    }

    /// Spec for the reader integrated into the host device.
    pub fn integrated() -> Self {
        Self::new(TYPE_INTEGRATED, INTEGRATED_READER_ADDR).with("name", "Integrated Reader")
    }

    /// Spec for the assisted-pairing pseudo device, offered only when the
    /// host application enables the pairing extension capability.
    pub fn assisted_pair() -> Self {
        Self::new(TYPE_ASSISTED_PAIR, "assisted_pair").with("name", "Assisted Pairing")
    }

    /// Default port of the integrated reader, for callers resolving the
    /// integrated pseudo-address themselves.
    pub fn integrated_reader_port() -> u16 {
        INTEGRATED_READER_PORT
    }
}

impl std::fmt::Display for DeviceSpec {
    /// Serialize back to the canonical spec string. Field order is
    /// insertion order, making this the exact inverse of [`DeviceSpec::parse`].
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (key, value) in &self.fields {
            if !first {
                write!(f, ";")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}
