//! Device kind selection bitmask for discovery requests.

use serde::{Deserialize, Serialize};

/// Bitmask selecting which discovery sources a scan should run.
///
/// The integrated-reader pseudo source is not part of the mask: it is
/// offered whenever the host manufacturer heuristic matches, regardless of
/// which kinds the caller requested.
///
/// # Examples
///
/// ```
/// use rflink_core::DeviceKinds;
///
/// let kinds = DeviceKinds::RADIO | DeviceKinds::NETWORK;
/// assert!(kinds.contains(DeviceKinds::RADIO));
/// assert!(!kinds.contains(DeviceKinds::BUS));
/// assert!(DeviceKinds::ALL.contains(kinds));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceKinds(u32);

impl DeviceKinds {
    /// No sources.
    pub const NONE: Self = Self(0);
    /// Short-range radio sources (active scan + bonded list).
    pub const RADIO: Self = Self(1);
    /// Local bus enumeration.
    pub const BUS: Self = Self(1 << 1);
    /// Network service discovery (mDNS + legacy broadcast probe).
    pub const NETWORK: Self = Self(1 << 2);
    /// All sources.
    pub const ALL: Self = Self((Self::NETWORK.0 << 1) - 1);

    /// Whether every kind in `other` is selected here.
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Whether no kind is selected.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bitmask value, for persistence alongside spec strings.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from a raw bitmask, ignoring undefined bits.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }
}

impl Default for DeviceKinds {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for DeviceKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DeviceKinds {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_every_kind() {
        assert!(DeviceKinds::ALL.contains(DeviceKinds::RADIO));
        assert!(DeviceKinds::ALL.contains(DeviceKinds::BUS));
        assert!(DeviceKinds::ALL.contains(DeviceKinds::NETWORK));
    }

    #[test]
    fn test_combination() {
        let kinds = DeviceKinds::RADIO | DeviceKinds::BUS;
        assert!(kinds.contains(DeviceKinds::RADIO));
        assert!(kinds.contains(DeviceKinds::BUS));
        assert!(!kinds.contains(DeviceKinds::NETWORK));
        assert!(!kinds.is_empty());
        assert!(DeviceKinds::NONE.is_empty());
    }

    #[test]
    fn test_from_bits_masks_undefined() {
        let kinds = DeviceKinds::from_bits(0xFFFF_FFFF);
        assert_eq!(kinds, DeviceKinds::ALL);
        assert_eq!(DeviceKinds::from_bits(kinds.bits()), kinds);
    }
}
