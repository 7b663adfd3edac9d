//! Maps an interface name to its primary IPv4 address.
//!
//! Platform-specific interface enumeration is treated as a single imported
//! capability (`if_addrs::get_if_addrs`) rather than hand-rolled ioctls, the
//! same way the reference codebase treats its own raw-socket `sys` layer as
//! an internal implementation detail behind a small safe API.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::RelayError;

/// An interface name paired with the IPv4 address resolved for it at
/// startup. Immutable for the life of the process (§3).
#[derive(Debug, Clone, Copy)]
pub struct InterfaceBinding {
    pub ipv4: Ipv4Addr,
}

impl InterfaceBinding {
    pub fn resolve(name: &str) -> Result<Self, RelayError> {
        Ok(InterfaceBinding {
            ipv4: resolve_ipv4_of_interface(name)?,
        })
    }
}

/// Returns the first IPv4 address assigned to the named interface.
pub fn resolve_ipv4_of_interface(name: &str) -> Result<Ipv4Addr, RelayError> {
    let interfaces = if_addrs::get_if_addrs().map_err(RelayError::InterfaceLookup)?;
    interfaces
        .into_iter()
        .filter(|iface| iface.name == name)
        .find_map(|iface| match iface.addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| RelayError::InterfaceNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_interface_is_not_found() {
        let err = resolve_ipv4_of_interface("definitely-not-a-real-iface-xyz").unwrap_err();
        assert!(matches!(err, RelayError::InterfaceNotFound(_)));
    }

    #[test]
    fn loopback_resolves_to_an_ipv4_address() {
        // `lo` carries 127.0.0.1 on every Linux host this runs on.
        if let Ok(binding) = InterfaceBinding::resolve("lo") {
            assert!(binding.ipv4.is_loopback());
        }
    }
}
