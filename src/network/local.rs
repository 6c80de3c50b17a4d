//! Local interface addresses
//!
//! The allow-list is every IPv4 address the host owns, read once at startup.
//! Capture needs the first IPv4 address of the listening device to build its
//! filter.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use get_if_addrs::get_if_addrs;

#[derive(Debug, thiserror::Error)]
pub enum LocalAddrError {
    #[error("Cannot list network interfaces: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interface {0} does not exist")]
    NoSuchInterface(String),

    #[error("Interface {0} has no IPv4 address")]
    NoIpv4(String),
}

/// All IPv4 addresses on all interfaces, loopback included.
pub fn local_ipv4_addrs() -> Result<HashSet<Ipv4Addr>, LocalAddrError> {
    let ifaces = get_if_addrs()?;
    Ok(ipv4_only(ifaces.iter().map(|i| i.ip())))
}

/// First IPv4 address of interface `name`.
pub fn interface_ipv4(name: &str) -> Result<Ipv4Addr, LocalAddrError> {
    let ifaces = get_if_addrs()?;
    first_ipv4(ifaces.iter().map(|i| (i.name.as_str(), i.ip())), name)
}

fn ipv4_only(addrs: impl IntoIterator<Item = IpAddr>) -> HashSet<Ipv4Addr> {
    addrs
        .into_iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        })
        .collect()
}

fn first_ipv4<'a>(
    addrs: impl IntoIterator<Item = (&'a str, IpAddr)>,
    name: &str,
) -> Result<Ipv4Addr, LocalAddrError> {
    let mut found = false;
    for (iface, addr) in addrs {
        if iface != name {
            continue;
        }
        found = true;
        if let IpAddr::V4(v4) = addr {
            return Ok(v4);
        }
    }
    if found {
        Err(LocalAddrError::NoIpv4(name.to_string()))
    } else {
        Err(LocalAddrError::NoSuchInterface(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn keeps_ipv4_and_mapped_addresses() {
        let set = ipv4_only([
            v4(127, 0, 0, 1),
            v4(192, 168, 1, 10),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6(Ipv4Addr::new(10, 1, 2, 3).to_ipv6_mapped()),
        ]);
        assert_eq!(
            set,
            HashSet::from([
                Ipv4Addr::LOCALHOST,
                Ipv4Addr::new(192, 168, 1, 10),
                Ipv4Addr::new(10, 1, 2, 3),
            ])
        );
    }

    #[test]
    fn picks_first_ipv4_of_named_interface() {
        let addrs = [
            ("lo", v4(127, 0, 0, 1)),
            ("eth0", IpAddr::V6(Ipv6Addr::LOCALHOST)),
            ("eth0", v4(10, 0, 0, 5)),
            ("eth0", v4(10, 0, 0, 6)),
        ];
        assert_eq!(first_ipv4(addrs, "eth0").unwrap(), Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn missing_interface_and_missing_ipv4_differ() {
        let addrs = [("eth0", IpAddr::V6(Ipv6Addr::LOCALHOST))];
        assert!(matches!(
            first_ipv4(addrs, "eth0"),
            Err(LocalAddrError::NoIpv4(name)) if name == "eth0"
        ));
        assert!(matches!(
            first_ipv4(addrs, "wlan0"),
            Err(LocalAddrError::NoSuchInterface(name)) if name == "wlan0"
        ));
    }
}
