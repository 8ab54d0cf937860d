//! The router's interface table: a small, fixed set of named network
//! attachment points, each with one MAC and one IPv4 address.

use std::net::Ipv4Addr;

use crate::codec::ethernet::MacAddr;

/// Static configuration for one interface, supplied by the host at construction.
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
}

/// A configured interface, as held inside the router.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl From<InterfaceConfig> for Interface {
    fn from(cfg: InterfaceConfig) -> Self {
        Interface {
            name: cfg.name,
            mac: cfg.mac,
            ip: cfg.ip,
            mask: cfg.mask,
        }
    }
}

/// The full set of interfaces a router owns. Small (a handful of entries),
/// so linear scans are the right tool — no need for a map.
#[derive(Debug, Clone)]
pub struct InterfaceTable {
    interfaces: Vec<Interface>,
}

impl InterfaceTable {
    pub fn new(interfaces: Vec<Interface>) -> Self {
        InterfaceTable { interfaces }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Finds the interface that owns `ip`, used to decide whether a packet's
    /// destination is the router itself.
    pub fn find_by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.ip == ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, last_octet: u8) -> Interface {
        Interface {
            name: name.to_string(),
            mac: MacAddr([0, 0, 0, 0, 0, last_octet]),
            ip: Ipv4Addr::new(10, 0, 0, last_octet),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        }
    }

    #[test]
    fn finds_by_name_and_ip() {
        let table = InterfaceTable::new(vec![iface("eth0", 1), iface("eth1", 2)]);
        assert_eq!(table.find_by_name("eth1").unwrap().ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(table.find_by_ip(Ipv4Addr::new(10, 0, 0, 1)).unwrap().name, "eth0");
        assert!(table.find_by_name("eth9").is_none());
        assert!(table.find_by_ip(Ipv4Addr::new(10, 0, 0, 9)).is_none());
    }
}
