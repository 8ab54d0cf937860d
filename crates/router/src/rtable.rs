//! Static routing table: longest-prefix-match lookup over a fixed route list.

use std::net::Ipv4Addr;

use crate::iface::InterfaceTable;

/// One static route, supplied by the host at construction.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub out_interface: String,
}

#[derive(Debug, Clone)]
struct Route {
    destination: u32,
    mask: u32,
    out_interface: String,
}

/// The result of resolving a destination address to an outbound path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// The address to ARP-resolve and send the frame to. Always the
    /// datagram's own destination — this router never ARPs a route's
    /// gateway, only the thing it was asked to deliver to.
    pub next_hop: Ipv4Addr,
    pub out_interface: String,
}

/// Longest-prefix-match routing table.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    /// Builds the table, dropping (and not silently keeping) any route whose
    /// `out_interface` doesn't name a configured interface — per this router's
    /// rule that a route to an absent interface is never a match.
    pub fn new(routes: Vec<RouteConfig>, interfaces: &InterfaceTable) -> Self {
        let routes = routes
            .into_iter()
            .filter(|r| interfaces.find_by_name(&r.out_interface).is_some())
            .map(|r| Route {
                destination: u32::from(r.destination),
                mask: u32::from(r.mask),
                out_interface: r.out_interface,
            })
            .collect();
        RoutingTable { routes }
    }

    /// Resolves `dest` to the most specific matching route, if any. The
    /// next hop to ARP-resolve is always `dest` itself — this router never
    /// substitutes a route's gateway for the packet's actual destination.
    pub fn resolve(&self, dest: Ipv4Addr) -> Option<ResolvedRoute> {
        let dest_bits = u32::from(dest);
        self.routes
            .iter()
            .filter(|r| (dest_bits & r.mask) == (r.destination & r.mask))
            .max_by_key(|r| r.mask)
            .map(|r| ResolvedRoute {
                next_hop: dest,
                out_interface: r.out_interface.clone(),
            })
    }
}
