//! The per-host routing table.
//!
//! Lookup is longest-prefix-match: among all stored destination networks
//! containing the queried address, the one with the largest mask wins. Two
//! routes with the same prefix and mask share a key, so the most recently
//! added one simply replaces the older entry; that is the documented,
//! deterministic tie-break policy.

use crate::addresses::{ip::mask_to_bits, IpAddress};
use std::collections::BTreeMap;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RoutingTableError {
    #[error("no route to {0}")]
    NoRoute(IpAddress),
    #[error("no such route: {0}")]
    NoSuchRoute(IpAddress),
}

/// Where a matched route sends the packet next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gateway {
    /// Directly reachable; the next hop is the destination itself.
    OnLink,
    Via(IpAddress),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub gateway: Gateway,
    /// The address of the egress interface.
    pub interface_ip: IpAddress,
}

/// The result of a routing lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub next_hop: IpAddress,
    pub interface_ip: IpAddress,
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    table: BTreeMap<(u8, u32), RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table every host starts with: loopback traffic stays local.
    pub fn with_loopback() -> Self {
        let mut table = Self::new();
        table.route_add(
            IpAddress::LOOPBACK.subnet(),
            RouteEntry {
                gateway: Gateway::OnLink,
                interface_ip: IpAddress::LOOPBACK,
            },
        );
        table
    }

    /// Adds a route for the destination network. The key is the masked
    /// network address, so re-adding the same destination replaces the entry.
    pub fn route_add(&mut self, destination: IpAddress, entry: RouteEntry) {
        let key = (
            destination.mask(),
            destination.to_u32() & destination.mask_bits(),
        );
        self.table.insert(key, entry);
    }

    pub fn route_delete(&mut self, destination: IpAddress) -> Result<(), RoutingTableError> {
        let key = (
            destination.mask(),
            destination.to_u32() & destination.mask_bits(),
        );
        self.table
            .remove(&key)
            .map(|_| ())
            .ok_or(RoutingTableError::NoSuchRoute(destination))
    }

    /// Installs the default route.
    pub fn set_default_gateway(&mut self, gateway: IpAddress, interface_ip: IpAddress) {
        self.route_add(
            IpAddress::NO_ADDRESS,
            RouteEntry {
                gateway: Gateway::Via(gateway),
                interface_ip,
            },
        );
    }

    /// Maintains the routes implied by an interface address: the attached
    /// subnet is on-link, and the address itself is delivered locally.
    pub fn add_interface(&mut self, ip: IpAddress) {
        self.route_add(
            ip.subnet(),
            RouteEntry {
                gateway: Gateway::OnLink,
                interface_ip: ip,
            },
        );
        self.route_add(
            ip.with_mask(32),
            RouteEntry {
                gateway: Gateway::OnLink,
                interface_ip: IpAddress::LOOPBACK,
            },
        );
    }

    pub fn delete_interface(&mut self, ip: IpAddress) {
        let _ = self.route_delete(ip.subnet());
        let _ = self.route_delete(ip.with_mask(32));
    }

    /// Longest-prefix-match lookup. The on-link sentinel resolves to the
    /// queried address itself.
    pub fn lookup(&self, ip: IpAddress) -> Result<Resolved, RoutingTableError> {
        for mask in (0..=32u8).rev() {
            let key = (mask, ip.to_u32() & mask_to_bits(mask));
            if let Some(entry) = self.table.get(&key) {
                let next_hop = match entry.gateway {
                    Gateway::OnLink => ip,
                    Gateway::Via(gateway) => gateway,
                };
                return Ok(Resolved {
                    next_hop,
                    interface_ip: entry.interface_ip,
                });
            }
        }
        Err(RoutingTableError::NoRoute(ip))
    }

    pub fn iter(&self) -> impl Iterator<Item = (IpAddress, &RouteEntry)> {
        self.table
            .iter()
            .map(|((mask, net), entry)| (IpAddress::from_u32(*net, *mask), entry))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    fn on_link(interface: &str) -> RouteEntry {
        RouteEntry {
            gateway: Gateway::OnLink,
            interface_ip: ip(interface),
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let mut table = RoutingTable::new();
        table.route_add(ip("10.0.0.0/8"), on_link("10.0.0.1/8"));
        table.route_add(ip("10.1.0.0/16"), on_link("10.1.0.1/16"));

        let resolved = table.lookup(ip("10.1.2.3")).unwrap();
        assert_eq!(resolved.interface_ip, ip("10.1.0.1"));
        // On-link: the next hop is the destination itself.
        assert_eq!(resolved.next_hop, ip("10.1.2.3"));

        let resolved = table.lookup(ip("10.2.2.3")).unwrap();
        assert_eq!(resolved.interface_ip, ip("10.0.0.1"));
    }

    #[test]
    fn default_route_is_the_fallback() {
        let mut table = RoutingTable::with_loopback();
        table.add_interface(ip("192.168.1.5/24"));
        table.set_default_gateway(ip("192.168.1.1"), ip("192.168.1.5/24"));

        let resolved = table.lookup(ip("8.8.8.8")).unwrap();
        assert_eq!(resolved.next_hop, ip("192.168.1.1"));

        let resolved = table.lookup(ip("192.168.1.77")).unwrap();
        assert_eq!(resolved.next_hop, ip("192.168.1.77"));
    }

    #[test]
    fn no_route_without_default() {
        let table = RoutingTable::with_loopback();
        assert_eq!(
            table.lookup(ip("8.8.8.8")),
            Err(RoutingTableError::NoRoute(ip("8.8.8.8")))
        );
    }

    #[test]
    fn most_recently_added_wins_at_equal_prefix() {
        let mut table = RoutingTable::new();
        table.route_add(ip("10.1.0.0/16"), on_link("10.1.0.1/16"));
        table.route_add(ip("10.1.0.0/16"), on_link("10.1.0.2/16"));
        let resolved = table.lookup(ip("10.1.9.9")).unwrap();
        assert_eq!(resolved.interface_ip, ip("10.1.0.2"));
    }

    #[test]
    fn route_delete_of_missing_route_fails() {
        let mut table = RoutingTable::new();
        assert_eq!(
            table.route_delete(ip("10.0.0.0/8")),
            Err(RoutingTableError::NoSuchRoute(ip("10.0.0.0/8")))
        );
    }

    #[test]
    fn interface_routes_come_and_go_together() {
        let mut table = RoutingTable::with_loopback();
        table.add_interface(ip("192.168.1.5/24"));
        assert!(table.lookup(ip("192.168.1.9")).is_ok());

        table.delete_interface(ip("192.168.1.5/24"));
        assert!(table.lookup(ip("192.168.1.9")).is_err());
    }
}
