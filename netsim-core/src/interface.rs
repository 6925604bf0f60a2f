//! A host's network attachment point.
//!
//! An interface owns its addresses, wraps outgoing payloads in Ethernet, and
//! filters what comes off the wire: unicast-or-broadcast normally,
//! everything when promiscuous, and only one protocol when blocked with an
//! accept filter (STP keeps its frames flowing through blocked ports this
//! way).

use crate::addresses::{IpAddress, MacAddress};
use crate::clock::SimTime;
use crate::connection::frequency::Position;
use crate::connection::{Direction, Side};
use crate::links::{ConnectionHandle, FrequencyHandle, Links};
use crate::packet::{Ethernet, Layer, LayerKind, Packet};

/// Misuse of connect/disconnect and interface lookup.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("interface is already connected")]
    DeviceAlreadyConnected,
    #[error("interface is not connected")]
    InterfaceNotConnected,
    #[error("no such interface: {0}")]
    NoSuchInterface(String),
}

/// What an interface is attached to. At most one attachment per interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Wired {
        connection: ConnectionHandle,
        side: Side,
    },
    Wireless {
        frequency: FrequencyHandle,
        side: usize,
    },
}

pub struct Interface {
    pub name: String,
    pub mac: MacAddress,
    pub ip: Option<IpAddress>,
    attachment: Option<Attachment>,
    pub is_blocked: bool,
    /// When blocked, only packets containing this layer pass in either
    /// direction.
    pub accept_filter: Option<LayerKind>,
    /// Promiscuous interfaces accept frames regardless of destination MAC.
    /// Switch ports run promiscuous.
    pub promiscuous: bool,
    /// A downed interface neither sends nor receives.
    pub up: bool,
    /// Only meaningful for wireless interfaces.
    pub position: Position,
}

impl Interface {
    pub fn new(name: impl Into<String>, mac: MacAddress) -> Self {
        Self {
            name: name.into(),
            mac,
            ip: None,
            attachment: None,
            is_blocked: false,
            accept_filter: None,
            promiscuous: false,
            up: true,
            position: Position::new(0.0, 0.0),
        }
    }

    pub fn with_ip(mut self, ip: IpAddress) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.attachment
    }

    /// Records the attachment. The connection itself is created and owned by
    /// the simulation.
    pub fn attach(&mut self, attachment: Attachment) -> Result<(), TopologyError> {
        if self.attachment.is_some() {
            return Err(TopologyError::DeviceAlreadyConnected);
        }
        self.attachment = Some(attachment);
        Ok(())
    }

    pub fn detach(&mut self) -> Result<Attachment, TopologyError> {
        self.attachment
            .take()
            .ok_or(TopologyError::InterfaceNotConnected)
    }

    /// Enters the blocking state, optionally letting one protocol through.
    pub fn block(&mut self, accept_filter: Option<LayerKind>, links: &mut Links) {
        self.is_blocked = true;
        self.accept_filter = accept_filter;
        if let Some(Attachment::Wired { connection, side }) = self.attachment {
            if let Some(connection) = links.connection_mut(connection) {
                connection.mark_blocked(side);
            }
        }
    }

    pub fn unblock(&mut self, links: &mut Links) {
        self.is_blocked = false;
        self.accept_filter = None;
        if let Some(Attachment::Wired { connection, side }) = self.attachment {
            if let Some(connection) = links.connection_mut(connection) {
                connection.mark_unblocked(side);
            }
        }
    }

    /// Wraps upper layers in Ethernet sourced from this interface.
    pub fn ethernet_wrap(
        &self,
        dst_mac: MacAddress,
        layers: impl IntoIterator<Item = Layer>,
    ) -> Packet {
        let mut packet = Packet::new([Layer::Ethernet(Ethernet {
            src_mac: self.mac,
            dst_mac,
        })]);
        for layer in layers {
            packet.push(layer);
        }
        packet
    }

    fn passes_block_filter(&self, packet: &Packet) -> bool {
        if !self.is_blocked {
            return true;
        }
        match self.accept_filter {
            Some(kind) => packet.contains(kind),
            None => false,
        }
    }

    /// Puts a packet on the attached link. A downed or unattached interface
    /// silently sends nothing; a blocked one only forwards packets matching
    /// its accept filter.
    pub fn send(&self, packet: Packet, links: &mut Links, now: SimTime) {
        if !self.up || !self.passes_block_filter(&packet) {
            return;
        }
        match self.attachment {
            Some(Attachment::Wired { connection, side }) => {
                if let Some(connection) = links.connection_mut(connection) {
                    connection.send(packet, Direction::from_side(side), now);
                }
            }
            Some(Attachment::Wireless { frequency, side }) => {
                if let Some(frequency) = links.frequency_mut(frequency) {
                    frequency.send(packet, side, now);
                }
            }
            None => {}
        }
    }

    /// Pulls everything that arrived at this interface's side of the link
    /// and applies receive filtering.
    pub fn receive(&mut self, links: &mut Links) -> Vec<Packet> {
        if !self.up {
            return Vec::new();
        }
        let arrived = match self.attachment {
            Some(Attachment::Wired { connection, side }) => links
                .connection_mut(connection)
                .map(|connection| connection.drain_inbox(side))
                .unwrap_or_default(),
            Some(Attachment::Wireless { frequency, side }) => links
                .frequency_mut(frequency)
                .map(|frequency| frequency.drain_inbox(side))
                .unwrap_or_default(),
            None => return Vec::new(),
        };

        arrived
            .into_iter()
            .filter(|packet| {
                if self.is_blocked {
                    return self.passes_block_filter(packet);
                }
                if self.promiscuous {
                    return true;
                }
                match packet.ethernet() {
                    Some(ethernet) => {
                        ethernet.dst_mac == self.mac
                            || ethernet.dst_mac.is_broadcast()
                            || ethernet.dst_mac == MacAddress::STP_MULTICAST
                    }
                    None => false,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionParams};

    fn wired_pair(links: &mut Links) -> (Interface, Interface) {
        let handle = links.add_connection(Connection::new(ConnectionParams::default(), 1));
        let mut a = Interface::new("eth0", MacAddress::new([1; 6]));
        let mut b = Interface::new("eth0", MacAddress::new([2; 6]));
        a.attach(Attachment::Wired {
            connection: handle,
            side: Side::A,
        })
        .unwrap();
        b.attach(Attachment::Wired {
            connection: handle,
            side: Side::B,
        })
        .unwrap();
        (a, b)
    }

    fn deliver(links: &mut Links) {
        for millis in 1..=100 {
            links.tick(SimTime::from_millis(millis));
        }
    }

    #[test]
    fn double_attach_is_an_error() {
        let mut links = Links::new();
        let (mut a, _) = wired_pair(&mut links);
        let handle = links.add_connection(Connection::new(ConnectionParams::default(), 2));
        let result = a.attach(Attachment::Wired {
            connection: handle,
            side: Side::A,
        });
        assert_eq!(result, Err(TopologyError::DeviceAlreadyConnected));
    }

    #[test]
    fn unicast_filtering() {
        let mut links = Links::new();
        let (a, mut b) = wired_pair(&mut links);

        // To b: accepted. To someone else: filtered. Broadcast: accepted.
        a.send(a.ethernet_wrap(b.mac, []), &mut links, SimTime::ZERO);
        a.send(
            a.ethernet_wrap(MacAddress::new([9; 6]), []),
            &mut links,
            SimTime::ZERO,
        );
        a.send(
            a.ethernet_wrap(MacAddress::BROADCAST, []),
            &mut links,
            SimTime::ZERO,
        );
        deliver(&mut links);
        assert_eq!(b.receive(&mut links).len(), 2);
    }

    #[test]
    fn blocked_interface_only_passes_its_accept_filter() {
        let mut links = Links::new();
        let (a, mut b) = wired_pair(&mut links);
        b.block(Some(LayerKind::Stp), &mut links);

        let mut stp_frame = a.ethernet_wrap(MacAddress::STP_MULTICAST, []);
        stp_frame.push(Layer::Stp(crate::packet::Stp {
            sender_bid: crate::packet::Bid::new(1, a.mac),
            root_bid: crate::packet::Bid::new(1, a.mac),
            distance_to_root: 0,
        }));
        a.send(stp_frame, &mut links, SimTime::ZERO);
        a.send(a.ethernet_wrap(b.mac, []), &mut links, SimTime::ZERO);

        deliver(&mut links);
        let received = b.receive(&mut links);
        assert_eq!(received.len(), 1);
        assert!(received[0].contains(LayerKind::Stp));
    }

    #[test]
    fn downed_interface_is_deaf_and_mute() {
        let mut links = Links::new();
        let (mut a, mut b) = wired_pair(&mut links);
        a.up = false;
        a.send(a.ethernet_wrap(b.mac, []), &mut links, SimTime::ZERO);
        deliver(&mut links);
        assert!(b.receive(&mut links).is_empty());

        b.send(b.ethernet_wrap(a.mac, []), &mut links, SimTime::ZERO);
        deliver(&mut links);
        assert!(a.receive(&mut links).is_empty());
    }
}
