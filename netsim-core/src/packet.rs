//! The layered packet model.
//!
//! A [`Packet`] is an ordered stack of named layers, outermost first:
//! Ethernet at the bottom, then ARP or IP or STP, then a transport layer,
//! then application layers or a raw payload. The layer set is closed; lookup
//! is by [`LayerKind`] with typed accessors per variant rather than
//! string-keyed reflection.
//!
//! Packets are plain values. They are deep-copied whenever retransmitted or
//! flooded so no state is shared between the copies.

pub mod layers;

pub use layers::{
    Arp, ArpOpcode, Bid, Dhcp, DhcpKind, Dns, DnsKind, Ethernet, Ftp, FtpKind, Icmp, IcmpKind, Ip,
    SackBlock, Stp, Tcp, TcpFlags, Udp,
};

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("packet has no {0:?} layer")]
pub struct NoSuchLayerError(pub LayerKind);

/// Discriminates the closed set of layer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Ethernet,
    Arp,
    Ip,
    Udp,
    Tcp,
    Icmp,
    Dhcp,
    Stp,
    Dns,
    Ftp,
    Raw,
}

/// One layer of a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Ethernet(Ethernet),
    Arp(Arp),
    Ip(Ip),
    Udp(Udp),
    Tcp(Tcp),
    Icmp(Icmp),
    Dhcp(Dhcp),
    Stp(Stp),
    Dns(Dns),
    Ftp(Ftp),
    Raw(Vec<u8>),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Ethernet(_) => LayerKind::Ethernet,
            Layer::Arp(_) => LayerKind::Arp,
            Layer::Ip(_) => LayerKind::Ip,
            Layer::Udp(_) => LayerKind::Udp,
            Layer::Tcp(_) => LayerKind::Tcp,
            Layer::Icmp(_) => LayerKind::Icmp,
            Layer::Dhcp(_) => LayerKind::Dhcp,
            Layer::Stp(_) => LayerKind::Stp,
            Layer::Dns(_) => LayerKind::Dns,
            Layer::Ftp(_) => LayerKind::Ftp,
            Layer::Raw(_) => LayerKind::Raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    layers: Vec<Layer>,
}

macro_rules! typed_accessors {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&self) -> Option<&$ty> {
            self.layers.iter().find_map(|layer| match layer {
                Layer::$variant(inner) => Some(inner),
                _ => None,
            })
        }

        pub fn $get_mut(&mut self) -> Option<&mut $ty> {
            self.layers.iter_mut().find_map(|layer| match layer {
                Layer::$variant(inner) => Some(inner),
                _ => None,
            })
        }
    };
}

impl Packet {
    pub fn new(layers: impl IntoIterator<Item = Layer>) -> Self {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Appends a layer above the existing stack.
    pub fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Whether any layer of the stack is of the given kind. The whole stack
    /// is traversed, so containment is transitive.
    pub fn contains(&self, kind: LayerKind) -> bool {
        self.layers.iter().any(|layer| layer.kind() == kind)
    }

    /// The first layer of the given kind, outermost first.
    pub fn layer(&self, kind: LayerKind) -> Result<&Layer, NoSuchLayerError> {
        self.layers
            .iter()
            .find(|layer| layer.kind() == kind)
            .ok_or(NoSuchLayerError(kind))
    }

    pub fn layer_mut(&mut self, kind: LayerKind) -> Result<&mut Layer, NoSuchLayerError> {
        self.layers
            .iter_mut()
            .find(|layer| layer.kind() == kind)
            .ok_or(NoSuchLayerError(kind))
    }

    /// An independent deep copy. Mutating the copy never affects the
    /// original.
    pub fn deep_copy(&self) -> Packet {
        self.clone()
    }

    /// Checksum placeholder. The simulation does not model corruption, so
    /// every well-formed packet is valid.
    pub fn is_valid(&self) -> bool {
        true
    }

    /// The raw payload bytes, if a raw layer is present.
    pub fn payload(&self) -> Option<&[u8]> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Raw(bytes) => Some(bytes.as_slice()),
            _ => None,
        })
    }

    typed_accessors!(ethernet, ethernet_mut, Ethernet, Ethernet);
    typed_accessors!(arp, arp_mut, Arp, Arp);
    typed_accessors!(ip, ip_mut, Ip, Ip);
    typed_accessors!(udp, udp_mut, Udp, Udp);
    typed_accessors!(tcp, tcp_mut, Tcp, Tcp);
    typed_accessors!(icmp, icmp_mut, Icmp, Icmp);
    typed_accessors!(dhcp, dhcp_mut, Dhcp, Dhcp);
    typed_accessors!(stp, stp_mut, Stp, Stp);
    typed_accessors!(dns, dns_mut, Dns, Dns);
    typed_accessors!(ftp, ftp_mut, Ftp, Ftp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addresses::{IpAddress, MacAddress};

    fn sample() -> Packet {
        Packet::new([
            Layer::Ethernet(Ethernet {
                src_mac: MacAddress::new([1; 6]),
                dst_mac: MacAddress::BROADCAST,
            }),
            Layer::Ip(Ip {
                src_ip: "1.1.1.1/24".parse().unwrap(),
                dst_ip: "1.1.1.2/24".parse().unwrap(),
                ttl: 64,
            }),
            Layer::Raw(b"hello".to_vec()),
        ])
    }

    #[test]
    fn containment_traverses_the_stack() {
        let packet = sample();
        assert!(packet.contains(LayerKind::Ethernet));
        assert!(packet.contains(LayerKind::Ip));
        assert!(packet.contains(LayerKind::Raw));
        assert!(!packet.contains(LayerKind::Tcp));
        assert_eq!(
            packet.layer(LayerKind::Tcp),
            Err(NoSuchLayerError(LayerKind::Tcp))
        );
    }

    #[test]
    fn copy_is_independent() {
        let original = sample();
        let mut copy = original.deep_copy();
        assert_eq!(copy, original);
        assert!(copy.contains(LayerKind::Ip));
        assert_eq!(
            copy.ip().unwrap().dst_ip,
            "1.1.1.2".parse::<IpAddress>().unwrap()
        );

        copy.ip_mut().unwrap().ttl = 1;
        assert_eq!(original.ip().unwrap().ttl, 64);
        assert_ne!(copy, original);
    }

    #[test]
    fn payload_reads_raw_layer() {
        assert_eq!(sample().payload(), Some(b"hello".as_slice()));
    }

    #[test]
    fn application_layers_push_on_top() {
        let mut packet = sample();
        packet.push(Layer::Ftp(Ftp {
            kind: FtpKind::Request {
                path: "/srv/motd".to_string(),
            },
        }));
        assert!(packet.contains(LayerKind::Ftp));
        assert_eq!(
            packet.ftp().unwrap().kind,
            FtpKind::Request {
                path: "/srv/motd".to_string()
            }
        );
    }
}
