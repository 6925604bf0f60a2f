//! The payload structs for each layer variant.
//!
//! These carry the fields the simulation acts on. No layer is bit-exact to a
//! real wire format; the protocols only need to interoperate with each other.

use crate::addresses::{IpAddress, MacAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ethernet {
    pub src_mac: MacAddress,
    pub dst_mac: MacAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOpcode {
    Request,
    Reply,
    /// An unsolicited announcement of one's own address.
    Gratuitous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arp {
    pub opcode: ArpOpcode,
    pub src_ip: IpAddress,
    pub src_mac: MacAddress,
    pub dst_ip: IpAddress,
    pub dst_mac: MacAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ip {
    pub src_ip: IpAddress,
    pub dst_ip: IpAddress,
    pub ttl: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Udp {
    pub src_port: u16,
    pub dst_port: u16,
}

/// TCP control flags. A segment may carry several at once (SYN-ACK and the
/// like), so these are independent booleans rather than an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub psh: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    pub const SYN: Self = Self {
        syn: true,
        ack: false,
        psh: false,
        fin: false,
        rst: false,
    };

    pub fn syn_ack() -> Self {
        Self {
            syn: true,
            ack: true,
            ..Default::default()
        }
    }
}

/// A contiguous byte range the receiver has already seen out of order.
/// `right` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SackBlock {
    pub left: u32,
    pub right: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tcp {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
    pub ack_number: u32,
    pub flags: TcpFlags,
    pub window_size: u16,
    /// Out-of-order ranges the receiver advertises back to the sender.
    pub sack_blocks: Vec<SackBlock>,
    /// Whether this segment is a retransmission. Purely diagnostic.
    pub retransmitted: bool,
}

impl Tcp {
    pub fn new(src_port: u16, dst_port: u16, sequence: u32, flags: TcpFlags) -> Self {
        Self {
            src_port,
            dst_port,
            sequence,
            ack_number: 0,
            flags,
            window_size: 0,
            sack_blocks: Vec::new(),
            retransmitted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    EchoRequest,
    EchoReply,
    Unreachable,
    TimeExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmp {
    pub kind: IcmpKind,
    pub sequence: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpKind {
    Discover,
    Offer,
    Request,
    Pack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dhcp {
    pub kind: DhcpKind,
    pub client_mac: MacAddress,
    /// The address being offered, requested, or granted.
    pub your_ip: IpAddress,
    pub gateway: IpAddress,
    pub server_ip: IpAddress,
}

/// An STP bridge ID: priority concatenated with the MAC-derived value.
/// Lower compares first, so the derived `Ord` elects the root directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bid {
    pub priority: u16,
    pub mac: MacAddress,
}

impl Bid {
    pub fn new(priority: u16, mac: MacAddress) -> Self {
        Self { priority, mac }
    }

    /// The numeric form used for display, priority in the high bits.
    pub fn value(&self) -> u64 {
        ((self.priority as u64) << 48) | self.mac.to_u64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stp {
    pub sender_bid: Bid,
    pub root_bid: Bid,
    /// Accumulated path cost from the sender to its believed root.
    pub distance_to_root: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsKind {
    Query,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dns {
    pub kind: DnsKind,
    pub name: String,
    /// Present on answers; `None` means the name does not exist.
    pub answer: Option<IpAddress>,
}

/// FTP messages. Real transfers ride a TCP stream as raw payload; this
/// layer appears on hand-crafted packets and in sniffer filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtpKind {
    Request { path: String },
    Data { bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ftp {
    pub kind: FtpKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bid_ordering_prefers_low_priority_then_low_mac() {
        let a = Bid::new(0x1000, MacAddress::new([9; 6]));
        let b = Bid::new(0x8000, MacAddress::new([1; 6]));
        assert!(a < b);

        let c = Bid::new(0x8000, MacAddress::new([2; 6]));
        assert!(b < c);
        assert!(b.value() < c.value());
    }
}
