use super::InvalidAddressError;
use std::fmt::{self, Display};
use std::str::FromStr;

/// A six byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: Self = Self([0xff; 6]);

    /// The all-zero address used before any address is assigned.
    pub const NO_MAC: Self = Self([0; 6]);

    /// The destination address of STP bridge protocol data units.
    pub const STP_MULTICAST: Self = Self([0x01, 0x80, 0xc2, 0x00, 0x00, 0x00]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// The numeric value of the address, used for BID comparison in STP.
    pub fn to_u64(self) -> u64 {
        let b = self.0;
        u64::from_be_bytes([0, 0, b[0], b[1], b[2], b[3], b[4], b[5]])
    }
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl FromStr for MacAddress {
    type Err = InvalidAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| InvalidAddressError::Mac(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| InvalidAddressError::Mac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(InvalidAddressError::Mac(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

/// Hands out unique MAC addresses for the lifetime of one simulation.
///
/// Owned by the simulation context so there is no global registry to collide
/// across tests.
#[derive(Debug, Default)]
pub struct MacGenerator {
    next: u64,
}

impl MacGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> MacAddress {
        self.next += 1;
        let n = self.next;
        // Locally administered unicast prefix.
        MacAddress::new([
            0x02,
            0x00,
            (n >> 24) as u8,
            (n >> 16) as u8,
            (n >> 8) as u8,
            n as u8,
        ])
    }
}
