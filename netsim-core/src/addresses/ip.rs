//! IPv4-style addresses with attached subnet masks.
//!
//! An [`IpAddress`] carries its prefix length alongside the four octets.
//! Equality and hashing ignore the mask so the address identifies a host when
//! used as a map key; subnet arithmetic uses the mask.

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// The prefix length assumed when parsing a bare dotted quad.
pub const DEFAULT_MASK: u8 = 24;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InvalidAddressError {
    #[error("invalid IP address: {0}")]
    Ip(String),
    #[error("invalid subnet mask length: {0}")]
    MaskLength(u32),
    #[error("address is not a valid dotted subnet mask: {0}")]
    DottedMask(String),
    #[error("invalid MAC address: {0}")]
    Mac(String),
}

/// Raised when incrementing an address would leave its subnet.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("incrementing the address would leave its subnet")]
pub struct AddressTooLargeError;

/// An IPv4-style address together with its subnet prefix length.
#[derive(Debug, Clone, Copy)]
pub struct IpAddress {
    octets: [u8; 4],
    mask: u8,
}

impl IpAddress {
    /// The placeholder used before an address is assigned, `0.0.0.0/0`.
    pub const NO_ADDRESS: Self = Self {
        octets: [0, 0, 0, 0],
        mask: 0,
    };

    /// The limited broadcast address, `255.255.255.255/32`.
    pub const BROADCAST: Self = Self {
        octets: [255, 255, 255, 255],
        mask: 32,
    };

    /// The loopback address, `127.0.0.1/8`.
    pub const LOOPBACK: Self = Self {
        octets: [127, 0, 0, 1],
        mask: 8,
    };

    pub fn new(octets: [u8; 4], mask: u8) -> Result<Self, InvalidAddressError> {
        if mask > 32 {
            return Err(InvalidAddressError::MaskLength(mask as u32));
        }
        Ok(Self { octets, mask })
    }

    pub const fn octets(self) -> [u8; 4] {
        self.octets
    }

    pub const fn mask(self) -> u8 {
        self.mask
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.octets)
    }

    pub fn from_u32(value: u32, mask: u8) -> Self {
        Self {
            octets: value.to_be_bytes(),
            mask: mask.min(32),
        }
    }

    /// The same address with a different prefix length.
    pub fn with_mask(self, mask: u8) -> Self {
        Self {
            mask: mask.min(32),
            ..self
        }
    }

    /// The mask as a bit pattern, e.g. `/24` is `0xff_ff_ff_00`.
    pub fn mask_bits(self) -> u32 {
        mask_to_bits(self.mask)
    }

    /// The mask in dotted form, e.g. `/24` is `255.255.255.0`.
    pub fn dotted_mask(self) -> IpAddress {
        IpAddress::from_u32(self.mask_bits(), 32)
    }

    pub fn is_no_address(self) -> bool {
        self.octets == [0, 0, 0, 0]
    }

    pub fn is_broadcast(self) -> bool {
        self.octets == [255, 255, 255, 255]
    }

    pub fn is_loopback(self) -> bool {
        self.octets[0] == 127
    }

    /// The network address: host bits masked off, prefix length kept.
    pub fn subnet(self) -> IpAddress {
        IpAddress::from_u32(self.to_u32() & self.mask_bits(), self.mask)
    }

    /// Whether `other` falls inside this address's subnet, judged by this
    /// address's own mask.
    pub fn is_same_subnet(self, other: IpAddress) -> bool {
        self.to_u32() & self.mask_bits() == other.to_u32() & self.mask_bits()
    }

    /// The conventional gateway for this subnet: the first host address.
    pub fn expected_gateway(self) -> IpAddress {
        let net = self.to_u32() & self.mask_bits();
        IpAddress::from_u32(net | 1, self.mask)
    }

    /// The next host address in the same subnet. Fails when the increment
    /// would step onto the subnet broadcast address or out of the subnet.
    pub fn increase(self) -> Result<IpAddress, AddressTooLargeError> {
        let next = self.to_u32().checked_add(1).ok_or(AddressTooLargeError)?;
        let candidate = IpAddress::from_u32(next, self.mask);
        let net = self.to_u32() & self.mask_bits();
        let subnet_broadcast = net | !self.mask_bits();
        if next >= subnet_broadcast || next & self.mask_bits() != net {
            return Err(AddressTooLargeError);
        }
        Ok(candidate)
    }
}

/// Converts a numeric prefix length into its bit pattern.
pub fn mask_to_bits(mask: u8) -> u32 {
    match mask {
        0 => 0,
        32.. => u32::MAX,
        n => ((1u32 << n) - 1) << (32 - n),
    }
}

/// Converts a dotted mask (e.g. `255.255.255.0`) back into a prefix length.
/// Fails when the bit pattern has holes.
pub fn bits_to_mask(bits: u32) -> Result<u8, InvalidAddressError> {
    let count = bits.count_ones() as u8;
    if mask_to_bits(count) == bits {
        Ok(count)
    } else {
        Err(InvalidAddressError::DottedMask(format!("{bits:#010x}")))
    }
}

impl PartialEq for IpAddress {
    /// Host identity: the mask does not participate.
    fn eq(&self, other: &Self) -> bool {
        self.octets == other.octets
    }
}

impl Eq for IpAddress {}

impl Hash for IpAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.octets.hash(state);
    }
}

impl PartialOrd for IpAddress {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IpAddress {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.octets.cmp(&other.octets)
    }
}

impl Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.octets;
        write!(f, "{}.{}.{}.{}/{}", o[0], o[1], o[2], o[3], self.mask)
    }
}

impl FromStr for IpAddress {
    type Err = InvalidAddressError;

    /// Parses `"a.b.c.d"` (defaulting to `/24`) or `"a.b.c.d/len"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidAddressError::Ip(s.to_string());
        let (ip_str, mask) = match s.split_once('/') {
            Some((ip, mask)) => {
                let mask: u32 = mask.parse().map_err(|_| invalid())?;
                if mask > 32 {
                    return Err(InvalidAddressError::MaskLength(mask));
                }
                (ip, mask as u8)
            }
            None => (s, DEFAULT_MASK),
        };
        let mut octets = [0u8; 4];
        let mut parts = ip_str.split('.');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            *octet = part.parse().map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        IpAddress::new(octets, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    #[test]
    fn parse_forms() {
        assert_eq!(ip("1.2.3.4/16").octets(), [1, 2, 3, 4]);
        assert_eq!(ip("1.2.3.4/16").mask(), 16);
        assert_eq!(ip("1.2.3.4").mask(), DEFAULT_MASK);
        assert!("1.2.3".parse::<IpAddress>().is_err());
        assert!("1.2.3.4.5".parse::<IpAddress>().is_err());
        assert!("1.2.3.256".parse::<IpAddress>().is_err());
        assert!("1.2.3.4/33".parse::<IpAddress>().is_err());
    }

    #[test]
    fn equality_ignores_mask() {
        assert_eq!(ip("1.1.1.1/8"), ip("1.1.1.1/24"));
        assert_ne!(ip("1.1.1.1/24"), ip("1.1.1.2/24"));
    }

    #[test]
    fn subnet_membership() {
        let a = ip("1.1.1.1/24");
        assert!(a.is_same_subnet(a));
        assert!(ip("1.1.1.1/24").is_same_subnet(ip("1.1.1.2/24")));
        assert!(!ip("1.1.2.1/24").is_same_subnet(ip("1.1.1.2/24")));
        // Judged by the left-hand mask.
        assert!(ip("1.1.2.1/16").is_same_subnet(ip("1.1.1.2/24")));
    }

    #[test]
    fn increase_boundary() {
        assert_eq!(ip("1.1.1.1/24").increase().unwrap(), ip("1.1.1.2/24"));
        assert_eq!(ip("1.1.1.255/24").increase(), Err(AddressTooLargeError));
        // .254 -> .255 would be the subnet broadcast
        assert_eq!(ip("1.1.1.254/24").increase(), Err(AddressTooLargeError));
    }

    #[test]
    fn mask_conversions_are_bit_exact() {
        assert_eq!(mask_to_bits(24), 0xff_ff_ff_00);
        assert_eq!(mask_to_bits(0), 0);
        assert_eq!(mask_to_bits(32), u32::MAX);
        assert_eq!(bits_to_mask(0xff_ff_ff_00), Ok(24));
        assert!(bits_to_mask(0xff_00_ff_00).is_err());
        assert_eq!(ip("10.0.0.1/24").dotted_mask(), ip("255.255.255.0/32"));
    }

    #[test]
    fn expected_gateway_is_first_host() {
        assert_eq!(ip("192.168.1.37/24").expected_gateway(), ip("192.168.1.1"));
        assert_eq!(ip("10.4.9.200/16").expected_gateway(), ip("10.4.0.1"));
    }

    #[test]
    fn subnet_masks_host_bits() {
        assert_eq!(ip("10.4.9.200/16").subnet(), ip("10.4.0.0/16"));
        assert_eq!(ip("10.4.9.200/16").subnet().mask(), 16);
    }
}
