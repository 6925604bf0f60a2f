//! Address value types: [`MacAddress`](mac::MacAddress) and
//! [`IpAddress`](ip::IpAddress).

pub mod ip;
pub mod mac;

pub use ip::{AddressTooLargeError, InvalidAddressError, IpAddress};
pub use mac::{MacAddress, MacGenerator};
