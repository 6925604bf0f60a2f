//! Various prebuilt simulation setups for demos and examples.

mod ping_switch;
pub use ping_switch::ping_switch;

mod tcp_transfer;
pub use tcp_transfer::tcp_transfer;

mod stp_triangle;
pub use stp_triangle::stp_triangle;

mod dhcp_subnet;
pub use dhcp_subnet::dhcp_subnet;

mod ftp_fetch;
pub use ftp_fetch::ftp_fetch;
