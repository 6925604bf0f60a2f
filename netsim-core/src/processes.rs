//! The process library: every protocol a host can run.
//!
//! Infrastructure that a host starts on its own (ARP resolution, switching,
//! routing, spanning tree) runs in kernelmode; everything a user would
//! launch runs in usermode. Each process is a hand-written resumable state
//! machine over [`Process`](crate::process::Process).

pub mod arp_resolution;
pub mod dhcp_client;
pub mod dhcp_server;
pub mod dns_client;
pub mod dns_server;
pub mod ftp;
pub mod ping;
pub mod router;
pub mod sniffer;
pub mod stp;
pub mod switch;
pub mod tcp;
pub mod udp_echo;
