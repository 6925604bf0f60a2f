//! A discrete-time network simulator.
//!
//! Simulated computers, switches, routers, and the wires and airwaves
//! between them advance in lockstep, one millisecond per tick. Every
//! protocol above the link layer is a cooperative [`Process`](process::Process):
//! an explicit state machine that runs to completion each resumption and
//! suspends on a wait descriptor. There are no threads and no locks;
//! determinism comes from seeded randomness and a fixed tick order.
//!
//! # Organization
//! - [`packet`] models frames as ordered stacks of typed layers
//! - [`connection`] and [`links`] move packets with latency and loss
//! - [`host`] ties interfaces, caches, tables, and schedulers together
//! - [`processes`] implements the protocol library, from ARP to FTP
//! - [`simulation`] owns everything and drives the main loop

pub mod addresses;
pub mod arp_cache;
pub mod clock;
pub mod config;
pub mod connection;
pub mod filesystem;
pub mod host;
pub mod interface;
pub mod links;
pub mod packet;
pub mod process;
pub mod processes;
pub mod routing;
pub mod save;
pub mod scheduler;
pub mod simulation;
pub mod sockets;

pub use addresses::{IpAddress, MacAddress};
pub use clock::{SimDuration, SimTime};
pub use host::{Host, HostKind};
pub use packet::{Layer, LayerKind, Packet};
pub use simulation::{HostHandle, Simulation};
