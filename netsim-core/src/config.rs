//! Protocol and engine constants, grouped per component.
//!
//! All times are simulated time. Changing these reshapes protocol behavior
//! across the whole simulation, so they live in one place.

use crate::clock::SimDuration;

pub mod arp_cache {
    use super::SimDuration;

    /// How long a dynamic ARP cache entry lives before it is forgotten.
    pub const ITEM_LIFETIME: SimDuration = SimDuration::from_secs(300);
}

pub mod arp {
    use super::SimDuration;

    /// Interval between ARP request resends.
    pub const RESEND_TIME: SimDuration = SimDuration::from_secs(3);

    /// How many times an unanswered ARP request is resent before giving up.
    pub const RESEND_COUNT: u32 = 4;
}

pub mod tcp {
    use super::SimDuration;

    /// Largest payload carried by a single segment.
    pub const MSS: usize = 1024;

    /// Maximum number of unacked in-flight segments.
    pub const MAX_WINDOW_SIZE: usize = 8;

    /// Age after which an unacked in-flight segment is retransmitted.
    pub const RESEND_TIME: SimDuration = SimDuration::from_secs(2);

    /// Minimum spacing between physical transmissions of window segments.
    /// Segments are never flooded within a single tick.
    pub const SENDING_INTERVAL: SimDuration = SimDuration::from_millis(100);

    /// Handshake step timeout before a SYN or SYN-ACK is resent.
    pub const HANDSHAKE_TIMEOUT: SimDuration = SimDuration::from_secs(2);

    /// Handshake retry budget before the connection attempt is abandoned.
    pub const MAX_HANDSHAKE_RETRIES: u32 = 5;

    /// Silence on an established connection for this long tears it down.
    pub const MAX_UNUSED_TIME: SimDuration = SimDuration::from_secs(30);
}

pub mod stp {
    use super::SimDuration;

    /// BPDU cadence while the tree is still settling.
    pub const NORMAL_SENDING_INTERVAL: SimDuration = SimDuration::from_secs(1);

    /// BPDU cadence once the root has been stable for a while.
    pub const STABLE_SENDING_INTERVAL: SimDuration = SimDuration::from_secs(4);

    /// How long the root must stay unchanged before the cadence backs off.
    pub const TREE_STABILIZING_MAX_TIME: SimDuration = SimDuration::from_secs(10);

    /// A switch that has not heard from its root for this long declares
    /// itself root again.
    pub const ROOT_MAX_DISAPPEARING_TIME: SimDuration = SimDuration::from_secs(20);

    /// Ports silent for this long are forgotten.
    pub const MAX_CONNECTION_DISAPPEARED_TIME: SimDuration = SimDuration::from_secs(20);

    /// Default bridge priority. Lower wins the root election.
    pub const DEFAULT_SWITCH_PRIORITY: u16 = 0x8000;
}

pub mod switch_table {
    use super::SimDuration;

    /// How long a learned MAC-to-port mapping lives without refresh.
    pub const ITEM_LIFETIME: SimDuration = SimDuration::from_secs(300);
}

pub mod connection {
    /// Link propagation speed in distance units per second.
    pub const DEFAULT_SPEED: f64 = 4000.0;

    /// Propagation speed of the wireless medium.
    pub const WIRELESS_SPEED: f64 = 8000.0;

    /// Maximum radius a wireless transmission reaches before it dies out.
    pub const WIRELESS_MAX_RANGE: f64 = 800.0;
}

pub mod dhcp {
    use super::SimDuration;

    pub const SERVER_PORT: u16 = 67;
    pub const CLIENT_PORT: u16 = 68;

    /// How long the client waits on each stage before starting over.
    pub const STAGE_TIMEOUT: SimDuration = SimDuration::from_secs(4);

    /// How many full restarts the client attempts before giving up.
    pub const MAX_TRIES: u32 = 3;
}

pub mod ping {
    use super::SimDuration;

    pub const DEFAULT_COUNT: u32 = 3;

    /// How long to wait for an echo reply before counting the ping as lost.
    pub const REPLY_TIMEOUT: SimDuration = SimDuration::from_secs(2);
}

pub mod dns {
    use super::SimDuration;

    pub const SERVER_PORT: u16 = 53;
    pub const QUERY_TIMEOUT: SimDuration = SimDuration::from_secs(2);
    pub const MAX_TRIES: u32 = 3;
}

pub mod ftp {
    pub const SERVER_PORT: u16 = 21;
}

pub mod echo {
    use super::SimDuration;

    pub const SERVER_PORT: u16 = 1000;
    pub const REPLY_TIMEOUT: SimDuration = SimDuration::from_secs(2);
}

pub mod ip {
    /// Initial time-to-live on originated IP packets.
    pub const DEFAULT_TTL: u8 = 64;
}
