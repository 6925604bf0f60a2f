//! Resumable protocol processes.
//!
//! A process is an explicit state machine: each resumption runs to
//! completion without preemption and ends by yielding a [`WaitDescriptor`]
//! (suspend until the condition holds) or terminating with an outcome value.
//! Termination is a value, never an unwind: a process that cannot continue
//! returns `Terminated(Err(..))` and the scheduler tears down only that
//! process.

use crate::addresses::{IpAddress, MacAddress};
use crate::clock::{SimTime, Timeout};
use crate::config;
use crate::filesystem::FsError;
use crate::host::HostData;
use crate::links::Links;
use crate::packet::{Ethernet, Ip, Layer, Packet};
use crate::routing::RoutingTableError;
use crate::sockets::SocketError;
use rand::rngs::SmallRng;

pub type Pid = u32;

/// Reserved for the imaginary init process; allocation starts above it.
pub const INIT_PID: Pid = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessMode {
    /// Visible in process listings; user-facing protocol work.
    Usermode,
    /// Invisible plumbing: switching, routing, socket workers.
    Kernelmode,
}

/// Signal numbers, following the usual POSIX values.
pub mod signals {
    pub type Signum = u8;

    pub const SIGHUP: Signum = 1;
    pub const SIGINT: Signum = 2;
    pub const SIGQUIT: Signum = 3;
    pub const SIGKILL: Signum = 9;
    pub const SIGTERM: Signum = 15;
    pub const SIGSTOP: Signum = 19;
    pub const SIGTSTP: Signum = 20;

    /// Signals that terminate a process unless a handler says otherwise.
    pub const KILLING_SIGNALS: [Signum; 6] =
        [SIGTERM, SIGINT, SIGKILL, SIGQUIT, SIGSTOP, SIGTSTP];

    /// Signals no handler can ignore.
    pub const UNIGNORABLE: [Signum; 2] = [SIGKILL, SIGSTOP];
}

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("no such process: {0}")]
pub struct NoSuchProcessError(pub Pid);

/// What a registered handler does with a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalHandler {
    Terminate,
    Ignore,
}

/// A packet the host received, as seen by waiting processes.
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    /// Monotonic per-host sequence number; schedulers use it to pick up
    /// packets that arrived since their own last check.
    pub seq: u64,
    pub packet: Packet,
    /// Index of the ingress interface; `None` for local delivery.
    pub interface: Option<usize>,
    pub time: SimTime,
}

pub type PacketMatcher = Box<dyn Fn(&ReceivedPacket) -> bool>;
pub type Condition = Box<dyn Fn(&HostData, SimTime) -> bool>;

/// What a process yields to request suspension.
pub enum WaitDescriptor {
    /// Resume once the predicate observes true. No packet is needed.
    Condition(Condition),
    /// Resume with every packet the matcher accepts. May deliver several
    /// matches from a single tick.
    Packet(PacketMatcher),
    /// Like `Packet`, but resumes with an empty result once the timeout
    /// elapses so the process can retry or fail.
    PacketTimeout(PacketMatcher, Timeout),
    /// Resume once the timeout elapses.
    Sleep(Timeout),
}

/// What a resumption is given.
pub enum ResumeInput {
    /// First run after spawn.
    Start,
    /// A condition or sleep wait was satisfied.
    Ready,
    /// The matched packets, in arrival order. Never empty.
    Packets(Vec<ReceivedPacket>),
    /// The packet wait timed out with no match.
    TimedOut,
}

/// Why a process could not continue. Contained to that process by the
/// scheduler; never crosses to the host or to other processes.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("host has no IP address configured")]
    NoIpAddress,
    #[error("{0} did not answer ARP")]
    ArpUnanswered(IpAddress),
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),
    #[error("connection was reset")]
    ConnectionReset,
    #[error("gave up after repeated timeouts")]
    TimedOut,
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Routing(#[from] RoutingTableError),
    #[error(transparent)]
    Filesystem(#[from] FsError),
}

pub enum ProcessOutcome {
    Wait(WaitDescriptor),
    Terminated(Result<(), ProcessError>),
}

impl ProcessOutcome {
    /// Clean natural completion.
    pub fn done() -> Self {
        ProcessOutcome::Terminated(Ok(()))
    }

    pub fn fail(error: ProcessError) -> Self {
        ProcessOutcome::Terminated(Err(error))
    }
}

/// A request to start another process, applied by the host after the current
/// resumption finishes.
pub struct SpawnRequest {
    pub mode: ProcessMode,
    pub process: Box<dyn Process>,
}

pub trait Process {
    fn name(&self) -> &'static str;

    /// Runs the process until it next suspends or terminates.
    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome;

    /// Invoked when the process is torn down by a signal or power-off.
    fn on_kill(&mut self, _ctx: &mut ProcessCtx) {}
}

/// Everything a resumption may touch. All state is exclusively owned by the
/// running host for the duration of the call, so no locking exists anywhere.
pub struct ProcessCtx<'a> {
    pub host: &'a mut HostData,
    pub links: &'a mut Links,
    pub now: SimTime,
    pub rng: &'a mut SmallRng,
    pub self_pid: Pid,
    pub mode: ProcessMode,
    pub spawns: &'a mut Vec<SpawnRequest>,
    pub kills: &'a mut Vec<(ProcessMode, Pid)>,
}

/// The result of attempting an IP send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Short-circuited into the host's own received queue.
    DeliveredLocally,
    /// The next hop's MAC is unknown; an ARP resolution process was started
    /// for it. The caller should wait and retry.
    ArpStarted(IpAddress),
}

impl<'a> ProcessCtx<'a> {
    pub fn spawn(&mut self, mode: ProcessMode, process: Box<dyn Process>) {
        self.spawns.push(SpawnRequest { mode, process });
    }

    pub fn kill(&mut self, mode: ProcessMode, pid: Pid) {
        self.kills.push((mode, pid));
    }

    /// Sends a fully formed frame out of the given interface, feeding raw
    /// socket taps on the way.
    pub fn send_frame(&mut self, interface: usize, packet: Packet) {
        self.host.send_frame(interface, packet, self.links, self.now);
    }

    /// Routes and sends an IP packet carrying the given upper layers.
    ///
    /// Loopback and own addresses short-circuit locally. A broadcast
    /// destination goes out as an Ethernet broadcast without ARP. Otherwise
    /// the routing table picks the next hop; a cache miss spawns an ARP
    /// resolution process on this process's behalf and reports
    /// [`SendOutcome::ArpStarted`] so the caller can suspend until the cache
    /// fills (or the ARP process terminates the caller on failure).
    pub fn send_ip(
        &mut self,
        dst_ip: IpAddress,
        layers: Vec<Layer>,
    ) -> Result<SendOutcome, ProcessError> {
        if dst_ip.is_loopback() || self.host.owns_ip(dst_ip) {
            let src_ip = if dst_ip.is_loopback() {
                IpAddress::LOOPBACK
            } else {
                dst_ip
            };
            let mut packet = Packet::new([Layer::Ip(Ip {
                src_ip,
                dst_ip,
                ttl: config::ip::DEFAULT_TTL,
            })]);
            for layer in layers {
                packet.push(layer);
            }
            self.host.deliver_local(packet, self.now);
            return Ok(SendOutcome::DeliveredLocally);
        }

        let resolved = self.host.routing_table.lookup(dst_ip)?;
        let interface = self
            .host
            .interface_index_by_ip(resolved.interface_ip)
            .ok_or(ProcessError::NoIpAddress)?;
        let src_ip = self.host.interfaces[interface]
            .ip
            .ok_or(ProcessError::NoIpAddress)?;
        let ip_layer = Layer::Ip(Ip {
            src_ip,
            dst_ip,
            ttl: config::ip::DEFAULT_TTL,
        });

        let dst_mac = if dst_ip.is_broadcast() {
            MacAddress::BROADCAST
        } else {
            match self.host.arp_cache.get(resolved.next_hop) {
                Some(entry) => entry.mac,
                None => {
                    let requester = Some((self.mode, self.self_pid));
                    self.spawn(
                        ProcessMode::Kernelmode,
                        Box::new(crate::processes::arp_resolution::ArpResolution::new(
                            resolved.next_hop,
                            interface,
                            requester,
                        )),
                    );
                    return Ok(SendOutcome::ArpStarted(resolved.next_hop));
                }
            }
        };

        let mut packet = self.host.interfaces[interface].ethernet_wrap(dst_mac, [ip_layer]);
        for layer in layers {
            packet.push(layer);
        }
        self.send_frame(interface, packet);
        Ok(SendOutcome::Sent)
    }

    /// A wait that resumes once the ARP cache knows the given address.
    pub fn wait_for_arp(&self, next_hop: IpAddress) -> WaitDescriptor {
        WaitDescriptor::Condition(Box::new(move |host, _now| {
            host.arp_cache.get(next_hop).is_some()
        }))
    }

    pub fn timeout(&self, length: crate::clock::SimDuration) -> Timeout {
        Timeout::new(self.now, length)
    }
}

/// Builds an Ethernet frame without an interface, for replies built directly
/// from a received frame.
pub fn ethernet_frame(
    src_mac: MacAddress,
    dst_mac: MacAddress,
    layers: impl IntoIterator<Item = Layer>,
) -> Packet {
    let mut packet = Packet::new([Layer::Ethernet(Ethernet { src_mac, dst_mac })]);
    for layer in layers {
        packet.push(layer);
    }
    packet
}
