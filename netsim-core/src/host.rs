//! Hosts: the simulated machines.
//!
//! A [`Host`] is plain data ([`HostData`]) plus two schedulers. Once per
//! tick [`Host::logic`] drains the interfaces, runs the built-in responders
//! that every operating system provides (ARP replies, echo replies, TCP
//! resets, UDP delivery), and gives each scheduler one pass. Everything else
//! a host does is a process.

use crate::addresses::{IpAddress, MacAddress, MacGenerator};
use crate::arp_cache::ArpCache;
use crate::clock::SimTime;
use crate::config;
use crate::filesystem::Filesystem;
use crate::interface::{Interface, TopologyError};
use crate::links::Links;
use crate::packet::{
    Arp, ArpOpcode, Ethernet, Icmp, IcmpKind, Ip, Layer, Packet, Tcp, TcpFlags,
};
use crate::process::{
    signals, NoSuchProcessError, Pid, Process, ProcessMode, ReceivedPacket, SignalHandler,
    SpawnRequest,
};
use crate::routing::RoutingTable;
use crate::scheduler::Scheduler;
use crate::sockets::{DatagramMessage, SocketTable};
use rand::rngs::SmallRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Computer,
    Switch,
    Hub,
    Router,
}

/// Everything a host owns except its processes. Processes get exclusive
/// access to this during their resumption.
pub struct HostData {
    pub name: String,
    pub kind: HostKind,
    pub interfaces: Vec<Interface>,
    pub arp_cache: ArpCache,
    pub routing_table: RoutingTable,
    pub sockets: SocketTable,
    pub filesystem: Filesystem,
    pub powered_on: bool,
    /// Recent arrivals, pruned once every consumer has caught up.
    received: Vec<ReceivedPacket>,
    next_seq: u64,
}

impl HostData {
    pub fn new(name: impl Into<String>, kind: HostKind) -> Self {
        Self {
            name: name.into(),
            kind,
            interfaces: Vec::new(),
            arp_cache: ArpCache::new(),
            routing_table: RoutingTable::with_loopback(),
            sockets: SocketTable::new(),
            filesystem: Filesystem::new(),
            powered_on: true,
            received: Vec::new(),
            next_seq: 0,
        }
    }

    /// The sequence number the next received packet will get.
    pub fn receive_seq(&self) -> u64 {
        self.next_seq
    }

    /// Clones of every packet received after the given sequence number.
    pub fn received_since(&self, seq: u64) -> Vec<ReceivedPacket> {
        self.received
            .iter()
            .filter(|packet| packet.seq > seq)
            .cloned()
            .collect()
    }

    fn push_received(&mut self, packet: Packet, interface: Option<usize>, now: SimTime) {
        self.sockets.tap_raw(&packet);
        self.next_seq += 1;
        self.received.push(ReceivedPacket {
            seq: self.next_seq,
            packet,
            interface,
            time: now,
        });
    }

    /// Short-circuits a packet into this host's own receive queue. Loopback
    /// and own-address traffic never touches a link.
    pub fn deliver_local(&mut self, packet: Packet, now: SimTime) {
        self.push_received(packet, None, now);
    }

    /// Sends a frame out of an interface, feeding raw socket taps on the
    /// way so sniffers see egress traffic too.
    pub fn send_frame(&mut self, interface: usize, packet: Packet, links: &mut Links, now: SimTime) {
        if let Some(interface) = self.interfaces.get(interface) {
            self.sockets.tap_raw(&packet);
            interface.send(packet, links, now);
        }
    }

    pub fn owns_ip(&self, ip: IpAddress) -> bool {
        self.interfaces
            .iter()
            .any(|interface| interface.ip == Some(ip))
    }

    pub fn interface_index_by_ip(&self, ip: IpAddress) -> Option<usize> {
        self.interfaces
            .iter()
            .position(|interface| interface.ip == Some(ip))
    }

    pub fn interface_index_by_name(&self, name: &str) -> Result<usize, TopologyError> {
        self.interfaces
            .iter()
            .position(|interface| interface.name == name)
            .ok_or_else(|| TopologyError::NoSuchInterface(name.to_string()))
    }

    /// Assigns an interface address, keeping the routing table's implied
    /// routes in step. The previous address's routes are withdrawn.
    pub fn set_interface_ip(&mut self, interface: usize, ip: Option<IpAddress>) {
        if let Some(old) = self.interfaces[interface].ip {
            self.routing_table.delete_interface(old);
        }
        self.interfaces[interface].ip = ip;
        if let Some(new) = ip {
            self.routing_table.add_interface(new);
        }
    }
}

struct StartupEntry {
    mode: ProcessMode,
    factory: Box<dyn Fn() -> Box<dyn Process>>,
}

pub struct Host {
    pub data: HostData,
    kernelmode: Scheduler,
    usermode: Scheduler,
    startup: Vec<StartupEntry>,
    /// How far the built-in responders have read into the receive queue.
    builtin_seen: u64,
}

impl Host {
    fn new(name: impl Into<String>, kind: HostKind) -> Self {
        Self {
            data: HostData::new(name, kind),
            kernelmode: Scheduler::new(ProcessMode::Kernelmode),
            usermode: Scheduler::new(ProcessMode::Usermode),
            startup: Vec::new(),
            builtin_seen: 0,
        }
    }

    /// An end host with a single interface, initially unaddressed.
    pub fn computer(name: impl Into<String>, macs: &mut MacGenerator) -> Self {
        let mut host = Self::new(name, HostKind::Computer);
        host.data
            .interfaces
            .push(Interface::new("eth0", macs.next()));
        host
    }

    /// A learning switch running spanning tree on all its ports.
    pub fn switch(
        name: impl Into<String>,
        macs: &mut MacGenerator,
        ports: usize,
        priority: Option<u16>,
    ) -> Self {
        let mut host = Self::new(name, HostKind::Switch);
        // The bridge identity is the first port's MAC.
        let bridge_mac = macs.next();
        for port in 0..ports {
            let mut interface = Interface::new(
                format!("port{port}"),
                if port == 0 { bridge_mac } else { macs.next() },
            );
            interface.promiscuous = true;
            host.data.interfaces.push(interface);
        }
        let priority = priority.unwrap_or(config::stp::DEFAULT_SWITCH_PRIORITY);
        host.add_startup(ProcessMode::Kernelmode, move || {
            Box::new(crate::processes::stp::SpanningTree::new(priority, bridge_mac))
        });
        host.add_startup(ProcessMode::Kernelmode, || {
            Box::new(crate::processes::switch::Switch::new())
        });
        host
    }

    /// A hub: floods every frame out of every other port, no learning.
    pub fn hub(name: impl Into<String>, macs: &mut MacGenerator, ports: usize) -> Self {
        let mut host = Self::new(name, HostKind::Hub);
        for port in 0..ports {
            let mut interface = Interface::new(format!("port{port}"), macs.next());
            interface.promiscuous = true;
            host.data.interfaces.push(interface);
        }
        host.add_startup(ProcessMode::Kernelmode, || {
            Box::new(crate::processes::switch::Hub::new())
        });
        host
    }

    /// A router with the given number of interfaces, forwarding in
    /// kernelmode.
    pub fn router(name: impl Into<String>, macs: &mut MacGenerator, ports: usize) -> Self {
        let mut host = Self::new(name, HostKind::Router);
        for port in 0..ports {
            host.data
                .interfaces
                .push(Interface::new(format!("eth{port}"), macs.next()));
        }
        host.add_startup(ProcessMode::Kernelmode, || {
            Box::new(crate::processes::router::Router::new())
        });
        host
    }

    /// Registers a process factory that runs at every boot, and starts it
    /// now.
    pub fn add_startup(
        &mut self,
        mode: ProcessMode,
        factory: impl Fn() -> Box<dyn Process> + 'static,
    ) -> Pid {
        let pid = self.spawn(mode, factory());
        self.startup.push(StartupEntry {
            mode,
            factory: Box::new(factory),
        });
        pid
    }

    pub fn spawn(&mut self, mode: ProcessMode, process: Box<dyn Process>) -> Pid {
        self.scheduler_mut(mode).start_process(process)
    }

    fn scheduler_mut(&mut self, mode: ProcessMode) -> &mut Scheduler {
        match mode {
            ProcessMode::Kernelmode => &mut self.kernelmode,
            ProcessMode::Usermode => &mut self.usermode,
        }
    }

    /// The user-visible process listing. Kernelmode plumbing stays hidden.
    pub fn processes(&self) -> impl Iterator<Item = (Pid, &'static str)> + '_ {
        self.usermode.processes()
    }

    pub fn send_signal(&mut self, pid: Pid, signum: signals::Signum) -> Result<(), NoSuchProcessError> {
        self.usermode.send_signal(pid, signum)
    }

    pub fn register_signal_handler(
        &mut self,
        pid: Pid,
        signum: signals::Signum,
        handler: SignalHandler,
    ) -> Result<(), NoSuchProcessError> {
        self.usermode.register_signal_handler(pid, signum, handler)
    }

    /// Tears down every process, wipes temporary mounts and volatile
    /// caches, and stops participating in the network.
    pub fn power_off(&mut self, links: &mut Links, now: SimTime, rng: &mut SmallRng) {
        let mut spawns = Vec::new();
        let mut kills = Vec::new();
        self.kernelmode
            .terminate_all(&mut self.data, links, now, rng, &mut spawns, &mut kills);
        self.usermode
            .terminate_all(&mut self.data, links, now, rng, &mut spawns, &mut kills);
        self.data.filesystem.wipe_temporary_mounts();
        self.data.arp_cache.wipe();
        self.data.received.clear();
        self.builtin_seen = self.data.next_seq;
        self.data.powered_on = false;
        tracing::info!(host = %self.data.name, "powered off");
    }

    /// Boots the host again, restarting its startup processes.
    pub fn power_on(&mut self) {
        if self.data.powered_on {
            return;
        }
        self.data.powered_on = true;
        for entry in &self.startup {
            let process = (entry.factory)();
            match entry.mode {
                ProcessMode::Kernelmode => self.kernelmode.start_process(process),
                ProcessMode::Usermode => self.usermode.start_process(process),
            };
        }
        tracing::info!(host = %self.data.name, "powered on");
    }

    /// One host tick: intake, built-in responders, then one pass of each
    /// scheduler, kernelmode first.
    pub fn logic(&mut self, links: &mut Links, now: SimTime, rng: &mut SmallRng) {
        if !self.data.powered_on {
            // Frames still arrive at the port but fall on deaf ears.
            for interface in &mut self.data.interfaces {
                interface.receive(links);
            }
            return;
        }

        for index in 0..self.data.interfaces.len() {
            let arrived = self.data.interfaces[index].receive(links);
            for packet in arrived {
                self.data.push_received(packet, Some(index), now);
            }
        }

        self.run_builtins(links, now);

        let mut spawns: Vec<SpawnRequest> = Vec::new();
        let mut kills: Vec<(ProcessMode, Pid)> = Vec::new();
        self.kernelmode
            .handle_processes(&mut self.data, links, now, rng, &mut spawns, &mut kills);
        self.apply_requests(&mut spawns, &mut kills);
        self.usermode
            .handle_processes(&mut self.data, links, now, rng, &mut spawns, &mut kills);
        self.apply_requests(&mut spawns, &mut kills);

        let keep_after = self
            .kernelmode
            .caught_up_to()
            .min(self.usermode.caught_up_to())
            .min(self.builtin_seen);
        self.data.received.retain(|packet| packet.seq > keep_after);

        self.data.arp_cache.forget_old_items(now);
    }

    fn apply_requests(&mut self, spawns: &mut Vec<SpawnRequest>, kills: &mut Vec<(ProcessMode, Pid)>) {
        for request in spawns.drain(..) {
            self.scheduler_mut(request.mode).start_process(request.process);
        }
        for (mode, pid) in kills.drain(..) {
            self.scheduler_mut(mode).mark_kill(pid);
        }
    }

    fn run_builtins(&mut self, links: &mut Links, now: SimTime) {
        let pending: Vec<ReceivedPacket> = self
            .data
            .received
            .iter()
            .filter(|packet| packet.seq > self.builtin_seen)
            .cloned()
            .collect();
        self.builtin_seen = self.data.next_seq;
        for received in pending {
            builtin_arp(&mut self.data, links, &received, now);
            builtin_icmp_echo(&mut self.data, links, &received, now);
            builtin_udp(&mut self.data, links, &received, now);
            builtin_tcp_reset(&mut self.data, links, &received, now);
        }
    }
}

/// Sends layers back toward whoever sent the received packet: out of the
/// ingress interface when there is one, or straight into the local queue for
/// loopback traffic.
fn respond(
    data: &mut HostData,
    links: &mut Links,
    received: &ReceivedPacket,
    layers: Vec<Layer>,
    now: SimTime,
) {
    match (received.interface, received.packet.ethernet()) {
        (Some(index), Some(ethernet)) => {
            let frame = data.interfaces[index].ethernet_wrap(ethernet.src_mac, layers);
            data.send_frame(index, frame, links, now);
        }
        _ => data.deliver_local(Packet::new(layers), now),
    }
}

/// Learns source mappings from every ARP layer and answers requests for our
/// own addresses.
fn builtin_arp(data: &mut HostData, links: &mut Links, received: &ReceivedPacket, now: SimTime) {
    let Some(arp) = received.packet.arp().copied() else {
        return;
    };
    if !arp.src_ip.is_no_address() {
        data.arp_cache.add_dynamic(arp.src_ip, arp.src_mac, now);
    }
    if arp.opcode == ArpOpcode::Request && data.owns_ip(arp.dst_ip) {
        let our_mac = match received.interface {
            Some(index) => data.interfaces[index].mac,
            None => return,
        };
        respond(
            data,
            links,
            received,
            vec![Layer::Arp(Arp {
                opcode: ArpOpcode::Reply,
                src_ip: arp.dst_ip,
                src_mac: our_mac,
                dst_ip: arp.src_ip,
                dst_mac: arp.src_mac,
            })],
            now,
        );
    }
}

/// Answers echo requests addressed to one of our IPs.
fn builtin_icmp_echo(
    data: &mut HostData,
    links: &mut Links,
    received: &ReceivedPacket,
    now: SimTime,
) {
    let (Some(ip), Some(icmp)) = (received.packet.ip().copied(), received.packet.icmp().copied())
    else {
        return;
    };
    if icmp.kind != IcmpKind::EchoRequest {
        return;
    }
    if !data.owns_ip(ip.dst_ip) && !ip.dst_ip.is_loopback() {
        return;
    }
    respond(
        data,
        links,
        received,
        vec![
            Layer::Ip(Ip {
                src_ip: ip.dst_ip,
                dst_ip: ip.src_ip,
                ttl: config::ip::DEFAULT_TTL,
            }),
            Layer::Icmp(Icmp {
                kind: IcmpKind::EchoReply,
                sequence: icmp.sequence,
            }),
        ],
        now,
    );
}

/// Delivers datagrams to bound sockets. A unicast datagram to a port nobody
/// is listening on earns an ICMP unreachable.
fn builtin_udp(data: &mut HostData, links: &mut Links, received: &ReceivedPacket, now: SimTime) {
    let (Some(ip), Some(udp)) = (received.packet.ip().copied(), received.packet.udp().copied())
    else {
        return;
    };
    let for_us = data.owns_ip(ip.dst_ip) || ip.dst_ip.is_loopback() || ip.dst_ip.is_broadcast();
    if !for_us {
        return;
    }
    if let Some(socket) = data.sockets.bound_datagram(udp.dst_port) {
        let payload = received.packet.payload().unwrap_or_default().to_vec();
        if let Ok(socket) = data.sockets.socket_mut(socket) {
            socket.datagrams.push_back(DatagramMessage {
                payload,
                from_ip: ip.src_ip,
                from_port: udp.src_port,
            });
        }
        return;
    }
    // Broadcasts to unbound ports die quietly.
    if ip.dst_ip.is_broadcast() {
        return;
    }
    respond(
        data,
        links,
        received,
        vec![
            Layer::Ip(Ip {
                src_ip: ip.dst_ip,
                dst_ip: ip.src_ip,
                ttl: config::ip::DEFAULT_TTL,
            }),
            Layer::Icmp(Icmp {
                kind: IcmpKind::Unreachable,
                sequence: 0,
            }),
        ],
        now,
    );
}

/// Resets TCP segments aimed at ports with no listening or connected
/// socket.
fn builtin_tcp_reset(
    data: &mut HostData,
    links: &mut Links,
    received: &ReceivedPacket,
    now: SimTime,
) {
    let (Some(ip), Some(tcp)) = (received.packet.ip().copied(), received.packet.tcp().cloned())
    else {
        return;
    };
    if tcp.flags.rst || !data.owns_ip(ip.dst_ip) {
        return;
    }
    if data.sockets.stream_port_open(tcp.dst_port) {
        return;
    }
    let mut reset = Tcp::new(
        tcp.dst_port,
        tcp.src_port,
        0,
        TcpFlags {
            rst: true,
            ack: true,
            ..Default::default()
        },
    );
    reset.ack_number = tcp.sequence.wrapping_add(1);
    respond(
        data,
        links,
        received,
        vec![
            Layer::Ip(Ip {
                src_ip: ip.dst_ip,
                dst_ip: ip.src_ip,
                ttl: config::ip::DEFAULT_TTL,
            }),
            Layer::Tcp(reset),
        ],
        now,
    );
}

/// Builds the broadcast ARP request frame used during resolution.
pub fn arp_request_frame(src_mac: MacAddress, src_ip: IpAddress, target: IpAddress) -> Packet {
    Packet::new([
        Layer::Ethernet(Ethernet {
            src_mac,
            dst_mac: MacAddress::BROADCAST,
        }),
        Layer::Arp(Arp {
            opcode: ArpOpcode::Request,
            src_ip,
            src_mac,
            dst_ip: target,
            dst_mac: MacAddress::NO_MAC,
        }),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionParams, Side};
    use crate::interface::Attachment;
    use crate::packet::LayerKind;
    use crate::sockets::SocketKind;
    use rand::SeedableRng;

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    /// Two computers on one wire, addressed 10.0.0.1 and 10.0.0.2.
    fn wired_pair() -> (Host, Host, Links, MacGenerator, SmallRng) {
        let mut macs = MacGenerator::new();
        let mut links = Links::new();
        let mut a = Host::computer("a", &mut macs);
        let mut b = Host::computer("b", &mut macs);
        let wire = links.add_connection(Connection::new(ConnectionParams::default(), 7));
        a.data.interfaces[0]
            .attach(Attachment::Wired {
                connection: wire,
                side: Side::A,
            })
            .unwrap();
        b.data.interfaces[0]
            .attach(Attachment::Wired {
                connection: wire,
                side: Side::B,
            })
            .unwrap();
        a.data.set_interface_ip(0, Some(ip("10.0.0.1/24")));
        b.data.set_interface_ip(0, Some(ip("10.0.0.2/24")));
        let rng = SmallRng::seed_from_u64(1);
        (a, b, links, macs, rng)
    }

    fn run(hosts: &mut [&mut Host], links: &mut Links, rng: &mut SmallRng, ticks: u64) {
        for tick in 1..=ticks {
            let now = SimTime::from_millis(tick);
            links.tick(now);
            for host in hosts.iter_mut() {
                host.logic(links, now, rng);
            }
        }
    }

    #[test]
    fn arp_request_earns_a_reply_and_both_sides_learn() {
        let (mut a, mut b, mut links, _, mut rng) = wired_pair();
        let frame = arp_request_frame(a.data.interfaces[0].mac, ip("10.0.0.1"), ip("10.0.0.2"));
        a.data.send_frame(0, frame, &mut links, SimTime::ZERO);

        run(&mut [&mut a, &mut b], &mut links, &mut rng, 300);

        // b learned a from the request; a learned b from the reply.
        let b_mac = b.data.interfaces[0].mac;
        assert_eq!(b.data.arp_cache.get(ip("10.0.0.1")).map(|e| e.mac), Some(a.data.interfaces[0].mac));
        assert_eq!(a.data.arp_cache.get(ip("10.0.0.2")).map(|e| e.mac), Some(b_mac));
    }

    #[test]
    fn echo_request_is_answered() {
        let (mut a, mut b, mut links, _, mut rng) = wired_pair();
        let b_mac = b.data.interfaces[0].mac;
        let mut frame = a.data.interfaces[0].ethernet_wrap(
            b_mac,
            [Layer::Ip(Ip {
                src_ip: ip("10.0.0.1"),
                dst_ip: ip("10.0.0.2"),
                ttl: 64,
            })],
        );
        frame.push(Layer::Icmp(Icmp {
            kind: IcmpKind::EchoRequest,
            sequence: 5,
        }));
        a.data.send_frame(0, frame, &mut links, SimTime::ZERO);

        run(&mut [&mut a, &mut b], &mut links, &mut rng, 300);

        let replies = a.data.received_since(0);
        let reply = replies
            .iter()
            .find(|received| received.packet.contains(LayerKind::Icmp))
            .unwrap();
        let icmp = reply.packet.icmp().unwrap();
        assert_eq!(icmp.kind, IcmpKind::EchoReply);
        assert_eq!(icmp.sequence, 5);
    }

    #[test]
    fn udp_to_unbound_port_gets_unreachable() {
        let (mut a, mut b, mut links, _, mut rng) = wired_pair();
        let b_mac = b.data.interfaces[0].mac;
        let mut frame = a.data.interfaces[0].ethernet_wrap(
            b_mac,
            [Layer::Ip(Ip {
                src_ip: ip("10.0.0.1"),
                dst_ip: ip("10.0.0.2"),
                ttl: 64,
            })],
        );
        frame.push(Layer::Udp(crate::packet::Udp {
            src_port: 5555,
            dst_port: 9999,
        }));
        frame.push(Layer::Raw(b"anyone home?".to_vec()));
        a.data.send_frame(0, frame, &mut links, SimTime::ZERO);

        run(&mut [&mut a, &mut b], &mut links, &mut rng, 300);

        let replies = a.data.received_since(0);
        assert!(replies.iter().any(|received| {
            received.packet.icmp().map(|icmp| icmp.kind) == Some(IcmpKind::Unreachable)
        }));
    }

    #[test]
    fn udp_to_bound_port_lands_in_the_socket() {
        let (mut a, mut b, mut links, _, mut rng) = wired_pair();
        let socket = b.data.sockets.get_socket(SocketKind::Datagram, None);
        b.data.sockets.bind(socket, ip("10.0.0.2"), 9999).unwrap();

        let b_mac = b.data.interfaces[0].mac;
        let mut frame = a.data.interfaces[0].ethernet_wrap(
            b_mac,
            [Layer::Ip(Ip {
                src_ip: ip("10.0.0.1"),
                dst_ip: ip("10.0.0.2"),
                ttl: 64,
            })],
        );
        frame.push(Layer::Udp(crate::packet::Udp {
            src_port: 5555,
            dst_port: 9999,
        }));
        frame.push(Layer::Raw(b"hello".to_vec()));
        a.data.send_frame(0, frame, &mut links, SimTime::ZERO);

        run(&mut [&mut a, &mut b], &mut links, &mut rng, 300);

        let socket = b.data.sockets.socket(socket).unwrap();
        assert_eq!(socket.datagrams.len(), 1);
        assert_eq!(socket.datagrams[0].payload, b"hello");
        assert_eq!(socket.datagrams[0].from_port, 5555);
    }

    #[test]
    fn syn_to_closed_port_is_reset() {
        let (mut a, mut b, mut links, _, mut rng) = wired_pair();
        let b_mac = b.data.interfaces[0].mac;
        let mut frame = a.data.interfaces[0].ethernet_wrap(
            b_mac,
            [Layer::Ip(Ip {
                src_ip: ip("10.0.0.1"),
                dst_ip: ip("10.0.0.2"),
                ttl: 64,
            })],
        );
        frame.push(Layer::Tcp(Tcp::new(4000, 80, 100, TcpFlags::SYN)));
        a.data.send_frame(0, frame, &mut links, SimTime::ZERO);

        run(&mut [&mut a, &mut b], &mut links, &mut rng, 300);

        let replies = a.data.received_since(0);
        let reset = replies
            .iter()
            .find_map(|received| received.packet.tcp())
            .unwrap();
        assert!(reset.flags.rst);
        assert_eq!(reset.ack_number, 101);
    }

    #[test]
    fn power_cycle_clears_volatile_state_and_restarts_startup() {
        let mut macs = MacGenerator::new();
        let mut links = Links::new();
        let mut rng = SmallRng::seed_from_u64(2);
        let mut host = Host::computer("pc", &mut macs);
        host.data
            .arp_cache
            .add_dynamic(ip("1.1.1.1"), MacAddress::new([1; 6]), SimTime::ZERO);
        host.data
            .filesystem
            .create_file("/tmp/scratch", "x", SimTime::ZERO)
            .unwrap();
        host.data
            .filesystem
            .create_file("/kept", "y", SimTime::ZERO)
            .unwrap();

        host.power_off(&mut links, SimTime::ZERO, &mut rng);
        assert!(!host.data.powered_on);
        assert!(host.data.arp_cache.is_empty());
        assert!(host.data.filesystem.read_file("/tmp/scratch").is_err());
        assert_eq!(host.data.filesystem.read_file("/kept").unwrap(), "y");

        host.power_on();
        assert!(host.data.powered_on);
    }
}
