//! The DHCP server process.
//!
//! Leases addresses over the classic discover/offer/request/pack exchange.
//! Every configured interface carries its own pool: clients on one subnet
//! draw sequential addresses from that subnet only, and an interface that
//! gains an address mid-run starts serving on the next resumption. All
//! server traffic goes straight out the ingress interface to the client's
//! MAC, since the client has no usable address yet.

use crate::addresses::{IpAddress, MacAddress};
use crate::config;
use crate::packet::{Dhcp, DhcpKind, Ip, Layer, Udp};
use crate::process::{
    Process, ProcessCtx, ProcessError, ProcessOutcome, ReceivedPacket, ResumeInput, WaitDescriptor,
};
use crate::sockets::SocketKind;
use rustc_hash::FxHashMap;

/// Lease state for one serving interface.
struct Pool {
    /// Next unleased address in the interface's subnet.
    cursor: IpAddress,
    /// The gateway handed out with each lease.
    gateway: IpAddress,
}

pub struct DhcpServer {
    /// One pool per interface index, seeded from the interface's own
    /// address when first seen configured.
    pools: FxHashMap<usize, Pool>,
    leases: FxHashMap<MacAddress, IpAddress>,
}

impl DhcpServer {
    pub fn new() -> Self {
        Self {
            pools: FxHashMap::default(),
            leases: FxHashMap::default(),
        }
    }

    fn wait(&self) -> ProcessOutcome {
        ProcessOutcome::Wait(WaitDescriptor::Packet(Box::new(|received| {
            received.packet.dhcp().is_some_and(|dhcp| {
                matches!(dhcp.kind, DhcpKind::Discover | DhcpKind::Request)
            })
        })))
    }

    /// Binds a pool to every configured interface that lacks one. Runs on
    /// each resumption so interfaces added mid-run get picked up.
    fn sync_pools(&mut self, ctx: &ProcessCtx) {
        for (index, interface) in ctx.host.interfaces.iter().enumerate() {
            let Some(ip) = interface.ip else {
                continue;
            };
            if self.pools.contains_key(&index) {
                continue;
            }
            let Ok(cursor) = ip.increase() else {
                continue;
            };
            tracing::debug!(host = %ctx.host.name, interface = %interface.name, pool = %cursor, "dhcp pool bound");
            self.pools.insert(
                index,
                Pool {
                    cursor,
                    gateway: ip,
                },
            );
        }
    }

    fn lease_for(&mut self, interface: usize, client: MacAddress) -> Option<IpAddress> {
        if let Some(&existing) = self.leases.get(&client) {
            return Some(existing);
        }
        let pool = self.pools.get_mut(&interface)?;
        let lease = pool.cursor;
        match pool.cursor.increase() {
            Ok(next) => pool.cursor = next,
            Err(_) => return None,
        }
        self.leases.insert(client, lease);
        Some(lease)
    }

    fn answer(&mut self, ctx: &mut ProcessCtx, received: &ReceivedPacket) {
        let Some(request) = received.packet.dhcp().copied() else {
            return;
        };
        let Some(interface) = received.interface else {
            return;
        };
        let Some(server_ip) = ctx.host.interfaces[interface].ip else {
            return;
        };
        let kind = match request.kind {
            DhcpKind::Discover => DhcpKind::Offer,
            DhcpKind::Request => DhcpKind::Pack,
            _ => return,
        };
        let your_ip = if request.kind == DhcpKind::Discover {
            match self.lease_for(interface, request.client_mac) {
                Some(ip) => ip,
                None => {
                    tracing::warn!(client = %request.client_mac, interface, "dhcp pool exhausted");
                    return;
                }
            }
        } else {
            request.your_ip
        };
        let Some(pool) = self.pools.get(&interface) else {
            return;
        };
        let gateway = pool.gateway;

        tracing::debug!(client = %request.client_mac, %your_ip, ?kind, "dhcp answer");
        let frame = ctx.host.interfaces[interface].ethernet_wrap(
            request.client_mac,
            [
                Layer::Ip(Ip {
                    src_ip: server_ip,
                    dst_ip: your_ip,
                    ttl: config::ip::DEFAULT_TTL,
                }),
                Layer::Udp(Udp {
                    src_port: config::dhcp::SERVER_PORT,
                    dst_port: config::dhcp::CLIENT_PORT,
                }),
                Layer::Dhcp(Dhcp {
                    kind,
                    client_mac: request.client_mac,
                    your_ip,
                    gateway,
                    server_ip,
                }),
            ],
        );
        ctx.send_frame(interface, frame);
    }
}

impl Default for DhcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for DhcpServer {
    fn name(&self) -> &'static str {
        "dhcp-server"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        self.sync_pools(ctx);
        match input {
            ResumeInput::Start => {
                // Claim the server port so the datagram built-in leaves
                // DHCP traffic alone.
                let owner = Some((ctx.mode, ctx.self_pid));
                let socket = ctx.host.sockets.get_socket(SocketKind::Datagram, owner);
                let bound = ctx.host.sockets.bind(
                    socket,
                    IpAddress::NO_ADDRESS,
                    config::dhcp::SERVER_PORT,
                );
                if let Err(error) = bound {
                    return ProcessOutcome::fail(ProcessError::from(error));
                }
                self.wait()
            }
            ResumeInput::Packets(packets) => {
                for received in &packets {
                    self.answer(ctx, received);
                }
                self.wait()
            }
            _ => ProcessOutcome::done(),
        }
    }
}
