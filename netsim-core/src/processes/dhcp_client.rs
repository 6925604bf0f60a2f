//! The DHCP client process.
//!
//! Acquires an address for one interface: broadcast a discover, take the
//! first offer, request it, and on the acknowledgement configure the
//! interface, install the default route, and announce the address with a
//! gratuitous ARP.
//!
//! The client is bound to the interface given at construction. Discovery
//! goes out that interface only, but offers count no matter which interface
//! they arrive on; the matcher keys on the client MAC, not the ingress
//! port. The lease is always applied to the bound interface. A multi-homed
//! host runs one client per interface it wants configured.

use crate::addresses::{IpAddress, MacAddress};
use crate::config;
use crate::packet::{Arp, ArpOpcode, Dhcp, DhcpKind, Ip, Layer, Udp};
use crate::process::{
    Process, ProcessCtx, ProcessError, ProcessOutcome, ResumeInput, WaitDescriptor,
};
use crate::sockets::SocketKind;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct DhcpStatus {
    pub assigned: Option<IpAddress>,
    pub done: bool,
}

enum Stage {
    Init,
    Discovering,
    Requesting { offered: IpAddress, server: IpAddress },
}

pub struct DhcpClient {
    interface: usize,
    stage: Stage,
    tries: u32,
    status: Rc<RefCell<DhcpStatus>>,
}

impl DhcpClient {
    pub fn new(interface: usize, status: Rc<RefCell<DhcpStatus>>) -> Self {
        Self {
            interface,
            stage: Stage::Init,
            tries: 0,
            status,
        }
    }

    fn broadcast(&self, ctx: &mut ProcessCtx, kind: DhcpKind, your_ip: IpAddress, server_ip: IpAddress) {
        let interface = &ctx.host.interfaces[self.interface];
        let frame = interface.ethernet_wrap(
            MacAddress::BROADCAST,
            [
                Layer::Ip(Ip {
                    src_ip: IpAddress::NO_ADDRESS,
                    dst_ip: IpAddress::BROADCAST,
                    ttl: config::ip::DEFAULT_TTL,
                }),
                Layer::Udp(Udp {
                    src_port: config::dhcp::CLIENT_PORT,
                    dst_port: config::dhcp::SERVER_PORT,
                }),
                Layer::Dhcp(Dhcp {
                    kind,
                    client_mac: interface.mac,
                    your_ip,
                    gateway: IpAddress::NO_ADDRESS,
                    server_ip,
                }),
            ],
        );
        ctx.send_frame(self.interface, frame);
    }

    fn wait_for(&self, ctx: &ProcessCtx, kind: DhcpKind) -> ProcessOutcome {
        let mac = ctx.host.interfaces[self.interface].mac;
        ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
            Box::new(move |received| {
                received
                    .packet
                    .dhcp()
                    .is_some_and(|dhcp| dhcp.kind == kind && dhcp.client_mac == mac)
            }),
            ctx.timeout(config::dhcp::STAGE_TIMEOUT),
        ))
    }

    fn discover(&mut self, ctx: &mut ProcessCtx) -> ProcessOutcome {
        if self.tries >= config::dhcp::MAX_TRIES {
            self.status.borrow_mut().done = true;
            return ProcessOutcome::fail(ProcessError::TimedOut);
        }
        self.tries += 1;
        self.stage = Stage::Discovering;
        self.broadcast(
            ctx,
            DhcpKind::Discover,
            IpAddress::NO_ADDRESS,
            IpAddress::NO_ADDRESS,
        );
        self.wait_for(ctx, DhcpKind::Offer)
    }
}

impl Process for DhcpClient {
    fn name(&self) -> &'static str {
        "dhcp-client"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match (&self.stage, input) {
            (Stage::Init, ResumeInput::Start) => {
                let owner = Some((ctx.mode, ctx.self_pid));
                let socket = ctx.host.sockets.get_socket(SocketKind::Datagram, owner);
                let bound = ctx.host.sockets.bind(
                    socket,
                    IpAddress::NO_ADDRESS,
                    config::dhcp::CLIENT_PORT,
                );
                if let Err(error) = bound {
                    return ProcessOutcome::fail(ProcessError::from(error));
                }
                self.discover(ctx)
            }
            (Stage::Discovering, ResumeInput::Packets(packets)) => {
                let Some(offer) = packets
                    .iter()
                    .find_map(|received| received.packet.dhcp().copied())
                else {
                    return self.discover(ctx);
                };
                self.stage = Stage::Requesting {
                    offered: offer.your_ip,
                    server: offer.server_ip,
                };
                self.broadcast(ctx, DhcpKind::Request, offer.your_ip, offer.server_ip);
                self.wait_for(ctx, DhcpKind::Pack)
            }
            (Stage::Requesting { offered, server }, ResumeInput::Packets(packets)) => {
                let (offered, server) = (*offered, *server);
                ctx.host.set_interface_ip(self.interface, Some(offered));
                // The server names the gateway; an absent one falls back to
                // the conventional first host of the subnet.
                let gateway = packets
                    .iter()
                    .find_map(|received| received.packet.dhcp())
                    .map(|dhcp| dhcp.gateway)
                    .filter(|gateway| !gateway.is_no_address())
                    .unwrap_or_else(|| offered.expected_gateway());
                ctx.host.routing_table.set_default_gateway(gateway, offered);
                tracing::info!(host = %ctx.host.name, ip = %offered, dhcp_server = %server, "address acquired");

                // Announce ourselves so neighbors refresh stale mappings.
                let interface = &ctx.host.interfaces[self.interface];
                let announce = interface.ethernet_wrap(
                    MacAddress::BROADCAST,
                    [Layer::Arp(Arp {
                        opcode: ArpOpcode::Gratuitous,
                        src_ip: offered,
                        src_mac: interface.mac,
                        dst_ip: offered,
                        dst_mac: MacAddress::BROADCAST,
                    })],
                );
                ctx.send_frame(self.interface, announce);

                let mut status = self.status.borrow_mut();
                status.assigned = Some(offered);
                status.done = true;
                ProcessOutcome::done()
            }
            (_, ResumeInput::TimedOut) => self.discover(ctx),
            _ => ProcessOutcome::done(),
        }
    }

    fn on_kill(&mut self, _ctx: &mut ProcessCtx) {
        self.status.borrow_mut().done = true;
    }
}
