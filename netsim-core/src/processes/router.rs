//! Kernelmode IP forwarding.

use crate::clock::{SimDuration, SimTime};
use crate::packet::{Icmp, IcmpKind, Layer, Packet};
use crate::process::{
    Process, ProcessCtx, ProcessMode, ProcessOutcome, ReceivedPacket, ResumeInput, WaitDescriptor,
};

/// How long a packet may sit waiting for ARP before the router gives up on
/// it.
const PENDING_LIFETIME: SimDuration = SimDuration::from_secs(5);

/// Forwards transit IP packets between interfaces: decrements TTL, answers
/// expiry with ICMP time exceeded, and parks packets whose next hop is
/// still being resolved.
pub struct Router {
    /// Packets awaiting ARP resolution of their next hop.
    pending: Vec<(Packet, SimTime)>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    fn wait(&self, ctx: &ProcessCtx) -> ProcessOutcome {
        let matcher = Box::new(|received: &ReceivedPacket| {
            received.interface.is_some() && received.packet.ip().is_some()
        });
        if self.pending.is_empty() {
            ProcessOutcome::Wait(WaitDescriptor::Packet(matcher))
        } else {
            // Poll so parked packets move once ARP answers.
            ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
                matcher,
                ctx.timeout(SimDuration::from_millis(100)),
            ))
        }
    }

    fn forward(&mut self, ctx: &mut ProcessCtx, mut packet: Packet) {
        let Some(ip) = packet.ip().copied() else {
            return;
        };
        // Traffic terminating here is the built-ins' business.
        if ctx.host.owns_ip(ip.dst_ip) || ip.dst_ip.is_broadcast() || ip.dst_ip.is_loopback() {
            return;
        }

        if ip.ttl <= 1 {
            tracing::debug!(src = %ip.src_ip, dst = %ip.dst_ip, "ttl expired");
            let _ = ctx.send_ip(
                ip.src_ip,
                vec![Layer::Icmp(Icmp {
                    kind: IcmpKind::TimeExceeded,
                    sequence: 0,
                })],
            );
            return;
        }

        let Ok(resolved) = ctx.host.routing_table.lookup(ip.dst_ip) else {
            tracing::debug!(dst = %ip.dst_ip, "no route, packet dropped");
            return;
        };
        let Some(egress) = ctx.host.interface_index_by_ip(resolved.interface_ip) else {
            return;
        };

        match ctx.host.arp_cache.get(resolved.next_hop) {
            Some(entry) => {
                let next_mac = entry.mac;
                if let Some(ttl_field) = packet.ip_mut() {
                    ttl_field.ttl = ip.ttl - 1;
                }
                let egress_mac = ctx.host.interfaces[egress].mac;
                if let Some(ethernet) = packet.ethernet_mut() {
                    ethernet.src_mac = egress_mac;
                    ethernet.dst_mac = next_mac;
                }
                ctx.send_frame(egress, packet);
            }
            None => {
                ctx.spawn(
                    ProcessMode::Kernelmode,
                    Box::new(crate::processes::arp_resolution::ArpResolution::new(
                        resolved.next_hop,
                        egress,
                        None,
                    )),
                );
                self.pending.push((packet, ctx.now));
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Router {
    fn name(&self) -> &'static str {
        "router"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        let parked: Vec<(Packet, SimTime)> = std::mem::take(&mut self.pending);
        for (packet, queued_at) in parked {
            if ctx.now.duration_since(queued_at) >= PENDING_LIFETIME {
                continue;
            }
            // Still unresolved packets fall back into the queue with their
            // original timestamp.
            let Some(ip) = packet.ip().copied() else {
                continue;
            };
            let resolvable = ctx
                .host
                .routing_table
                .lookup(ip.dst_ip)
                .ok()
                .map(|resolved| ctx.host.arp_cache.get(resolved.next_hop).is_some());
            match resolvable {
                Some(true) => self.forward(ctx, packet),
                Some(false) => self.pending.push((packet, queued_at)),
                None => {}
            }
        }

        if let ResumeInput::Packets(packets) = input {
            for received in packets {
                self.forward(ctx, received.packet);
            }
        }
        self.wait(ctx)
    }
}
