//! Frame forwarding: the learning switch and the hub.

use crate::addresses::MacAddress;
use crate::clock::SimTime;
use crate::config;
use crate::packet::LayerKind;
use crate::process::{
    Process, ProcessCtx, ProcessOutcome, ReceivedPacket, ResumeInput, WaitDescriptor,
};
use rustc_hash::FxHashMap;

fn wait_for_frames() -> ProcessOutcome {
    // Spanning tree frames are for the bridge itself, never forwarded.
    ProcessOutcome::Wait(WaitDescriptor::Packet(Box::new(|received| {
        received.interface.is_some()
            && received.packet.ethernet().is_some()
            && !received.packet.contains(LayerKind::Stp)
    })))
}

/// A learning switch in kernelmode. Learns source MACs per port, forwards
/// known unicasts out of one port and floods everything else, honoring port
/// blocking imposed by spanning tree.
pub struct Switch {
    table: FxHashMap<MacAddress, (usize, SimTime)>,
}

impl Switch {
    pub fn new() -> Self {
        Self {
            table: FxHashMap::default(),
        }
    }

    fn forward(&mut self, ctx: &mut ProcessCtx, received: &ReceivedPacket) {
        let Some(ingress) = received.interface else {
            return;
        };
        let Some(ethernet) = received.packet.ethernet().copied() else {
            return;
        };
        // A blocked ingress port does not participate in forwarding.
        if ctx.host.interfaces[ingress].is_blocked {
            return;
        }
        self.table.insert(ethernet.src_mac, (ingress, ctx.now));

        // Frames addressed to the bridge itself stop here.
        if ctx
            .host
            .interfaces
            .iter()
            .any(|interface| interface.mac == ethernet.dst_mac)
        {
            return;
        }

        let known_port = if ethernet.dst_mac.is_broadcast() {
            None
        } else {
            self.table.get(&ethernet.dst_mac).map(|&(port, _)| port)
        };
        match known_port {
            Some(port) if port != ingress => {
                ctx.send_frame(port, received.packet.deep_copy());
            }
            Some(_) => {}
            None => {
                for port in 0..ctx.host.interfaces.len() {
                    if port == ingress {
                        continue;
                    }
                    ctx.send_frame(port, received.packet.deep_copy());
                }
            }
        }
    }

    fn age(&mut self, now: SimTime) {
        self.table.retain(|_, &mut (_, learned)| {
            now.duration_since(learned) < config::switch_table::ITEM_LIFETIME
        });
    }
}

impl Default for Switch {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Switch {
    fn name(&self) -> &'static str {
        "switch"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        if let ResumeInput::Packets(packets) = input {
            self.age(ctx.now);
            for received in &packets {
                self.forward(ctx, received);
            }
        }
        wait_for_frames()
    }
}

/// A hub: every frame goes out of every other port, unconditionally.
pub struct Hub;

impl Hub {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Hub {
    fn name(&self) -> &'static str {
        "hub"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        if let ResumeInput::Packets(packets) = input {
            for received in &packets {
                let Some(ingress) = received.interface else {
                    continue;
                };
                for port in 0..ctx.host.interfaces.len() {
                    if port != ingress {
                        ctx.send_frame(port, received.packet.deep_copy());
                    }
                }
            }
        }
        wait_for_frames()
    }
}
