//! Spanning tree for switches.
//!
//! A simplified STP: bridges advertise (root, distance, self) hellos on
//! every port, elect the lowest bridge ID as root, pick the cheapest port
//! toward it, and block ports where a better bridge is designated for the
//! segment. Blocked ports keep passing STP frames through their accept
//! filter so the tree can heal when topology changes.

use crate::addresses::MacAddress;
use crate::clock::{SimDuration, SimTime};
use crate::config;
use crate::packet::{Bid, Layer, LayerKind, Stp};
use crate::process::{
    Process, ProcessCtx, ProcessOutcome, ReceivedPacket, ResumeInput, WaitDescriptor,
};
use rustc_hash::FxHashMap;

struct HeardBpdu {
    bpdu: Stp,
    last_seen: SimTime,
}

pub struct SpanningTree {
    own_bid: Bid,
    root_bid: Bid,
    distance_to_root: u64,
    root_port: Option<usize>,
    /// Best advertisement heard per port.
    heard: FxHashMap<usize, HeardBpdu>,
    last_change: SimTime,
    next_hello: SimTime,
}

/// Preference order for advertisements: lower root, then shorter path, then
/// lower sender.
fn rank(bpdu: &Stp) -> (Bid, u64, Bid) {
    (bpdu.root_bid, bpdu.distance_to_root, bpdu.sender_bid)
}

impl SpanningTree {
    pub fn new(priority: u16, bridge_mac: MacAddress) -> Self {
        let own_bid = Bid::new(priority, bridge_mac);
        Self {
            own_bid,
            root_bid: own_bid,
            distance_to_root: 0,
            root_port: None,
            heard: FxHashMap::default(),
            last_change: SimTime::ZERO,
            next_hello: SimTime::ZERO,
        }
    }

    pub fn is_root(&self) -> bool {
        self.root_bid == self.own_bid
    }

    pub fn root_bid(&self) -> Bid {
        self.root_bid
    }

    fn note(&mut self, received: &ReceivedPacket, now: SimTime) {
        let (Some(port), Some(bpdu)) = (received.interface, received.packet.stp().copied()) else {
            return;
        };
        match self.heard.get(&port) {
            Some(existing) if rank(&existing.bpdu) < rank(&bpdu) => {
                // A worse advertisement still refreshes liveness of the
                // stored one.
                if let Some(entry) = self.heard.get_mut(&port) {
                    entry.last_seen = now;
                }
            }
            _ => {
                self.heard.insert(
                    port,
                    HeardBpdu {
                        bpdu,
                        last_seen: now,
                    },
                );
            }
        }
    }

    fn expire(&mut self, now: SimTime) {
        self.heard.retain(|_, heard| {
            now.duration_since(heard.last_seen) < config::stp::MAX_CONNECTION_DISAPPEARED_TIME
        });
        // A root nobody vouches for anymore has disappeared.
        if !self.is_root() {
            let vouched = self
                .heard
                .values()
                .any(|heard| heard.bpdu.root_bid == self.root_bid);
            if !vouched && now.duration_since(self.last_change) > config::stp::ROOT_MAX_DISAPPEARING_TIME
            {
                self.root_bid = self.own_bid;
                self.distance_to_root = 0;
                self.root_port = None;
                self.last_change = now;
                tracing::debug!(bridge = self.own_bid.value(), "root lost, reclaiming");
            }
        }
    }

    fn recompute(&mut self, ctx: &mut ProcessCtx, now: SimTime) {
        let best_root = self
            .heard
            .values()
            .map(|heard| heard.bpdu.root_bid)
            .min()
            .map(|heard_root| heard_root.min(self.own_bid))
            .unwrap_or(self.own_bid);

        let (new_root, new_distance, new_root_port) = if best_root == self.own_bid {
            (self.own_bid, 0, None)
        } else {
            let toward_root = self
                .heard
                .iter()
                .filter(|(_, heard)| heard.bpdu.root_bid == best_root)
                .min_by_key(|(_, heard)| (heard.bpdu.distance_to_root, heard.bpdu.sender_bid))
                .map(|(&port, heard)| (port, heard.bpdu.distance_to_root + 1));
            match toward_root {
                Some((port, distance)) => (best_root, distance, Some(port)),
                None => (self.own_bid, 0, None),
            }
        };

        if new_root != self.root_bid
            || new_distance != self.distance_to_root
            || new_root_port != self.root_port
        {
            self.last_change = now;
            tracing::debug!(
                bridge = self.own_bid.value(),
                root = new_root.value(),
                distance = new_distance,
                "tree changed"
            );
        }
        self.root_bid = new_root;
        self.distance_to_root = new_distance;
        self.root_port = new_root_port;

        for port in 0..ctx.host.interfaces.len() {
            let designated_elsewhere = match self.heard.get(&port) {
                Some(heard) if heard.bpdu.root_bid == self.root_bid => {
                    let theirs = (heard.bpdu.distance_to_root, heard.bpdu.sender_bid);
                    let ours = (self.distance_to_root, self.own_bid);
                    theirs < ours
                }
                _ => false,
            };
            let block = Some(port) != self.root_port && designated_elsewhere;
            let interface = &mut ctx.host.interfaces[port];
            if block && !interface.is_blocked {
                interface.block(Some(LayerKind::Stp), ctx.links);
            } else if !block && interface.is_blocked {
                interface.unblock(ctx.links);
            }
        }
    }

    fn hello(&self, ctx: &mut ProcessCtx) {
        for port in 0..ctx.host.interfaces.len() {
            let frame = ctx.host.interfaces[port].ethernet_wrap(
                MacAddress::STP_MULTICAST,
                [Layer::Stp(Stp {
                    sender_bid: self.own_bid,
                    root_bid: self.root_bid,
                    distance_to_root: self.distance_to_root,
                })],
            );
            ctx.send_frame(port, frame);
        }
    }

    /// The next instant a timer alone could change the tree: a heard
    /// advertisement aging out, or the missing root's grace period lapsing.
    fn next_deadline(&self) -> Option<SimTime> {
        let mut deadline = self
            .heard
            .values()
            .map(|heard| heard.last_seen + config::stp::MAX_CONNECTION_DISAPPEARED_TIME)
            .min();
        if !self.is_root() {
            let vouched = self
                .heard
                .values()
                .any(|heard| heard.bpdu.root_bid == self.root_bid);
            if !vouched {
                let reclaim = self.last_change + config::stp::ROOT_MAX_DISAPPEARING_TIME;
                deadline = Some(deadline.map_or(reclaim, |other| other.min(reclaim)));
            }
        }
        deadline
    }

    fn interval(&self, now: SimTime) -> SimDuration {
        let settled = now.duration_since(self.last_change)
            > config::stp::TREE_STABILIZING_MAX_TIME;
        if settled {
            config::stp::STABLE_SENDING_INTERVAL
        } else {
            config::stp::NORMAL_SENDING_INTERVAL
        }
    }
}

impl Process for SpanningTree {
    fn name(&self) -> &'static str {
        "stp"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        let now = ctx.now;
        match input {
            ResumeInput::Start => {
                self.last_change = now;
            }
            ResumeInput::Packets(packets) => {
                for received in &packets {
                    self.note(received, now);
                }
            }
            _ => {}
        }

        self.expire(now);
        let changed_at = self.last_change;
        self.recompute(ctx, now);

        // Hellos go out on schedule, or right away after a tree change.
        if now >= self.next_hello || self.last_change != changed_at {
            self.hello(ctx);
            self.next_hello = now + self.interval(now);
        }

        // Wake at the next hello, or earlier if an expiry deadline would
        // change the tree before then. Deadlines land one tick late so the
        // strict age comparisons in `expire` see them as passed.
        let mut wake = self.next_hello;
        if let Some(deadline) = self.next_deadline() {
            wake = wake.min(deadline.max(now) + SimDuration::from_millis(1));
        }
        ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
            Box::new(|received| received.packet.contains(LayerKind::Stp)),
            ctx.timeout(wake.duration_since(now)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertisement_ranking() {
        let low = Stp {
            sender_bid: Bid::new(0x8000, MacAddress::new([1; 6])),
            root_bid: Bid::new(0x1000, MacAddress::new([1; 6])),
            distance_to_root: 3,
        };
        let high_root = Stp {
            root_bid: Bid::new(0x8000, MacAddress::new([1; 6])),
            ..low
        };
        assert!(rank(&low) < rank(&high_root));

        let closer = Stp {
            distance_to_root: 1,
            ..low
        };
        assert!(rank(&closer) < rank(&low));
    }

    #[test]
    fn deadline_tracks_heard_advertisements() {
        let mut tree = SpanningTree::new(0x8000, MacAddress::new([2; 6]));
        assert_eq!(tree.next_deadline(), None);

        let heard_at = SimTime::from_millis(1_000);
        let peer = Bid::new(0x1000, MacAddress::new([1; 6]));
        tree.heard.insert(
            0,
            HeardBpdu {
                bpdu: Stp {
                    sender_bid: peer,
                    root_bid: peer,
                    distance_to_root: 0,
                },
                last_seen: heard_at,
            },
        );
        assert_eq!(
            tree.next_deadline(),
            Some(heard_at + config::stp::MAX_CONNECTION_DISAPPEARED_TIME)
        );
    }

    #[test]
    fn deadline_covers_a_vanished_root() {
        let mut tree = SpanningTree::new(0x8000, MacAddress::new([2; 6]));
        tree.root_bid = Bid::new(0x1000, MacAddress::new([1; 6]));
        tree.distance_to_root = 1;
        tree.root_port = Some(0);
        tree.last_change = SimTime::from_millis(5_000);

        // Nobody vouches for the root anymore, so the reclaim grace period
        // bounds the wait.
        assert_eq!(
            tree.next_deadline(),
            Some(tree.last_change + config::stp::ROOT_MAX_DISAPPEARING_TIME)
        );
    }
}
