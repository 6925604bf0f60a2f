//! The physical link model.
//!
//! A [`Connection`] joins exactly two endpoints. Packets put on the wire sit
//! in an in-flight queue until their propagation delay has elapsed, then land
//! in the destination side's inbox. Loss is rolled independently per send;
//! a lost packet is discarded silently at its delivery deadline, with no
//! notification to the sender, so protocol-level retry logic stays honest.

pub mod frequency;

use crate::clock::{SimDuration, SimTime};
use crate::config;
use crate::packet::Packet;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// One endpoint of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

/// Which way a packet is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    pub fn from_side(origin: Side) -> Direction {
        match origin {
            Side::A => Direction::AToB,
            Side::B => Direction::BToA,
        }
    }

    pub fn destination(self) -> Side {
        match self {
            Direction::AToB => Side::B,
            Direction::BToA => Side::A,
        }
    }
}

/// A packet in flight on a connection.
#[derive(Debug, Clone)]
struct SentPacket {
    packet: Packet,
    send_time: SimTime,
    direction: Direction,
    dropped: bool,
}

/// Parameters for creating a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionParams {
    /// Physical length of the link, in distance units.
    pub length: f64,
    /// Propagation speed, in distance units per second.
    pub speed: f64,
    /// Probability in `[0, 1]` that any given send is lost.
    pub packet_loss: f64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            length: 100.0,
            speed: config::connection::DEFAULT_SPEED,
            packet_loss: 0.0,
        }
    }
}

pub struct Connection {
    queue: Vec<SentPacket>,
    inboxes: [VecDeque<Packet>; 2],
    blocked: [bool; 2],
    params: ConnectionParams,
    rng: SmallRng,
}

impl Connection {
    pub fn new(params: ConnectionParams, seed: u64) -> Self {
        Self {
            queue: Vec::new(),
            inboxes: [VecDeque::new(), VecDeque::new()],
            blocked: [false, false],
            params,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Propagation delay of the link. Never less than one millisecond, so a
    /// packet sent this tick is observable no earlier than the next tick.
    pub fn deliver_time(&self) -> SimDuration {
        let millis = (self.params.length / self.params.speed * 1000.0).ceil() as u64;
        SimDuration::from_millis(millis.max(1))
    }

    /// Puts a packet on the wire. The loss roll happens here, once per send.
    pub fn send(&mut self, packet: Packet, direction: Direction, now: SimTime) {
        let dropped = self.params.packet_loss > 0.0
            && self.rng.gen_range(0.0..1.0) < self.params.packet_loss;
        if dropped {
            tracing::trace!("packet will be lost in transit");
        }
        self.queue.push(SentPacket {
            packet,
            send_time: now,
            direction,
            dropped,
        });
    }

    /// Moves in-flight packets. Each queued packet leaves the queue exactly
    /// once: delivered to the destination inbox at its deadline, or
    /// discarded there if the send-time loss roll marked it.
    pub fn tick(&mut self, now: SimTime) {
        let deliver_time = self.deliver_time();
        let mut index = 0;
        while index < self.queue.len() {
            if now.duration_since(self.queue[index].send_time) >= deliver_time {
                let sent = self.queue.swap_remove(index);
                if !sent.dropped {
                    let side = sent.direction.destination();
                    self.inboxes[side.index()].push_back(sent.packet);
                }
            } else {
                index += 1;
            }
        }
    }

    /// Takes everything that has arrived at the given side.
    pub fn drain_inbox(&mut self, side: Side) -> Vec<Packet> {
        self.inboxes[side.index()].drain(..).collect()
    }

    /// Records that the given side is in a blocking state (STP port states).
    pub fn mark_blocked(&mut self, side: Side) {
        self.blocked[side.index()] = true;
    }

    pub fn mark_unblocked(&mut self, side: Side) {
        self.blocked[side.index()] = false;
    }

    /// Whether either side is currently blocking.
    pub fn is_blocked(&self) -> bool {
        self.blocked[0] || self.blocked[1]
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Layer, Packet};

    fn packet() -> Packet {
        Packet::new([Layer::Raw(vec![1, 2, 3])])
    }

    fn tick_until(conn: &mut Connection, mut now: SimTime, step: SimDuration, ticks: u32) -> SimTime {
        for _ in 0..ticks {
            now += step;
            conn.tick(now);
        }
        now
    }

    #[test]
    fn delivers_to_the_destination_side_only() {
        let mut conn = Connection::new(ConnectionParams::default(), 7);
        conn.send(packet(), Direction::AToB, SimTime::ZERO);
        assert_eq!(conn.in_flight(), 1);

        tick_until(&mut conn, SimTime::ZERO, SimDuration::from_millis(10), 10);
        assert_eq!(conn.in_flight(), 0);
        assert!(conn.drain_inbox(Side::A).is_empty());
        assert_eq!(conn.drain_inbox(Side::B).len(), 1);
    }

    #[test]
    fn zero_length_link_still_takes_a_tick() {
        let params = ConnectionParams {
            length: 0.0,
            ..Default::default()
        };
        let mut conn = Connection::new(params, 7);
        conn.send(packet(), Direction::AToB, SimTime::ZERO);
        // Same instant: nothing arrives yet.
        conn.tick(SimTime::ZERO);
        assert_eq!(conn.in_flight(), 1);
        conn.tick(SimTime::from_millis(1));
        assert_eq!(conn.drain_inbox(Side::B).len(), 1);
    }

    #[test]
    fn loss_is_silent_and_converges_to_the_configured_rate() {
        let params = ConnectionParams {
            packet_loss: 0.3,
            ..Default::default()
        };
        let mut conn = Connection::new(params, 42);
        let total = 2000;
        for _ in 0..total {
            conn.send(packet(), Direction::AToB, SimTime::ZERO);
        }
        tick_until(&mut conn, SimTime::ZERO, SimDuration::from_millis(25), 4);
        let delivered = conn.drain_inbox(Side::B).len();
        let observed_loss = 1.0 - delivered as f64 / total as f64;
        assert!(
            (observed_loss - 0.3).abs() < 0.05,
            "observed loss {observed_loss}"
        );
        assert_eq!(conn.in_flight(), 0);
    }
}
