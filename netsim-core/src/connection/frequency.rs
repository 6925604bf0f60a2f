//! The wireless broadcast medium.
//!
//! A [`Frequency`] can have any number of sides. A transmission propagates
//! outward from the sender's position; a side receives the packet once the
//! propagation radius reaches it, and each side dedupes by transmission id so
//! nothing is received twice. Transmissions die out past the maximum range.

use crate::clock::SimTime;
use crate::config;
use crate::packet::Packet;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance_to(self, other: Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

struct FrequencySide {
    position: Position,
    inbox: VecDeque<Packet>,
    seen: FxHashSet<u64>,
}

struct AirPacket {
    id: u64,
    packet: Packet,
    origin: Position,
    origin_side: usize,
    send_time: SimTime,
}

pub struct Frequency {
    /// The carrier frequency in hertz. Purely an identifier.
    pub hertz: f64,
    sides: Vec<FrequencySide>,
    in_flight: Vec<AirPacket>,
    next_id: u64,
}

impl Frequency {
    pub fn new(hertz: f64) -> Self {
        Self {
            hertz,
            sides: Vec::new(),
            in_flight: Vec::new(),
            next_id: 0,
        }
    }

    /// Attaches a new side at the given position and returns its index.
    pub fn join(&mut self, position: Position) -> usize {
        self.sides.push(FrequencySide {
            position,
            inbox: VecDeque::new(),
            seen: FxHashSet::default(),
        });
        self.sides.len() - 1
    }

    pub fn move_side(&mut self, side: usize, position: Position) {
        if let Some(side) = self.sides.get_mut(side) {
            side.position = position;
        }
    }

    pub fn side_count(&self) -> usize {
        self.sides.len()
    }

    pub fn send(&mut self, packet: Packet, origin_side: usize, now: SimTime) {
        let origin = self.sides[origin_side].position;
        self.next_id += 1;
        self.in_flight.push(AirPacket {
            id: self.next_id,
            packet,
            origin,
            origin_side,
            send_time: now,
        });
    }

    /// Expands every in-flight transmission and delivers it to sides inside
    /// the current radius. Delivery is range-based: a side out of range when
    /// the wave dies never hears the packet at all.
    pub fn tick(&mut self, now: SimTime) {
        let mut index = 0;
        while index < self.in_flight.len() {
            let radius = {
                let air = &self.in_flight[index];
                now.duration_since(air.send_time).as_millis() as f64 / 1000.0
                    * config::connection::WIRELESS_SPEED
            };

            let air = &self.in_flight[index];
            for (side_index, side) in self.sides.iter_mut().enumerate() {
                if side_index == air.origin_side || side.seen.contains(&air.id) {
                    continue;
                }
                if side.position.distance_to(air.origin) <= radius {
                    side.seen.insert(air.id);
                    side.inbox.push_back(air.packet.deep_copy());
                }
            }

            if radius > config::connection::WIRELESS_MAX_RANGE {
                let dead = self.in_flight.swap_remove(index);
                for side in &mut self.sides {
                    side.seen.remove(&dead.id);
                }
            } else {
                index += 1;
            }
        }
    }

    pub fn drain_inbox(&mut self, side: usize) -> Vec<Packet> {
        match self.sides.get_mut(side) {
            Some(side) => side.inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }
}
