//! Owning storage for connections and wireless frequencies.
//!
//! Hosts never hold pointers into each other or into links. Everything lives
//! in an arena keyed by a stable handle; "back references" are handles
//! looked up here.

use crate::clock::SimTime;
use crate::connection::frequency::Frequency;
use crate::connection::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrequencyHandle(usize);

struct Arena<T> {
    items: Vec<Option<T>>,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn insert(&mut self, item: T) -> usize {
        match self.items.iter_mut().enumerate().find(|(_, slot)| slot.is_none()) {
            Some((index, slot)) => {
                *slot = Some(item);
                index
            }
            None => {
                self.items.push(Some(item));
                self.items.len() - 1
            }
        }
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index).and_then(Option::as_mut)
    }

    fn remove(&mut self, index: usize) -> Option<T> {
        self.items.get_mut(index).and_then(Option::take)
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut().filter_map(Option::as_mut)
    }
}

/// All links of a simulation.
pub struct Links {
    connections: Arena<Connection>,
    frequencies: Arena<Frequency>,
}

impl Links {
    pub fn new() -> Self {
        Self {
            connections: Arena::new(),
            frequencies: Arena::new(),
        }
    }

    pub fn add_connection(&mut self, connection: Connection) -> ConnectionHandle {
        ConnectionHandle(self.connections.insert(connection))
    }

    pub fn connection(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.connections.get(handle.0)
    }

    pub fn connection_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Connection> {
        self.connections.get_mut(handle.0)
    }

    /// Removes a connection, dropping all in-flight packets.
    pub fn remove_connection(&mut self, handle: ConnectionHandle) -> Option<Connection> {
        self.connections.remove(handle.0)
    }

    pub fn add_frequency(&mut self, frequency: Frequency) -> FrequencyHandle {
        FrequencyHandle(self.frequencies.insert(frequency))
    }

    pub fn frequency_mut(&mut self, handle: FrequencyHandle) -> Option<&mut Frequency> {
        self.frequencies.get_mut(handle.0)
    }

    /// Moves every in-flight packet on every link.
    pub fn tick(&mut self, now: SimTime) {
        for connection in self.connections.iter_mut() {
            connection.tick(now);
        }
        for frequency in self.frequencies.iter_mut() {
            frequency.tick(now);
        }
    }
}

impl Default for Links {
    fn default() -> Self {
        Self::new()
    }
}
