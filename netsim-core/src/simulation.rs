//! The simulation itself: hosts, links, and the main loop.
//!
//! Link delivery runs before host logic each tick, so a packet sent during
//! tick N is never observed before tick N+1 even on a zero-length wire.

use crate::addresses::MacGenerator;
use crate::clock::{SimDuration, SimTime};
use crate::connection::frequency::{Frequency, Position};
use crate::connection::{Connection, ConnectionParams, Side};
use crate::host::Host;
use crate::interface::{Attachment, TopologyError};
use crate::links::{ConnectionHandle, FrequencyHandle, Links};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Opaque reference to a host inside a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostHandle(usize);

/// A wire and the two interfaces it joins.
struct Wire {
    connection: ConnectionHandle,
    a: (HostHandle, usize),
    b: (HostHandle, usize),
}

pub struct Simulation {
    hosts: Vec<Host>,
    links: Links,
    wires: Vec<Wire>,
    now: SimTime,
    rng: SmallRng,
    macs: MacGenerator,
}

impl Simulation {
    /// All randomness in the simulation flows from this one seed.
    pub fn new(seed: u64) -> Self {
        Self {
            hosts: Vec::new(),
            links: Links::new(),
            wires: Vec::new(),
            now: SimTime::ZERO,
            rng: SmallRng::seed_from_u64(seed),
            macs: MacGenerator::new(),
        }
    }

    fn add_host(&mut self, host: Host) -> HostHandle {
        self.hosts.push(host);
        HostHandle(self.hosts.len() - 1)
    }

    pub fn add_computer(&mut self, name: impl Into<String>) -> HostHandle {
        let host = Host::computer(name, &mut self.macs);
        self.add_host(host)
    }

    pub fn add_switch(
        &mut self,
        name: impl Into<String>,
        ports: usize,
        priority: Option<u16>,
    ) -> HostHandle {
        let host = Host::switch(name, &mut self.macs, ports, priority);
        self.add_host(host)
    }

    pub fn add_hub(&mut self, name: impl Into<String>, ports: usize) -> HostHandle {
        let host = Host::hub(name, &mut self.macs, ports);
        self.add_host(host)
    }

    pub fn add_router(&mut self, name: impl Into<String>, ports: usize) -> HostHandle {
        let host = Host::router(name, &mut self.macs, ports);
        self.add_host(host)
    }

    pub fn host(&self, handle: HostHandle) -> &Host {
        &self.hosts[handle.0]
    }

    pub fn host_mut(&mut self, handle: HostHandle) -> &mut Host {
        &mut self.hosts[handle.0]
    }

    pub fn hosts(&self) -> impl Iterator<Item = (HostHandle, &Host)> {
        self.hosts
            .iter()
            .enumerate()
            .map(|(index, host)| (HostHandle(index), host))
    }

    /// Wires two interfaces together. Fails if either is already attached.
    pub fn connect(
        &mut self,
        a: (HostHandle, usize),
        b: (HostHandle, usize),
        params: ConnectionParams,
    ) -> Result<(), TopologyError> {
        if !self.hosts[a.0 .0].data.interfaces[a.1].is_connected()
            && !self.hosts[b.0 .0].data.interfaces[b.1].is_connected()
        {
            let seed = self.rng.gen();
            let connection = self.links.add_connection(Connection::new(params, seed));
            self.hosts[a.0 .0].data.interfaces[a.1].attach(Attachment::Wired {
                connection,
                side: Side::A,
            })?;
            self.hosts[b.0 .0].data.interfaces[b.1].attach(Attachment::Wired {
                connection,
                side: Side::B,
            })?;
            self.wires.push(Wire { connection, a, b });
            Ok(())
        } else {
            Err(TopologyError::DeviceAlreadyConnected)
        }
    }

    /// Severs the wire attached to the given interface. Everything in
    /// flight on it is lost.
    pub fn disconnect(&mut self, end: (HostHandle, usize)) -> Result<(), TopologyError> {
        let position = self
            .wires
            .iter()
            .position(|wire| wire.a == end || wire.b == end)
            .ok_or(TopologyError::InterfaceNotConnected)?;
        let wire = self.wires.swap_remove(position);
        self.hosts[wire.a.0 .0].data.interfaces[wire.a.1].detach()?;
        self.hosts[wire.b.0 .0].data.interfaces[wire.b.1].detach()?;
        self.links.remove_connection(wire.connection);
        Ok(())
    }

    pub fn add_frequency(&mut self, hertz: f64) -> FrequencyHandle {
        self.links.add_frequency(Frequency::new(hertz))
    }

    /// Attaches an interface to a wireless frequency at a position.
    pub fn join_frequency(
        &mut self,
        end: (HostHandle, usize),
        frequency: FrequencyHandle,
        position: Position,
    ) -> Result<(), TopologyError> {
        let side = self
            .links
            .frequency_mut(frequency)
            .ok_or(TopologyError::InterfaceNotConnected)?
            .join(position);
        let interface = &mut self.hosts[end.0 .0].data.interfaces[end.1];
        interface.position = position;
        interface.attach(Attachment::Wireless { frequency, side })
    }

    pub fn time(&self) -> SimTime {
        self.now
    }

    /// How long ago `earlier` was, saturating at zero.
    pub fn time_since(&self, earlier: SimTime) -> SimDuration {
        self.now.duration_since(earlier)
    }

    /// Advances the world by one millisecond.
    pub fn tick(&mut self) {
        self.now += SimDuration::from_millis(1);
        self.links.tick(self.now);
        for host in &mut self.hosts {
            host.logic(&mut self.links, self.now, &mut self.rng);
        }
    }

    pub fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Runs until the predicate holds or the budget runs out. Returns
    /// whether the predicate was observed.
    pub fn run_until(&mut self, max_ticks: u64, mut done: impl FnMut(&Simulation) -> bool) -> bool {
        for _ in 0..max_ticks {
            self.tick();
            if done(self) {
                return true;
            }
        }
        false
    }

    pub fn power_off(&mut self, host: HostHandle) {
        let now = self.now;
        self.hosts[host.0].power_off(&mut self.links, now, &mut self.rng);
    }

    pub fn power_on(&mut self, host: HostHandle) {
        self.hosts[host.0].power_on();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_busy_interfaces() {
        let mut sim = Simulation::new(1);
        let a = sim.add_computer("a");
        let b = sim.add_computer("b");
        let c = sim.add_computer("c");
        sim.connect((a, 0), (b, 0), ConnectionParams::default())
            .unwrap();
        assert_eq!(
            sim.connect((a, 0), (c, 0), ConnectionParams::default()),
            Err(TopologyError::DeviceAlreadyConnected)
        );
    }

    #[test]
    fn disconnect_frees_both_ends() {
        let mut sim = Simulation::new(1);
        let a = sim.add_computer("a");
        let b = sim.add_computer("b");
        sim.connect((a, 0), (b, 0), ConnectionParams::default())
            .unwrap();
        sim.disconnect((b, 0)).unwrap();
        assert!(!sim.host(a).data.interfaces[0].is_connected());
        assert!(!sim.host(b).data.interfaces[0].is_connected());
        // Both ends are reusable.
        sim.connect((a, 0), (b, 0), ConnectionParams::default())
            .unwrap();
    }

    #[test]
    fn clock_advances_one_millisecond_per_tick() {
        let mut sim = Simulation::new(1);
        sim.run_ticks(250);
        assert_eq!(sim.time(), SimTime::from_millis(250));
    }
}
