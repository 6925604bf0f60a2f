use netsim_core::connection::ConnectionParams;
use netsim_core::process::ProcessMode;
use netsim_core::processes::ping::{Ping, PingStats};
use netsim_core::Simulation;
use std::cell::RefCell;
use std::rc::Rc;

/// Runs a basic simulation.
///
/// Two computers hang off one switch. One pings the other four times and
/// the simulation ends when every reply is in.
pub fn ping_switch(seed: u64) {
    let mut sim = Simulation::new(seed);
    let alice = sim.add_computer("alice");
    let bob = sim.add_computer("bob");
    let switch = sim.add_switch("switch", 2, None);
    sim.connect((alice, 0), (switch, 0), ConnectionParams::default())
        .unwrap();
    sim.connect((bob, 0), (switch, 1), ConnectionParams::default())
        .unwrap();
    sim.host_mut(alice)
        .data
        .set_interface_ip(0, Some("10.0.0.1/24".parse().unwrap()));
    sim.host_mut(bob)
        .data
        .set_interface_ip(0, Some("10.0.0.2/24".parse().unwrap()));

    let stats = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(alice).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::new("10.0.0.2".parse().unwrap(), 4, stats.clone())),
    );

    let finished = sim.run_until(30_000, |_| stats.borrow().done);
    assert!(finished);
    let stats = stats.borrow();
    assert_eq!(stats.received, 4);
    assert_eq!(stats.lost, 0);
    println!(
        "ping: {} sent, {} received, first rtt {:?}",
        stats.sent, stats.received, stats.rtts[0]
    );
}

#[cfg(test)]
mod tests {
    #[test]
    fn ping_switch() {
        super::ping_switch(1);
    }
}
