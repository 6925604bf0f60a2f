use netsim_core::connection::ConnectionParams;
use netsim_core::process::ProcessMode;
use netsim_core::processes::ping::{Ping, PingStats};
use netsim_core::Simulation;
use std::cell::RefCell;
use std::rc::Rc;

/// Three switches wired in a loop, with a computer on either side.
///
/// Without spanning tree the loop would flood forever. The bridges elect a
/// root, exactly one port goes blocking, and a ping still gets through.
pub fn stp_triangle(seed: u64) {
    let mut sim = Simulation::new(seed);
    let s1 = sim.add_switch("s1", 3, Some(1));
    let s2 = sim.add_switch("s2", 3, Some(2));
    let s3 = sim.add_switch("s3", 3, Some(3));
    sim.connect((s1, 0), (s2, 1), ConnectionParams::default())
        .unwrap();
    sim.connect((s2, 0), (s3, 1), ConnectionParams::default())
        .unwrap();
    sim.connect((s3, 0), (s1, 1), ConnectionParams::default())
        .unwrap();

    let alice = sim.add_computer("alice");
    let bob = sim.add_computer("bob");
    sim.connect((alice, 0), (s1, 2), ConnectionParams::default())
        .unwrap();
    sim.connect((bob, 0), (s2, 2), ConnectionParams::default())
        .unwrap();
    sim.host_mut(alice)
        .data
        .set_interface_ip(0, Some("10.0.0.1/24".parse().unwrap()));
    sim.host_mut(bob)
        .data
        .set_interface_ip(0, Some("10.0.0.2/24".parse().unwrap()));

    // Let the tree settle before sending traffic through it.
    sim.run_ticks(10_000);
    let blocked: usize = [s1, s2, s3]
        .into_iter()
        .map(|handle| {
            sim.host(handle)
                .data
                .interfaces
                .iter()
                .filter(|interface| interface.is_blocked)
                .count()
        })
        .sum();
    assert_eq!(blocked, 1);

    let stats = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(alice).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::with_default_count(
            "10.0.0.2".parse().unwrap(),
            stats.clone(),
        )),
    );
    let finished = sim.run_until(30_000, |_| stats.borrow().done);
    assert!(finished);
    assert_eq!(stats.borrow().received, 3);
    println!("stp: 1 port blocking, ping survived the loop");
}

#[cfg(test)]
mod tests {
    #[test]
    fn stp_triangle() {
        super::stp_triangle(1);
    }
}
