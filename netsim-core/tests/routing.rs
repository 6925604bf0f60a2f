//! Forwarding scenarios through a router joining two subnets.

use netsim_core::clock::SimTime;
use netsim_core::connection::ConnectionParams;
use netsim_core::packet::{Icmp, IcmpKind, Ip, Layer};
use netsim_core::process::{
    Process, ProcessCtx, ProcessMode, ProcessOutcome, ResumeInput, WaitDescriptor,
};
use netsim_core::processes::ping::{Ping, PingStats};
use netsim_core::{HostHandle, IpAddress, MacAddress, Simulation};
use std::cell::RefCell;
use std::rc::Rc;

/// alice (10.0.1.2) -- router -- bob (10.0.2.2), default routes pointing at
/// the router on both sides.
fn two_subnets(sim: &mut Simulation) -> (HostHandle, HostHandle, HostHandle) {
    let router = sim.add_router("router", 2);
    let alice = sim.add_computer("alice");
    let bob = sim.add_computer("bob");
    sim.connect((alice, 0), (router, 0), ConnectionParams::default())
        .unwrap();
    sim.connect((bob, 0), (router, 1), ConnectionParams::default())
        .unwrap();

    let data = &mut sim.host_mut(router).data;
    data.set_interface_ip(0, Some("10.0.1.1/24".parse().unwrap()));
    data.set_interface_ip(1, Some("10.0.2.1/24".parse().unwrap()));

    let data = &mut sim.host_mut(alice).data;
    data.set_interface_ip(0, Some("10.0.1.2/24".parse().unwrap()));
    data.routing_table
        .set_default_gateway("10.0.1.1".parse().unwrap(), "10.0.1.2".parse().unwrap());

    let data = &mut sim.host_mut(bob).data;
    data.set_interface_ip(0, Some("10.0.2.2/24".parse().unwrap()));
    data.routing_table
        .set_default_gateway("10.0.2.1".parse().unwrap(), "10.0.2.2".parse().unwrap());

    (alice, router, bob)
}

#[test]
fn ping_crosses_subnets() {
    let mut sim = Simulation::new(11);
    let (alice, _router, _bob) = two_subnets(&mut sim);

    let stats = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(alice).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::new("10.0.2.2".parse().unwrap(), 3, stats.clone())),
    );
    assert!(sim.run_until(60_000, |_| stats.borrow().done));
    let stats = stats.borrow();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.lost, 0);
}

/// Sends one echo request with TTL 1 and records the ICMP error that comes
/// back.
struct TtlProbe {
    gateway_mac: MacAddress,
    target: IpAddress,
    outcome: Rc<RefCell<Option<IcmpKind>>>,
}

impl Process for TtlProbe {
    fn name(&self) -> &'static str {
        "ttl-probe"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match input {
            ResumeInput::Start => {
                let Some(src_ip) = ctx.host.interfaces[0].ip else {
                    return ProcessOutcome::done();
                };
                let mut packet = ctx.host.interfaces[0].ethernet_wrap(
                    self.gateway_mac,
                    [Layer::Ip(Ip {
                        src_ip,
                        dst_ip: self.target,
                        ttl: 1,
                    })],
                );
                packet.push(Layer::Icmp(Icmp {
                    kind: IcmpKind::EchoRequest,
                    sequence: 1,
                }));
                ctx.send_frame(0, packet);
                ProcessOutcome::Wait(WaitDescriptor::Packet(Box::new(|received| {
                    received
                        .packet
                        .icmp()
                        .is_some_and(|icmp| icmp.kind != IcmpKind::EchoRequest)
                })))
            }
            ResumeInput::Packets(packets) => {
                *self.outcome.borrow_mut() =
                    packets[0].packet.icmp().map(|icmp| icmp.kind);
                ProcessOutcome::done()
            }
            _ => ProcessOutcome::done(),
        }
    }
}

#[test]
fn expired_ttl_comes_back_as_time_exceeded() {
    let mut sim = Simulation::new(12);
    let (alice, router, _bob) = two_subnets(&mut sim);

    let gateway_mac = sim.host(router).data.interfaces[0].mac;
    let alice_mac = sim.host(alice).data.interfaces[0].mac;
    // Pre-seed both ARP caches so the error path itself is what gets tested.
    sim.host_mut(router).data.arp_cache.add_static(
        "10.0.1.2".parse().unwrap(),
        alice_mac,
        SimTime::ZERO,
    );

    let outcome = Rc::new(RefCell::new(None));
    sim.host_mut(alice).spawn(
        ProcessMode::Usermode,
        Box::new(TtlProbe {
            gateway_mac,
            target: "10.0.2.2".parse().unwrap(),
            outcome: outcome.clone(),
        }),
    );
    assert!(sim.run_until(10_000, |_| outcome.borrow().is_some()));
    assert_eq!(*outcome.borrow(), Some(IcmpKind::TimeExceeded));
}
