//! Whole-simulation scenarios: several hosts, real topology, protocols
//! driven to completion through the public API only.

use netsim_core::addresses::MacAddress;
use netsim_core::connection::ConnectionParams;
use netsim_core::interface::Interface;
use netsim_core::process::ProcessMode;
use netsim_core::processes::dhcp_client::{DhcpClient, DhcpStatus};
use netsim_core::processes::dhcp_server::DhcpServer;
use netsim_core::processes::dns_client::{DnsClient, DnsLookup};
use netsim_core::processes::dns_server::DnsServer;
use netsim_core::processes::ping::{Ping, PingStats};
use netsim_core::processes::sniffer::Sniffer;
use netsim_core::processes::tcp::{TcpClient, TcpServer, TcpStatus};
use netsim_core::processes::udp_echo::{EchoClient, EchoServer, EchoStatus};
use netsim_core::connection::frequency::Position;
use netsim_core::{HostHandle, LayerKind, Simulation};
use std::cell::RefCell;
use std::rc::Rc;

fn wired_pair(sim: &mut Simulation) -> (HostHandle, HostHandle) {
    let a = sim.add_computer("a");
    let b = sim.add_computer("b");
    sim.connect((a, 0), (b, 0), ConnectionParams::default())
        .unwrap();
    sim.host_mut(a)
        .data
        .set_interface_ip(0, Some("10.0.0.1/24".parse().unwrap()));
    sim.host_mut(b)
        .data
        .set_interface_ip(0, Some("10.0.0.2/24".parse().unwrap()));
    (a, b)
}

#[test]
fn udp_echo_through_hub() -> anyhow::Result<()> {
    let mut sim = Simulation::new(3);
    let hub = sim.add_hub("hub", 3);
    let client = sim.add_computer("client");
    let server = sim.add_computer("server");
    let bystander = sim.add_computer("bystander");
    for (index, host) in [client, server, bystander].into_iter().enumerate() {
        sim.connect((host, 0), (hub, index), ConnectionParams::default())?;
    }
    sim.host_mut(client)
        .data
        .set_interface_ip(0, Some("192.168.1.1/24".parse().unwrap()));
    sim.host_mut(server)
        .data
        .set_interface_ip(0, Some("192.168.1.2/24".parse().unwrap()));
    sim.host_mut(bystander)
        .data
        .set_interface_ip(0, Some("192.168.1.3/24".parse().unwrap()));

    sim.host_mut(server)
        .spawn(ProcessMode::Usermode, Box::new(EchoServer::new()));
    let status = Rc::new(RefCell::new(EchoStatus::default()));
    sim.host_mut(client).spawn(
        ProcessMode::Usermode,
        Box::new(EchoClient::new(
            "192.168.1.2".parse().unwrap(),
            b"marco".to_vec(),
            status.clone(),
        )),
    );

    assert!(sim.run_until(30_000, |_| status.borrow().done));
    assert_eq!(status.borrow().reply.as_deref(), Some(b"marco".as_slice()));
    Ok(())
}

#[test]
fn dns_resolves_known_and_unknown_names() {
    let mut sim = Simulation::new(4);
    let (client, server) = wired_pair(&mut sim);
    sim.host_mut(server).spawn(
        ProcessMode::Usermode,
        Box::new(DnsServer::new([(
            "files.example".to_string(),
            "10.9.9.9".parse().unwrap(),
        )])),
    );

    let known = Rc::new(RefCell::new(DnsLookup::default()));
    let unknown = Rc::new(RefCell::new(DnsLookup::default()));
    let server_ip = "10.0.0.2".parse().unwrap();
    sim.host_mut(client).spawn(
        ProcessMode::Usermode,
        Box::new(DnsClient::new(server_ip, "files.example", known.clone())),
    );
    sim.host_mut(client).spawn(
        ProcessMode::Usermode,
        Box::new(DnsClient::new(server_ip, "no.such.name", unknown.clone())),
    );

    assert!(sim.run_until(30_000, |_| {
        known.borrow().done && unknown.borrow().done
    }));
    assert_eq!(
        known.borrow().result,
        Some(Some("10.9.9.9".parse().unwrap()))
    );
    assert_eq!(unknown.borrow().result, Some(None));
}

#[test]
fn powered_off_switch_drops_traffic_until_restored() {
    let mut sim = Simulation::new(5);
    let switch = sim.add_switch("switch", 2, None);
    let alice = sim.add_computer("alice");
    let bob = sim.add_computer("bob");
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
    let bob_ip = "10.0.0.2".parse().unwrap();

    let before = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(alice).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::new(bob_ip, 2, before.clone())),
    );
    assert!(sim.run_until(30_000, |_| before.borrow().done));
    assert_eq!(before.borrow().received, 2);

    sim.power_off(switch);
    let during = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(alice).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::new(bob_ip, 2, during.clone())),
    );
    assert!(sim.run_until(60_000, |_| during.borrow().done));
    assert_eq!(during.borrow().received, 0);

    sim.power_on(switch);
    let after = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(alice).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::new(bob_ip, 2, after.clone())),
    );
    assert!(sim.run_until(60_000, |_| after.borrow().done));
    assert_eq!(after.borrow().received, 2);
}

#[test]
fn tcp_survives_a_lossy_wire() {
    let mut sim = Simulation::new(7);
    let client = sim.add_computer("client");
    let server = sim.add_computer("server");
    sim.connect(
        (client, 0),
        (server, 0),
        ConnectionParams {
            packet_loss: 0.1,
            ..ConnectionParams::default()
        },
    )
    .unwrap();
    sim.host_mut(client)
        .data
        .set_interface_ip(0, Some("10.0.0.1/24".parse().unwrap()));
    sim.host_mut(server)
        .data
        .set_interface_ip(0, Some("10.0.0.2/24".parse().unwrap()));

    sim.host_mut(server).spawn(
        ProcessMode::Usermode,
        Box::new(TcpServer::new(
            9000,
            Box::new(|request, _ctx| {
                let mut response = request.to_vec();
                response.reverse();
                response
            }),
        )),
    );

    let request: Vec<u8> = (0..8000u32).map(|n| n as u8).collect();
    let mut expected = request.clone();
    expected.reverse();
    let status = Rc::new(RefCell::new(TcpStatus::default()));
    sim.host_mut(client).spawn(
        ProcessMode::Usermode,
        Box::new(TcpClient::new(
            "10.0.0.2".parse().unwrap(),
            9000,
            request,
            status.clone(),
        )),
    );

    assert!(sim.run_until(240_000, |_| status.borrow().done));
    let status = status.borrow();
    assert!(!status.reset);
    assert_eq!(status.response.as_deref(), Some(expected.as_slice()));
    assert!(status.retransmissions > 0);
}

#[test]
fn ping_over_the_air() {
    let mut sim = Simulation::new(8);
    let near = sim.add_computer("near");
    let far = sim.add_computer("far");
    let out_of_range = sim.add_computer("out-of-range");
    let frequency = sim.add_frequency(2_400_000_000.0);
    sim.join_frequency((near, 0), frequency, Position::new(0.0, 0.0))
        .unwrap();
    sim.join_frequency((far, 0), frequency, Position::new(300.0, 400.0))
        .unwrap();
    sim.join_frequency((out_of_range, 0), frequency, Position::new(5000.0, 0.0))
        .unwrap();
    sim.host_mut(near)
        .data
        .set_interface_ip(0, Some("10.0.0.1/24".parse().unwrap()));
    sim.host_mut(far)
        .data
        .set_interface_ip(0, Some("10.0.0.2/24".parse().unwrap()));
    sim.host_mut(out_of_range)
        .data
        .set_interface_ip(0, Some("10.0.0.3/24".parse().unwrap()));

    let reachable = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(near).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::new(
            "10.0.0.2".parse().unwrap(),
            2,
            reachable.clone(),
        )),
    );
    assert!(sim.run_until(60_000, |_| reachable.borrow().done));
    assert_eq!(reachable.borrow().received, 2);

    // The distant host never hears anything, so ARP for it cannot finish.
    let unreachable = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(near).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::new(
            "10.0.0.3".parse().unwrap(),
            2,
            unreachable.clone(),
        )),
    );
    sim.run_ticks(60_000);
    assert_eq!(unreachable.borrow().received, 0);
}

#[test]
fn dhcp_leases_follow_the_ingress_subnet() {
    let mut sim = Simulation::new(9);
    let server = sim.add_computer("server");
    let first = sim.add_computer("first");
    let second = sim.add_computer("second");
    sim.host_mut(server).data.interfaces.push(Interface::new(
        "eth1",
        MacAddress::new([0x02, 0x01, 0, 0, 0, 0x99]),
    ));
    sim.connect((server, 0), (first, 0), ConnectionParams::default())
        .unwrap();
    sim.connect((server, 1), (second, 0), ConnectionParams::default())
        .unwrap();
    sim.host_mut(server)
        .data
        .set_interface_ip(0, Some("10.0.1.1/24".parse().unwrap()));
    sim.host_mut(server)
        .spawn(ProcessMode::Kernelmode, Box::new(DhcpServer::new()));

    let lease_a = Rc::new(RefCell::new(DhcpStatus::default()));
    sim.host_mut(first).spawn(
        ProcessMode::Kernelmode,
        Box::new(DhcpClient::new(0, lease_a.clone())),
    );
    assert!(sim.run_until(30_000, |_| lease_a.borrow().done));
    assert_eq!(
        lease_a.borrow().assigned,
        Some("10.0.1.2".parse().unwrap())
    );

    // The second serving interface gets its address only now, while the
    // server is already running. It still leases out of its own subnet.
    sim.host_mut(server)
        .data
        .set_interface_ip(1, Some("10.0.2.1/24".parse().unwrap()));
    let lease_b = Rc::new(RefCell::new(DhcpStatus::default()));
    sim.host_mut(second).spawn(
        ProcessMode::Kernelmode,
        Box::new(DhcpClient::new(0, lease_b.clone())),
    );
    assert!(sim.run_until(30_000, |_| lease_b.borrow().done));
    assert_eq!(
        lease_b.borrow().assigned,
        Some("10.0.2.2".parse().unwrap())
    );
}

#[test]
fn sniffer_sees_only_its_filter() {
    let mut sim = Simulation::new(6);
    let (alice, bob) = wired_pair(&mut sim);

    let log = Rc::new(RefCell::new(Vec::new()));
    sim.host_mut(bob).spawn(
        ProcessMode::Usermode,
        Box::new(Sniffer::new(Some(LayerKind::Icmp), log.clone())),
    );
    let stats = Rc::new(RefCell::new(PingStats::default()));
    sim.host_mut(alice).spawn(
        ProcessMode::Usermode,
        Box::new(Ping::new("10.0.0.2".parse().unwrap(), 2, stats.clone())),
    );
    assert!(sim.run_until(30_000, |_| stats.borrow().done));

    let log = log.borrow();
    // Two requests in and two replies out; the ARP exchange is filtered out.
    assert_eq!(log.len(), 4);
    assert!(log.iter().all(|packet| packet.icmp().is_some()));
}
