use itertools::Itertools;
use netsim_core::connection::ConnectionParams;
use netsim_core::process::ProcessMode;
use netsim_core::processes::dhcp_client::{DhcpClient, DhcpStatus};
use netsim_core::processes::dhcp_server::DhcpServer;
use netsim_core::Simulation;
use std::cell::RefCell;
use std::rc::Rc;

/// A DHCP server leases addresses to three fresh clients on one subnet.
///
/// Every client comes up with no address at all and ends holding a distinct
/// lease plus the advertised default gateway.
pub fn dhcp_subnet(seed: u64) {
    let mut sim = Simulation::new(seed);
    let switch = sim.add_switch("switch", 4, None);
    let server = sim.add_computer("dhcp-server");
    sim.connect((server, 0), (switch, 0), ConnectionParams::default())
        .unwrap();
    sim.host_mut(server)
        .data
        .set_interface_ip(0, Some("10.0.0.1/24".parse().unwrap()));
    sim.host_mut(server).spawn(ProcessMode::Kernelmode, Box::new(DhcpServer::new()));

    let mut leases = Vec::new();
    for index in 0..3 {
        let client = sim.add_computer(format!("client-{index}"));
        sim.connect((client, 0), (switch, index + 1), ConnectionParams::default())
            .unwrap();
        let status = Rc::new(RefCell::new(DhcpStatus::default()));
        sim.host_mut(client).spawn(
            ProcessMode::Kernelmode,
            Box::new(DhcpClient::new(0, status.clone())),
        );
        leases.push(status);
    }

    let finished = sim.run_until(60_000, |_| {
        leases.iter().all(|status| status.borrow().done)
    });
    assert!(finished);
    let assigned: Vec<_> = leases
        .iter()
        .map(|status| status.borrow().assigned.unwrap())
        .collect();
    assert_eq!(assigned.iter().unique().count(), assigned.len());
    for address in &assigned {
        println!("dhcp: leased {address}");
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn dhcp_subnet() {
        super::dhcp_subnet(1);
    }
}
