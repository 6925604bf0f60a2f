use netsim_core::connection::ConnectionParams;
use netsim_core::process::ProcessMode;
use netsim_core::processes::tcp::{TcpClient, TcpServer, TcpStatus};
use netsim_core::Simulation;
use std::cell::RefCell;
use std::rc::Rc;

const PORT: u16 = 8080;

/// A request/response exchange over a wire that drops one packet in twenty.
///
/// The server upper-cases whatever it is sent. Retransmission makes the
/// response come out intact anyway.
pub fn tcp_transfer(seed: u64) {
    let mut sim = Simulation::new(seed);
    let client = sim.add_computer("client");
    let server = sim.add_computer("server");
    sim.connect(
        (client, 0),
        (server, 0),
        ConnectionParams {
            packet_loss: 0.05,
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
            PORT,
            Box::new(|request, _ctx| request.to_ascii_uppercase()),
        )),
    );

    let request = b"the quick brown fox jumps over the lazy dog".repeat(100);
    let status = Rc::new(RefCell::new(TcpStatus::default()));
    sim.host_mut(client).spawn(
        ProcessMode::Usermode,
        Box::new(TcpClient::new(
            "10.0.0.2".parse().unwrap(),
            PORT,
            request.clone(),
            status.clone(),
        )),
    );

    let started = sim.time();
    let finished = sim.run_until(120_000, |_| status.borrow().done);
    assert!(finished);
    let status = status.borrow();
    assert!(!status.reset);
    assert_eq!(
        status.response.as_deref(),
        Some(request.to_ascii_uppercase().as_slice())
    );
    println!(
        "tcp: {} bytes transferred in {:?}, {} retransmissions",
        request.len(),
        sim.time_since(started),
        status.retransmissions
    );
}

#[cfg(test)]
mod tests {
    #[test]
    fn tcp_transfer() {
        super::tcp_transfer(7);
    }
}
