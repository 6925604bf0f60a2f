use netsim_core::clock::SimTime;
use netsim_core::connection::ConnectionParams;
use netsim_core::process::ProcessMode;
use netsim_core::processes::ftp::{FtpClient, FtpServer, FtpTransfer};
use netsim_core::Simulation;
use std::cell::RefCell;
use std::rc::Rc;

/// One computer fetches a file from another over FTP and saves it locally.
pub fn ftp_fetch(seed: u64) {
    let mut sim = Simulation::new(seed);
    let server = sim.add_computer("server");
    let client = sim.add_computer("client");
    sim.connect((server, 0), (client, 0), ConnectionParams::default())
        .unwrap();
    sim.host_mut(server)
        .data
        .set_interface_ip(0, Some("10.0.0.1/24".parse().unwrap()));
    sim.host_mut(client)
        .data
        .set_interface_ip(0, Some("10.0.0.2/24".parse().unwrap()));

    let motd = "Welcome to the simulated internet.\n";
    {
        let fs = &mut sim.host_mut(server).data.filesystem;
        fs.mkdir("/srv").unwrap();
        fs.create_file("/srv/motd", motd, SimTime::ZERO).unwrap();
    }
    sim.host_mut(server)
        .spawn(ProcessMode::Usermode, Box::new(FtpServer::new()));

    let transfer = Rc::new(RefCell::new(FtpTransfer::default()));
    sim.host_mut(client).spawn(
        ProcessMode::Usermode,
        Box::new(FtpClient::new(
            "10.0.0.1".parse().unwrap(),
            "/srv/motd",
            Some("/motd".to_string()),
            transfer.clone(),
        )),
    );

    let finished = sim.run_until(60_000, |_| transfer.borrow().done);
    assert!(finished);
    let transfer = transfer.borrow();
    assert_eq!(transfer.error, None);
    assert_eq!(transfer.content.as_deref(), Some(motd.as_bytes()));
    assert_eq!(
        sim.host(client).data.filesystem.read_file("/motd").unwrap(),
        motd
    );
    println!("ftp: fetched {} bytes", motd.len());
}

#[cfg(test)]
mod tests {
    #[test]
    fn ftp_fetch() {
        super::ftp_fetch(1);
    }
}
