//! A DNS server backed by a static name table.

use crate::addresses::IpAddress;
use crate::config;
use crate::packet::{Dns, DnsKind, Layer, Udp};
use crate::process::{
    Process, ProcessCtx, ProcessError, ProcessOutcome, ResumeInput, WaitDescriptor,
};
use crate::sockets::SocketKind;
use rustc_hash::FxHashMap;

pub struct DnsServer {
    records: FxHashMap<String, IpAddress>,
}

impl DnsServer {
    pub fn new(records: impl IntoIterator<Item = (String, IpAddress)>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    fn wait(&self) -> ProcessOutcome {
        ProcessOutcome::Wait(WaitDescriptor::Packet(Box::new(|received| {
            received
                .packet
                .dns()
                .is_some_and(|dns| dns.kind == DnsKind::Query)
        })))
    }
}

impl Process for DnsServer {
    fn name(&self) -> &'static str {
        "dns-server"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match input {
            ResumeInput::Start => {
                let ip = match ctx.host.interfaces.iter().find_map(|interface| interface.ip) {
                    Some(ip) => ip,
                    None => return ProcessOutcome::fail(ProcessError::NoIpAddress),
                };
                let owner = Some((ctx.mode, ctx.self_pid));
                let socket = ctx.host.sockets.get_socket(SocketKind::Datagram, owner);
                if let Err(error) = ctx.host.sockets.bind(socket, ip, config::dns::SERVER_PORT) {
                    return ProcessOutcome::fail(error.into());
                }
                self.wait()
            }
            ResumeInput::Packets(packets) => {
                for received in &packets {
                    let (Some(ip), Some(udp), Some(query)) = (
                        received.packet.ip().copied(),
                        received.packet.udp().copied(),
                        received.packet.dns().cloned(),
                    ) else {
                        continue;
                    };
                    let answer = self.records.get(&query.name).copied();
                    tracing::debug!(name = %query.name, found = answer.is_some(), "dns query");
                    // An unresolved next hop loses the answer; the client
                    // retries the query.
                    let _ = ctx.send_ip(
                        ip.src_ip,
                        vec![
                            Layer::Udp(Udp {
                                src_port: config::dns::SERVER_PORT,
                                dst_port: udp.src_port,
                            }),
                            Layer::Dns(Dns {
                                kind: DnsKind::Answer,
                                name: query.name,
                                answer,
                            }),
                        ],
                    );
                }
                self.wait()
            }
            _ => ProcessOutcome::done(),
        }
    }
}
