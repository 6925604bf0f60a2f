//! A UDP echo pair, the smallest useful datagram service.

use crate::addresses::IpAddress;
use crate::config;
use crate::packet::{Layer, Udp};
use crate::process::{
    Process, ProcessCtx, ProcessError, ProcessOutcome, ResumeInput, SendOutcome, WaitDescriptor,
};
use crate::sockets::{SocketId, SocketKind};
use std::cell::RefCell;
use std::rc::Rc;

/// Echoes every datagram on the echo port back to its sender. Runs forever.
pub struct EchoServer {
    socket: Option<SocketId>,
}

impl EchoServer {
    pub fn new() -> Self {
        Self { socket: None }
    }

    fn wait_for_datagram(&self, socket: SocketId) -> ProcessOutcome {
        ProcessOutcome::Wait(WaitDescriptor::Condition(Box::new(move |host, _| {
            host.sockets
                .socket(socket)
                .map(|socket| !socket.datagrams.is_empty())
                .unwrap_or(false)
        })))
    }
}

impl Default for EchoServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for EchoServer {
    fn name(&self) -> &'static str {
        "echo-server"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        if let ResumeInput::Start = input {
            let ip = match ctx.host.interfaces.iter().find_map(|interface| interface.ip) {
                Some(ip) => ip,
                None => return ProcessOutcome::fail(ProcessError::NoIpAddress),
            };
            let owner = Some((ctx.mode, ctx.self_pid));
            let socket = ctx.host.sockets.get_socket(SocketKind::Datagram, owner);
            if let Err(error) = ctx.host.sockets.bind(socket, ip, config::echo::SERVER_PORT) {
                return ProcessOutcome::fail(error.into());
            }
            self.socket = Some(socket);
            return self.wait_for_datagram(socket);
        }

        let socket = match self.socket {
            Some(socket) => socket,
            None => return ProcessOutcome::done(),
        };
        let mut queued = Vec::new();
        if let Ok(socket) = ctx.host.sockets.socket_mut(socket) {
            queued.extend(socket.datagrams.drain(..));
        }
        for message in queued {
            // An ARP miss here drops the echo; the client will retry.
            let _ = ctx.send_ip(
                message.from_ip,
                vec![
                    Layer::Udp(Udp {
                        src_port: config::echo::SERVER_PORT,
                        dst_port: message.from_port,
                    }),
                    Layer::Raw(message.payload),
                ],
            );
        }
        self.wait_for_datagram(socket)
    }
}

#[derive(Debug, Default)]
pub struct EchoStatus {
    pub reply: Option<Vec<u8>>,
    pub done: bool,
}

enum ClientState {
    Init,
    AwaitArp,
    AwaitReply,
}

/// Sends one datagram to an echo server and waits for it to come back.
pub struct EchoClient {
    server: IpAddress,
    payload: Vec<u8>,
    tries: u32,
    state: ClientState,
    status: Rc<RefCell<EchoStatus>>,
}

impl EchoClient {
    pub fn new(server: IpAddress, payload: Vec<u8>, status: Rc<RefCell<EchoStatus>>) -> Self {
        Self {
            server,
            payload,
            tries: 0,
            state: ClientState::Init,
            status,
        }
    }

    fn send(&mut self, ctx: &mut ProcessCtx) -> ProcessOutcome {
        if self.tries >= config::dns::MAX_TRIES {
            self.status.borrow_mut().done = true;
            return ProcessOutcome::fail(ProcessError::TimedOut);
        }
        self.tries += 1;
        let layers = vec![
            Layer::Udp(Udp {
                src_port: 40000,
                dst_port: config::echo::SERVER_PORT,
            }),
            Layer::Raw(self.payload.clone()),
        ];
        match ctx.send_ip(self.server, layers) {
            Ok(SendOutcome::ArpStarted(next_hop)) => {
                self.tries -= 1;
                self.state = ClientState::AwaitArp;
                ProcessOutcome::Wait(ctx.wait_for_arp(next_hop))
            }
            Ok(_) => {
                self.state = ClientState::AwaitReply;
                let server = self.server;
                ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
                    Box::new(move |received| {
                        received
                            .packet
                            .udp()
                            .is_some_and(|udp| udp.dst_port == 40000)
                            && received.packet.ip().is_some_and(|ip| ip.src_ip == server)
                    }),
                    ctx.timeout(config::echo::REPLY_TIMEOUT),
                ))
            }
            Err(error) => {
                self.status.borrow_mut().done = true;
                ProcessOutcome::fail(error)
            }
        }
    }
}

impl Process for EchoClient {
    fn name(&self) -> &'static str {
        "echo-client"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match (&self.state, input) {
            (ClientState::Init, ResumeInput::Start) => self.send(ctx),
            (ClientState::AwaitArp, ResumeInput::Ready) => self.send(ctx),
            (ClientState::AwaitReply, ResumeInput::Packets(packets)) => {
                let payload = packets[0].packet.payload().unwrap_or_default().to_vec();
                let mut status = self.status.borrow_mut();
                status.reply = Some(payload);
                status.done = true;
                ProcessOutcome::done()
            }
            (ClientState::AwaitReply, ResumeInput::TimedOut) => self.send(ctx),
            _ => ProcessOutcome::done(),
        }
    }
}
