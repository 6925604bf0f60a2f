//! Packet capture over a raw socket.

use crate::packet::{LayerKind, Packet};
use crate::process::{Process, ProcessCtx, ProcessOutcome, ResumeInput, WaitDescriptor};
use crate::sockets::{SocketId, SocketKind};
use std::cell::RefCell;
use std::rc::Rc;

/// Copies every packet the host sends or receives into a shared log,
/// optionally restricted to packets carrying one layer kind. Runs until
/// killed.
pub struct Sniffer {
    filter: Option<LayerKind>,
    socket: Option<SocketId>,
    log: Rc<RefCell<Vec<Packet>>>,
}

impl Sniffer {
    pub fn new(filter: Option<LayerKind>, log: Rc<RefCell<Vec<Packet>>>) -> Self {
        Self {
            filter,
            socket: None,
            log,
        }
    }

    fn wait(socket: SocketId) -> ProcessOutcome {
        ProcessOutcome::Wait(WaitDescriptor::Condition(Box::new(move |host, _| {
            host.sockets
                .socket(socket)
                .map(|socket| !socket.raw_packets.is_empty())
                .unwrap_or(false)
        })))
    }
}

impl Process for Sniffer {
    fn name(&self) -> &'static str {
        "sniffer"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        if let ResumeInput::Start = input {
            let owner = Some((ctx.mode, ctx.self_pid));
            let socket = ctx.host.sockets.get_socket(SocketKind::Raw, owner);
            match ctx.host.sockets.socket_mut(socket) {
                Ok(raw) => raw.raw_filter = self.filter,
                Err(error) => return ProcessOutcome::fail(error.into()),
            }
            self.socket = Some(socket);
            return Self::wait(socket);
        }
        let Some(socket) = self.socket else {
            return ProcessOutcome::done();
        };
        let captured: Vec<Packet> = match ctx.host.sockets.socket_mut(socket) {
            Ok(raw) => raw.raw_packets.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        let mut log = self.log.borrow_mut();
        for packet in captured {
            tracing::trace!(host = %ctx.host.name, layers = packet.layers().len(), "captured");
            log.push(packet);
        }
        drop(log);
        Self::wait(socket)
    }
}
