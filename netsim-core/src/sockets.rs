//! The per-host socket table.
//!
//! Sockets are plain records keyed by a handle. Stream sockets are fed by
//! the TCP process, datagram sockets by the host's UDP delivery, and raw
//! sockets see every packet that matches their filter. A process owns its
//! sockets: when the process dies, the scheduler closes them.

use crate::addresses::IpAddress;
use crate::packet::{LayerKind, Packet};
use crate::process::{Pid, ProcessMode};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Unbound,
    Bound,
    Listening,
    Connected,
    Closed,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SocketError {
    #[error("port {0} is already bound")]
    PortAlreadyBound(u16),
    #[error("socket is not registered")]
    SocketNotRegistered,
    #[error("socket is not bound")]
    SocketNotBound,
    #[error("socket is closed")]
    SocketIsClosed,
}

/// One received datagram, with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramMessage {
    pub payload: Vec<u8>,
    pub from_ip: IpAddress,
    pub from_port: u16,
}

#[derive(Debug)]
pub struct Socket {
    pub kind: SocketKind,
    pub state: SocketState,
    pub local_ip: Option<IpAddress>,
    pub local_port: Option<u16>,
    pub remote_ip: Option<IpAddress>,
    pub remote_port: Option<u16>,
    pub owner: Option<(ProcessMode, Pid)>,
    /// Inbox for datagram sockets.
    pub datagrams: VecDeque<DatagramMessage>,
    /// Received byte stream for stream sockets.
    pub stream_data: Vec<u8>,
    /// Raw sockets only see packets containing this layer; `None` sees all.
    pub raw_filter: Option<LayerKind>,
    /// Inbox for raw sockets.
    pub raw_packets: VecDeque<Packet>,
}

impl Socket {
    fn new(kind: SocketKind, owner: Option<(ProcessMode, Pid)>) -> Self {
        Self {
            kind,
            state: SocketState::Unbound,
            local_ip: None,
            local_port: None,
            remote_ip: None,
            remote_port: None,
            owner,
            datagrams: VecDeque::new(),
            stream_data: Vec::new(),
            raw_filter: None,
            raw_packets: VecDeque::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SocketTable {
    sockets: FxHashMap<u64, Socket>,
    next_id: u64,
}

impl SocketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_socket(
        &mut self,
        kind: SocketKind,
        owner: Option<(ProcessMode, Pid)>,
    ) -> SocketId {
        self.next_id += 1;
        self.sockets.insert(self.next_id, Socket::new(kind, owner));
        SocketId(self.next_id)
    }

    pub fn socket(&self, id: SocketId) -> Result<&Socket, SocketError> {
        self.sockets.get(&id.0).ok_or(SocketError::SocketNotRegistered)
    }

    pub fn socket_mut(&mut self, id: SocketId) -> Result<&mut Socket, SocketError> {
        self.sockets
            .get_mut(&id.0)
            .ok_or(SocketError::SocketNotRegistered)
    }

    /// Binds a socket to a local port. For stream and datagram sockets, at
    /// most one bound socket per (kind, port) pair may exist.
    pub fn bind(&mut self, id: SocketId, ip: IpAddress, port: u16) -> Result<(), SocketError> {
        let kind = {
            let socket = self.socket(id)?;
            if socket.state == SocketState::Closed {
                return Err(SocketError::SocketIsClosed);
            }
            socket.kind
        };
        if kind != SocketKind::Raw {
            let taken = self.sockets.iter().any(|(&other, socket)| {
                other != id.0
                    && socket.kind == kind
                    && socket.state != SocketState::Closed
                    && socket.local_port == Some(port)
            });
            if taken {
                return Err(SocketError::PortAlreadyBound(port));
            }
        }
        let socket = self.socket_mut(id)?;
        socket.local_ip = Some(ip);
        socket.local_port = Some(port);
        socket.state = SocketState::Bound;
        Ok(())
    }

    pub fn listen(&mut self, id: SocketId) -> Result<(), SocketError> {
        let socket = self.socket_mut(id)?;
        match socket.state {
            SocketState::Bound => {
                socket.state = SocketState::Listening;
                Ok(())
            }
            SocketState::Closed => Err(SocketError::SocketIsClosed),
            _ => Err(SocketError::SocketNotBound),
        }
    }

    pub fn close(&mut self, id: SocketId) -> Result<(), SocketError> {
        self.socket_mut(id)?.state = SocketState::Closed;
        Ok(())
    }

    pub fn remove_socket(&mut self, id: SocketId) -> Result<(), SocketError> {
        self.sockets
            .remove(&id.0)
            .map(|_| ())
            .ok_or(SocketError::SocketNotRegistered)
    }

    /// The datagram socket bound to the given port, if any.
    pub fn bound_datagram(&self, port: u16) -> Option<SocketId> {
        self.sockets
            .iter()
            .find(|(_, socket)| {
                socket.kind == SocketKind::Datagram
                    && socket.state != SocketState::Closed
                    && socket.state != SocketState::Unbound
                    && socket.local_port == Some(port)
            })
            .map(|(&id, _)| SocketId(id))
    }

    /// Whether any stream socket is listening on the port. Unexpected SYNs
    /// to other ports get a RST.
    pub fn stream_port_open(&self, port: u16) -> bool {
        self.sockets.values().any(|socket| {
            socket.kind == SocketKind::Stream
                && matches!(socket.state, SocketState::Listening | SocketState::Connected)
                && socket.local_port == Some(port)
        })
    }

    /// Feeds a packet to every raw socket whose filter matches.
    pub fn tap_raw(&mut self, packet: &Packet) {
        for socket in self.sockets.values_mut() {
            if socket.kind != SocketKind::Raw || socket.state == SocketState::Closed {
                continue;
            }
            let matches = match socket.raw_filter {
                Some(kind) => packet.contains(kind),
                None => true,
            };
            if matches {
                socket.raw_packets.push_back(packet.deep_copy());
            }
        }
    }

    /// Removes every socket owned by the given process. Part of process
    /// teardown.
    pub fn close_owned_by(&mut self, mode: ProcessMode, pid: Pid) {
        self.sockets
            .retain(|_, socket| socket.owner != Some((mode, pid)));
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessMode;

    fn ip() -> IpAddress {
        "1.1.1.1".parse().unwrap()
    }

    #[test]
    fn bind_uniqueness_per_kind() {
        let mut table = SocketTable::new();
        let udp_a = table.get_socket(SocketKind::Datagram, None);
        let udp_b = table.get_socket(SocketKind::Datagram, None);
        let tcp = table.get_socket(SocketKind::Stream, None);

        table.bind(udp_a, ip(), 53).unwrap();
        assert_eq!(
            table.bind(udp_b, ip(), 53),
            Err(SocketError::PortAlreadyBound(53))
        );
        // Different protocol, same port: fine.
        table.bind(tcp, ip(), 53).unwrap();
    }

    #[test]
    fn listen_requires_bind() {
        let mut table = SocketTable::new();
        let tcp = table.get_socket(SocketKind::Stream, None);
        assert_eq!(table.listen(tcp), Err(SocketError::SocketNotBound));
        table.bind(tcp, ip(), 80).unwrap();
        table.listen(tcp).unwrap();
        assert!(table.stream_port_open(80));
        assert!(!table.stream_port_open(81));
    }

    #[test]
    fn teardown_closes_owned_sockets() {
        let mut table = SocketTable::new();
        let owned = table.get_socket(SocketKind::Datagram, Some((ProcessMode::Usermode, 3)));
        let other = table.get_socket(SocketKind::Datagram, Some((ProcessMode::Usermode, 4)));
        table.close_owned_by(ProcessMode::Usermode, 3);
        assert_eq!(
            table.socket(owned).err(),
            Some(SocketError::SocketNotRegistered)
        );
        assert!(table.socket(other).is_ok());
    }

    #[test]
    fn raw_tap_respects_filter() {
        let mut table = SocketTable::new();
        let raw = table.get_socket(SocketKind::Raw, None);
        table.socket_mut(raw).unwrap().raw_filter = Some(LayerKind::Arp);

        let plain = Packet::new([crate::packet::Layer::Raw(vec![1])]);
        table.tap_raw(&plain);
        assert!(table.socket(raw).unwrap().raw_packets.is_empty());
    }
}
