//! TCP over the simulated network.
//!
//! The exchange model is request/response: a client connects, streams its
//! request through the sliding window, half-closes with FIN, and the server
//! answers with a response stream and its own FIN. Both directions get
//! selective acknowledgement, pacing, and timer-driven retransmission. SYN
//! and FIN each consume one sequence number.

pub mod window;

use crate::addresses::IpAddress;
use crate::clock::SimTime;
use crate::config;
use crate::packet::{Layer, Tcp, TcpFlags};
use crate::process::{
    Process, ProcessCtx, ProcessError, ProcessOutcome, ReceivedPacket, ResumeInput, WaitDescriptor,
};
use crate::sockets::{SocketId, SocketKind, SocketState};
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;
use window::{seq_le, ReceivingWindow, SendingWindow};

/// Client-side observability handle.
#[derive(Debug, Default)]
pub struct TcpStatus {
    pub response: Option<Vec<u8>>,
    pub done: bool,
    pub reset: bool,
    pub retransmissions: u32,
}

fn segment(src_port: u16, dst_port: u16, seq: u32, flags: TcpFlags) -> Tcp {
    let mut tcp = Tcp::new(src_port, dst_port, seq, flags);
    tcp.window_size = config::tcp::MAX_WINDOW_SIZE as u16;
    tcp
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    SynSent,
    Established,
    /// FIN sent, not yet acknowledged.
    FinWait1,
    /// Our side closed; draining the response.
    FinWait2,
}

pub struct TcpClient {
    remote: IpAddress,
    remote_port: u16,
    local_port: u16,
    request: Vec<u8>,
    isn: u32,
    state: ClientState,
    syn_tries: u32,
    syn_last_sent: SimTime,
    sending: SendingWindow,
    receiving: Option<ReceivingWindow>,
    peer_fin: Option<u32>,
    peer_fin_consumed: bool,
    fin_sent: bool,
    fin_acked: bool,
    fin_last_sent: SimTime,
    next_batch: SimTime,
    last_heard: SimTime,
    socket: Option<SocketId>,
    status: Rc<RefCell<TcpStatus>>,
}

impl TcpClient {
    pub fn new(
        remote: IpAddress,
        remote_port: u16,
        request: Vec<u8>,
        status: Rc<RefCell<TcpStatus>>,
    ) -> Self {
        Self {
            remote,
            remote_port,
            local_port: 0,
            sending: SendingWindow::new(0, &[]),
            request,
            isn: 0,
            state: ClientState::SynSent,
            syn_tries: 0,
            syn_last_sent: SimTime::ZERO,
            receiving: None,
            peer_fin: None,
            peer_fin_consumed: false,
            fin_sent: false,
            fin_acked: false,
            fin_last_sent: SimTime::ZERO,
            next_batch: SimTime::ZERO,
            last_heard: SimTime::ZERO,
            socket: None,
            status,
        }
    }

    fn fin_seq(&self) -> u32 {
        self.sending.end_seq()
    }

    fn transmit(
        &self,
        ctx: &mut ProcessCtx,
        tcp: Tcp,
        payload: Option<Vec<u8>>,
    ) -> Result<(), ProcessError> {
        let mut layers = vec![Layer::Tcp(tcp)];
        if let Some(bytes) = payload {
            layers.push(Layer::Raw(bytes));
        }
        // An unresolved next hop leaves the segment to its retransmission
        // timer.
        ctx.send_ip(self.remote, layers).map(|_| ())
    }

    fn matches(&self) -> impl Fn(&ReceivedPacket) -> bool {
        let remote = self.remote;
        let (local_port, remote_port) = (self.local_port, self.remote_port);
        move |received: &ReceivedPacket| {
            received
                .packet
                .tcp()
                .map(|tcp| tcp.dst_port == local_port && tcp.src_port == remote_port)
                .unwrap_or(false)
                && received
                    .packet
                    .ip()
                    .map(|ip| ip.src_ip == remote)
                    .unwrap_or(false)
        }
    }

    fn wait(&self, ctx: &ProcessCtx, length: crate::clock::SimDuration) -> ProcessOutcome {
        ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
            Box::new(self.matches()),
            ctx.timeout(length),
        ))
    }

    fn send_syn(&mut self, ctx: &mut ProcessCtx) -> Result<(), ProcessError> {
        self.syn_tries += 1;
        self.syn_last_sent = ctx.now;
        let mut syn = segment(self.local_port, self.remote_port, self.isn, TcpFlags::SYN);
        syn.retransmitted = self.syn_tries > 1;
        self.transmit(ctx, syn, None)
    }

    fn fail(&mut self, error: ProcessError) -> ProcessOutcome {
        let mut status = self.status.borrow_mut();
        status.reset = matches!(error, ProcessError::ConnectionReset);
        status.retransmissions = self.sending.retransmissions;
        status.done = true;
        drop(status);
        ProcessOutcome::fail(error)
    }

    fn send_ack(&mut self, ctx: &mut ProcessCtx) -> Result<(), ProcessError> {
        let Some(receiving) = &self.receiving else {
            return Ok(());
        };
        let mut ack = segment(
            self.local_port,
            self.remote_port,
            self.fin_seq(),
            TcpFlags {
                ack: true,
                ..Default::default()
            },
        );
        ack.ack_number = receiving.expected();
        ack.sack_blocks = receiving.sack_blocks();
        self.transmit(ctx, ack, None)
    }

    /// The established-connection engine: absorb segments, acknowledge,
    /// (re)send the window, progress the close handshake.
    fn pump(&mut self, ctx: &mut ProcessCtx, packets: &[ReceivedPacket]) -> ProcessOutcome {
        let mut need_ack = false;
        for received in packets {
            let Some(tcp) = received.packet.tcp().cloned() else {
                continue;
            };
            self.last_heard = received.time;
            if tcp.flags.rst {
                return self.fail(ProcessError::ConnectionReset);
            }
            if tcp.flags.ack {
                self.sending.handle_ack(tcp.ack_number, &tcp.sack_blocks);
                self.sending.set_peer_window(tcp.window_size);
                if self.fin_sent && seq_le(self.fin_seq().wrapping_add(1), tcp.ack_number) {
                    self.fin_acked = true;
                }
            }
            if let (Some(receiving), Some(payload)) =
                (self.receiving.as_mut(), received.packet.payload())
            {
                receiving.receive(tcp.sequence, payload);
                need_ack = true;
            }
            if tcp.flags.fin {
                self.peer_fin = Some(tcp.sequence);
                need_ack = true;
            }
        }

        if let (Some(fin_seq), Some(receiving)) = (self.peer_fin, self.receiving.as_mut()) {
            if !self.peer_fin_consumed && receiving.consume_ghost(fin_seq) {
                self.peer_fin_consumed = true;
                need_ack = true;
            }
        }

        if self.state == ClientState::Established {
            if ctx.now >= self.next_batch {
                let due = self
                    .sending
                    .collect_due(ctx.now, config::tcp::RESEND_TIME);
                if !due.is_empty() {
                    self.next_batch = ctx.now + config::tcp::SENDING_INTERVAL;
                }
                for outgoing in due {
                    let mut tcp = segment(
                        self.local_port,
                        self.remote_port,
                        outgoing.seq,
                        TcpFlags {
                            ack: true,
                            psh: true,
                            ..Default::default()
                        },
                    );
                    tcp.ack_number = self
                        .receiving
                        .as_ref()
                        .map(|receiving| receiving.expected())
                        .unwrap_or(0);
                    tcp.retransmitted = outgoing.retransmission;
                    if let Err(error) = self.transmit(ctx, tcp, Some(outgoing.bytes)) {
                        return self.fail(error);
                    }
                }
            }
            if self.sending.is_done() && !self.fin_sent {
                self.fin_sent = true;
                self.state = ClientState::FinWait1;
            }
        }

        if self.fin_sent && !self.fin_acked {
            let due = self.fin_last_sent == SimTime::ZERO
                || ctx.now.duration_since(self.fin_last_sent) >= config::tcp::RESEND_TIME;
            if due {
                let mut fin = segment(
                    self.local_port,
                    self.remote_port,
                    self.fin_seq(),
                    TcpFlags {
                        fin: true,
                        ack: true,
                        ..Default::default()
                    },
                );
                fin.ack_number = self
                    .receiving
                    .as_ref()
                    .map(|receiving| receiving.expected())
                    .unwrap_or(0);
                fin.retransmitted = self.fin_last_sent != SimTime::ZERO;
                self.fin_last_sent = ctx.now;
                if let Err(error) = self.transmit(ctx, fin, None) {
                    return self.fail(error);
                }
            }
        }
        if self.state == ClientState::FinWait1 && self.fin_acked {
            self.state = ClientState::FinWait2;
        }

        if need_ack {
            if let Err(error) = self.send_ack(ctx) {
                return self.fail(error);
            }
        }

        if self.fin_acked && self.peer_fin_consumed {
            let response = self
                .receiving
                .take()
                .map(ReceivingWindow::into_assembled)
                .unwrap_or_default();
            tracing::debug!(
                remote = %self.remote,
                bytes = response.len(),
                retransmissions = self.sending.retransmissions,
                "connection closed"
            );
            let mut status = self.status.borrow_mut();
            status.response = Some(response);
            status.retransmissions = self.sending.retransmissions;
            status.done = true;
            return ProcessOutcome::done();
        }

        if ctx.now.duration_since(self.last_heard) >= config::tcp::MAX_UNUSED_TIME {
            return self.fail(ProcessError::TimedOut);
        }
        self.wait(ctx, config::tcp::SENDING_INTERVAL)
    }
}

impl Process for TcpClient {
    fn name(&self) -> &'static str {
        "tcp-client"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match input {
            ResumeInput::Start => {
                self.local_port = 49152 + ctx.rng.gen::<u16>() % 16000;
                self.isn = ctx.rng.gen::<u32>() & 0x3fff_ffff;
                self.sending = SendingWindow::new(self.isn.wrapping_add(1), &self.request);

                let owner = Some((ctx.mode, ctx.self_pid));
                let socket = ctx.host.sockets.get_socket(SocketKind::Stream, owner);
                if let Err(error) =
                    ctx.host
                        .sockets
                        .bind(socket, IpAddress::NO_ADDRESS, self.local_port)
                {
                    return self.fail(error.into());
                }
                self.socket = Some(socket);

                if let Err(error) = self.send_syn(ctx) {
                    return self.fail(error);
                }
                self.wait(ctx, config::tcp::HANDSHAKE_TIMEOUT)
            }
            ResumeInput::Packets(packets) if self.state == ClientState::SynSent => {
                for received in &packets {
                    let Some(tcp) = received.packet.tcp().cloned() else {
                        continue;
                    };
                    if tcp.flags.rst {
                        return self.fail(ProcessError::ConnectionReset);
                    }
                    if tcp.flags.syn
                        && tcp.flags.ack
                        && tcp.ack_number == self.isn.wrapping_add(1)
                    {
                        let mut receiving = ReceivingWindow::new(tcp.sequence);
                        receiving.consume_ghost(tcp.sequence);
                        self.receiving = Some(receiving);
                        self.sending.set_peer_window(tcp.window_size);
                        self.state = ClientState::Established;
                        self.last_heard = ctx.now;
                        if let Some(id) = self.socket {
                            if let Ok(socket) = ctx.host.sockets.socket_mut(id) {
                                socket.state = SocketState::Connected;
                                socket.remote_ip = Some(self.remote);
                                socket.remote_port = Some(self.remote_port);
                            }
                        }
                        if let Err(error) = self.send_ack(ctx) {
                            return self.fail(error);
                        }
                        return self.pump(ctx, &[]);
                    }
                }
                self.wait(ctx, config::tcp::HANDSHAKE_TIMEOUT)
            }
            ResumeInput::TimedOut if self.state == ClientState::SynSent => {
                if self.syn_tries >= config::tcp::MAX_HANDSHAKE_RETRIES {
                    return self.fail(ProcessError::TimedOut);
                }
                if let Err(error) = self.send_syn(ctx) {
                    return self.fail(error);
                }
                self.wait(ctx, config::tcp::HANDSHAKE_TIMEOUT)
            }
            ResumeInput::Packets(packets) => self.pump(ctx, &packets),
            ResumeInput::TimedOut => self.pump(ctx, &[]),
            ResumeInput::Ready => self.pump(ctx, &[]),
        }
    }

    fn on_kill(&mut self, ctx: &mut ProcessCtx) {
        // Best effort: tell the peer the conversation is over.
        if self.state != ClientState::SynSent {
            let rst = segment(
                self.local_port,
                self.remote_port,
                self.fin_seq(),
                TcpFlags {
                    rst: true,
                    ..Default::default()
                },
            );
            let _ = self.transmit(ctx, rst, None);
        }
        self.status.borrow_mut().done = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    SynReceived,
    Established,
    /// Request complete; streaming the response.
    Closing,
}

struct ServerConn {
    peer_ip: IpAddress,
    peer_port: u16,
    isn: u32,
    state: ServerState,
    synack_last_sent: SimTime,
    receiving: ReceivingWindow,
    sending: Option<SendingWindow>,
    peer_fin: Option<u32>,
    peer_fin_consumed: bool,
    fin_sent: bool,
    fin_acked: bool,
    fin_last_sent: SimTime,
    next_batch: SimTime,
    last_heard: SimTime,
}

impl ServerConn {
    fn fin_seq(&self) -> u32 {
        self.sending
            .as_ref()
            .map(SendingWindow::end_seq)
            .unwrap_or_else(|| self.isn.wrapping_add(1))
    }
}

/// Turns a fully received request into the response stream.
pub type RequestHandler = Box<dyn FnMut(&[u8], &mut ProcessCtx) -> Vec<u8>>;

/// A sequential TCP server: accepts one connection at a time on its port,
/// feeds the complete request to its handler, streams the response back,
/// and returns to listening. Runs until killed.
pub struct TcpServer {
    port: u16,
    handler: RequestHandler,
    conn: Option<ServerConn>,
}

impl TcpServer {
    pub fn new(port: u16, handler: RequestHandler) -> Self {
        Self {
            port,
            handler,
            conn: None,
        }
    }

    fn wait(&self, ctx: &ProcessCtx) -> ProcessOutcome {
        let port = self.port;
        let matcher = Box::new(move |received: &ReceivedPacket| {
            received
                .packet
                .tcp()
                .map(|tcp| tcp.dst_port == port)
                .unwrap_or(false)
        });
        if self.conn.is_some() {
            ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
                matcher,
                ctx.timeout(config::tcp::SENDING_INTERVAL),
            ))
        } else {
            ProcessOutcome::Wait(WaitDescriptor::Packet(matcher))
        }
    }

    fn transmit(
        &self,
        ctx: &mut ProcessCtx,
        peer_ip: IpAddress,
        tcp: Tcp,
        payload: Option<Vec<u8>>,
    ) {
        let mut layers = vec![Layer::Tcp(tcp)];
        if let Some(bytes) = payload {
            layers.push(Layer::Raw(bytes));
        }
        // Losing a reply here is recovered by the peer's timers.
        let _ = ctx.send_ip(peer_ip, layers);
    }

    fn send_syn_ack(&mut self, ctx: &mut ProcessCtx) {
        let Some(conn) = &mut self.conn else {
            return;
        };
        let retransmitted = conn.synack_last_sent != SimTime::ZERO;
        conn.synack_last_sent = ctx.now;
        let mut syn_ack = segment(self.port, conn.peer_port, conn.isn, TcpFlags::syn_ack());
        syn_ack.ack_number = conn.receiving.expected();
        syn_ack.retransmitted = retransmitted;
        let peer_ip = conn.peer_ip;
        self.transmit(ctx, peer_ip, syn_ack, None);
    }

    fn accept(&mut self, ctx: &mut ProcessCtx, received: &ReceivedPacket) {
        let (Some(ip), Some(tcp)) = (received.packet.ip().copied(), received.packet.tcp().cloned())
        else {
            return;
        };
        if !tcp.flags.syn || tcp.flags.ack {
            return;
        }
        let mut receiving = ReceivingWindow::new(tcp.sequence);
        receiving.consume_ghost(tcp.sequence);
        self.conn = Some(ServerConn {
            peer_ip: ip.src_ip,
            peer_port: tcp.src_port,
            isn: ctx.rng.gen::<u32>() & 0x3fff_ffff,
            state: ServerState::SynReceived,
            synack_last_sent: SimTime::ZERO,
            receiving,
            sending: None,
            peer_fin: None,
            peer_fin_consumed: false,
            fin_sent: false,
            fin_acked: false,
            fin_last_sent: SimTime::ZERO,
            next_batch: SimTime::ZERO,
            last_heard: ctx.now,
        });
        tracing::debug!(peer = %ip.src_ip, port = self.port, "connection accepted");
        self.send_syn_ack(ctx);
    }

    fn pump(&mut self, ctx: &mut ProcessCtx, packets: &[ReceivedPacket]) {
        let mut need_ack = false;
        let mut resend_syn_ack = false;
        let mut finished = false;
        let mut response_due = false;
        let mut reset = false;

        {
            let Some(conn) = &mut self.conn else {
                return;
            };
            for received in packets {
                let (Some(ip), Some(tcp)) =
                    (received.packet.ip().copied(), received.packet.tcp().cloned())
                else {
                    continue;
                };
                if ip.src_ip != conn.peer_ip || tcp.src_port != conn.peer_port {
                    continue;
                }
                conn.last_heard = received.time;
                if tcp.flags.rst {
                    tracing::debug!(peer = %conn.peer_ip, "connection reset by peer");
                    reset = true;
                    break;
                }
                if tcp.flags.syn && conn.state == ServerState::SynReceived {
                    // The SYN-ACK was lost.
                    resend_syn_ack = true;
                    continue;
                }
                if tcp.flags.ack {
                    if conn.state == ServerState::SynReceived
                        && tcp.ack_number == conn.isn.wrapping_add(1)
                    {
                        conn.state = ServerState::Established;
                    }
                    if let Some(sending) = conn.sending.as_mut() {
                        sending.handle_ack(tcp.ack_number, &tcp.sack_blocks);
                        sending.set_peer_window(tcp.window_size);
                    }
                    if conn.fin_sent && seq_le(conn.fin_seq().wrapping_add(1), tcp.ack_number) {
                        conn.fin_acked = true;
                    }
                }
                if let Some(payload) = received.packet.payload() {
                    conn.receiving.receive(tcp.sequence, payload);
                    need_ack = true;
                }
                if tcp.flags.fin {
                    conn.peer_fin = Some(tcp.sequence);
                    need_ack = true;
                }
            }

            if let Some(fin_seq) = conn.peer_fin {
                if !conn.peer_fin_consumed && conn.receiving.consume_ghost(fin_seq) {
                    conn.peer_fin_consumed = true;
                    need_ack = true;
                    response_due = conn.sending.is_none();
                }
            }
        }

        if reset {
            self.conn = None;
            return;
        }
        if resend_syn_ack {
            self.send_syn_ack(ctx);
        }

        // The request is complete once the peer's FIN fell into place.
        if response_due {
            let (request, first_seq) = match &self.conn {
                Some(conn) => (
                    conn.receiving.assembled().to_vec(),
                    conn.isn.wrapping_add(1),
                ),
                None => return,
            };
            let response = (self.handler)(&request, ctx);
            tracing::debug!(
                request_bytes = request.len(),
                response_bytes = response.len(),
                "request handled"
            );
            if let Some(conn) = &mut self.conn {
                conn.sending = Some(SendingWindow::new(first_seq, &response));
                conn.state = ServerState::Closing;
            }
        }

        let mut outgoing = Vec::new();
        {
            let Some(conn) = &mut self.conn else {
                return;
            };
            if conn.state == ServerState::Closing {
                if let Some(sending) = conn.sending.as_mut() {
                    if ctx.now >= conn.next_batch {
                        let due = sending.collect_due(ctx.now, config::tcp::RESEND_TIME);
                        if !due.is_empty() {
                            conn.next_batch = ctx.now + config::tcp::SENDING_INTERVAL;
                        }
                        for out in due {
                            let mut tcp = segment(
                                self.port,
                                conn.peer_port,
                                out.seq,
                                TcpFlags {
                                    ack: true,
                                    psh: true,
                                    ..Default::default()
                                },
                            );
                            tcp.ack_number = conn.receiving.expected();
                            tcp.retransmitted = out.retransmission;
                            outgoing.push((conn.peer_ip, tcp, Some(out.bytes)));
                        }
                    }
                    if sending.is_done() && !conn.fin_sent {
                        conn.fin_sent = true;
                    }
                }
            }

            if conn.fin_sent && !conn.fin_acked {
                let due = conn.fin_last_sent == SimTime::ZERO
                    || ctx.now.duration_since(conn.fin_last_sent) >= config::tcp::RESEND_TIME;
                if due {
                    let mut fin = segment(
                        self.port,
                        conn.peer_port,
                        conn.fin_seq(),
                        TcpFlags {
                            fin: true,
                            ack: true,
                            ..Default::default()
                        },
                    );
                    fin.ack_number = conn.receiving.expected();
                    fin.retransmitted = conn.fin_last_sent != SimTime::ZERO;
                    conn.fin_last_sent = ctx.now;
                    outgoing.push((conn.peer_ip, fin, None));
                }
            }

            if need_ack {
                let mut ack = segment(
                    self.port,
                    conn.peer_port,
                    conn.fin_seq(),
                    TcpFlags {
                        ack: true,
                        ..Default::default()
                    },
                );
                ack.ack_number = conn.receiving.expected();
                ack.sack_blocks = conn.receiving.sack_blocks();
                outgoing.push((conn.peer_ip, ack, None));
            }

            if conn.fin_acked && conn.peer_fin_consumed {
                tracing::debug!(peer = %conn.peer_ip, "connection finished");
                finished = true;
            }
        }

        for (peer_ip, tcp, payload) in outgoing {
            self.transmit(ctx, peer_ip, tcp, payload);
        }
        if finished {
            self.conn = None;
        }
    }
}

impl Process for TcpServer {
    fn name(&self) -> &'static str {
        "tcp-server"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match input {
            ResumeInput::Start => {
                let owner = Some((ctx.mode, ctx.self_pid));
                let socket = ctx.host.sockets.get_socket(SocketKind::Stream, owner);
                let ready = ctx
                    .host
                    .sockets
                    .bind(socket, IpAddress::NO_ADDRESS, self.port)
                    .and_then(|_| ctx.host.sockets.listen(socket));
                if let Err(error) = ready {
                    return ProcessOutcome::fail(error.into());
                }
                self.wait(ctx)
            }
            ResumeInput::Packets(packets) => {
                if self.conn.is_none() {
                    if let Some(syn) = packets.iter().find(|received| {
                        received
                            .packet
                            .tcp()
                            .map(|tcp| tcp.flags.syn && !tcp.flags.ack)
                            .unwrap_or(false)
                    }) {
                        self.accept(ctx, syn);
                    }
                }
                self.pump(ctx, &packets);
                self.wait(ctx)
            }
            ResumeInput::TimedOut => {
                if let Some(conn) = &self.conn {
                    if ctx.now.duration_since(conn.last_heard) >= config::tcp::MAX_UNUSED_TIME {
                        tracing::debug!(peer = %conn.peer_ip, "connection abandoned by peer");
                        self.conn = None;
                        return self.wait(ctx);
                    }
                }
                // Drive retransmissions; also resend a lost SYN-ACK.
                if let Some(conn) = &self.conn {
                    if conn.state == ServerState::SynReceived
                        && ctx.now.duration_since(conn.synack_last_sent)
                            >= config::tcp::HANDSHAKE_TIMEOUT
                    {
                        self.send_syn_ack(ctx);
                    }
                }
                self.pump(ctx, &[]);
                self.wait(ctx)
            }
            ResumeInput::Ready => self.wait(ctx),
        }
    }

    fn on_kill(&mut self, ctx: &mut ProcessCtx) {
        if let Some(conn) = &self.conn {
            let rst = segment(
                self.port,
                conn.peer_port,
                conn.fin_seq(),
                TcpFlags {
                    rst: true,
                    ..Default::default()
                },
            );
            let peer_ip = conn.peer_ip;
            self.transmit(ctx, peer_ip, rst, None);
        }
    }
}
