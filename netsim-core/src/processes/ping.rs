//! The ping utility process.

use crate::addresses::IpAddress;
use crate::clock::{SimDuration, SimTime};
use crate::config;
use crate::packet::{Icmp, IcmpKind, Layer};
use crate::process::{
    Process, ProcessCtx, ProcessOutcome, ResumeInput, SendOutcome, WaitDescriptor,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared results handle, readable from outside the simulation while the
/// process runs.
#[derive(Debug, Default)]
pub struct PingStats {
    pub sent: u32,
    pub received: u32,
    pub lost: u32,
    pub rtts: Vec<SimDuration>,
    pub done: bool,
}

enum State {
    Init,
    /// An ARP resolution is running; resend once the cache fills.
    AwaitArp,
    AwaitReply { sent_at: SimTime },
}

pub struct Ping {
    target: IpAddress,
    count: u32,
    sequence: u16,
    state: State,
    stats: Rc<RefCell<PingStats>>,
}

impl Ping {
    pub fn new(target: IpAddress, count: u32, stats: Rc<RefCell<PingStats>>) -> Self {
        Self {
            target,
            count,
            sequence: 0,
            state: State::Init,
            stats,
        }
    }

    /// The plain `ping <target>` form.
    pub fn with_default_count(target: IpAddress, stats: Rc<RefCell<PingStats>>) -> Self {
        Self::new(target, config::ping::DEFAULT_COUNT, stats)
    }

    fn send_request(&mut self, ctx: &mut ProcessCtx) -> ProcessOutcome {
        let request = Layer::Icmp(Icmp {
            kind: IcmpKind::EchoRequest,
            sequence: self.sequence,
        });
        match ctx.send_ip(self.target, vec![request]) {
            Ok(SendOutcome::ArpStarted(next_hop)) => {
                self.state = State::AwaitArp;
                ProcessOutcome::Wait(ctx.wait_for_arp(next_hop))
            }
            Ok(_) => {
                self.stats.borrow_mut().sent += 1;
                self.state = State::AwaitReply { sent_at: ctx.now };
                let target = self.target;
                let sequence = self.sequence;
                ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
                    Box::new(move |received| {
                        let Some(icmp) = received.packet.icmp() else {
                            return false;
                        };
                        icmp.kind == IcmpKind::EchoReply
                            && icmp.sequence == sequence
                            && received
                                .packet
                                .ip()
                                .is_some_and(|ip| ip.src_ip == target || target.is_loopback())
                    }),
                    ctx.timeout(config::ping::REPLY_TIMEOUT),
                ))
            }
            Err(error) => {
                self.stats.borrow_mut().done = true;
                ProcessOutcome::fail(error)
            }
        }
    }

    fn next_or_finish(&mut self, ctx: &mut ProcessCtx) -> ProcessOutcome {
        self.sequence += 1;
        if u32::from(self.sequence) >= self.count {
            self.stats.borrow_mut().done = true;
            return ProcessOutcome::done();
        }
        self.send_request(ctx)
    }
}

impl Process for Ping {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match (&self.state, input) {
            (State::Init, ResumeInput::Start) => self.send_request(ctx),
            (State::AwaitArp, ResumeInput::Ready) => self.send_request(ctx),
            (State::AwaitReply { sent_at }, ResumeInput::Packets(_)) => {
                let rtt = ctx.now.duration_since(*sent_at);
                let mut stats = self.stats.borrow_mut();
                stats.received += 1;
                stats.rtts.push(rtt);
                drop(stats);
                tracing::debug!(target = %self.target, seq = self.sequence, rtt_ms = rtt.as_millis(), "pong");
                self.next_or_finish(ctx)
            }
            (State::AwaitReply { .. }, ResumeInput::TimedOut) => {
                self.stats.borrow_mut().lost += 1;
                tracing::debug!(target = %self.target, seq = self.sequence, "ping timed out");
                self.next_or_finish(ctx)
            }
            _ => ProcessOutcome::done(),
        }
    }
}
