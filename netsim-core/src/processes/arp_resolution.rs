//! Kernelmode ARP resolution.
//!
//! Spawned on a cache miss during an IP send. Broadcasts requests until the
//! built-in ARP responder of some host answers (the reply lands in the cache
//! before this process is resumed) or until the retry budget runs out, in
//! which case the process that wanted the address is killed.

use crate::addresses::IpAddress;
use crate::config;
use crate::host::arp_request_frame;
use crate::process::{
    Pid, Process, ProcessCtx, ProcessError, ProcessMode, ProcessOutcome, ResumeInput,
    WaitDescriptor,
};

pub struct ArpResolution {
    target: IpAddress,
    interface: usize,
    /// The process waiting on this resolution, killed if it fails.
    requester: Option<(ProcessMode, Pid)>,
    tries: u32,
}

impl ArpResolution {
    pub fn new(target: IpAddress, interface: usize, requester: Option<(ProcessMode, Pid)>) -> Self {
        Self {
            target,
            interface,
            requester,
            tries: 0,
        }
    }

    fn request(&mut self, ctx: &mut ProcessCtx) -> ProcessOutcome {
        if self.tries >= config::arp::RESEND_COUNT {
            tracing::debug!(target = %self.target, "arp resolution gave up");
            if let Some((mode, pid)) = self.requester {
                ctx.kill(mode, pid);
            }
            return ProcessOutcome::fail(ProcessError::ArpUnanswered(self.target));
        }
        self.tries += 1;

        let interface = &ctx.host.interfaces[self.interface];
        let src_ip = interface.ip.unwrap_or(IpAddress::NO_ADDRESS);
        let frame = arp_request_frame(interface.mac, src_ip, self.target);
        let index = self.interface;
        ctx.send_frame(index, frame);

        let target = self.target;
        ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
            Box::new(move |received| {
                received
                    .packet
                    .arp()
                    .is_some_and(|arp| arp.src_ip == target)
            }),
            ctx.timeout(config::arp::RESEND_TIME),
        ))
    }
}

impl Process for ArpResolution {
    fn name(&self) -> &'static str {
        "arp-resolution"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match input {
            ResumeInput::Start | ResumeInput::TimedOut => {
                if ctx.host.arp_cache.get(self.target).is_some() {
                    return ProcessOutcome::done();
                }
                self.request(ctx)
            }
            // Any frame from the target also fed the cache via the built-in
            // learner before we ran.
            ResumeInput::Packets(_) | ResumeInput::Ready => ProcessOutcome::done(),
        }
    }
}
