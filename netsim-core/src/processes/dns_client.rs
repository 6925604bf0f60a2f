//! One-shot DNS resolution.

use crate::addresses::IpAddress;
use crate::config;
use crate::packet::{Dns, DnsKind, Layer, Udp};
use crate::process::{
    Process, ProcessCtx, ProcessError, ProcessOutcome, ResumeInput, SendOutcome, WaitDescriptor,
};
use std::cell::RefCell;
use std::rc::Rc;

/// The resolution result. `Some(None)` means the server answered that the
/// name does not exist.
#[derive(Debug, Default)]
pub struct DnsLookup {
    pub result: Option<Option<IpAddress>>,
    pub done: bool,
}

fn valid_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !name.starts_with('.')
}

enum State {
    Init,
    AwaitArp,
    AwaitAnswer,
}

pub struct DnsClient {
    server: IpAddress,
    name: String,
    tries: u32,
    state: State,
    lookup: Rc<RefCell<DnsLookup>>,
}

impl DnsClient {
    pub fn new(server: IpAddress, name: impl Into<String>, lookup: Rc<RefCell<DnsLookup>>) -> Self {
        Self {
            server,
            name: name.into(),
            tries: 0,
            state: State::Init,
            lookup,
        }
    }

    fn query(&mut self, ctx: &mut ProcessCtx) -> ProcessOutcome {
        if self.tries >= config::dns::MAX_TRIES {
            self.lookup.borrow_mut().done = true;
            return ProcessOutcome::fail(ProcessError::TimedOut);
        }
        self.tries += 1;
        let layers = vec![
            Layer::Udp(Udp {
                src_port: 40053,
                dst_port: config::dns::SERVER_PORT,
            }),
            Layer::Dns(Dns {
                kind: DnsKind::Query,
                name: self.name.clone(),
                answer: None,
            }),
        ];
        match ctx.send_ip(self.server, layers) {
            Ok(SendOutcome::ArpStarted(next_hop)) => {
                self.tries -= 1;
                self.state = State::AwaitArp;
                ProcessOutcome::Wait(ctx.wait_for_arp(next_hop))
            }
            Ok(_) => {
                self.state = State::AwaitAnswer;
                let name = self.name.clone();
                ProcessOutcome::Wait(WaitDescriptor::PacketTimeout(
                    Box::new(move |received| {
                        received
                            .packet
                            .dns()
                            .is_some_and(|dns| dns.kind == DnsKind::Answer && dns.name == name)
                    }),
                    ctx.timeout(config::dns::QUERY_TIMEOUT),
                ))
            }
            Err(error) => {
                self.lookup.borrow_mut().done = true;
                ProcessOutcome::fail(error)
            }
        }
    }
}

impl Process for DnsClient {
    fn name(&self) -> &'static str {
        "dns-client"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
        match (&self.state, input) {
            (State::Init, ResumeInput::Start) => {
                if !valid_hostname(&self.name) {
                    self.lookup.borrow_mut().done = true;
                    return ProcessOutcome::fail(ProcessError::InvalidHostname(self.name.clone()));
                }
                self.query(ctx)
            }
            (State::AwaitArp, ResumeInput::Ready) => self.query(ctx),
            (State::AwaitAnswer, ResumeInput::Packets(packets)) => {
                let answer = packets
                    .iter()
                    .find_map(|received| received.packet.dns())
                    .and_then(|dns| dns.answer);
                let mut lookup = self.lookup.borrow_mut();
                lookup.result = Some(answer);
                lookup.done = true;
                ProcessOutcome::done()
            }
            (State::AwaitAnswer, ResumeInput::TimedOut) => self.query(ctx),
            _ => ProcessOutcome::done(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::valid_hostname;

    #[test]
    fn hostname_validation() {
        assert!(valid_hostname("example.com"));
        assert!(valid_hostname("a-b.c-d.net"));
        assert!(!valid_hostname(""));
        assert!(!valid_hostname(".com"));
        assert!(!valid_hostname("bad host"));
        assert!(!valid_hostname("under_score.org"));
    }
}
