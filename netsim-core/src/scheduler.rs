//! The cooperative process scheduler.
//!
//! Each host owns two independent schedulers, one per
//! [`ProcessMode`](crate::process::ProcessMode). Once per host tick a
//! scheduler moves eligible processes to ready and resumes each exactly
//! once. All suspension is cooperative: a process only stops at the wait
//! descriptor it yields.

use crate::clock::SimTime;
use crate::host::HostData;
use crate::links::Links;
use crate::process::{
    signals, NoSuchProcessError, Pid, Process, ProcessCtx, ProcessMode, ProcessOutcome,
    ReceivedPacket, ResumeInput, SignalHandler, SpawnRequest, WaitDescriptor, INIT_PID,
};
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;

struct ProcessEntry {
    pid: Pid,
    name: &'static str,
    process: Box<dyn Process>,
    /// `None` means freshly spawned and never run.
    wait: Option<WaitDescriptor>,
    /// Packets matched while waiting, delivered on the next resumption.
    pending: Vec<ReceivedPacket>,
    /// Torn down before the next tick's intake.
    kill_me: bool,
    signal_handlers: FxHashMap<signals::Signum, SignalHandler>,
}

pub struct Scheduler {
    mode: ProcessMode,
    table: Vec<ProcessEntry>,
    /// The host receive sequence this scheduler has caught up to. Decoupled
    /// from the host's per-tick list, since packets can arrive faster than a
    /// process is resumed.
    last_seen_seq: u64,
}

impl Scheduler {
    pub fn new(mode: ProcessMode) -> Self {
        Self {
            mode,
            table: Vec::new(),
            last_seen_seq: 0,
        }
    }

    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    /// The host receive sequence this scheduler has already consumed.
    pub fn caught_up_to(&self) -> u64 {
        self.last_seen_seq
    }

    /// Registers a process. It enters the waiting set uninitiated and first
    /// runs on the next tick. PIDs grow monotonically: one above the highest
    /// live pid, never below the reserved init pid.
    pub fn start_process(&mut self, process: Box<dyn Process>) -> Pid {
        let pid = self
            .table
            .iter()
            .map(|entry| entry.pid)
            .max()
            .unwrap_or(INIT_PID)
            + 1;
        self.table.push(ProcessEntry {
            pid,
            name: process.name(),
            process,
            wait: None,
            pending: Vec::new(),
            kill_me: false,
            signal_handlers: FxHashMap::default(),
        });
        pid
    }

    pub fn is_running(&self, pid: Pid) -> bool {
        self.table.iter().any(|entry| entry.pid == pid)
    }

    pub fn processes(&self) -> impl Iterator<Item = (Pid, &'static str)> + '_ {
        self.table.iter().map(|entry| (entry.pid, entry.name))
    }

    pub fn register_signal_handler(
        &mut self,
        pid: Pid,
        signum: signals::Signum,
        handler: SignalHandler,
    ) -> Result<(), NoSuchProcessError> {
        let entry = self
            .table
            .iter_mut()
            .find(|entry| entry.pid == pid)
            .ok_or(NoSuchProcessError(pid))?;
        entry.signal_handlers.insert(signum, handler);
        Ok(())
    }

    /// Delivers a signal. SIGKILL and SIGSTOP terminate regardless of any
    /// registered handler; other killing signals respect an Ignore handler.
    /// Anything else is a no-op unless a Terminate handler was registered.
    pub fn send_signal(
        &mut self,
        pid: Pid,
        signum: signals::Signum,
    ) -> Result<(), NoSuchProcessError> {
        let entry = self
            .table
            .iter_mut()
            .find(|entry| entry.pid == pid)
            .ok_or(NoSuchProcessError(pid))?;

        let default = if signals::KILLING_SIGNALS.contains(&signum) {
            SignalHandler::Terminate
        } else {
            SignalHandler::Ignore
        };
        let handler = if signals::UNIGNORABLE.contains(&signum) {
            SignalHandler::Terminate
        } else {
            *entry.signal_handlers.get(&signum).unwrap_or(&default)
        };

        if handler == SignalHandler::Terminate {
            entry.kill_me = true;
        }
        Ok(())
    }

    /// Flags a process for teardown before the next intake.
    pub fn mark_kill(&mut self, pid: Pid) {
        if let Some(entry) = self.table.iter_mut().find(|entry| entry.pid == pid) {
            entry.kill_me = true;
        }
    }

    /// Tears down every process immediately (power-off).
    pub fn terminate_all(
        &mut self,
        host: &mut HostData,
        links: &mut Links,
        now: SimTime,
        rng: &mut SmallRng,
        spawns: &mut Vec<SpawnRequest>,
        kills: &mut Vec<(ProcessMode, Pid)>,
    ) {
        for entry in &mut self.table {
            entry.kill_me = true;
        }
        self.teardown_killed(host, links, now, rng, spawns, kills);
    }

    fn teardown_killed(
        &mut self,
        host: &mut HostData,
        links: &mut Links,
        now: SimTime,
        rng: &mut SmallRng,
        spawns: &mut Vec<SpawnRequest>,
        kills: &mut Vec<(ProcessMode, Pid)>,
    ) {
        let mut index = 0;
        while index < self.table.len() {
            if !self.table[index].kill_me {
                index += 1;
                continue;
            }
            let mut entry = self.table.remove(index);
            let mut ctx = ProcessCtx {
                host,
                links,
                now,
                rng,
                self_pid: entry.pid,
                mode: self.mode,
                spawns,
                kills,
            };
            entry.process.on_kill(&mut ctx);
            host.sockets.close_owned_by(self.mode, entry.pid);
            tracing::debug!(pid = entry.pid, name = entry.name, "process killed");
        }
    }

    /// The per-tick scheduling pass.
    ///
    /// 1. Tear down processes flagged for killing since the last pass.
    /// 2. Collect packets received since this scheduler's own last check.
    /// 3. Move eligible waiters to ready: fresh spawns, satisfied
    ///    conditions, elapsed sleeps, matched packets (a matcher may accept
    ///    several packets in one tick), and expired packet timeouts (which
    ///    deliver an empty result).
    /// 4. Resume every ready process exactly once and capture its new wait
    ///    descriptor, removing it from the table if it terminated.
    pub fn handle_processes(
        &mut self,
        host: &mut HostData,
        links: &mut Links,
        now: SimTime,
        rng: &mut SmallRng,
        spawns: &mut Vec<SpawnRequest>,
        kills: &mut Vec<(ProcessMode, Pid)>,
    ) {
        self.teardown_killed(host, links, now, rng, spawns, kills);

        let new_packets = host.received_since(self.last_seen_seq);
        self.last_seen_seq = host.receive_seq();

        let mut ready: Vec<Pid> = Vec::new();
        for entry in &mut self.table {
            let eligible = match &entry.wait {
                None => true,
                Some(WaitDescriptor::Condition(predicate)) => predicate(host, now),
                Some(WaitDescriptor::Sleep(timeout)) => timeout.is_done(now),
                Some(WaitDescriptor::Packet(matcher)) => {
                    for packet in &new_packets {
                        if matcher(packet) {
                            entry.pending.push(packet.clone());
                        }
                    }
                    !entry.pending.is_empty()
                }
                Some(WaitDescriptor::PacketTimeout(matcher, timeout)) => {
                    for packet in &new_packets {
                        if matcher(packet) {
                            entry.pending.push(packet.clone());
                        }
                    }
                    !entry.pending.is_empty() || timeout.is_done(now)
                }
            };
            if eligible {
                ready.push(entry.pid);
            }
        }

        for pid in ready {
            let Some(index) = self.table.iter().position(|entry| entry.pid == pid) else {
                continue;
            };
            let entry = &mut self.table[index];
            let input = match entry.wait.take() {
                None => ResumeInput::Start,
                Some(WaitDescriptor::Condition(_)) | Some(WaitDescriptor::Sleep(_)) => {
                    ResumeInput::Ready
                }
                Some(WaitDescriptor::Packet(_)) | Some(WaitDescriptor::PacketTimeout(..)) => {
                    if entry.pending.is_empty() {
                        ResumeInput::TimedOut
                    } else {
                        ResumeInput::Packets(std::mem::take(&mut entry.pending))
                    }
                }
            };

            let mut ctx = ProcessCtx {
                host,
                links,
                now,
                rng,
                self_pid: entry.pid,
                mode: self.mode,
                spawns,
                kills,
            };
            match entry.process.resume(&mut ctx, input) {
                ProcessOutcome::Wait(wait) => {
                    entry.wait = Some(wait);
                }
                ProcessOutcome::Terminated(result) => {
                    if let Err(error) = &result {
                        tracing::info!(
                            pid = entry.pid,
                            name = entry.name,
                            %error,
                            "process terminated"
                        );
                    }
                    let entry = self.table.remove(index);
                    host.sockets.close_owned_by(self.mode, entry.pid);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SimDuration, Timeout};
    use crate::host::HostData;
    use rand::SeedableRng;

    /// Counts its own resumptions, optionally yielding between them.
    struct Counter {
        runs: std::rc::Rc<std::cell::Cell<u32>>,
        remaining: u32,
        yields: bool,
    }

    impl Process for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn resume(&mut self, ctx: &mut ProcessCtx, _input: ResumeInput) -> ProcessOutcome {
            self.runs.set(self.runs.get() + 1);
            self.remaining -= 1;
            if self.remaining == 0 {
                ProcessOutcome::done()
            } else if self.yields {
                ProcessOutcome::Wait(WaitDescriptor::Sleep(Timeout::new(
                    ctx.now,
                    SimDuration::ZERO,
                )))
            } else {
                // Waits on an always-true predicate: runs once per tick.
                ProcessOutcome::Wait(WaitDescriptor::Condition(Box::new(|_, _| true)))
            }
        }
    }

    fn fixture() -> (HostData, Links, SmallRng) {
        (
            HostData::new("test", crate::host::HostKind::Computer),
            Links::new(),
            SmallRng::seed_from_u64(0),
        )
    }

    fn run_tick(sched: &mut Scheduler, host: &mut HostData, links: &mut Links, rng: &mut SmallRng, now: SimTime) {
        let mut spawns = Vec::new();
        let mut kills = Vec::new();
        sched.handle_processes(host, links, now, rng, &mut spawns, &mut kills);
    }

    #[test]
    fn runs_exactly_once_per_tick_until_completion() {
        let (mut host, mut links, mut rng) = fixture();
        let mut sched = Scheduler::new(ProcessMode::Usermode);
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        sched.start_process(Box::new(Counter {
            runs: runs.clone(),
            remaining: 3,
            yields: false,
        }));

        for tick in 0..5 {
            run_tick(
                &mut sched,
                &mut host,
                &mut links,
                &mut rng,
                SimTime::from_millis(tick),
            );
        }
        // Three resumptions then natural completion, no more.
        assert_eq!(runs.get(), 3);
        assert_eq!(sched.processes().count(), 0);
    }

    #[test]
    fn pids_are_monotonic_above_init() {
        let mut sched = Scheduler::new(ProcessMode::Usermode);
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let first = sched.start_process(Box::new(Counter {
            runs: runs.clone(),
            remaining: 1,
            yields: false,
        }));
        let second = sched.start_process(Box::new(Counter {
            runs,
            remaining: 1,
            yields: false,
        }));
        assert!(first > INIT_PID);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn condition_wait_resumes_on_first_true_observation() {
        struct WaitsForArp {
            resumed_ready: std::rc::Rc<std::cell::Cell<bool>>,
        }

        impl Process for WaitsForArp {
            fn name(&self) -> &'static str {
                "waits"
            }

            fn resume(&mut self, _ctx: &mut ProcessCtx, input: ResumeInput) -> ProcessOutcome {
                match input {
                    ResumeInput::Start => ProcessOutcome::Wait(WaitDescriptor::Condition(
                        Box::new(|host, _| !host.arp_cache.is_empty()),
                    )),
                    _ => {
                        self.resumed_ready.set(true);
                        ProcessOutcome::done()
                    }
                }
            }
        }

        let (mut host, mut links, mut rng) = fixture();
        let mut sched = Scheduler::new(ProcessMode::Usermode);
        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        sched.start_process(Box::new(WaitsForArp {
            resumed_ready: flag.clone(),
        }));

        run_tick(&mut sched, &mut host, &mut links, &mut rng, SimTime::ZERO);
        run_tick(&mut sched, &mut host, &mut links, &mut rng, SimTime::from_millis(1));
        assert!(!flag.get());

        host.arp_cache.add_dynamic(
            "1.1.1.1".parse().unwrap(),
            crate::addresses::MacAddress::new([1; 6]),
            SimTime::ZERO,
        );
        run_tick(&mut sched, &mut host, &mut links, &mut rng, SimTime::from_millis(2));
        assert!(flag.get());
    }

    #[test]
    fn sigkill_is_unignorable() {
        let (mut host, mut links, mut rng) = fixture();
        let mut sched = Scheduler::new(ProcessMode::Usermode);
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let pid = sched.start_process(Box::new(Counter {
            runs: runs.clone(),
            remaining: 100,
            yields: false,
        }));
        sched
            .register_signal_handler(pid, signals::SIGKILL, SignalHandler::Ignore)
            .unwrap();
        sched.send_signal(pid, signals::SIGKILL).unwrap();
        run_tick(&mut sched, &mut host, &mut links, &mut rng, SimTime::ZERO);
        assert_eq!(runs.get(), 0);
        assert!(!sched.is_running(pid));
    }

    #[test]
    fn sigterm_respects_ignore_handler() {
        let (mut host, mut links, mut rng) = fixture();
        let mut sched = Scheduler::new(ProcessMode::Usermode);
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let pid = sched.start_process(Box::new(Counter {
            runs,
            remaining: 100,
            yields: false,
        }));
        sched
            .register_signal_handler(pid, signals::SIGTERM, SignalHandler::Ignore)
            .unwrap();
        sched.send_signal(pid, signals::SIGTERM).unwrap();
        run_tick(&mut sched, &mut host, &mut links, &mut rng, SimTime::ZERO);
        assert!(sched.is_running(pid));
    }

    #[test]
    fn signalling_a_missing_pid_fails() {
        let mut sched = Scheduler::new(ProcessMode::Usermode);
        assert_eq!(
            sched.send_signal(42, signals::SIGTERM),
            Err(NoSuchProcessError(42))
        );
    }
}
