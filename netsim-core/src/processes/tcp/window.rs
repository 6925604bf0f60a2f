//! Sliding windows for the TCP process.
//!
//! The sender chunks its payload into MSS-sized segments up front and
//! tracks per-segment acknowledgement, including selective acks for
//! segments that arrived ahead of a loss. The receiver reassembles the byte
//! stream, parking out-of-order segments until the gap fills.

use crate::clock::{SimDuration, SimTime};
use crate::config;
use crate::packet::SackBlock;
use std::collections::BTreeMap;
use std::collections::VecDeque;

/// `a < b` in sequence space, tolerant of wraparound.
pub fn seq_lt(a: u32, b: u32) -> bool {
    (b.wrapping_sub(a) as i32) > 0
}

/// `a <= b` in sequence space.
pub fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

#[derive(Debug)]
struct OutSegment {
    seq: u32,
    bytes: Vec<u8>,
    last_sent: Option<SimTime>,
    /// Set once the segment is sent a second time.
    retransmitted: bool,
    /// Selectively acknowledged; kept until the window slides past it.
    sacked: bool,
}

/// A segment the caller should put on the wire now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub seq: u32,
    pub bytes: Vec<u8>,
    pub retransmission: bool,
}

#[derive(Debug)]
pub struct SendingWindow {
    segments: VecDeque<OutSegment>,
    /// Sequence number one past the last payload byte.
    end_seq: u32,
    /// Peer-advertised window, in segments.
    peer_window: usize,
    pub retransmissions: u32,
}

impl SendingWindow {
    /// Chunks the payload starting at `first_seq` (one past the SYN).
    pub fn new(first_seq: u32, payload: &[u8]) -> Self {
        let mut segments = VecDeque::new();
        let mut seq = first_seq;
        for chunk in payload.chunks(config::tcp::MSS) {
            segments.push_back(OutSegment {
                seq,
                bytes: chunk.to_vec(),
                last_sent: None,
                retransmitted: false,
                sacked: false,
            });
            seq = seq.wrapping_add(chunk.len() as u32);
        }
        Self {
            segments,
            end_seq: seq,
            peer_window: config::tcp::MAX_WINDOW_SIZE,
            retransmissions: 0,
        }
    }

    /// Where the FIN goes once everything is acknowledged.
    pub fn end_seq(&self) -> u32 {
        self.end_seq
    }

    pub fn set_peer_window(&mut self, window: u16) {
        if window > 0 {
            self.peer_window = usize::from(window);
        }
    }

    pub fn is_done(&self) -> bool {
        self.segments.is_empty()
    }

    /// Slides past everything cumulatively acknowledged and marks the
    /// selectively acknowledged ranges.
    pub fn handle_ack(&mut self, ack: u32, sacks: &[SackBlock]) {
        while let Some(front) = self.segments.front() {
            let segment_end = front.seq.wrapping_add(front.bytes.len() as u32);
            if seq_le(segment_end, ack) {
                self.segments.pop_front();
            } else {
                break;
            }
        }
        for segment in &mut self.segments {
            let segment_end = segment.seq.wrapping_add(segment.bytes.len() as u32);
            let covered = sacks
                .iter()
                .any(|block| seq_le(block.left, segment.seq) && seq_le(segment_end, block.right));
            if covered {
                segment.sacked = true;
            }
        }
    }

    /// The segments due on the wire: expired retransmissions within the
    /// window, plus at most one never-sent segment. Fresh segments leave one
    /// per pass; only the caller's pacing decides how often a pass happens,
    /// so the window is never flooded onto the wire in a single tick.
    pub fn collect_due(&mut self, now: SimTime, resend_after: SimDuration) -> Vec<Outgoing> {
        let window = self.peer_window.min(config::tcp::MAX_WINDOW_SIZE);
        let mut due = Vec::new();
        for segment in self.segments.iter_mut().take(window) {
            if segment.sacked {
                continue;
            }
            match segment.last_sent {
                // Segments go out in order, so the first unsent one ends
                // the scan.
                None => {
                    segment.last_sent = Some(now);
                    due.push(Outgoing {
                        seq: segment.seq,
                        bytes: segment.bytes.clone(),
                        retransmission: false,
                    });
                    break;
                }
                Some(sent_at) => {
                    if now.duration_since(sent_at) < resend_after {
                        continue;
                    }
                    segment.retransmitted = true;
                    self.retransmissions += 1;
                    segment.last_sent = Some(now);
                    due.push(Outgoing {
                        seq: segment.seq,
                        bytes: segment.bytes.clone(),
                        retransmission: true,
                    });
                }
            }
        }
        due
    }
}

#[derive(Debug)]
pub struct ReceivingWindow {
    /// The next in-order sequence number.
    expected: u32,
    /// Out-of-order segments keyed by sequence number.
    parked: BTreeMap<u32, Vec<u8>>,
    assembled: Vec<u8>,
}

impl ReceivingWindow {
    pub fn new(expected: u32) -> Self {
        Self {
            expected,
            parked: BTreeMap::new(),
            assembled: Vec::new(),
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn assembled(&self) -> &[u8] {
        &self.assembled
    }

    pub fn into_assembled(self) -> Vec<u8> {
        self.assembled
    }

    /// Accepts a data segment. Returns true if the in-order edge moved.
    pub fn receive(&mut self, seq: u32, bytes: &[u8]) -> bool {
        if seq_lt(seq, self.expected) {
            // A duplicate; the ack for it was lost.
            return false;
        }
        if seq != self.expected {
            self.parked.entry(seq).or_insert_with(|| bytes.to_vec());
            return false;
        }
        self.assembled.extend_from_slice(bytes);
        self.expected = self.expected.wrapping_add(bytes.len() as u32);
        while let Some(bytes) = self.parked.remove(&self.expected) {
            self.expected = self.expected.wrapping_add(bytes.len() as u32);
            self.assembled.extend_from_slice(&bytes);
        }
        true
    }

    /// Consumes a ghost sequence number (SYN or FIN) at the in-order edge.
    pub fn consume_ghost(&mut self, seq: u32) -> bool {
        if seq == self.expected {
            self.expected = self.expected.wrapping_add(1);
            true
        } else {
            false
        }
    }

    /// The out-of-order ranges to advertise, adjacent runs merged.
    pub fn sack_blocks(&self) -> Vec<SackBlock> {
        let mut blocks: Vec<SackBlock> = Vec::new();
        for (&seq, bytes) in &self.parked {
            let end = seq.wrapping_add(bytes.len() as u32);
            match blocks.last_mut() {
                Some(last) if last.right == seq => last.right = end,
                _ => blocks.push(SackBlock {
                    left: seq,
                    right: end,
                }),
            }
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSS: usize = config::tcp::MSS;

    #[test]
    fn fresh_segments_leave_one_per_pass() {
        let payload = vec![7u8; MSS * 20];
        let mut window = SendingWindow::new(1, &payload);

        for pass in 0..config::tcp::MAX_WINDOW_SIZE {
            let now = SimTime::from_millis(pass as u64 * 100);
            let due = window.collect_due(now, config::tcp::RESEND_TIME);
            assert_eq!(due.len(), 1, "pass {pass} put more than one new segment out");
            assert_eq!(due[0].seq, 1 + (pass * MSS) as u32);
            assert!(!due[0].retransmission);
        }

        // The window is full now; nothing more until an ack or the timer.
        let now = SimTime::from_millis(config::tcp::MAX_WINDOW_SIZE as u64 * 100);
        assert!(window.collect_due(now, config::tcp::RESEND_TIME).is_empty());
    }

    #[test]
    fn expired_segments_retransmit_together() {
        let payload = vec![7u8; MSS * 4];
        let mut window = SendingWindow::new(1, &payload);
        let mut now = SimTime::ZERO;
        for _ in 0..4 {
            assert_eq!(window.collect_due(now, config::tcp::RESEND_TIME).len(), 1);
            now += config::tcp::SENDING_INTERVAL;
        }
        // Nothing is due again before the retransmission timer runs out.
        assert!(window.collect_due(now, config::tcp::RESEND_TIME).is_empty());

        let later = now + config::tcp::RESEND_TIME;
        let again = window.collect_due(later, config::tcp::RESEND_TIME);
        assert_eq!(again.len(), 4);
        assert!(again.iter().all(|outgoing| outgoing.retransmission));
        assert_eq!(window.retransmissions, 4);
    }

    #[test]
    fn cumulative_ack_slides_the_window() {
        let payload = vec![1u8; MSS * 4];
        let mut window = SendingWindow::new(1, &payload);
        let mut now = SimTime::ZERO;
        for _ in 0..2 {
            window.collect_due(now, config::tcp::RESEND_TIME);
            now += config::tcp::SENDING_INTERVAL;
        }

        window.handle_ack(1 + 2 * MSS as u32, &[]);
        let due = window.collect_due(now, config::tcp::RESEND_TIME);
        // The next unsent segment follows the acked ones.
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].seq, 1 + 2 * MSS as u32);
        assert!(!window.is_done());

        window.handle_ack(1 + 4 * MSS as u32, &[]);
        assert!(window.is_done());
    }

    #[test]
    fn sacked_segments_are_not_retransmitted() {
        let payload = vec![2u8; MSS * 3];
        let mut window = SendingWindow::new(1, &payload);
        let mut now = SimTime::ZERO;
        for _ in 0..3 {
            window.collect_due(now, config::tcp::RESEND_TIME);
            now += config::tcp::SENDING_INTERVAL;
        }

        // The middle and last segments arrived; the first was lost.
        let sack = SackBlock {
            left: 1 + MSS as u32,
            right: 1 + 3 * MSS as u32,
        };
        window.handle_ack(1, &[sack]);

        let later = now + config::tcp::RESEND_TIME;
        let due = window.collect_due(later, config::tcp::RESEND_TIME);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].seq, 1);
        assert!(due[0].retransmission);
    }

    #[test]
    fn receiver_reassembles_out_of_order() {
        let mut window = ReceivingWindow::new(100);
        assert!(!window.receive(100 + MSS as u32, &vec![9u8; MSS]));
        assert_eq!(window.sack_blocks().len(), 1);
        assert_eq!(window.expected(), 100);

        assert!(window.receive(100, &vec![8u8; MSS]));
        assert_eq!(window.expected(), 100 + 2 * MSS as u32);
        assert!(window.sack_blocks().is_empty());
        assert_eq!(window.assembled().len(), 2 * MSS);
        assert_eq!(window.assembled()[0], 8);
        assert_eq!(window.assembled()[MSS], 9);
    }

    #[test]
    fn adjacent_sack_runs_merge() {
        let mut window = ReceivingWindow::new(0);
        window.receive(10, &[1, 2, 3, 4, 5]);
        window.receive(15, &[6, 7, 8]);
        window.receive(30, &[9]);
        let blocks = window.sack_blocks();
        assert_eq!(
            blocks,
            vec![
                SackBlock { left: 10, right: 18 },
                SackBlock { left: 30, right: 31 },
            ]
        );
    }

    #[test]
    fn ghost_bytes_only_consume_at_the_edge() {
        let mut window = ReceivingWindow::new(5);
        assert!(!window.consume_ghost(7));
        assert!(window.consume_ghost(5));
        assert_eq!(window.expected(), 6);
    }

    #[test]
    fn duplicate_data_is_ignored() {
        let mut window = ReceivingWindow::new(0);
        assert!(window.receive(0, &[1, 2, 3]));
        assert!(!window.receive(0, &[1, 2, 3]));
        assert_eq!(window.assembled(), &[1, 2, 3]);
    }
}
