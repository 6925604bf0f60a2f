//! Simulated time.
//!
//! The simulation advances in discrete ticks and is the sole time source for
//! every host and connection. Time is measured in whole milliseconds so that
//! tests are exact; there is no wall-clock anywhere in the engine.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A point in simulated time, in milliseconds since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`. Saturates at zero rather than wrapping,
    /// since the clock never runs backwards.
    pub fn duration_since(self, earlier: SimTime) -> SimDuration {
        SimDuration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<SimDuration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimDuration) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign<SimDuration> for SimTime {
    fn add_assign(&mut self, rhs: SimDuration) {
        self.0 += rhs.0;
    }
}

impl Sub<SimTime> for SimTime {
    type Output = SimDuration;

    fn sub(self, rhs: SimTime) -> SimDuration {
        self.duration_since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A span of simulated time, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimDuration(u64);

impl SimDuration {
    pub const ZERO: SimDuration = SimDuration(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    pub const fn mul(self, factor: u64) -> Self {
        Self(self.0 * factor)
    }
}

impl Add for SimDuration {
    type Output = SimDuration;

    fn add(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0 + rhs.0)
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A cooperative timeout. Captures the simulated time at creation and is done
/// once `length` has elapsed. It never auto-resets; callers that want to wait
/// again create a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    started: SimTime,
    length: SimDuration,
}

impl Timeout {
    pub fn new(now: SimTime, length: SimDuration) -> Self {
        Self {
            started: now,
            length,
        }
    }

    pub fn is_done(&self, now: SimTime) -> bool {
        now.duration_since(self.started) >= self.length
    }

    pub fn started(&self) -> SimTime {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_never_resets() {
        let timeout = Timeout::new(SimTime::from_millis(100), SimDuration::from_millis(50));
        assert!(!timeout.is_done(SimTime::from_millis(149)));
        assert!(timeout.is_done(SimTime::from_millis(150)));
        assert!(timeout.is_done(SimTime::from_millis(10_000)));
    }

    #[test]
    fn duration_since_saturates() {
        let early = SimTime::from_millis(10);
        let late = SimTime::from_millis(30);
        assert_eq!(late.duration_since(early), SimDuration::from_millis(20));
        assert_eq!(early.duration_since(late), SimDuration::ZERO);
    }
}
