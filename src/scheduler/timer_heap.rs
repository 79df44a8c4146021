//! Stable-ordered min-heap of pending timers.
//!
//! Grounded in the teacher's `simulation/schedule.rs::Schedule`, which
//! wraps a `BinaryHeap<Event>` ordered by `Reverse<Time>` via
//! `derivative::Derivative`. This version adds the insertion-sequence
//! tie-break §4.1/§5 require for timers sharing the same `at`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use delegate::delegate;
use derivative::Derivative;

use crate::units::Clock;

use super::TimerPayload;

#[derive(Debug, Derivative)]
#[derivative(PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    key: Reverse<(Clock, u64)>,
    #[derivative(PartialEq = "ignore", PartialOrd = "ignore", Ord = "ignore")]
    stage: usize,
    #[derivative(PartialEq = "ignore", PartialOrd = "ignore", Ord = "ignore")]
    data: TimerPayload,
}

/// A popped timer: the instant it fires, the stage that armed it, and its
/// payload.
#[derive(Debug)]
pub(crate) struct Fired {
    pub(crate) at: Clock,
    pub(crate) stage: usize,
    pub(crate) data: TimerPayload,
}

/// The scheduler's pending-timer priority queue.
#[derive(Debug, Default)]
pub(crate) struct TimerHeap {
    inner: BinaryHeap<HeapEntry>,
    next_seq: u64,
}

impl TimerHeap {
    /// Arm a timer for `at`, addressed to `stage`, carrying `data`. Ties at
    /// the same `at` break in the order timers were armed.
    pub(crate) fn push(&mut self, at: Clock, stage: usize, data: TimerPayload) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.inner.push(HeapEntry {
            key: Reverse((at, seq)),
            stage,
            data,
        });
    }

    /// Pop the earliest-armed, earliest-fired timer.
    pub(crate) fn pop_min(&mut self) -> Option<Fired> {
        self.inner.pop().map(|entry| Fired {
            at: (entry.key.0).0,
            stage: entry.stage,
            data: entry.data,
        })
    }

    delegate! {
        to self.inner {
            pub(crate) fn is_empty(&self) -> bool;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_earliest_time_first() {
        let mut h = TimerHeap::default();
        h.push(Clock::new(30), 0, TimerPayload::None);
        h.push(Clock::new(10), 1, TimerPayload::None);
        h.push(Clock::new(20), 2, TimerPayload::None);
        assert_eq!(h.pop_min().unwrap().at, Clock::new(10));
        assert_eq!(h.pop_min().unwrap().at, Clock::new(20));
        assert_eq!(h.pop_min().unwrap().at, Clock::new(30));
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut h = TimerHeap::default();
        h.push(Clock::new(10), 5, TimerPayload::None);
        h.push(Clock::new(10), 1, TimerPayload::None);
        h.push(Clock::new(10), 9, TimerPayload::None);
        assert_eq!(h.pop_min().unwrap().stage, 5);
        assert_eq!(h.pop_min().unwrap().stage, 1);
        assert_eq!(h.pop_min().unwrap().stage, 9);
    }
}
