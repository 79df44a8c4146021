//! The deterministic, round-robin discrete-event scheduler.
//!
//! Grounded in the teacher's `simulation.rs` (a central loop applying
//! commands and collecting an `EventList` of follow-on commands per step)
//! generalized to the spec's ring-with-backpressure model: each stage is
//! `Running` or `Waiting`, and a `Packet` emission the ring can't yet
//! deliver is held in a `pending` slot rather than immediately applied, so
//! that two runs of the same configuration produce the identical ordered
//! sequence of `(stage, now, payload)` triples.

mod timer_heap;

use std::collections::VecDeque;

use smallvec::SmallVec;
use tracing::trace;

use crate::error::Error;
use crate::packet::{FlowId, Packet};
use crate::units::{Bitrate, Clock};

use timer_heap::TimerHeap;

/// Payload carried by a timer from the stage that armed it back to that
/// stage's `ding` handler.
#[derive(Debug)]
pub enum TimerPayload {
    /// No data; the timer's existence is the signal (e.g. a pacing wait).
    None,
    /// A packet the stage needs back (e.g. a delayed-ACK candidate).
    Packet(Packet),
    /// A scheduled bottleneck rate change.
    Rate(Bitrate),
    /// Which flow a pacing timer belongs to.
    Flow(FlowId),
}

/// One message a stage can emit in response to being driven.
#[derive(Debug)]
pub enum Emission {
    /// Send `Packet` to the next stage in the ring.
    Packet(Packet),
    /// Arm a timer for `after` from now, to be delivered back to the stage
    /// that armed it.
    Timer { after: Clock, data: TimerPayload },
    /// The stage has no more work for this instant.
    Wait,
    /// The stage has exited; `Some(err)` if it exited abnormally.
    Done(Option<Error>),
    /// End the run immediately.
    Shutdown,
}

/// The list of emissions produced by one call into a [`Stage`].
pub type StageOut = SmallVec<[Emission; 2]>;

/// A single stage in the ring.
///
/// `start`/`stop` lifecycle hooks are a separate, default-provided
/// capability (via [`StageLifecycle`]) so stages that need no setup pay no
/// cost, per the design notes on independently probed plug-in capabilities.
pub trait Stage: std::fmt::Debug {
    /// A short name used in diagnostics and error messages.
    fn name(&self) -> &'static str;

    /// Called once at `Clock::ZERO` before the main loop begins.
    fn start(&mut self, now: Clock) -> StageOut;

    /// Handle an incoming packet from the previous stage in the ring.
    fn handle(&mut self, now: Clock, pkt: Packet) -> StageOut;

    /// Handle a timer this stage previously armed.
    fn ding(&mut self, now: Clock, data: TimerPayload) -> StageOut;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Waiting,
}

/// The deterministic ring scheduler.
#[derive(Debug)]
pub struct Scheduler {
    stages: Vec<Box<dyn Stage>>,
    state: Vec<RunState>,
    outbox: Vec<VecDeque<Emission>>,
    pending: Vec<Option<Packet>>,
    timers: TimerHeap,
    now: Clock,
}

impl Scheduler {
    /// Construct a scheduler over an ordered ring of stages. Index `i`'s
    /// `Packet` emissions are delivered to index `(i + 1) % N`.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        let n = stages.len();
        assert!(n > 0, "scheduler requires at least one stage");
        Self {
            state: vec![RunState::Waiting; n],
            outbox: (0..n).map(|_| VecDeque::new()).collect(),
            pending: vec![None; n],
            timers: TimerHeap::default(),
            now: Clock::ZERO,
            stages,
        }
    }

    fn extend_outbox(&mut self, idx: usize, out: StageOut) {
        self.state[idx] = RunState::Running;
        self.outbox[idx].extend(out);
    }

    /// Run the ring to completion: until a stage emits `Shutdown`, or a
    /// deadlock (every stage `Waiting`, no pending timers) is detected.
    pub fn run(&mut self) -> Result<(), Error> {
        let n = self.stages.len();

        // Initial activation: every stage gets a chance to emit its
        // opening moves at time zero.
        for idx in 0..n {
            let now = self.now;
            let out = self.stages[idx].start(now);
            self.extend_outbox(idx, out);
        }

        let mut cursor = 0usize;
        loop {
            let mut done: Option<Result<(), Error>> = None;
            if self.state[cursor] == RunState::Running {
                let msg = match self.pending[cursor].take() {
                    Some(pkt) => Some(Emission::Packet(pkt)),
                    None => self.outbox[cursor].pop_front(),
                };
                match msg {
                    Some(Emission::Packet(pkt)) => {
                        let dest = (cursor + 1) % n;
                        if self.state[dest] == RunState::Running {
                            // Destination still busy this instant; hold the
                            // packet and retry on our next visit.
                            self.pending[cursor] = Some(pkt);
                        } else {
                            let now = self.now;
                            let out = self.stages[dest].handle(now, pkt);
                            self.extend_outbox(dest, out);
                        }
                    }
                    Some(Emission::Timer { after, data }) => {
                        let at = self.now.checked_add(after)?;
                        trace!(stage = self.stages[cursor].name(), ?at, "arming timer");
                        self.timers.push(at, cursor, data);
                    }
                    Some(Emission::Wait) => {
                        self.state[cursor] = RunState::Waiting;
                    }
                    Some(Emission::Done(err)) => {
                        done = Some(match err {
                            Some(e) => Err(e),
                            None => Ok(()),
                        });
                    }
                    Some(Emission::Shutdown) => {
                        done = Some(Ok(()));
                    }
                    None => {
                        // A stage must emit exactly one `Wait` per handled
                        // input; an empty outbox while still `Running`
                        // means a stage implementation violated its
                        // contract.
                        unreachable!(
                            "stage `{}` left Running with no pending emission",
                            self.stages[cursor].name()
                        );
                    }
                }
            }

            if let Some(result) = done {
                return result;
            }

            if self.state.iter().all(|s| *s == RunState::Waiting) {
                let fired = self.timers.pop_min().ok_or(Error::Deadlock)?;
                if fired.stage >= n {
                    return Err(Error::TimerHeapUnderflow);
                }
                self.now = fired.at;
                trace!(stage = self.stages[fired.stage].name(), now = ?self.now, "timer fired");
                let out = self.stages[fired.stage].ding(self.now, fired.data);
                self.extend_outbox(fired.stage, out);
                cursor = fired.stage;
            } else {
                cursor = (cursor + 1) % n;
            }
        }
    }

    /// The scheduler's current virtual time.
    pub fn now(&self) -> Clock {
        self.now
    }
}
