//! Crate-wide error type.
//!
//! Per the error-handling design, only fatal simulator-invariant violations
//! and trace-sink I/O failures are represented here. Congestion signals,
//! rate underflow, and duplicate ACKs are normal control flow and never
//! surface as an [`Error`].

use thiserror::Error;

/// Errors that can terminate a simulation run.
#[derive(Debug, Error)]
pub enum Error {
    /// All stages reported `Wait` and the timer heap held no pending
    /// events: the scheduler cannot make progress.
    #[error("deadlock: all stages waiting with no pending timers")]
    Deadlock,

    /// An interface's AQM reached its configured hard queue length. This is
    /// a misconfiguration or a simulator bug, not a drop policy.
    #[error("hard queue limit exceeded at stage `{stage}`")]
    QueueHardLimitExceeded {
        /// Name of the stage whose AQM overflowed.
        stage: &'static str,
    },

    /// The scheduler popped a timer addressed to a stage index that is no
    /// longer part of the ring.
    #[error("timer heap underflow: no stage for scheduled timer")]
    TimerHeapUnderflow,

    /// A `Clock` arithmetic operation overflowed `i64`.
    #[error("clock arithmetic overflow")]
    ClockOverflow,

    /// A trace sink failed to write a row.
    #[error("trace sink I/O error: {0}")]
    TraceIo(#[from] std::io::Error),
}
