//! The AQM family: DelTiC and its delta-sigma derivatives, plus two static
//! reference AQMs.
//!
//! Grounded in the teacher's `queue.rs::QDisc` trait (`enqueue`, `dequeue`,
//! `is_empty`) and `FifoQ`'s `delegate!`-to-`VecDeque` body; every AQM here
//! wraps the same FIFO storage and differs only in what it computes on
//! dequeue.

mod brickwall;
mod deltasigma;
mod deltic;
mod deltic_mds;
mod deltim;
mod fifo;
mod monotonic_min;
mod ramp;

pub use brickwall::Brickwall;
pub use deltic::DelTiC;
pub use deltic_mds::DelTiCMds;
pub use deltim::DelTiM;
pub use ramp::Ramp;

use crate::packet::Packet;
use crate::units::{Bytes, Clock};

/// The outcome of dequeuing a packet through an AQM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mark {
    /// No congestion signal.
    None,
    /// Some Congestion Experienced.
    Sce,
    /// Congestion Experienced.
    Ce,
    /// The AQM decided to drop. The interface (§7) converts this into a
    /// forced CE since loss recovery is out of scope.
    Drop,
}

/// The operations every AQM variant supports.
pub trait Aqm: std::fmt::Debug {
    /// Enqueue `pkt`, stamping its `enqueue` time. Returns the queue's
    /// length in bytes after the enqueue, for the `qsize`-based trace
    /// series; the interface's hard-limit check uses [`Aqm::len`] instead.
    fn enqueue(&mut self, pkt: Packet, now: Clock) -> Bytes;

    /// Dequeue the next packet (FIFO order) and the mark decision for it,
    /// or `None` if the queue is empty.
    fn dequeue(&mut self, now: Clock) -> Option<(Packet, Mark)>;

    /// Inspect the head-of-line packet without removing it.
    fn peek(&self) -> Option<&Packet>;

    /// Number of packets currently queued.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes currently queued.
    fn qsize(&self) -> Bytes;

    /// A representative oscillator value for the `deltaSigma` trace series
    /// (§6). Static AQMs (Brickwall, Ramp) have no such signal and keep the
    /// default.
    fn signal(&self) -> f64 {
        0.0
    }
}
