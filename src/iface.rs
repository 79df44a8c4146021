//! The Iface stage: rate-limited drain of a pluggable AQM, plus a scheduled
//! bottleneck rate-change list (§4.2).
//!
//! Grounded in the teacher's `entities/bottleneck.rs::Bottleneck`: the same
//! `Running`/`Blocked` status machine (there named for DCTCP's flat
//! threshold, here driving any [`Aqm`]), generalized from a single fixed
//! `bandwidth` to a `(at, Bitrate)` rate-change schedule.

use std::cell::RefCell;
use std::rc::Rc;

use crate::aqm::{Aqm, Mark};
use crate::error::Error;
use crate::packet::Packet;
use crate::scheduler::{Emission, Stage, StageOut, TimerPayload};
use crate::trace::{Series, Tracer};
use crate::units::{Bitrate, Bytes, Clock};

type SharedTracer<'a> = Rc<RefCell<Tracer<'a>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derivative::Derivative)]
#[derivative(Default)]
enum Status {
    Running,
    #[derivative(Default)]
    Blocked,
}

/// Convert an AQM's mark decision into the wire bits a packet actually
/// carries. A `Drop` becomes a forced CE (§7): the sender has no loss
/// recovery path, so the interface never actually discards a packet.
fn apply_mark(mut pkt: Packet, mark: Mark) -> Packet {
    match mark {
        Mark::None => {}
        Mark::Sce => pkt.sce = true,
        Mark::Ce | Mark::Drop => pkt.ce = true,
    }
    pkt
}

/// The bottleneck interface: one AQM instance, a current link rate, and a
/// schedule of future rate changes.
pub(crate) struct Iface<'a> {
    aqm: Box<dyn Aqm>,
    rate: Bitrate,
    hard_limit: usize,
    status: Status,
    rate_schedule: Vec<(Clock, Bitrate)>,
    tracer: Option<SharedTracer<'a>>,
}

impl std::fmt::Debug for Iface<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iface")
            .field("rate", &self.rate)
            .field("hard_limit", &self.hard_limit)
            .field("status", &self.status)
            .finish()
    }
}

impl<'a> Iface<'a> {
    pub(crate) fn new(
        aqm: Box<dyn Aqm>,
        initial_rate: Bitrate,
        hard_limit: usize,
        rate_schedule: Vec<(Clock, Bitrate)>,
    ) -> Self {
        Self {
            aqm,
            rate: initial_rate,
            hard_limit,
            status: Status::Blocked,
            rate_schedule,
            tracer: None,
        }
    }

    pub(crate) fn with_tracer(
        aqm: Box<dyn Aqm>,
        initial_rate: Bitrate,
        hard_limit: usize,
        rate_schedule: Vec<(Clock, Bitrate)>,
        tracer: SharedTracer<'a>,
    ) -> Self {
        Self {
            tracer: Some(tracer),
            ..Self::new(aqm, initial_rate, hard_limit, rate_schedule)
        }
    }

    /// Emit the queue-level series a trace sink is configured for (§6):
    /// queue occupancy, the delta-sigma oscillator, and per-dequeue sojourn.
    fn record_trace(&self, now: Clock, sojourn: Clock, marked: bool) -> Result<(), Error> {
        let Some(tracer) = &self.tracer else {
            return Ok(());
        };
        let mut t = tracer.borrow_mut();
        t.maybe_record(Series::Qlen, None, now, self.aqm.len() as f64)?;
        t.maybe_record(Series::DeltaSigma, None, now, self.aqm.signal())?;
        t.maybe_record(Series::Sojourn, None, now, sojourn.as_secs_f64())?;
        if marked {
            t.maybe_record(Series::Marks, None, now, 1.0)?;
        }
        Ok(())
    }

    fn drain_one(&mut self, now: Clock, out: &mut StageOut) -> Result<(), Error> {
        match self.aqm.dequeue(now) {
            Some((pkt, mark)) => {
                let sojourn = now.saturating_sub(pkt.enqueue);
                let marked = mark != Mark::None;
                if marked {
                    tracing::debug!(flow = ?pkt.flow, ?mark, ?sojourn, "aqm mark");
                }
                out.push(Emission::Packet(apply_mark(pkt, mark)));
                match self.aqm.peek() {
                    Some(next) => {
                        let delay = self.rate.transfer_time(next.len);
                        out.push(Emission::Timer {
                            after: delay,
                            data: TimerPayload::None,
                        });
                    }
                    None => self.status = Status::Blocked,
                }
                self.record_trace(now, sojourn, marked)
            }
            None => {
                self.status = Status::Blocked;
                Ok(())
            }
        }
    }
}

impl Stage for Iface<'_> {
    fn name(&self) -> &'static str {
        "iface"
    }

    fn start(&mut self, now: Clock) -> StageOut {
        let mut out = StageOut::new();
        for &(at, rate) in &self.rate_schedule {
            out.push(Emission::Timer {
                after: at.saturating_sub(now),
                data: TimerPayload::Rate(rate),
            });
        }
        out.push(Emission::Wait);
        out
    }

    fn handle(&mut self, now: Clock, pkt: Packet) -> StageOut {
        let mut out = StageOut::new();
        self.aqm.enqueue(pkt, now);
        if self.aqm.len() > self.hard_limit {
            out.push(Emission::Done(Some(Error::QueueHardLimitExceeded {
                stage: "iface",
            })));
            return out;
        }
        if self.status == Status::Blocked {
            self.status = Status::Running;
            let delay = self.rate.transfer_time(pkt.len);
            out.push(Emission::Timer {
                after: delay,
                data: TimerPayload::None,
            });
        }
        out.push(Emission::Wait);
        out
    }

    fn ding(&mut self, now: Clock, data: TimerPayload) -> StageOut {
        let mut out = StageOut::new();
        match data {
            TimerPayload::Rate(rate) => self.rate = rate,
            _ => {
                if let Err(e) = self.drain_one(now, &mut out) {
                    out.push(Emission::Done(Some(e)));
                    return out;
                }
            }
        }
        out.push(Emission::Wait);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FlowId;
    use std::collections::VecDeque;

    /// A minimal FIFO with no marking logic, for exercising `Iface` in
    /// isolation from any particular AQM's signal behavior.
    #[derive(Debug, Default)]
    struct PlainFifo {
        queue: VecDeque<Packet>,
        qsize: Bytes,
    }

    impl Aqm for PlainFifo {
        fn enqueue(&mut self, mut pkt: Packet, now: Clock) -> Bytes {
            pkt.enqueue = now;
            self.qsize += pkt.len;
            self.queue.push_back(pkt);
            self.qsize
        }

        fn dequeue(&mut self, _now: Clock) -> Option<(Packet, Mark)> {
            let pkt = self.queue.pop_front()?;
            self.qsize = self.qsize.saturating_sub(pkt.len);
            Some((pkt, Mark::None))
        }

        fn peek(&self) -> Option<&Packet> {
            self.queue.front()
        }

        fn len(&self) -> usize {
            self.queue.len()
        }

        fn qsize(&self) -> Bytes {
            self.qsize
        }
    }

    fn mk_pkt(len: u64) -> Packet {
        Packet::builder()
            .flow(FlowId::ZERO)
            .len(Bytes::new(len))
            .ecn_capable(true)
            .sce_capable(true)
            .build()
    }

    #[test]
    fn enqueue_on_idle_link_arms_a_drain_timer() {
        let mut iface = Iface::new(
            Box::new(PlainFifo::default()),
            Bitrate::from_mbps(100),
            1_000,
            Vec::new(),
        );
        let out = iface.handle(Clock::ZERO, mk_pkt(1500));
        assert!(out.iter().any(|e| matches!(e, Emission::Timer { .. })));
    }

    #[test]
    fn hard_limit_is_fatal() {
        let mut iface = Iface::new(
            Box::new(PlainFifo::default()),
            Bitrate::from_mbps(100),
            0,
            Vec::new(),
        );
        let out = iface.handle(Clock::ZERO, mk_pkt(1500));
        assert!(out.iter().any(|e| matches!(e, Emission::Done(Some(_)))));
    }

    #[test]
    fn drain_forwards_packet_and_arms_next_timer() {
        let mut iface = Iface::new(
            Box::new(PlainFifo::default()),
            Bitrate::from_mbps(100),
            1_000,
            Vec::new(),
        );
        iface.handle(Clock::ZERO, mk_pkt(1500));
        iface.handle(Clock::ZERO, mk_pkt(1500));
        let out = iface.ding(Clock::from_micros(120), TimerPayload::None);
        assert!(out.iter().any(|e| matches!(e, Emission::Packet(_))));
        assert!(out.iter().any(|e| matches!(e, Emission::Timer { .. })));
    }

    #[test]
    fn rate_change_timer_updates_rate_without_draining() {
        let mut iface = Iface::new(
            Box::new(PlainFifo::default()),
            Bitrate::from_mbps(100),
            1_000,
            Vec::new(),
        );
        let out = iface.ding(
            Clock::from_secs_f64(1.0),
            TimerPayload::Rate(Bitrate::from_mbps(50)),
        );
        assert_eq!(iface.rate, Bitrate::from_mbps(50));
        assert!(!out.iter().any(|e| matches!(e, Emission::Packet(_))));
    }
}
