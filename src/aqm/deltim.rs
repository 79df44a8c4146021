//! DelTiM: the sojourn-down-to-one-packet variant, with optional burst-window
//! minimum tracking, idle-period utilization scaling, and jitter
//! compensation (§4.7.3, §4.7.5).

use crate::packet::Packet;
use crate::units::{Bytes, Clock};

use super::deltasigma::DeltaSigma;
use super::fifo::FifoStore;
use super::monotonic_min::MonotonicMinDeque;
use super::{Aqm, Mark};

const ONE_SEC: f64 = 1_000_000_000.0;

/// Idle/active utilization tracker feeding the overmarking-after-starvation
/// correction of §4.7.3.
#[derive(Debug)]
struct IdleTracker {
    window: Clock,
    last_event: Clock,
    idle_since: Option<Clock>,
}

impl IdleTracker {
    fn new(window: Clock) -> Self {
        Self {
            window,
            last_event: Clock::ZERO,
            idle_since: None,
        }
    }

    /// Returns the `(idle, active)` durations observed since the previous
    /// dequeue, clamped to the configured window per the spec's formula.
    fn sample(&mut self, now: Clock) -> (Clock, Clock) {
        let idle_raw = match self.idle_since {
            Some(since) => now.saturating_sub(since),
            None => Clock::ZERO,
        };
        let gap = now.saturating_sub(self.last_event);
        let active_raw = gap.saturating_sub(idle_raw);

        let w = self.window;
        let idle = if idle_raw > w { w } else { idle_raw };
        let active_cap = w.saturating_sub(idle);
        let active = if active_raw > active_cap {
            active_cap
        } else {
            active_raw
        };

        self.last_event = now;
        self.idle_since = None;
        (idle, active)
    }

    fn mark_went_idle(&mut self, now: Clock) {
        self.idle_since = Some(now);
    }
}

/// EWMA jitter estimator shared across delay-based AQMs that want to forgive
/// sojourn inflation caused purely by inter-arrival jitter (§4.7.5).
#[derive(Debug, Default)]
struct JitterEstimator {
    jitter: f64,
    last_dequeue: Option<Clock>,
}

impl JitterEstimator {
    fn update(&mut self, now: Clock) -> Clock {
        let gap_ns = match self.last_dequeue {
            Some(prev) => (now - prev).into_nanos() as f64,
            None => 0.0,
        };
        self.last_dequeue = Some(now);
        let i = gap_ns.clamp(0.0, ONE_SEC);
        self.jitter = (i * i + self.jitter * (ONE_SEC - i)) / ONE_SEC;
        Clock::new(self.jitter as i64)
    }
}

/// DelTiM: same delta-sigma core as [`super::deltic_mds::DelTiCMds`], but the
/// error signal fed into it is the sojourn of the packet behind the one
/// being dequeued, optionally smoothed by a sliding minimum and corrected
/// for idle-period overmarking and inter-arrival jitter.
#[derive(Debug)]
pub struct DelTiM {
    ds: DeltaSigma,
    tau: u32,
    mds_osc: f64,
    conv_osc: f64,
    store: FifoStore,
    burst_min: Option<MonotonicMinDeque>,
    idle: IdleTracker,
    jitter: JitterEstimator,
}

impl DelTiM {
    /// Construct a DelTiM AQM. `burst_window`, if `Some`, enables the
    /// sliding-minimum smoothing of the error signal over that window.
    pub fn new(target: Clock, tau: u32, idle_window: Clock, burst_window: Option<Clock>) -> Self {
        Self {
            ds: DeltaSigma::new(target),
            tau,
            mds_osc: 0.0,
            conv_osc: 0.0,
            store: FifoStore::default(),
            burst_min: burst_window.map(MonotonicMinDeque::new),
            idle: IdleTracker::new(idle_window),
            jitter: JitterEstimator::default(),
        }
    }

    fn step_mds(&mut self, i: f64) -> Mark {
        let tau_s = self.tau as f64 * ONE_SEC;
        self.mds_osc += i;
        if self.mds_osc < ONE_SEC {
            Mark::None
        } else if self.mds_osc < 2.0 * ONE_SEC {
            self.mds_osc -= ONE_SEC;
            Mark::Sce
        } else if self.mds_osc < tau_s {
            self.mds_osc -= tau_s;
            Mark::Ce
        } else {
            self.mds_osc -= tau_s;
            if self.mds_osc > tau_s {
                self.ds.relieve_overload();
            }
            Mark::Drop
        }
    }

    fn step_conv(&mut self, i: f64) -> Mark {
        self.conv_osc += i / self.tau as f64;
        if self.conv_osc < ONE_SEC {
            Mark::None
        } else if self.conv_osc < 2.0 * ONE_SEC {
            self.conv_osc -= ONE_SEC;
            Mark::Ce
        } else {
            self.conv_osc -= 2.0 * ONE_SEC;
            if self.conv_osc > 2.0 * ONE_SEC {
                self.ds.relieve_overload();
            }
            Mark::Drop
        }
    }
}

impl Aqm for DelTiM {
    fn enqueue(&mut self, pkt: Packet, now: Clock) -> Bytes {
        self.store.enqueue(pkt, now)
    }

    fn dequeue(&mut self, now: Clock) -> Option<(Packet, Mark)> {
        let pkt = self.store.dequeue()?;

        let (idle, active) = self.idle.sample(now);
        let w = self.idle.window.into_nanos() as f64;
        if w > 0.0 {
            let i = idle.into_nanos() as f64;
            let a = active.into_nanos() as f64;
            if i + a > 0.0 {
                let p = (a + i) / w;
                let u = a / (a + i);
                self.ds.scale_acc(u * p + (1.0 - p));
            }
        }

        let raw_error = match self.store.peek() {
            Some(behind) => now.saturating_sub(behind.enqueue),
            None => {
                self.idle.mark_went_idle(now);
                Clock::ZERO
            }
        };

        let jitter = self.jitter.update(now);
        let error = raw_error.saturating_sub(jitter);
        let error = match &mut self.burst_min {
            Some(deque) => deque.push(now, error),
            None => error,
        };

        let out = self.ds.step(now, error);
        if out.reset_osc {
            self.mds_osc = 0.0;
            self.conv_osc = 0.0;
        }
        let mds_mark = self.step_mds(out.increment);
        let conv_mark = self.step_conv(out.increment);

        let mark = if pkt.sce_capable {
            mds_mark
        } else if pkt.ecn_capable {
            conv_mark
        } else if conv_mark == Mark::Ce {
            Mark::Drop
        } else {
            conv_mark
        };

        Some((pkt, mark))
    }

    fn peek(&self) -> Option<&Packet> {
        self.store.peek()
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn qsize(&self) -> Bytes {
        self.store.qsize()
    }

    fn signal(&self) -> f64 {
        self.mds_osc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_pkt() -> Packet {
        Packet::builder()
            .flow(crate::packet::FlowId::ZERO)
            .len(Bytes::new(1500))
            .sce_capable(true)
            .ecn_capable(true)
            .build()
    }

    #[test]
    fn fifo_order_preserved_under_deltim() {
        let mut aqm = DelTiM::new(Clock::from_millis(5), 8, Clock::from_millis(100), None);
        let mut now = Clock::ZERO;
        for i in 0..10 {
            let mut p = mk_pkt();
            p.seq = crate::units::Seq::new(i);
            aqm.enqueue(p, now);
            now += Clock::from_millis(1);
        }
        let mut last = None;
        while let Some((pkt, _)) = aqm.dequeue(now) {
            if let Some(prev) = last {
                assert!(pkt.seq >= prev);
            }
            last = Some(pkt.seq);
            now += Clock::from_millis(1);
        }
    }
}
