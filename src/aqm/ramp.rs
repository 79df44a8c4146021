//! Ramp: linear marking probability over a sojourn-time window, with SCE
//! rate-limited to one mark per Tau CE-equivalent marks (§4.7.4).

use crate::packet::Packet;
use crate::units::{Bytes, Clock};

use super::fifo::FifoStore;
use super::{Aqm, Mark};

/// A small, fully local xorshift64 generator. Used instead of an external RNG
/// crate so a run's mark sequence is reproducible from the seed alone,
/// independent of any crate version's algorithm choice.
#[derive(Debug, Clone, Copy)]
struct XorShift64(u64);

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E3779B97F4A7C15 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// A uniform sample in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

/// A probability-ramp reference AQM: marking probability rises linearly from
/// `min_ramp` to `max_ramp` sojourn time, capped at 1. SCE is emitted on at
/// most one in every `tau` marks that would otherwise be CE; the rest surface
/// as CE (or Drop, if the flow isn't ECN-capable).
#[derive(Debug)]
pub struct Ramp {
    min_ramp: Clock,
    max_ramp: Clock,
    tau: u32,
    rng: XorShift64,
    marks_since_sce: u32,
    store: FifoStore,
}

impl Ramp {
    /// Construct a Ramp AQM. `seed` makes the mark sequence reproducible;
    /// `min_ramp` must be less than `max_ramp`.
    pub fn new(min_ramp: Clock, max_ramp: Clock, tau: u32, seed: u64) -> Self {
        assert!(min_ramp < max_ramp);
        Self {
            min_ramp,
            max_ramp,
            tau,
            rng: XorShift64::new(seed),
            marks_since_sce: 0,
            store: FifoStore::default(),
        }
    }

    fn mark_probability(&self, sojourn: Clock) -> f64 {
        let span = (self.max_ramp - self.min_ramp).into_nanos() as f64;
        let over = (sojourn - self.min_ramp).into_nanos() as f64;
        (over / span).clamp(0.0, 1.0)
    }
}

impl Aqm for Ramp {
    fn enqueue(&mut self, pkt: Packet, now: Clock) -> Bytes {
        self.store.enqueue(pkt, now)
    }

    fn dequeue(&mut self, now: Clock) -> Option<(Packet, Mark)> {
        let pkt = self.store.dequeue()?;
        let sojourn = now.saturating_sub(pkt.enqueue);
        let p = self.mark_probability(sojourn);
        let r = self.rng.next_f64();

        let mark = if r >= p {
            Mark::None
        } else {
            self.marks_since_sce += 1;
            if self.marks_since_sce >= self.tau && pkt.sce_capable {
                self.marks_since_sce = 0;
                Mark::Sce
            } else if pkt.ecn_capable {
                Mark::Ce
            } else {
                Mark::Drop
            }
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
    fn never_marks_below_min_ramp() {
        let mut aqm = Ramp::new(Clock::from_millis(10), Clock::from_millis(20), 8, 42);
        for _ in 0..100 {
            aqm.enqueue(mk_pkt(), Clock::ZERO);
            let (_, mark) = aqm.dequeue(Clock::from_millis(5)).unwrap();
            assert_eq!(mark, Mark::None);
        }
    }

    #[test]
    fn always_marks_above_max_ramp() {
        let mut aqm = Ramp::new(Clock::from_millis(10), Clock::from_millis(20), 8, 42);
        for _ in 0..100 {
            aqm.enqueue(mk_pkt(), Clock::ZERO);
            let (_, mark) = aqm.dequeue(Clock::from_millis(30)).unwrap();
            assert_ne!(mark, Mark::None);
        }
    }

    #[test]
    fn sce_never_exceeds_one_in_tau_marks() {
        let mut aqm = Ramp::new(Clock::from_millis(10), Clock::from_millis(20), 4, 7);
        let mut sce = 0u32;
        let mut total = 0u32;
        for _ in 0..10_000 {
            aqm.enqueue(mk_pkt(), Clock::ZERO);
            let (_, mark) = aqm.dequeue(Clock::from_millis(30)).unwrap();
            total += 1;
            if mark == Mark::Sce {
                sce += 1;
            }
        }
        assert!(sce as f64 <= total as f64 / 4.0 + 1.0);
    }

    #[test]
    fn same_seed_reproduces_the_same_mark_sequence() {
        let run = || {
            let mut aqm = Ramp::new(Clock::from_millis(10), Clock::from_millis(20), 8, 1234);
            let mut marks = Vec::new();
            for _ in 0..50 {
                aqm.enqueue(mk_pkt(), Clock::ZERO);
                let (_, mark) = aqm.dequeue(Clock::from_millis(15)).unwrap();
                marks.push(mark);
            }
            marks
        };
        assert_eq!(run(), run());
    }
}
