//! Brickwall: fixed sojourn-time thresholds, no control loop (§4.7.4).

use crate::packet::Packet;
use crate::units::{Bytes, Clock};

use super::fifo::FifoStore;
use super::{Aqm, Mark};

/// A static reference AQM with fixed SCE/CE/drop thresholds on sojourn time.
#[derive(Debug)]
pub struct Brickwall {
    sce_target: Clock,
    ce_target: Clock,
    drop_target: Clock,
    store: FifoStore,
}

impl Brickwall {
    /// Construct a Brickwall AQM. Thresholds must satisfy
    /// `sce_target < ce_target < drop_target`.
    pub fn new(sce_target: Clock, ce_target: Clock, drop_target: Clock) -> Self {
        assert!(sce_target < ce_target && ce_target < drop_target);
        Self {
            sce_target,
            ce_target,
            drop_target,
            store: FifoStore::default(),
        }
    }
}

impl Aqm for Brickwall {
    fn enqueue(&mut self, pkt: Packet, now: Clock) -> Bytes {
        self.store.enqueue(pkt, now)
    }

    fn dequeue(&mut self, now: Clock) -> Option<(Packet, Mark)> {
        let pkt = self.store.dequeue()?;
        let sojourn = now.saturating_sub(pkt.enqueue);

        let mark = if sojourn >= self.drop_target {
            Mark::Drop
        } else if sojourn >= self.ce_target {
            if pkt.ecn_capable {
                Mark::Ce
            } else {
                Mark::Drop
            }
        } else if sojourn >= self.sce_target {
            if pkt.sce_capable {
                Mark::Sce
            } else if pkt.ecn_capable {
                Mark::Ce
            } else {
                Mark::Drop
            }
        } else {
            Mark::None
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
    fn thresholds_select_the_right_mark() {
        let mut aqm = Brickwall::new(
            Clock::from_millis(5),
            Clock::from_millis(10),
            Clock::from_millis(20),
        );
        aqm.enqueue(mk_pkt(), Clock::ZERO);
        let (_, mark) = aqm.dequeue(Clock::from_millis(3)).unwrap();
        assert_eq!(mark, Mark::None);

        aqm.enqueue(mk_pkt(), Clock::ZERO);
        let (_, mark) = aqm.dequeue(Clock::from_millis(7)).unwrap();
        assert_eq!(mark, Mark::Sce);

        aqm.enqueue(mk_pkt(), Clock::ZERO);
        let (_, mark) = aqm.dequeue(Clock::from_millis(15)).unwrap();
        assert_eq!(mark, Mark::Ce);

        aqm.enqueue(mk_pkt(), Clock::ZERO);
        let (_, mark) = aqm.dequeue(Clock::from_millis(25)).unwrap();
        assert_eq!(mark, Mark::Drop);
    }
}
