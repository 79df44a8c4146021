//! Plain DelTiC: three independent delta-sigma controllers (SCE, CE, drop),
//! highest severity wins (§4.7.1).

use crate::packet::Packet;
use crate::units::{Bytes, Clock};

use super::deltasigma::DeltaSigma;
use super::fifo::FifoStore;
use super::{Aqm, Mark};

/// Per-controller oscillator plus its delta-sigma loop.
#[derive(Debug)]
struct Controller {
    ds: DeltaSigma,
    osc: f64,
}

impl Controller {
    fn new(target: Clock) -> Self {
        Self {
            ds: DeltaSigma::new(target),
            osc: 0.0,
        }
    }

    /// Runs one update and returns whether this controller's oscillator
    /// fired.
    fn update(&mut self, now: Clock, sojourn: Clock) -> bool {
        let out = self.ds.step(now, sojourn);
        if out.reset_osc {
            self.osc = 0.0;
        }
        self.osc += out.increment;
        if self.osc >= 1_000_000_000.0 {
            self.osc -= 1_000_000_000.0;
            if self.osc > 1_000_000_000.0 {
                self.ds.relieve_overload();
            }
            true
        } else {
            false
        }
    }
}

/// The three independently targeted DelTiC controllers driving SCE, CE, and
/// drop decisions for one bottleneck queue.
#[derive(Debug)]
pub struct DelTiC {
    sce: Controller,
    ce: Controller,
    drop: Controller,
    store: FifoStore,
}

impl DelTiC {
    /// Construct a DelTiC AQM from its three controller targets (SCE, CE,
    /// drop sojourn-time setpoints).
    pub fn new(sce_target: Clock, ce_target: Clock, drop_target: Clock) -> Self {
        Self {
            sce: Controller::new(sce_target),
            ce: Controller::new(ce_target),
            drop: Controller::new(drop_target),
            store: FifoStore::default(),
        }
    }

    /// The CE-controller's target, used for the `deltaSigma` trace series.
    pub fn ce_target(&self) -> Clock {
        self.ce.ds.target()
    }
}

impl Aqm for DelTiC {
    fn enqueue(&mut self, pkt: Packet, now: Clock) -> Bytes {
        self.store.enqueue(pkt, now)
    }

    fn dequeue(&mut self, now: Clock) -> Option<(Packet, Mark)> {
        let pkt = self.store.dequeue()?;
        let sojourn = now.saturating_sub(pkt.enqueue);

        let drop_fired = self.drop.update(now, sojourn);
        let ce_fired = self.ce.update(now, sojourn);
        let sce_fired = self.sce.update(now, sojourn);

        let mark = if drop_fired {
            Mark::Drop
        } else if ce_fired {
            if pkt.ecn_capable {
                Mark::Ce
            } else {
                Mark::Drop
            }
        } else if sce_fired {
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

    fn signal(&self) -> f64 {
        self.ce.osc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_pkt(sce_capable: bool, ecn_capable: bool) -> Packet {
        Packet::builder()
            .flow(crate::packet::FlowId::ZERO)
            .len(Bytes::new(1500))
            .sce_capable(sce_capable)
            .ecn_capable(ecn_capable)
            .build()
    }

    #[test]
    fn fifo_order_preserved() {
        let mut aqm = DelTiC::new(
            Clock::from_millis(5),
            Clock::from_millis(25),
            Clock::from_millis(125),
        );
        for i in 0..5 {
            let mut p = mk_pkt(true, true);
            p.seq = crate::units::Seq::new(i);
            aqm.enqueue(p, Clock::ZERO);
        }
        let mut last = None;
        while let Some((pkt, _)) = aqm.dequeue(Clock::from_millis(1)) {
            if let Some(prev) = last {
                assert!(pkt.seq >= prev);
            }
            last = Some(pkt.seq);
        }
    }

    #[test]
    fn non_sce_capable_packet_gets_ce_instead_of_sce() {
        let mut aqm = DelTiC::new(
            Clock::from_millis(1),
            Clock::from_millis(1_000),
            Clock::from_millis(10_000),
        );
        let mut now = Clock::ZERO;
        // Drive a large, sustained sojourn so the SCE oscillator fires
        // quickly while CE/drop stay quiet.
        for _ in 0..50 {
            let p = mk_pkt(false, true);
            aqm.enqueue(p, now);
            now += Clock::from_millis(1);
        }
        let mut saw_promoted_ce = false;
        while let Some((pkt, mark)) = aqm.dequeue(now) {
            if !pkt.sce_capable && mark == Mark::Ce {
                saw_promoted_ce = true;
            }
            assert_ne!(mark, Mark::Sce, "non-SCE-capable packet must not get SCE");
            now += Clock::from_millis(1);
        }
        assert!(saw_promoted_ce);
    }
}
