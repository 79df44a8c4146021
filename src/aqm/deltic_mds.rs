//! DelTiC-MDS: MD-Scaling coupled oscillators sharing a single accumulator
//! (§4.7.2).

use crate::packet::Packet;
use crate::units::{Bytes, Clock};

use super::deltasigma::DeltaSigma;
use super::fifo::FifoStore;
use super::{Aqm, Mark};

const ONE_SEC: f64 = 1_000_000_000.0;

/// A single DelTiC accumulator driving two oscillators: `mds_osc` (direct
/// SCE/CE/drop output for SCE-capable flows) and `conv_osc` (a CE/drop-only
/// output, incremented at `i/Tau`, for flows that cannot carry SCE).
#[derive(Debug)]
pub struct DelTiCMds {
    ds: DeltaSigma,
    tau: u32,
    mds_osc: f64,
    conv_osc: f64,
    store: FifoStore,
}

impl DelTiCMds {
    /// Construct a DelTiC-MDS AQM with the given sojourn-time target and
    /// SCE:CE scaling factor `tau`.
    pub fn new(target: Clock, tau: u32) -> Self {
        Self {
            ds: DeltaSigma::new(target),
            tau,
            mds_osc: 0.0,
            conv_osc: 0.0,
            store: FifoStore::default(),
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

impl Aqm for DelTiCMds {
    fn enqueue(&mut self, pkt: Packet, now: Clock) -> Bytes {
        self.store.enqueue(pkt, now)
    }

    fn dequeue(&mut self, now: Clock) -> Option<(Packet, Mark)> {
        let pkt = self.store.dequeue()?;
        let sojourn = now.saturating_sub(pkt.enqueue);
        let out = self.ds.step(now, sojourn);
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

    fn mk_pkt(sce_capable: bool, ecn_capable: bool) -> Packet {
        Packet::builder()
            .flow(crate::packet::FlowId::ZERO)
            .len(Bytes::new(1500))
            .sce_capable(sce_capable)
            .ecn_capable(ecn_capable)
            .build()
    }

    #[test]
    fn sce_marks_occur_far_more_often_than_ce_under_sustained_overload() {
        let mut aqm = DelTiCMds::new(Clock::from_millis(5), 8);
        let mut now = Clock::ZERO;
        let mut sce_count = 0u32;
        let mut ce_count = 0u32;
        for _ in 0..20_000 {
            let p = mk_pkt(true, true);
            aqm.enqueue(p, now);
            now += Clock::from_micros(200);
            // keep sojourn well above target by delaying dequeue
            if aqm.len() > 50 {
                let (_, mark) = aqm.dequeue(now).unwrap();
                match mark {
                    Mark::Sce => sce_count += 1,
                    Mark::Ce => ce_count += 1,
                    _ => {}
                }
            }
        }
        assert!(sce_count > ce_count, "SCE should fire more often than CE");
    }
}
