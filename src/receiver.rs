//! The Receiver stage: cumulative ACKs with out-of-order buffering,
//! alternating delayed ACKs, and quick-ACK-on-signal-change (§4.6).
//!
//! Grounded in the teacher's `entities/bottleneck.rs`'s is-last/ACK
//! scheduling pattern, generalized with a `BTreeMap<Seq, Packet>` reorder
//! buffer since the teacher's single-bottleneck model never reorders.

use std::collections::BTreeMap;

use crate::packet::{FlowId, Packet};
use crate::scheduler::{Emission, Stage, StageOut, TimerPayload};
use crate::units::{Clock, Seq};

/// Per-flow receive-side state.
#[derive(Debug)]
struct FlowRx {
    rcv_next: Seq,
    last_acked: Seq,
    buffer: BTreeMap<Seq, Packet>,
    delay_ack: bool,
    prior_ece: bool,
    prior_esce: bool,
}

impl FlowRx {
    fn new() -> Self {
        Self {
            rcv_next: Seq::ZERO,
            last_acked: Seq::ZERO,
            buffer: BTreeMap::new(),
            delay_ack: false,
            prior_ece: false,
            prior_esce: false,
        }
    }
}

/// The Receiver stage.
#[derive(Debug)]
pub(crate) struct Receiver {
    by_flow: Vec<FlowRx>,
    delayed_ack_time: Clock,
    quick_ack_on_signal: bool,
}

impl Receiver {
    pub(crate) fn new(flow_count: usize, delayed_ack_time: Clock, quick_ack_on_signal: bool) -> Self {
        Self {
            by_flow: (0..flow_count).map(|_| FlowRx::new()).collect(),
            delayed_ack_time,
            quick_ack_on_signal,
        }
    }

    fn send_ack(&mut self, idx: usize, pkt: Packet, ack_num: Seq, delayed: bool, out: &mut StageOut) {
        let flow = &mut self.by_flow[idx];
        flow.prior_ece = pkt.ce;
        flow.prior_esce = pkt.sce;
        flow.last_acked = ack_num;
        let mut ack = pkt.into_ack(ack_num);
        ack.delayed = delayed;
        out.push(Emission::Packet(ack));
    }
}

impl Stage for Receiver {
    fn name(&self) -> &'static str {
        "receiver"
    }

    fn start(&mut self, _now: Clock) -> StageOut {
        let mut out = StageOut::new();
        out.push(Emission::Wait);
        out
    }

    fn handle(&mut self, _now: Clock, pkt: Packet) -> StageOut {
        let mut out = StageOut::new();
        let idx = pkt.flow.into_usize();

        let (immediate, ack_num) = {
            let flow = &mut self.by_flow[idx];
            let mut buffer_used = false;
            let out_of_order = pkt.seq != flow.rcv_next;
            if out_of_order {
                flow.buffer.insert(pkt.seq, pkt);
            } else {
                flow.rcv_next = flow.rcv_next.advance(pkt.len);
                while let Some(next_seq) = flow.buffer.keys().next().copied() {
                    if next_seq == flow.rcv_next {
                        let buffered = flow.buffer.remove(&next_seq).expect("key just observed");
                        flow.rcv_next = flow.rcv_next.advance(buffered.len);
                        buffer_used = true;
                    } else {
                        break;
                    }
                }
            }

            let signal_changed = pkt.ce != flow.prior_ece || pkt.sce != flow.prior_esce;
            let immediate = out_of_order
                || buffer_used
                || self.delayed_ack_time == Clock::ZERO
                || (self.quick_ack_on_signal && (pkt.ce || pkt.sce))
                || signal_changed;
            (immediate, flow.rcv_next)
        };

        if immediate {
            self.send_ack(idx, pkt, ack_num, false, &mut out);
        } else {
            let flow = &mut self.by_flow[idx];
            if flow.delay_ack {
                flow.delay_ack = false;
                out.push(Emission::Timer {
                    after: self.delayed_ack_time,
                    data: TimerPayload::Packet(pkt),
                });
            } else {
                flow.delay_ack = true;
                self.send_ack(idx, pkt, ack_num, false, &mut out);
            }
        }

        out.push(Emission::Wait);
        out
    }

    fn ding(&mut self, _now: Clock, data: TimerPayload) -> StageOut {
        let mut out = StageOut::new();
        if let TimerPayload::Packet(pkt) = data {
            let idx = pkt.flow.into_usize();
            let flow = &self.by_flow[idx];
            let end = pkt.seq.advance(pkt.len);
            if end > flow.last_acked {
                let ack_num = flow.rcv_next;
                self.send_ack(idx, pkt, ack_num, true, &mut out);
            }
        }
        out.push(Emission::Wait);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Bytes;

    fn mk_pkt(seq: i64, len: u64, ce: bool) -> Packet {
        Packet::builder()
            .flow(FlowId::ZERO)
            .seq(Seq::new(seq))
            .len(Bytes::new(len))
            .ce(ce)
            .build()
    }

    #[test]
    fn in_order_packet_without_signal_change_may_be_delayed() {
        let mut rx = Receiver::new(1, Clock::from_millis(40), false);
        let out = rx.handle(Clock::ZERO, mk_pkt(0, 1000, false));
        assert!(!out.iter().any(|e| matches!(e, Emission::Packet(_))));
        assert!(out.iter().any(|e| matches!(e, Emission::Timer { .. })));
    }

    #[test]
    fn out_of_order_packet_is_acked_immediately() {
        let mut rx = Receiver::new(1, Clock::from_millis(40), false);
        let out = rx.handle(Clock::ZERO, mk_pkt(1000, 1000, false));
        assert!(out.iter().any(|e| matches!(e, Emission::Packet(p) if p.ack_num == Seq::ZERO)));
    }

    #[test]
    fn ce_signal_change_forces_immediate_ack() {
        let mut rx = Receiver::new(1, Clock::from_millis(40), false);
        rx.handle(Clock::ZERO, mk_pkt(0, 1000, false));
        let out = rx.handle(Clock::ZERO, mk_pkt(1000, 1000, true));
        assert!(out.iter().any(|e| matches!(e, Emission::Packet(p) if p.ece)));
    }

    #[test]
    fn disabling_delayed_acks_always_acks_immediately() {
        let mut rx = Receiver::new(1, Clock::ZERO, false);
        let out = rx.handle(Clock::ZERO, mk_pkt(0, 1000, false));
        assert!(out.iter().any(|e| matches!(e, Emission::Packet(_))));
    }

    #[test]
    fn delayed_ack_fires_only_if_not_superseded() {
        let mut rx = Receiver::new(1, Clock::from_millis(40), false);
        let first = mk_pkt(0, 1000, false);
        rx.handle(Clock::ZERO, first);
        let second = mk_pkt(1000, 1000, false);
        let out = rx.handle(Clock::ZERO, second);
        let timer_pkt = out
            .iter()
            .find_map(|e| match e {
                Emission::Timer { data: TimerPayload::Packet(p), .. } => Some(*p),
                _ => None,
            })
            .expect("second packet should be delayed");
        // A subsequent immediate ack (signal change) covers the same range.
        rx.handle(Clock::ZERO, mk_pkt(2000, 1000, true));
        let ding_out = rx.ding(Clock::from_millis(40), TimerPayload::Packet(timer_pkt));
        assert!(!ding_out.iter().any(|e| matches!(e, Emission::Packet(_))));
    }
}
