//! The Delay stage: a fixed per-flow one-way delay between the interface
//! and the receiver (§4.3).
//!
//! Grounded in the teacher's `entities/flow.rs::Flow::step`/`rcv_ack`, which
//! both arm a single timer per in-flight packet holding the packet itself as
//! the timer's payload; here that idiom is the entire stage rather than one
//! operation within a larger one.

use crate::packet::{FlowId, Packet};
use crate::scheduler::{Emission, Stage, StageOut, TimerPayload};
use crate::units::Clock;

/// Per-flow one-way delay, indexed by [`FlowId`].
#[derive(Debug)]
pub(crate) struct Delay {
    by_flow: Vec<Clock>,
}

impl Delay {
    pub(crate) fn new(by_flow: Vec<Clock>) -> Self {
        Self { by_flow }
    }

    fn delay_for(&self, flow: FlowId) -> Clock {
        self.by_flow
            .get(flow.into_usize())
            .copied()
            .unwrap_or(Clock::ZERO)
    }
}

impl Stage for Delay {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn start(&mut self, _now: Clock) -> StageOut {
        let mut out = StageOut::new();
        out.push(Emission::Wait);
        out
    }

    fn handle(&mut self, _now: Clock, pkt: Packet) -> StageOut {
        let mut out = StageOut::new();
        let after = self.delay_for(pkt.flow);
        out.push(Emission::Timer {
            after,
            data: TimerPayload::Packet(pkt),
        });
        out.push(Emission::Wait);
        out
    }

    fn ding(&mut self, _now: Clock, data: TimerPayload) -> StageOut {
        let mut out = StageOut::new();
        if let TimerPayload::Packet(pkt) = data {
            out.push(Emission::Packet(pkt));
        }
        out.push(Emission::Wait);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Bytes;

    #[test]
    fn handle_arms_a_timer_for_the_flows_delay() {
        let mut delay = Delay::new(vec![Clock::from_millis(5)]);
        let pkt = Packet::builder()
            .flow(FlowId::ZERO)
            .len(Bytes::new(1500))
            .build();
        let out = delay.handle(Clock::ZERO, pkt);
        assert!(out.iter().any(
            |e| matches!(e, Emission::Timer { after, .. } if *after == Clock::from_millis(5))
        ));
    }

    #[test]
    fn ding_forwards_the_held_packet() {
        let mut delay = Delay::new(vec![Clock::from_millis(5)]);
        let pkt = Packet::builder()
            .flow(FlowId::ZERO)
            .len(Bytes::new(1500))
            .build();
        let out = delay.ding(Clock::from_millis(5), TimerPayload::Packet(pkt));
        assert!(out.iter().any(|e| matches!(e, Emission::Packet(_))));
    }
}
