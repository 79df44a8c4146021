//! The Sender stage: per-flow pacing, ACK processing, and the pluggable
//! slow-start / CCA / responder composition (§4.4).
//!
//! Grounded in the teacher's `entities/source.rs::Source` (owns a
//! per-flow map, drains sendable flows on activation and on every ACK) and
//! `entities/flow.rs::Flow::rcv_ack` for the "update accounting, then
//! conditionally react to a mark, then grow" shape — generalized to the
//! pluggable `SlowStart`/`Cca`/`Responder` composition of §4.4.1.

pub(crate) mod cca;
pub(crate) mod flow;
pub(crate) mod responder;
pub(crate) mod slowstart;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;
use crate::packet::Packet;
use crate::scheduler::{Emission, Stage, StageOut, TimerPayload};
use crate::trace::{Series, Tracer};
use crate::units::{Bytes, Clock, Seq};

use cca::Cca;
use flow::{FlowState, Phase};
use responder::Responder;
use slowstart::SlowStart;

type SharedTracer<'a> = Rc<RefCell<Tracer<'a>>>;

/// Everything needed to drive one flow: its mutable state plus the boxed
/// plug-ins chosen for it.
pub(crate) struct FlowRuntime {
    pub(crate) state: FlowState,
    pub(crate) slow_start: Box<dyn SlowStart>,
    pub(crate) slow_start_exit: Box<dyn Responder>,
    pub(crate) cca: Box<dyn Cca>,
    pub(crate) ca_pacing_ratio: f64,
}

impl std::fmt::Debug for FlowRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRuntime")
            .field("state", &self.state)
            .field("slow_start", &self.slow_start)
            .field("cca", &self.cca)
            .finish()
    }
}

/// `pacing_delay = size / (cwnd/srtt * ratio)` (§4.4.2), or, once a CCA has
/// switched to explicit pacing, `size / pacing_rate`.
fn pacing_delay(runtime: &FlowRuntime, size: Bytes) -> Clock {
    if runtime.cca.uses_explicit_pacing() {
        let rate = runtime.state.pacing_rate;
        if rate.into_bps() <= 0 {
            return Clock::ZERO;
        }
        return rate.transfer_time(size);
    }

    let ratio = match runtime.state.phase {
        Phase::SlowStart => runtime.slow_start.pacing_ratio(),
        Phase::CongestionAvoidance => runtime.ca_pacing_ratio,
    };
    let srtt = runtime.state.srtt;
    if srtt == Clock::ZERO || runtime.state.cwnd() == Bytes::ZERO || ratio <= 0.0 {
        return Clock::ZERO;
    }
    let rate_bps = runtime.state.cwnd().into_f64() * 8e9 / srtt.as_secs_f64() * ratio;
    if rate_bps <= 0.0 {
        return Clock::ZERO;
    }
    Clock::new(((size.into_f64() * 8e9) / rate_bps) as i64)
}

/// The Sender stage. Owns every flow's runtime state; the scheduler drives
/// it by ACKs arriving on the ring and by pacing timers it arms itself.
pub(crate) struct Sender<'a> {
    flows: Vec<FlowRuntime>,
    duration: Clock,
    tracer: Option<SharedTracer<'a>>,
}

impl std::fmt::Debug for Sender<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("flows", &self.flows)
            .field("duration", &self.duration)
            .finish()
    }
}

impl<'a> Sender<'a> {
    pub(crate) fn new(flows: Vec<FlowRuntime>, duration: Clock) -> Self {
        Self { flows, duration, tracer: None }
    }

    pub(crate) fn with_tracer(
        flows: Vec<FlowRuntime>,
        duration: Clock,
        tracer: SharedTracer<'a>,
    ) -> Self {
        Self { flows, duration, tracer: Some(tracer) }
    }

    /// Emit the per-flow series a trace sink is configured for (§6):
    /// inflight, cwnd, rtt, pacing rate, and a cumulative-average goodput.
    fn record_trace(&self, idx: usize, now: Clock) -> Result<(), Error> {
        let Some(tracer) = &self.tracer else {
            return Ok(());
        };
        let runtime = &self.flows[idx];
        let id = runtime.state.id;
        let mut t = tracer.borrow_mut();
        t.maybe_record(Series::Inflight, Some(id), now, runtime.state.inflight.into_f64())?;
        t.maybe_record(Series::Cwnd, Some(id), now, runtime.state.cwnd().into_f64())?;
        t.maybe_record(Series::Rtt, Some(id), now, runtime.state.srtt.as_secs_f64())?;
        t.maybe_record(
            Series::Pacing,
            Some(id),
            now,
            runtime.state.pacing_rate.as_mbps_f64(),
        )?;
        let elapsed = now.as_secs_f64();
        let goodput = if elapsed > 0.0 {
            runtime.state.seq.bytes_since(Seq::ZERO).into_f64() * 8.0 / elapsed
        } else {
            0.0
        };
        t.maybe_record(Series::Goodput, Some(id), now, goodput)?;
        Ok(())
    }

    fn drain_flow(&mut self, idx: usize, now: Clock, out: &mut StageOut) {
        loop {
            let runtime = &mut self.flows[idx];
            if now >= self.duration {
                break;
            }
            if !runtime.state.active || runtime.state.pacing_wait || !runtime.state.can_send() {
                break;
            }
            let pkt = runtime.state.next_packet(now);
            let size = pkt.len;
            out.push(Emission::Packet(pkt));
            if runtime.state.pacing_enabled {
                let delay = pacing_delay(runtime, size);
                runtime.state.pacing_wait = true;
                out.push(Emission::Timer {
                    after: delay,
                    data: TimerPayload::Flow(runtime.state.id),
                });
                break;
            }
        }
    }

    /// Process one arriving ACK against flow `idx`'s state per §4.4.3.
    fn process_ack(&mut self, idx: usize, now: Clock, pkt: Packet) {
        let runtime = &mut self.flows[idx];
        let state = &mut runtime.state;

        if pkt.syn {
            let rtt = now.saturating_sub(pkt.sent);
            state.update_rtt_sample(rtt);
            state.receive_next = pkt.ack_num;
            runtime.slow_start.init(state);
            return;
        }

        let acked = pkt.ack_num.bytes_since(state.receive_next);
        state.inflight = state.inflight.saturating_sub(acked);
        state.receive_next = pkt.ack_num;
        state.record_sample(now);

        if !pkt.delayed {
            let rtt = now.saturating_sub(pkt.sent);
            state.update_rtt_sample(rtt);
            runtime.slow_start.update_rtt(rtt, state);
            runtime.cca.update_rtt(rtt, state);
        }

        let mut exited_slow_start = false;
        if pkt.ece {
            if !state.signal_gated() {
                state.arm_signal_gate();
                match state.phase {
                    Phase::SlowStart => {
                        exited_slow_start = runtime.slow_start.react_to_ce(state);
                    }
                    Phase::CongestionAvoidance => runtime.cca.react_to_ce(state),
                }
            }
        } else if pkt.esce && state.sce_capable && !state.signal_gated() {
            // The SCE sub-reaction is further gated by the Tau-sized ring
            // within one srtt, implementing the MD-Scaling invariant.
            if state.try_record_sce_response(now) {
                state.arm_signal_gate();
                match state.phase {
                    Phase::SlowStart => {
                        exited_slow_start = runtime.slow_start.react_to_sce(state);
                    }
                    Phase::CongestionAvoidance => runtime.cca.react_to_sce(state),
                }
            }
        }

        if exited_slow_start {
            Self::exit_slow_start(runtime);
        }

        // `grow()` runs on every ACK regardless of whether a CE/SCE
        // reaction just exited slow-start, on whichever plug-in is active
        // after that transition.
        let grew_past_slow_start = match runtime.state.phase {
            Phase::SlowStart => runtime.slow_start.grow(acked, &mut runtime.state),
            Phase::CongestionAvoidance => {
                runtime.cca.grow(acked, &pkt, &mut runtime.state);
                false
            }
        };
        if grew_past_slow_start {
            Self::exit_slow_start(runtime);
        }
    }

    fn exit_slow_start(runtime: &mut FlowRuntime) {
        let new_cwnd = runtime.slow_start_exit.respond(&runtime.state);
        runtime.state.set_cwnd(new_cwnd);
        runtime.state.phase = Phase::CongestionAvoidance;
        runtime.cca.slow_start_exit(&mut runtime.state);
    }
}

impl Stage for Sender<'_> {
    fn name(&self) -> &'static str {
        "sender"
    }

    fn start(&mut self, now: Clock) -> StageOut {
        let mut out = StageOut::new();
        for idx in 0..self.flows.len() {
            if self.flows[idx].state.active {
                self.drain_flow(idx, now, &mut out);
                if let Err(e) = self.record_trace(idx, now) {
                    out.push(Emission::Done(Some(e)));
                    return out;
                }
            }
        }
        out.push(Emission::Wait);
        out
    }

    fn handle(&mut self, now: Clock, pkt: Packet) -> StageOut {
        let mut out = StageOut::new();
        let idx = pkt.flow.into_usize();
        self.process_ack(idx, now, pkt);
        if let Err(e) = self.record_trace(idx, now) {
            out.push(Emission::Done(Some(e)));
            return out;
        }
        self.drain_flow(idx, now, &mut out);
        out.push(Emission::Wait);
        out
    }

    fn ding(&mut self, now: Clock, data: TimerPayload) -> StageOut {
        let mut out = StageOut::new();
        if let TimerPayload::Flow(id) = data {
            let idx = id.into_usize();
            self.flows[idx].state.pacing_wait = false;
            self.drain_flow(idx, now, &mut out);
            if let Err(e) = self.record_trace(idx, now) {
                out.push(Emission::Done(Some(e)));
                return out;
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
    use responder::NoResponse;
    use slowstart::{GrowthMode, StdSlowStart};

    fn mk_runtime(bytes_total: Bytes) -> FlowRuntime {
        let mut state = FlowState::new(FlowId::ZERO, Bytes::new(1500), bytes_total, 64);
        state.set_cwnd(Bytes::new(15_000));
        state.active = true;
        state.ecn_capable = true;
        state.sce_capable = true;
        FlowRuntime {
            state,
            slow_start: Box::new(StdSlowStart::new(32, GrowthMode::Mss, false)),
            slow_start_exit: Box::new(NoResponse),
            cca: Box::new(cca::Reno::new(0.5, Box::new(NoResponse))),
            ca_pacing_ratio: 1.0,
        }
    }

    #[test]
    fn start_emits_a_syn_for_each_active_flow() {
        let mut sender = Sender::new(vec![mk_runtime(Bytes::new(100_000))], Clock::from_secs_f64(60.0));
        let out = sender.start(Clock::ZERO);
        assert!(out.iter().any(|e| matches!(e, Emission::Packet(p) if p.syn)));
        assert!(out.iter().any(|e| matches!(e, Emission::Wait)));
    }

    #[test]
    fn drain_stops_once_window_is_used_up() {
        let mut sender = Sender::new(vec![mk_runtime(Bytes::new(1_000_000))], Clock::from_secs_f64(60.0));
        let mut out = StageOut::new();
        sender.flows[0].state.started = true;
        sender.drain_flow(0, Clock::ZERO, &mut out);
        let sent: Bytes = out
            .iter()
            .filter_map(|e| match e {
                Emission::Packet(p) => Some(p.len),
                _ => None,
            })
            .fold(Bytes::ZERO, |acc, len| acc + len);
        assert!(sent <= Bytes::new(15_000));
    }

    #[test]
    fn syn_ack_initializes_srtt_and_slow_start() {
        let mut sender = Sender::new(vec![mk_runtime(Bytes::new(100_000))], Clock::from_secs_f64(60.0));
        let synack = Packet::builder()
            .flow(FlowId::ZERO)
            .syn(true)
            .ack(true)
            .ack_num(crate::units::Seq::ZERO)
            .len(Bytes::ZERO)
            .sent(Clock::ZERO)
            .build();
        sender.handle(Clock::from_millis(20), synack);
        assert_eq!(sender.flows[0].state.srtt, Clock::from_millis(20));
    }
}
