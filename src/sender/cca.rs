//! Congestion control algorithm variants (§4.4.6): `Reno`, `Cubic`,
//! `Scalable`, `Maslo`. Exact numeric fidelity to any reference
//! implementation is explicitly out of scope (§1); only the interface and
//! the qualitative growth/response shape are specified.

use std::cmp;

use crate::packet::Packet;
use crate::units::{Bitrate, Bytes, Clock};

use super::flow::FlowState;
use super::responder::Responder;

/// The congestion-avoidance capability set, active once a flow has left
/// slow-start. `update_rtt` and `explicit_pacing_rate` are optional
/// capabilities with default implementations so CCAs that pace off
/// `cwnd/srtt` (the common case) need not mention them.
pub trait Cca: std::fmt::Debug {
    fn slow_start_exit(&mut self, flow: &mut FlowState);
    fn react_to_ce(&mut self, flow: &mut FlowState);
    fn react_to_sce(&mut self, flow: &mut FlowState);
    fn grow(&mut self, acked: Bytes, pkt: &Packet, flow: &mut FlowState);

    fn update_rtt(&mut self, _rtt: Clock, _flow: &mut FlowState) {}

    /// CCAs that pace directly off an internal rate (Maslo) return `true`
    /// here; the sender then derives `pacing_delay` from `flow.pacing_rate`
    /// instead of from `cwnd/srtt` (§4.4.2).
    fn uses_explicit_pacing(&self) -> bool {
        false
    }
}

/// Reno: halve `cwnd` on CE, respond via a pluggable [`Responder`] on SCE,
/// grow by one MSS roughly once per window's worth of acked data.
#[derive(Debug)]
pub struct Reno {
    beta_ce: f64,
    responder: Box<dyn Responder>,
    bytes_since_growth: Bytes,
}

impl Reno {
    pub fn new(beta_ce: f64, responder: Box<dyn Responder>) -> Self {
        Self {
            beta_ce,
            responder,
            bytes_since_growth: Bytes::ZERO,
        }
    }
}

impl Cca for Reno {
    fn slow_start_exit(&mut self, _flow: &mut FlowState) {
        self.bytes_since_growth = Bytes::ZERO;
    }

    fn react_to_ce(&mut self, flow: &mut FlowState) {
        let new_cwnd = flow.cwnd().scale_by(self.beta_ce);
        flow.set_cwnd(new_cwnd);
    }

    fn react_to_sce(&mut self, flow: &mut FlowState) {
        let new_cwnd = self.responder.respond(flow);
        flow.set_cwnd(new_cwnd);
    }

    fn grow(&mut self, acked: Bytes, _pkt: &Packet, flow: &mut FlowState) {
        self.bytes_since_growth += acked;
        if self.bytes_since_growth >= flow.cwnd() {
            self.bytes_since_growth = Bytes::ZERO;
            flow.set_cwnd(flow.cwnd() + flow.mss);
        }
    }
}

/// CUBIC (RFC 9438): a cubic window-growth function anchored to the window
/// size at the last CE reaction, with a Reno-friendly region for small
/// windows and fast convergence on repeated congestion.
#[derive(Debug)]
pub struct Cubic {
    c: f64,
    beta: f64,
    fast_convergence: bool,
    responder: Box<dyn Responder>,
    t_epoch: Clock,
    cwnd_epoch: Bytes,
    w_max: Bytes,
    w_est: Bytes,
}

impl Cubic {
    pub fn new(c: f64, beta: f64, fast_convergence: bool, responder: Box<dyn Responder>) -> Self {
        Self {
            c,
            beta,
            fast_convergence,
            responder,
            t_epoch: Clock::ZERO,
            cwnd_epoch: Bytes::ZERO,
            w_max: Bytes::ZERO,
            w_est: Bytes::ZERO,
        }
    }

    fn w_cubic(&self, t: Clock, mss: Bytes) -> Bytes {
        if self.c <= 0.0 || mss == Bytes::ZERO {
            return self.w_max;
        }
        let delta_segs = self.w_max.saturating_sub(self.cwnd_epoch).into_f64() / mss.into_f64();
        let k = (delta_segs / self.c).max(0.0).cbrt();
        let x = t.as_secs_f64() - k;
        let segs = self.c * x.powi(3) + self.w_max.into_f64() / mss.into_f64();
        Bytes::new((segs.max(0.0) * mss.into_f64()).round() as u64)
    }
}

impl Cca for Cubic {
    fn slow_start_exit(&mut self, flow: &mut FlowState) {
        self.t_epoch = flow.now;
        self.cwnd_epoch = flow.cwnd();
        self.w_max = flow.cwnd();
        self.w_est = flow.cwnd();
    }

    fn react_to_ce(&mut self, flow: &mut FlowState) {
        if self.fast_convergence && flow.cwnd() < self.w_max {
            self.w_max = flow.cwnd().scale_by((1.0 + self.beta) / 2.0);
        } else {
            self.w_max = flow.cwnd();
        }
        let new_cwnd = flow.cwnd().scale_by(self.beta);
        flow.set_cwnd(new_cwnd);
        self.t_epoch = flow.now;
        self.cwnd_epoch = new_cwnd;
        self.w_est = new_cwnd;
    }

    fn react_to_sce(&mut self, flow: &mut FlowState) {
        let new_cwnd = self.responder.respond(flow);
        flow.set_cwnd(new_cwnd);
    }

    fn grow(&mut self, acked: Bytes, _pkt: &Packet, flow: &mut FlowState) {
        let mss = flow.mss;
        let reno_frac = 3.0 * (1.0 - self.beta) / (1.0 + self.beta);
        let reno_inc = mss.into_f64() * reno_frac * (acked.into_f64() / flow.cwnd().into_f64().max(1.0));
        self.w_est = self.w_est.saturating_add(Bytes::new(reno_inc.max(0.0) as u64));

        let t = flow.now.saturating_sub(self.t_epoch);
        let target_now = self.w_cubic(t, mss);
        if target_now < self.w_est {
            flow.set_cwnd(self.w_est);
        } else {
            let target_next = self.w_cubic(t + flow.srtt, mss);
            let capped = cmp::min(target_next, flow.cwnd().scale_by(1.5));
            flow.set_cwnd(cmp::max(flow.cwnd(), capped));
        }
    }
}

/// tcp-scalable: multiplicative growth `acked/alpha` per ACK, multiplicative
/// decrease `beta` on CE. SCE response is delegated to the same pluggable
/// [`Responder`] used elsewhere, since the spec's Scalable contract is
/// silent on SCE specifically but every CCA must handle it.
#[derive(Debug)]
pub struct Scalable {
    alpha: f64,
    beta: f64,
    responder: Box<dyn Responder>,
}

impl Scalable {
    pub fn new(alpha: f64, beta: f64, responder: Box<dyn Responder>) -> Self {
        Self { alpha, beta, responder }
    }
}

impl Cca for Scalable {
    fn slow_start_exit(&mut self, _flow: &mut FlowState) {}

    fn react_to_ce(&mut self, flow: &mut FlowState) {
        let new_cwnd = flow.cwnd().scale_by(self.beta);
        flow.set_cwnd(new_cwnd);
    }

    fn react_to_sce(&mut self, flow: &mut FlowState) {
        let new_cwnd = self.responder.respond(flow);
        flow.set_cwnd(new_cwnd);
    }

    fn grow(&mut self, acked: Bytes, _pkt: &Packet, flow: &mut FlowState) {
        flow.set_cwnd(flow.cwnd() + Bytes::new((acked.into_f64() / self.alpha) as u64));
    }
}

/// Maslo: explicit-pacing CCA. Advances through a hard-coded safe-per-RTT
/// stage table; growth adds `acked/K[stage]` to the pacing rate, and `cwnd`
/// is re-derived from `pacing_rate * srtt / 8` after every update.
#[derive(Debug)]
pub struct Maslo {
    stage: usize,
    k_table: Vec<u64>,
    ce_factor: Vec<f64>,
}

impl Maslo {
    pub fn new() -> Self {
        Self {
            stage: 0,
            k_table: vec![8, 16, 32, 64, 128, 256],
            ce_factor: vec![0.9, 0.85, 0.8, 0.75, 0.7, 0.65],
        }
    }

    fn cwnd_from_rate(rate: Bitrate, srtt: Clock) -> Bytes {
        Bytes::new(((rate.into_bps().max(0) as f64) * srtt.as_secs_f64() / 8.0) as u64)
    }

    fn advance(&mut self) {
        if self.stage + 1 < self.k_table.len() {
            self.stage += 1;
        }
    }
}

impl Default for Maslo {
    fn default() -> Self {
        Self::new()
    }
}

impl Cca for Maslo {
    fn slow_start_exit(&mut self, flow: &mut FlowState) {
        if flow.pacing_rate == Bitrate::ZERO {
            flow.pacing_rate = flow.implicit_pacing_rate();
        }
    }

    fn react_to_ce(&mut self, flow: &mut FlowState) {
        let factor = self.ce_factor[self.stage];
        flow.pacing_rate = flow.pacing_rate.scale_by(factor);
        flow.set_cwnd(Self::cwnd_from_rate(flow.pacing_rate, flow.srtt));
        self.advance();
    }

    fn react_to_sce(&mut self, flow: &mut FlowState) {
        let factor = self.ce_factor[self.stage].sqrt();
        flow.pacing_rate = flow.pacing_rate.scale_by(factor);
        flow.set_cwnd(Self::cwnd_from_rate(flow.pacing_rate, flow.srtt));
    }

    fn grow(&mut self, acked: Bytes, _pkt: &Packet, flow: &mut FlowState) {
        let k = self.k_table[self.stage].max(1);
        let srtt_s = flow.srtt.as_secs_f64().max(1e-9);
        let inc_bps = (acked.into_f64() * 8e9 / srtt_s) / k as f64;
        flow.pacing_rate = flow.pacing_rate + Bitrate::new(inc_bps as i64);
        flow.set_cwnd(Self::cwnd_from_rate(flow.pacing_rate, flow.srtt));
    }

    fn uses_explicit_pacing(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FlowId;
    use crate::sender::responder::NoResponse;

    fn mk_flow() -> FlowState {
        let mut flow = FlowState::new(FlowId::ZERO, Bytes::new(1500), Bytes::new(10_000_000), 64);
        flow.srtt = Clock::from_millis(20);
        flow.set_cwnd(Bytes::new(100_000));
        flow
    }

    #[test]
    fn reno_halves_on_ce() {
        let mut cca = Reno::new(0.5, Box::new(NoResponse));
        let mut flow = mk_flow();
        cca.react_to_ce(&mut flow);
        assert_eq!(flow.cwnd(), Bytes::new(50_000));
    }

    #[test]
    fn scalable_grows_with_acked_over_alpha() {
        let mut cca = Scalable::new(100.0, 0.8, Box::new(NoResponse));
        let mut flow = mk_flow();
        let before = flow.cwnd();
        let pkt = Packet::builder().flow(FlowId::ZERO).len(Bytes::new(1500)).build();
        cca.grow(Bytes::new(1500), &pkt, &mut flow);
        assert!(flow.cwnd() > before);
    }

    #[test]
    fn maslo_derives_cwnd_from_pacing_rate() {
        let mut cca = Maslo::new();
        let mut flow = mk_flow();
        cca.slow_start_exit(&mut flow);
        let pkt = Packet::builder().flow(FlowId::ZERO).len(Bytes::new(1500)).build();
        cca.grow(Bytes::new(1500), &pkt, &mut flow);
        assert!(flow.pacing_rate > Bitrate::ZERO);
    }
}
