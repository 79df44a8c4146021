//! Responders: pure functions from a flow's current state to a new `cwnd`
//! (§4.5). Used both at slow-start exit and as the SCE response inside a
//! CCA.
//!
//! The purity property is load-bearing (§8 "Responder purity"): every
//! variant takes `&FlowState`, never `&mut`, so "no hidden mutation" is a
//! compile-time guarantee rather than a tested convention.

use std::cmp;

use crate::units::{Bytes, Clock};

use super::flow::FlowState;

/// Maps a flow's current state to a new `cwnd`. Implementations must not
/// mutate the flow; any bookkeeping needed across calls belongs to the
/// caller (the CCA or slow-start variant that invoked the responder).
pub trait Responder: std::fmt::Debug {
    fn respond(&self, flow: &FlowState) -> Bytes;
}

/// Constant multiplicative decrease: `cwnd * m`.
#[derive(Debug, Clone, Copy)]
pub struct Md {
    pub m: f64,
}

impl Responder for Md {
    fn respond(&self, flow: &FlowState) -> Bytes {
        flow.cwnd().scale_by(self.m)
    }
}

/// Rate-fair multiplicative decrease: `cwnd * m^(1/tau)`, with
/// `tau = Tau * (srtt/RTT0)^2` so flows with longer RTTs back off less,
/// equalizing throughput rather than window share.
#[derive(Debug, Clone, Copy)]
pub struct RateFairMd {
    pub m: f64,
    pub rtt0: Clock,
    pub tau: u32,
}

impl Responder for RateFairMd {
    fn respond(&self, flow: &FlowState) -> Bytes {
        let ratio = flow.srtt.as_secs_f64() / self.rtt0.as_secs_f64().max(1e-9);
        let tau_eff = (self.tau as f64) * ratio * ratio;
        flow.cwnd().scale_by(self.m.powf(1.0 / tau_eff.max(1e-9)))
    }
}

/// As [`RateFairMd`] but with `tau = Tau * (srtt/RTT0)`, a milder
/// RTT-fairness correction.
#[derive(Debug, Clone, Copy)]
pub struct HybridFairMd {
    pub m: f64,
    pub rtt0: Clock,
    pub tau: u32,
}

impl Responder for HybridFairMd {
    fn respond(&self, flow: &FlowState) -> Bytes {
        let ratio = flow.srtt.as_secs_f64() / self.rtt0.as_secs_f64().max(1e-9);
        let tau_eff = (self.tau as f64) * ratio;
        flow.cwnd().scale_by(self.m.powf(1.0 / tau_eff.max(1e-9)))
    }
}

/// `cwnd * (1 - 1/sqrt(cwnd))`.
#[derive(Debug, Clone, Copy)]
pub struct SqrtP;

impl Responder for SqrtP {
    fn respond(&self, flow: &FlowState) -> Bytes {
        let cwnd = flow.cwnd().into_f64();
        if cwnd <= 1.0 {
            return flow.cwnd();
        }
        flow.cwnd().scale_by(1.0 - 1.0 / cwnd.sqrt())
    }
}

/// `cwnd <- inflight(now - srtt) * minRtt/srtt`: retarget the window to
/// what would have kept exactly one `minRtt` worth of data in flight.
#[derive(Debug, Clone, Copy)]
pub struct TargetCwnd;

impl Responder for TargetCwnd {
    fn respond(&self, flow: &FlowState) -> Bytes {
        if flow.srtt == Clock::ZERO {
            return flow.cwnd();
        }
        let ratio = flow.min_rtt.as_secs_f64() / flow.srtt.as_secs_f64();
        flow.inflight_one_srtt_ago().scale_by(ratio)
    }
}

/// [`TargetCwnd`] followed by [`SqrtP`] on the result.
#[derive(Debug, Clone, Copy)]
pub struct TargetResponse;

impl Responder for TargetResponse {
    fn respond(&self, flow: &FlowState) -> Bytes {
        let targeted = TargetCwnd.respond(flow);
        let cwnd = targeted.into_f64();
        if cwnd <= 1.0 {
            return targeted;
        }
        targeted.scale_by(1.0 - 1.0 / cwnd.sqrt())
    }
}

/// `cwnd / 2`.
#[derive(Debug, Clone, Copy)]
pub struct HalfCwnd;

impl Responder for HalfCwnd {
    fn respond(&self, flow: &FlowState) -> Bytes {
        Bytes::new(flow.cwnd().into_u64() / 2)
    }
}

/// Identity: no response.
#[derive(Debug, Clone, Copy)]
pub struct NoResponse;

impl Responder for NoResponse {
    fn respond(&self, flow: &FlowState) -> Bytes {
        flow.cwnd()
    }
}

/// Clamp a value between `lo` and `hi` using `Ord` (used by HyStart++'s
/// threshold clamp; kept here since responders are the other place small
/// numeric clamps recur).
pub(crate) fn clamp_clock(value: Clock, lo: Clock, hi: Clock) -> Clock {
    cmp::max(lo, cmp::min(hi, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FlowId;

    fn mk_flow(cwnd: Bytes, srtt: Clock, min_rtt: Clock) -> FlowState {
        let mut flow = FlowState::new(FlowId::ZERO, Bytes::new(1500), Bytes::new(10_000_000), 64);
        flow.set_cwnd(cwnd);
        flow.srtt = srtt;
        flow.min_rtt = min_rtt;
        flow
    }

    #[test]
    fn md_halves_with_m_half() {
        let flow = mk_flow(Bytes::new(100_000), Clock::from_millis(20), Clock::from_millis(20));
        let r = Md { m: 0.5 };
        assert_eq!(r.respond(&flow), Bytes::new(50_000));
    }

    #[test]
    fn no_response_is_identity() {
        let flow = mk_flow(Bytes::new(12_345), Clock::from_millis(20), Clock::from_millis(20));
        assert_eq!(NoResponse.respond(&flow), flow.cwnd());
    }

    #[test]
    fn half_cwnd_response() {
        let flow = mk_flow(Bytes::new(100_000), Clock::from_millis(20), Clock::from_millis(20));
        assert_eq!(HalfCwnd.respond(&flow), Bytes::new(50_000));
    }

    #[test]
    fn rate_fair_md_backs_off_less_for_longer_rtt() {
        let short = mk_flow(Bytes::new(100_000), Clock::from_millis(10), Clock::from_millis(10));
        let long = mk_flow(Bytes::new(100_000), Clock::from_millis(40), Clock::from_millis(10));
        let r = RateFairMd { m: 0.9, rtt0: Clock::from_millis(10), tau: 64 };
        assert!(r.respond(&long) >= r.respond(&short));
    }
}
