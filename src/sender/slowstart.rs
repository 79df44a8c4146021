//! Slow-start variants (§4.4.5): `StdSlowStart`, `HyStartPlusPlus`, `Essp`.

use std::cmp;

use crate::units::{Bytes, Clock};

use super::flow::FlowState;
use super::responder::clamp_clock;

/// The slow-start capability set. `init`/`react_to_ce`/`react_to_sce`/`grow`
/// are the required surface; `update_rtt` and `pacing_ratio` are optional
/// capabilities expressed as default no-op methods so variants that don't
/// need them (most of them) pay no extra cost or boilerplate.
pub trait SlowStart: std::fmt::Debug {
    fn init(&mut self, flow: &mut FlowState);
    /// Returns `true` if the flow should exit slow-start.
    fn react_to_ce(&mut self, flow: &mut FlowState) -> bool;
    /// Returns `true` if the flow should exit slow-start.
    fn react_to_sce(&mut self, flow: &mut FlowState) -> bool;
    /// Returns `true` if the flow should exit slow-start.
    fn grow(&mut self, acked: Bytes, flow: &mut FlowState) -> bool;

    fn update_rtt(&mut self, _rtt: Clock, _flow: &mut FlowState) {}

    /// Pacing ratio for the slow-start phase (§4.4.2); 1.0 unless overridden.
    fn pacing_ratio(&self) -> f64 {
        1.0
    }
}

/// Growth rule applied per ACK while in slow-start.
#[derive(Debug, Clone, Copy)]
pub enum GrowthMode {
    /// `+MSS` per ACK.
    Mss,
    /// `+acked` per ACK (ABC-2).
    Abc2,
    /// `+acked/2` per ACK (ABC-1.5).
    Abc15,
}

/// Standard slow-start: exits after counting `threshold` SCE marks
/// (default `Tau/2`); CE always exits immediately.
#[derive(Debug)]
pub struct StdSlowStart {
    sce_count: u32,
    threshold: u32,
    growth: GrowthMode,
    divide_by_sce_count: bool,
}

impl StdSlowStart {
    pub fn new(threshold: u32, growth: GrowthMode, divide_by_sce_count: bool) -> Self {
        Self {
            sce_count: 0,
            threshold,
            growth,
            divide_by_sce_count,
        }
    }
}

impl SlowStart for StdSlowStart {
    fn init(&mut self, _flow: &mut FlowState) {
        self.sce_count = 0;
    }

    fn react_to_ce(&mut self, _flow: &mut FlowState) -> bool {
        true
    }

    fn react_to_sce(&mut self, _flow: &mut FlowState) -> bool {
        self.sce_count += 1;
        self.sce_count >= self.threshold
    }

    fn grow(&mut self, acked: Bytes, flow: &mut FlowState) -> bool {
        let inc = match self.growth {
            GrowthMode::Mss => flow.mss,
            GrowthMode::Abc2 => acked,
            GrowthMode::Abc15 => Bytes::new(acked.into_u64() / 2),
        };
        let inc = if self.divide_by_sce_count && self.sce_count > 0 {
            Bytes::new(inc.into_u64() / u64::from(self.sce_count))
        } else {
            inc
        };
        flow.set_cwnd(flow.cwnd() + inc);
        false
    }
}

const HYSTART_MIN_THRESH: Clock = Clock::from_millis(4);
const HYSTART_MAX_THRESH: Clock = Clock::from_millis(16);

/// HyStart++ (RFC 9406): detects the end of slow-start from round-trip-time
/// growth rather than loss/ECN signals, transitions through a Conservative
/// Slow Start (CSS) phase, then exits to congestion avoidance.
#[derive(Debug)]
pub struct HyStartPlusPlus {
    last_round_min_rtt: Clock,
    current_round_min_rtt: Clock,
    round_start: Bytes,
    css_rounds: u32,
    css_rounds_done: u32,
    in_css: bool,
}

impl HyStartPlusPlus {
    pub fn new(css_rounds: u32) -> Self {
        Self {
            last_round_min_rtt: Clock::MAX,
            current_round_min_rtt: Clock::MAX,
            round_start: Bytes::ZERO,
            css_rounds,
            css_rounds_done: 0,
            in_css: false,
        }
    }
}

impl SlowStart for HyStartPlusPlus {
    fn init(&mut self, flow: &mut FlowState) {
        self.last_round_min_rtt = Clock::MAX;
        self.current_round_min_rtt = Clock::MAX;
        self.round_start = flow.seq.bytes_since(crate::units::Seq::ZERO);
        self.in_css = false;
        self.css_rounds_done = 0;
    }

    fn react_to_ce(&mut self, _flow: &mut FlowState) -> bool {
        true
    }

    fn react_to_sce(&mut self, _flow: &mut FlowState) -> bool {
        false
    }

    fn grow(&mut self, acked: Bytes, flow: &mut FlowState) -> bool {
        if self.in_css {
            // RFC 9406 ~N=4 conservative growth during CSS.
            flow.set_cwnd(flow.cwnd() + Bytes::new(acked.into_u64() / 4));
            self.css_rounds_done >= self.css_rounds
        } else {
            flow.set_cwnd(flow.cwnd() + acked);
            false
        }
    }

    fn update_rtt(&mut self, rtt: Clock, flow: &mut FlowState) {
        if rtt < self.current_round_min_rtt {
            self.current_round_min_rtt = rtt;
        }

        let received = flow.receive_next.bytes_since(crate::units::Seq::ZERO);
        if received <= self.round_start {
            return;
        }

        if self.last_round_min_rtt != Clock::MAX && !self.in_css {
            let eighth = self
                .last_round_min_rtt
                .checked_div(8)
                .unwrap_or(Clock::ZERO);
            let thresh = clamp_clock(eighth, HYSTART_MIN_THRESH, HYSTART_MAX_THRESH);
            if self.current_round_min_rtt >= self.last_round_min_rtt + thresh {
                self.in_css = true;
            }
        }
        if self.in_css {
            self.css_rounds_done += 1;
        }
        self.last_round_min_rtt = self.current_round_min_rtt;
        self.current_round_min_rtt = Clock::MAX;
        self.round_start = flow.seq.bytes_since(crate::units::Seq::ZERO);
    }
}

/// Extended Slow-Start with Pacing: growth base and pacing ratio step down
/// through a Leonardo-number sequence as the flow advances stages, giving a
/// smoother deceleration into congestion avoidance than a hard SS/CA switch.
#[derive(Debug)]
pub struct Essp {
    stage: usize,
    k: Vec<u64>,
    pacing_ratios: Vec<f64>,
    rtt_growth_threshold: f64,
}

impl Essp {
    pub fn new(stages: usize, rtt_growth_threshold: f64) -> Self {
        let stages = stages.max(1);
        let mut k = Vec::with_capacity(stages * 2);
        let (mut a, mut b) = (1u64, 1u64);
        for _ in 0..stages * 2 {
            k.push(a);
            let next = a + b + 1;
            a = b;
            b = next;
        }
        let pacing_ratios = (0..stages).map(|i| 1.0 / (i as f64 + 1.0)).collect();
        Self {
            stage: 0,
            k,
            pacing_ratios,
            rtt_growth_threshold,
        }
    }

    fn advance(&mut self) {
        if self.stage + 1 < self.pacing_ratios.len() {
            self.stage += 1;
        }
    }
}

impl SlowStart for Essp {
    fn init(&mut self, _flow: &mut FlowState) {
        self.stage = 0;
    }

    fn react_to_ce(&mut self, _flow: &mut FlowState) -> bool {
        self.advance();
        false
    }

    fn react_to_sce(&mut self, _flow: &mut FlowState) -> bool {
        self.advance();
        false
    }

    fn grow(&mut self, acked: Bytes, flow: &mut FlowState) -> bool {
        let k_stage = self.k[self.stage].max(1);
        flow.set_cwnd(flow.cwnd() + Bytes::new(acked.into_u64() / k_stage));

        if flow.min_rtt != Clock::MAX
            && flow.srtt.as_secs_f64() > flow.min_rtt.as_secs_f64() * self.rtt_growth_threshold
        {
            self.advance();
        }

        let exit_idx = cmp::min(2 * self.stage, self.k.len() - 1);
        let segments = flow.cwnd().into_u64() / flow.mss.into_u64().max(1);
        self.k[exit_idx] >= segments
    }

    fn pacing_ratio(&self) -> f64 {
        self.pacing_ratios[self.stage]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FlowId;

    fn mk_flow() -> FlowState {
        FlowState::new(FlowId::ZERO, Bytes::new(1500), Bytes::new(10_000_000), 64)
    }

    #[test]
    fn std_slow_start_exits_after_threshold_sce_marks() {
        let mut ss = StdSlowStart::new(3, GrowthMode::Mss, false);
        let mut flow = mk_flow();
        ss.init(&mut flow);
        assert!(!ss.react_to_sce(&mut flow));
        assert!(!ss.react_to_sce(&mut flow));
        assert!(ss.react_to_sce(&mut flow));
    }

    #[test]
    fn std_slow_start_exits_immediately_on_ce() {
        let mut ss = StdSlowStart::new(32, GrowthMode::Mss, false);
        let mut flow = mk_flow();
        assert!(ss.react_to_ce(&mut flow));
    }

    #[test]
    fn essp_stage_advances_on_ce() {
        let mut ss = Essp::new(8, 1.5);
        let mut flow = mk_flow();
        ss.init(&mut flow);
        let first_ratio = ss.pacing_ratio();
        ss.react_to_ce(&mut flow);
        assert!(ss.pacing_ratio() <= first_ratio);
    }
}
