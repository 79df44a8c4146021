//! Per-flow sender state (§3 "Flow state", owned by sender).
//!
//! Grounded in the teacher's `flow.rs::Flow`: a plain struct holding every
//! piece of mutable per-flow accounting, with every congestion-relevant
//! mutation routed through a small setter (`set_cwnd`) rather than direct
//! field assignment, the way the teacher computes `new_rate` before
//! `cmp::max(self.min_rate, new_rate)`.

use std::cmp;
use std::collections::VecDeque;

use crate::packet::{FlowId, Packet};
use crate::units::{Bitrate, Bytes, Clock, Seq};

/// A flow's position in the slow-start / congestion-avoidance state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derivative::Derivative)]
#[derivative(Default)]
pub(crate) enum Phase {
    #[derivative(Default)]
    SlowStart,
    CongestionAvoidance,
}

/// Everything the sender tracks for one flow between ACKs.
#[derive(Debug, Clone)]
pub(crate) struct FlowState {
    pub(crate) id: FlowId,
    pub(crate) mss: Bytes,
    pub(crate) ecn_capable: bool,
    pub(crate) sce_capable: bool,
    pub(crate) pacing_enabled: bool,
    pub(crate) active: bool,
    pub(crate) started: bool,
    pub(crate) pacing_wait: bool,

    pub(crate) bytes_total: Bytes,
    pub(crate) seq: Seq,
    pub(crate) inflight: Bytes,
    cwnd: Bytes,
    pub(crate) pacing_rate: Bitrate,
    pub(crate) phase: Phase,
    pub(crate) signal_next: Seq,

    pub(crate) now: Clock,
    pub(crate) rtt: Clock,
    pub(crate) srtt: Clock,
    pub(crate) min_rtt: Clock,
    pub(crate) max_rtt: Clock,

    pub(crate) receive_next: Seq,

    window_samples: VecDeque<(Clock, Bytes)>,
    sce_ring: VecDeque<Clock>,
    tau: u32,
    rtt_alpha: f64,
}

const CWND_FLOOR_SEGMENTS: u64 = 2;
/// Default RTT EWMA gain, §6's `RTTAlpha`; `Config::rtt_alpha` may override
/// it per run.
pub(crate) const DEFAULT_RTT_ALPHA: f64 = 0.125;

impl FlowState {
    pub(crate) fn new(id: FlowId, mss: Bytes, bytes_total: Bytes, tau: u32) -> Self {
        Self::with_rtt_alpha(id, mss, bytes_total, tau, DEFAULT_RTT_ALPHA)
    }

    pub(crate) fn with_rtt_alpha(
        id: FlowId,
        mss: Bytes,
        bytes_total: Bytes,
        tau: u32,
        rtt_alpha: f64,
    ) -> Self {
        Self {
            id,
            mss,
            ecn_capable: false,
            sce_capable: false,
            pacing_enabled: false,
            active: false,
            started: false,
            pacing_wait: false,
            bytes_total,
            seq: Seq::ZERO,
            inflight: Bytes::ZERO,
            cwnd: Bytes::new(mss.into_u64() * CWND_FLOOR_SEGMENTS),
            pacing_rate: Bitrate::ZERO,
            phase: Phase::SlowStart,
            // No reaction has happened yet, so nothing should be gated;
            // use the minimum representable sequence rather than `ZERO` so
            // the very first CE/SCE reaction (at `receive_next == ZERO`)
            // isn't suppressed by a gate that hasn't actually fired.
            signal_next: Seq::new(i64::MIN),
            now: Clock::ZERO,
            rtt: Clock::ZERO,
            srtt: Clock::ZERO,
            min_rtt: Clock::MAX,
            max_rtt: Clock::ZERO,
            receive_next: Seq::ZERO,
            window_samples: VecDeque::new(),
            sce_ring: VecDeque::new(),
            tau: tau.max(1),
            rtt_alpha,
        }
    }

    pub(crate) fn cwnd(&self) -> Bytes {
        self.cwnd
    }

    /// The only path by which `cwnd` may change; enforces the §4.4.4 floor
    /// of `2 * MSS` on every assignment.
    pub(crate) fn set_cwnd(&mut self, cwnd: Bytes) {
        let floor = Bytes::new(self.mss.into_u64() * CWND_FLOOR_SEGMENTS);
        self.cwnd = cmp::max(floor, cwnd);
    }

    pub(crate) fn bytes_left(&self) -> Bytes {
        self.bytes_total.saturating_sub(self.seq.bytes_since(Seq::ZERO))
    }

    pub(crate) fn usable_window(&self) -> Bytes {
        self.cwnd.saturating_sub(self.inflight)
    }

    /// Record a point sample for the CWND-targeting responders' sliding
    /// window, then drop samples older than one `srtt`.
    pub(crate) fn record_sample(&mut self, now: Clock) {
        self.window_samples.push_back((now, self.inflight));
        let horizon = now.saturating_sub(self.srtt);
        while let Some(&(t, _)) = self.window_samples.front() {
            if t < horizon {
                self.window_samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// The `inflight` value as of approximately `now - srtt`, for
    /// `TargetCwnd`-style responders. Falls back to the oldest retained
    /// sample, or current `inflight` if the window is empty.
    pub(crate) fn inflight_one_srtt_ago(&self) -> Bytes {
        self.window_samples
            .front()
            .map(|&(_, bytes)| bytes)
            .unwrap_or(self.inflight)
    }

    /// Attempt to record an SCE response at `now`, gated by the Tau-sized,
    /// srtt-windowed ring buffer of §4.4.3. Returns `false` (and leaves the
    /// ring unchanged) if the flow has already responded to SCE `tau` times
    /// within the last `srtt`.
    pub(crate) fn try_record_sce_response(&mut self, now: Clock) -> bool {
        let horizon = now.saturating_sub(self.srtt);
        while let Some(&t) = self.sce_ring.front() {
            if t < horizon {
                self.sce_ring.pop_front();
            } else {
                break;
            }
        }
        if self.sce_ring.len() >= self.tau as usize {
            tracing::warn!(flow = ?self.id, tau = self.tau, "sce ring saturated within one srtt");
            return false;
        }
        self.sce_ring.push_back(now);
        true
    }

    /// Update RTT statistics from a fresh (non-delayed) ACK sample.
    pub(crate) fn update_rtt_sample(&mut self, rtt: Clock) {
        self.rtt = rtt;
        self.srtt = if self.srtt == Clock::ZERO {
            rtt
        } else {
            let alpha = self.rtt_alpha;
            Clock::from_secs_f64(
                (1.0 - alpha) * self.srtt.as_secs_f64() + alpha * rtt.as_secs_f64(),
            )
        };
        self.min_rtt = cmp::min(self.min_rtt, rtt);
        self.max_rtt = cmp::max(self.max_rtt, rtt);
    }

    /// Whether a CE/SCE reaction is currently gated per §4.4.3's per-RTT
    /// signal gate.
    pub(crate) fn signal_gated(&self) -> bool {
        self.receive_next <= self.signal_next
    }

    /// Arm the per-RTT signal gate so the next reaction requires another
    /// RTT of data to have been transmitted.
    pub(crate) fn arm_signal_gate(&mut self) {
        self.signal_next = self.seq;
    }

    /// Derive a pacing rate from the current `cwnd`/`srtt`, for CCAs that
    /// start in implicit-pacing mode before switching to explicit pacing.
    pub(crate) fn implicit_pacing_rate(&self) -> Bitrate {
        if self.srtt == Clock::ZERO {
            return Bitrate::ZERO;
        }
        Bitrate::new(((self.cwnd.into_f64() * 8e9) / self.srtt.as_secs_f64().max(1e-9)) as i64)
    }

    /// Whether the flow currently has more to send: either it hasn't sent
    /// its opening SYN yet, or it has remaining bytes and window room.
    pub(crate) fn can_send(&self) -> bool {
        if !self.started {
            return true;
        }
        self.bytes_left() > Bytes::ZERO && self.usable_window() > Bytes::ZERO
    }

    /// Build the next packet to transmit: a header-only SYN the first time,
    /// otherwise a data segment sized to the lesser of remaining bytes, MSS,
    /// and the usable window (§4.4.2).
    pub(crate) fn next_packet(&mut self, now: Clock) -> Packet {
        if !self.started {
            self.started = true;
            return Packet::builder()
                .flow(self.id)
                .seq(self.seq)
                .len(Bytes::ZERO)
                .syn(true)
                .ecn_capable(self.ecn_capable)
                .sce_capable(self.sce_capable)
                .sent(now)
                .build();
        }

        let payload = cmp::min(cmp::min(self.bytes_left(), self.mss), self.usable_window());
        assert!(payload > Bytes::ZERO, "next_packet called with no sendable bytes");
        let seq = self.seq;
        self.seq = self.seq.advance(payload);
        self.inflight += payload;
        Packet::builder()
            .flow(self.id)
            .seq(seq)
            .len(payload)
            .ecn_capable(self.ecn_capable)
            .sce_capable(self.sce_capable)
            .sent(now)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_flow() -> FlowState {
        FlowState::new(FlowId::ZERO, Bytes::new(1500), Bytes::new(1_000_000), 64)
    }

    #[test]
    fn cwnd_floor_is_enforced() {
        let mut flow = mk_flow();
        flow.set_cwnd(Bytes::ZERO);
        assert_eq!(flow.cwnd(), Bytes::new(3000));
    }

    #[test]
    fn sce_ring_rejects_past_tau_within_one_srtt() {
        let mut flow = mk_flow();
        flow.srtt = Clock::from_millis(20);
        flow.tau = 3;
        let mut now = Clock::ZERO;
        let mut accepted = 0;
        for _ in 0..5 {
            if flow.try_record_sce_response(now) {
                accepted += 1;
            }
            now += Clock::from_millis(1);
        }
        assert_eq!(accepted, 3);
    }

    #[test]
    fn sce_ring_admits_again_after_srtt_elapses() {
        let mut flow = mk_flow();
        flow.srtt = Clock::from_millis(10);
        flow.tau = 1;
        assert!(flow.try_record_sce_response(Clock::ZERO));
        assert!(!flow.try_record_sce_response(Clock::from_millis(1)));
        assert!(flow.try_record_sce_response(Clock::from_millis(11)));
    }
}
