//! The public configuration surface (§6): a serializable `Config` plus the
//! factory that turns it into a running [`Scheduler`].
//!
//! Grounded in the teacher's `driver.rs::Config`/`run`: a `typed_builder`
//! struct holding every run parameter, consumed by a free `run` function
//! that assembles the pieces it describes — generalized from a single
//! `Bottleneck`/`Workload` pair to the four-stage ring and its pluggable
//! AQM/slow-start/CCA/responder plug-ins, the way `Source::flow_arrive`
//! turns a `FlowDesc` (plain, serializable data) into a live `Flow`.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::aqm::{Aqm, Brickwall, DelTiC, DelTiCMds, DelTiM, Ramp};
use crate::delay::Delay;
use crate::error::Error;
use crate::iface::Iface;
use crate::packet::FlowId;
use crate::receiver::Receiver;
use crate::scheduler::{Scheduler, Stage};
use crate::sender::cca::{self, Cca};
use crate::sender::flow::FlowState;
use crate::sender::responder::{self, Responder};
use crate::sender::slowstart::{self, GrowthMode, SlowStart};
use crate::sender::{FlowRuntime, Sender};
use crate::trace::{Tracer, TraceConfig, TraceSink};
use crate::units::{Bitrate, Bytes, Clock};

type SharedTracer<'a> = Rc<RefCell<Tracer<'a>>>;

/// Which slow-start variant a flow uses (§4.4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GrowthModeKind {
    Mss,
    Abc2,
    Abc15,
}

impl From<&GrowthModeKind> for GrowthMode {
    fn from(kind: &GrowthModeKind) -> Self {
        match kind {
            GrowthModeKind::Mss => GrowthMode::Mss,
            GrowthModeKind::Abc2 => GrowthMode::Abc2,
            GrowthModeKind::Abc15 => GrowthMode::Abc15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SlowStartKind {
    Std {
        threshold: u32,
        growth: GrowthModeKind,
        divide_by_sce_count: bool,
    },
    HyStartPlusPlus {
        css_rounds: u32,
    },
    Essp {
        stages: usize,
        rtt_growth_threshold: f64,
    },
}

fn build_slow_start(kind: &SlowStartKind) -> Box<dyn SlowStart> {
    match kind {
        SlowStartKind::Std {
            threshold,
            growth,
            divide_by_sce_count,
        } => Box::new(slowstart::StdSlowStart::new(
            *threshold,
            growth.into(),
            *divide_by_sce_count,
        )),
        SlowStartKind::HyStartPlusPlus { css_rounds } => {
            Box::new(slowstart::HyStartPlusPlus::new(*css_rounds))
        }
        SlowStartKind::Essp {
            stages,
            rtt_growth_threshold,
        } => Box::new(slowstart::Essp::new(*stages, *rtt_growth_threshold)),
    }
}

/// Which [`Responder`] a flow's slow-start exit or SCE reaction uses (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponderKind {
    Md { m: f64 },
    RateFairMd { m: f64, rtt0: Clock, tau: u32 },
    HybridFairMd { m: f64, rtt0: Clock, tau: u32 },
    SqrtP,
    TargetCwnd,
    TargetResponse,
    HalfCwnd,
    NoResponse,
}

fn build_responder(kind: &ResponderKind) -> Box<dyn Responder> {
    match *kind {
        ResponderKind::Md { m } => Box::new(responder::Md { m }),
        ResponderKind::RateFairMd { m, rtt0, tau } => {
            Box::new(responder::RateFairMd { m, rtt0, tau })
        }
        ResponderKind::HybridFairMd { m, rtt0, tau } => {
            Box::new(responder::HybridFairMd { m, rtt0, tau })
        }
        ResponderKind::SqrtP => Box::new(responder::SqrtP),
        ResponderKind::TargetCwnd => Box::new(responder::TargetCwnd),
        ResponderKind::TargetResponse => Box::new(responder::TargetResponse),
        ResponderKind::HalfCwnd => Box::new(responder::HalfCwnd),
        ResponderKind::NoResponse => Box::new(responder::NoResponse),
    }
}

/// Which [`Cca`] a flow uses once it leaves slow-start (§4.4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CcaKind {
    Reno {
        beta_ce: f64,
        responder: ResponderKind,
    },
    Cubic {
        c: f64,
        beta: f64,
        fast_convergence: bool,
        responder: ResponderKind,
    },
    Scalable {
        alpha: f64,
        beta: f64,
        responder: ResponderKind,
    },
    Maslo,
}

fn build_cca(kind: &CcaKind) -> Box<dyn Cca> {
    match kind {
        CcaKind::Reno { beta_ce, responder } => {
            Box::new(cca::Reno::new(*beta_ce, build_responder(responder)))
        }
        CcaKind::Cubic {
            c,
            beta,
            fast_convergence,
            responder,
        } => Box::new(cca::Cubic::new(
            *c,
            *beta,
            *fast_convergence,
            build_responder(responder),
        )),
        CcaKind::Scalable { alpha, beta, responder } => {
            Box::new(cca::Scalable::new(*alpha, *beta, build_responder(responder)))
        }
        CcaKind::Maslo => Box::new(cca::Maslo::new()),
    }
}

/// One flow's capability/plug-in selection (§6). `bytes_total` is the
/// flow's total payload; everything else selects pluggable behavior.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct FlowConfig {
    #[builder(setter(into))]
    pub bytes_total: Bytes,
    #[builder(default = true)]
    pub ecn_capable: bool,
    #[builder(default = true)]
    pub sce_capable: bool,
    #[builder(default = true)]
    pub pacing: bool,
    #[builder(default = true)]
    pub active: bool,
    #[builder(default = 1.0)]
    pub ca_pacing_ratio: f64,
    pub slow_start: SlowStartKind,
    pub slow_start_exit: ResponderKind,
    pub cca: CcaKind,
}

fn build_flow(id: FlowId, cfg: &FlowConfig, mss: Bytes, iw: Bytes, rtt_alpha: f64, tau: u32) -> FlowRuntime {
    let mut state = FlowState::with_rtt_alpha(id, mss, cfg.bytes_total, tau, rtt_alpha);
    state.ecn_capable = cfg.ecn_capable;
    state.sce_capable = cfg.sce_capable;
    state.pacing_enabled = cfg.pacing;
    state.active = cfg.active;
    state.set_cwnd(iw);
    FlowRuntime {
        state,
        slow_start: build_slow_start(&cfg.slow_start),
        slow_start_exit: build_responder(&cfg.slow_start_exit),
        cca: build_cca(&cfg.cca),
        ca_pacing_ratio: cfg.ca_pacing_ratio,
    }
}

/// Which AQM variant the bottleneck interface runs, and its parameters
/// (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AqmConfig {
    DelTiC {
        sce_target: Clock,
        ce_target: Clock,
        drop_target: Clock,
    },
    DelTiCMds {
        target: Clock,
        tau: u32,
    },
    DelTiM {
        target: Clock,
        tau: u32,
        idle_window: Clock,
        burst_window: Option<Clock>,
    },
    Brickwall {
        sce_target: Clock,
        ce_target: Clock,
        drop_target: Clock,
    },
    Ramp {
        min_ramp: Clock,
        max_ramp: Clock,
        tau: u32,
        seed: u64,
    },
}

impl AqmConfig {
    fn build(&self) -> Box<dyn Aqm> {
        match *self {
            AqmConfig::DelTiC {
                sce_target,
                ce_target,
                drop_target,
            } => Box::new(DelTiC::new(sce_target, ce_target, drop_target)),
            AqmConfig::DelTiCMds { target, tau } => Box::new(DelTiCMds::new(target, tau)),
            AqmConfig::DelTiM {
                target,
                tau,
                idle_window,
                burst_window,
            } => Box::new(DelTiM::new(target, tau, idle_window, burst_window)),
            AqmConfig::Brickwall {
                sce_target,
                ce_target,
                drop_target,
            } => Box::new(Brickwall::new(sce_target, ce_target, drop_target)),
            AqmConfig::Ramp {
                min_ramp,
                max_ramp,
                tau,
                seed,
            } => Box::new(Ramp::new(min_ramp, max_ramp, tau, seed)),
        }
    }
}

/// A complete, serializable run description (§6). `ConfigBuilder` is
/// generated by `typed_builder`; every field but `flows` and `aqm` has a
/// sensible default so a minimal config only needs to name its flows and
/// bottleneck AQM.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Config {
    pub duration: Clock,
    pub flows: Vec<FlowConfig>,
    pub flow_delay: Vec<Clock>,
    pub initial_rate: Bitrate,
    #[builder(default)]
    pub rate_schedule: Vec<(Clock, Bitrate)>,
    pub aqm: AqmConfig,
    /// Maximum number of undequeued packets the interface admits (§4.2's
    /// `HardQueueLen`), not a byte count.
    #[builder(default)]
    pub queue_hard_limit: usize,
    #[builder(default)]
    pub traces: TraceConfig,
    #[builder(default = Clock::from_millis(1))]
    pub delayed_ack_time: Clock,
    #[builder(default = true)]
    pub quick_ack_signal: bool,
    #[builder(default = Bytes::new(1500))]
    pub mss: Bytes,
    #[builder(default = Bytes::new(3000))]
    pub iw: Bytes,
    #[builder(default = crate::sender::flow::DEFAULT_RTT_ALPHA)]
    pub rtt_alpha: f64,
    #[builder(default = 8)]
    pub tau: u32,
}

impl Config {
    /// A small, fully self-contained example run: one Reno flow over
    /// DelTiM, no link congestion beyond a 5ms target. Used by the binary
    /// target and as a smoke-test fixture.
    pub fn example() -> Self {
        Config::builder()
            .duration(Clock::from_secs_f64(10.0))
            .traces(TraceConfig {
                cwnd: Some(Clock::from_millis(10)),
                rtt: Some(Clock::from_millis(10)),
                qlen: Some(Clock::from_millis(10)),
                ..Default::default()
            })
            .flows(vec![FlowConfig::builder()
                .bytes_total(Bytes::new(50_000_000))
                .slow_start(SlowStartKind::Std {
                    threshold: 32,
                    growth: GrowthModeKind::Mss,
                    divide_by_sce_count: false,
                })
                .slow_start_exit(ResponderKind::HalfCwnd)
                .cca(CcaKind::Reno {
                    beta_ce: 0.5,
                    responder: ResponderKind::Md { m: 0.9 },
                })
                .build()])
            .flow_delay(vec![Clock::from_millis(10)])
            .initial_rate(Bitrate::from_mbps(100))
            .queue_hard_limit(7_000)
            .aqm(AqmConfig::DelTiM {
                target: Clock::from_millis(5),
                tau: 8,
                idle_window: Clock::from_millis(100),
                burst_window: None,
            })
            .build()
    }
}

/// Assemble a [`Scheduler`] from `cfg` and run it to completion, writing
/// enabled trace series to `sink`.
pub fn run<'a>(cfg: Config, sink: Box<dyn TraceSink + 'a>) -> Result<(), Error> {
    let flow_count = cfg.flows.len();
    let flows: Vec<FlowRuntime> = cfg
        .flows
        .iter()
        .enumerate()
        .map(|(i, fc)| build_flow(FlowId::new(i), fc, cfg.mss, cfg.iw, cfg.rtt_alpha, cfg.tau))
        .collect();

    let tracer: SharedTracer<'a> = Rc::new(RefCell::new(Tracer::new(sink, cfg.traces)));

    let sender = Sender::with_tracer(flows, cfg.duration, Rc::clone(&tracer));
    let iface = Iface::with_tracer(
        cfg.aqm.build(),
        cfg.initial_rate,
        cfg.queue_hard_limit,
        cfg.rate_schedule,
        Rc::clone(&tracer),
    );
    let delay = Delay::new(cfg.flow_delay);
    let receiver = Receiver::new(flow_count, cfg.delayed_ack_time, cfg.quick_ack_signal);

    let stages: Vec<Box<dyn Stage + 'a>> = vec![
        Box::new(sender),
        Box::new(iface),
        Box::new(delay),
        Box::new(receiver),
    ];
    Scheduler::new(stages).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::NullTraceSink;

    #[test]
    fn example_config_runs_to_completion() {
        let cfg = Config::example();
        assert!(run(cfg, Box::new(NullTraceSink)).is_ok());
    }

    #[test]
    fn hard_limit_of_zero_is_immediately_fatal() {
        let mut cfg = Config::example();
        cfg.queue_hard_limit = 0;
        assert!(run(cfg, Box::new(NullTraceSink)).is_err());
    }
}
