//! A deterministic, single-threaded discrete-event network simulator for
//! studying ECN/SCE-based congestion control over a single bottleneck link.
//!
//! The ring is `Sender -> Iface -> Delay -> Receiver -> (ack path back to
//! Sender)`, driven by [`scheduler::Scheduler`]. [`Config`] describes one
//! run as data; [`run`] assembles the ring from it and drives it to
//! completion.

pub mod aqm;
pub mod scheduler;
pub mod units;

mod config;
mod delay;
mod error;
mod iface;
mod packet;
mod receiver;
mod sender;
mod trace;

pub use config::{
    AqmConfig, CcaKind, Config, ConfigBuilder, FlowConfig, FlowConfigBuilder, GrowthModeKind,
    ResponderKind, SlowStartKind, run,
};
pub use error::Error;
pub use packet::{FlowId, Packet};
pub use trace::{CsvTraceSink, NullTraceSink, Series, TraceConfig, TraceRow, TraceSink, Tracer};
