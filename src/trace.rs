//! Trace sinks (§6): a pluggable output for the per-run time series the
//! simulator can emit (inflight, cwnd, rtt, pacing, sojourn, qlen,
//! deltaSigma, marks, goodput).
//!
//! Grounded in the teacher's `Record` (`data.rs`): a plain, `Debug`-only
//! value struct with no behavior of its own, here wrapped by a sink trait
//! since there are many series instead of one end-of-flow summary.

use std::io::Write;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::packet::FlowId;
use crate::units::Clock;

/// Which named series a [`TraceRow`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    Inflight,
    Cwnd,
    Rtt,
    Pacing,
    Sojourn,
    Qlen,
    DeltaSigma,
    Marks,
    Goodput,
}

impl Series {
    fn label(self) -> &'static str {
        match self {
            Series::Inflight => "inflight",
            Series::Cwnd => "cwnd",
            Series::Rtt => "rtt",
            Series::Pacing => "pacing",
            Series::Sojourn => "sojourn",
            Series::Qlen => "qlen",
            Series::DeltaSigma => "deltaSigma",
            Series::Marks => "marks",
            Series::Goodput => "goodput",
        }
    }
}

/// One sample: a series, an optional owning flow, a time, and a value.
#[derive(Debug, Clone, Copy)]
pub struct TraceRow {
    pub series: Series,
    pub flow: Option<FlowId>,
    pub time: Clock,
    pub value: f64,
}

/// A destination for trace rows.
pub trait TraceSink {
    fn record(&mut self, row: TraceRow) -> Result<(), Error>;
}

/// Writes `time_seconds,value,color` lines to any [`Write`]r. `color` is a
/// per-series-per-flow label; the exact textual format is
/// implementation-defined (§6).
#[derive(Debug)]
pub struct CsvTraceSink<W: Write> {
    out: W,
}

impl<W: Write> CsvTraceSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> TraceSink for CsvTraceSink<W> {
    fn record(&mut self, row: TraceRow) -> Result<(), Error> {
        let color = match row.flow {
            Some(id) => format!("{}-{}", row.series.label(), id.into_usize()),
            None => row.series.label().to_string(),
        };
        writeln!(self.out, "{},{},{}", row.time.as_secs_f64(), row.value, color)?;
        Ok(())
    }
}

/// Discards every row; used for series a `Config` leaves disabled.
#[derive(Debug, Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn record(&mut self, _row: TraceRow) -> Result<(), Error> {
        Ok(())
    }
}

/// Per-series enable/decimation configuration (§6): `None` disables a
/// series entirely, `Some(period)` emits at most one sample per `period`
/// of virtual time (per distinct flow, for per-flow series).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    pub inflight: Option<Clock>,
    pub cwnd: Option<Clock>,
    pub rtt: Option<Clock>,
    pub pacing: Option<Clock>,
    pub sojourn: Option<Clock>,
    pub qlen: Option<Clock>,
    pub delta_sigma: Option<Clock>,
    pub marks: Option<Clock>,
    pub goodput: Option<Clock>,
}

impl TraceConfig {
    fn period_for(&self, series: Series) -> Option<Clock> {
        match series {
            Series::Inflight => self.inflight,
            Series::Cwnd => self.cwnd,
            Series::Rtt => self.rtt,
            Series::Pacing => self.pacing,
            Series::Sojourn => self.sojourn,
            Series::Qlen => self.qlen,
            Series::DeltaSigma => self.delta_sigma,
            Series::Marks => self.marks,
            Series::Goodput => self.goodput,
        }
    }
}

/// Applies a [`TraceConfig`]'s decimation to rows before handing them to a
/// [`TraceSink`]. Shared by every stage that emits trace rows, so the
/// per-(series, flow) "last emitted" bookkeeping lives in one place.
pub struct Tracer<'a> {
    sink: Box<dyn TraceSink + 'a>,
    config: TraceConfig,
    last_emitted: FxHashMap<(Series, Option<FlowId>), Clock>,
}

impl<'a> Tracer<'a> {
    pub fn new(sink: Box<dyn TraceSink + 'a>, config: TraceConfig) -> Self {
        Self {
            sink,
            config,
            last_emitted: FxHashMap::default(),
        }
    }

    /// Record `value` for `series`/`flow` at `now`, unless the series is
    /// disabled or its decimation period hasn't elapsed since the last
    /// emitted sample for this (series, flow) pair.
    pub fn maybe_record(
        &mut self,
        series: Series,
        flow: Option<FlowId>,
        now: Clock,
        value: f64,
    ) -> Result<(), Error> {
        let Some(period) = self.config.period_for(series) else {
            return Ok(());
        };
        let key = (series, flow);
        let due = match self.last_emitted.get(&key) {
            Some(&last) => now.saturating_sub(last) >= period,
            None => true,
        };
        if due {
            self.sink.record(TraceRow { series, flow, time: now, value })?;
            self.last_emitted.insert(key, now);
        }
        Ok(())
    }
}
