//! The shared DelTiC delta-sigma control loop (§4.7.1).
//!
//! One [`DeltaSigma`] instance tracks the accumulator/oscillator state for a
//! single target sojourn time. Concrete AQMs own one or more instances (one
//! per independent target for plain DelTiC; one shared accumulator feeding
//! two oscillators for the MD-Scaling variants) and decide what a firing
//! oscillator means.

use crate::units::Clock;

const ONE_SECOND_NS: f64 = 1_000_000_000.0;

/// Result of one [`DeltaSigma::step`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepOutput {
    /// The oscillator increment `i` to add to the caller's oscillator.
    pub(crate) increment: f64,
    /// Set when the accumulator underflowed this step; the caller must
    /// zero its own oscillator, not just add `increment` (which is `0.0`
    /// either way).
    pub(crate) reset_osc: bool,
}

/// A single delta-sigma control loop over queue sojourn time.
#[derive(Debug, Clone)]
pub(crate) struct DeltaSigma {
    target_ns: f64,
    resonance: f64,
    acc: f64,
    prior_sojourn_ns: f64,
    prior_time: Clock,
    primed: bool,
    last_delta: f64,
    last_sigma: f64,
}

impl DeltaSigma {
    pub(crate) fn new(target: Clock) -> Self {
        let target_ns = target.into_nanos() as f64;
        assert!(target_ns > 0.0, "DeltaSigma target must be positive");
        Self {
            target_ns,
            resonance: ONE_SECOND_NS / target_ns,
            acc: 0.0,
            prior_sojourn_ns: 0.0,
            prior_time: Clock::ZERO,
            primed: false,
            last_delta: 0.0,
            last_sigma: 0.0,
        }
    }

    pub(crate) fn target(&self) -> Clock {
        Clock::new(self.target_ns as i64)
    }

    pub(crate) fn acc(&self) -> f64 {
        self.acc
    }

    pub(crate) fn delta(&self) -> f64 {
        self.last_delta
    }

    pub(crate) fn sigma(&self) -> f64 {
        self.last_sigma
    }

    /// Run the accumulator update for one dequeue with the given sojourn
    /// time (or any equivalent error signal a variant substitutes for it,
    /// e.g. DelTiM's sojourn-down-to-one-packet). Returns the per-update
    /// oscillator increment `i` alongside whether the accumulator
    /// underflowed this step — spec.md's `if acc < 0: acc <- 0; osc <- 0`
    /// resets the caller's oscillator too, so that reset has to be handed
    /// back rather than inferred from `increment` alone.
    pub(crate) fn step(&mut self, now: Clock, sojourn: Clock) -> StepOutput {
        let sojourn_ns = sojourn.into_nanos() as f64;
        let mut dt = if self.primed {
            (now - self.prior_time).into_nanos() as f64
        } else {
            self.primed = true;
            0.0
        };
        if dt > ONE_SECOND_NS {
            if sojourn_ns < self.target_ns {
                dt = 0.0;
                self.acc = 0.0;
            } else {
                dt = ONE_SECOND_NS;
            }
        }
        let delta = sojourn_ns - self.prior_sojourn_ns;
        let sigma = (sojourn_ns - self.target_ns) * dt / ONE_SECOND_NS;
        self.last_delta = delta;
        self.last_sigma = sigma;
        self.prior_sojourn_ns = sojourn_ns;
        self.prior_time = now;

        self.acc += (delta + sigma) * self.resonance;
        if self.acc < 0.0 {
            self.acc = 0.0;
            return StepOutput {
                increment: 0.0,
                reset_osc: true,
            };
        }

        let increment = if sojourn_ns >= self.target_ns / 2.0 {
            (self.acc * dt / ONE_SECOND_NS) * self.resonance
        } else {
            0.0
        };
        StepOutput {
            increment,
            reset_osc: false,
        }
    }

    /// Overload relief: shed 1/16th of the accumulator. Called by a
    /// variant's oscillator when it has fired more than once in a single
    /// update (sustained overload).
    pub(crate) fn relieve_overload(&mut self) {
        self.acc -= self.acc / 16.0;
    }

    /// Scale the accumulator by a utilization factor, used by DelTiM to
    /// prevent overmarking after an idle period (§4.7.3).
    pub(crate) fn scale_acc(&mut self, factor: f64) {
        self.acc *= factor;
    }
}
