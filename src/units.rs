//! Simulation units: virtual time, byte counts, bitrates, and sequence
//! numbers.
//!
//! Every type here is a thin newtype following the teacher's `unit!` macro
//! idiom: cheap `Copy` values with `derive_more` arithmetic and explicit,
//! named conversions rather than implicit numeric coercions.

use crate::error::Error;

macro_rules! unsigned_unit {
    ($name:ident) => {
        #[allow(missing_docs)]
        #[derive(
            Debug,
            Default,
            Copy,
            Clone,
            PartialOrd,
            Ord,
            PartialEq,
            Eq,
            Hash,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::Display,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            /// Equivalent to `Self::new(0)`.
            pub const ZERO: $name = Self::new(0);
            /// Equivalent to `Self::new(u64::MAX)`.
            pub const MAX: $name = Self::new(u64::MAX);

            /// Create a new value from a raw count.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Convert into the raw `u64`.
            pub const fn into_u64(self) -> u64 {
                self.0
            }

            /// Convert into `f64` for use in fractional arithmetic.
            pub const fn into_f64(self) -> f64 {
                self.0 as f64
            }

            /// Convert into `usize` for indexing.
            pub const fn into_usize(self) -> usize {
                self.0 as usize
            }

            /// Scale by a floating-point factor, rounding to the nearest unit.
            pub fn scale_by(self, by: f64) -> Self {
                Self((self.0 as f64 * by).round() as u64)
            }

            /// Saturating subtraction.
            pub const fn saturating_sub(self, rhs: Self) -> Self {
                Self(self.0.saturating_sub(rhs.0))
            }

            /// Saturating addition.
            pub const fn saturating_add(self, rhs: Self) -> Self {
                Self(self.0.saturating_add(rhs.0))
            }
        }
    };
}

unsigned_unit!(Bytes);

impl Bytes {
    /// Turn a packet count into a byte count at the given MSS.
    pub fn from_segments(segments: u64, mss: Bytes) -> Self {
        Self(segments * mss.0)
    }
}

/// Virtual-nanosecond clock value, signed per the data model so that deltas
/// (which are ordinary [`Clock`] values here, not a distinct type) can be
/// negative during intermediate computation.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Clock(i64);

impl Clock {
    /// The zero instant / zero duration.
    pub const ZERO: Clock = Self::new(0);
    /// The largest representable instant.
    pub const MAX: Clock = Self::new(i64::MAX);
    /// One second, expressed in nanoseconds.
    pub const SECOND: Clock = Self::new(1_000_000_000);

    /// Construct a clock value from a raw nanosecond count.
    pub const fn new(ns: i64) -> Self {
        Self(ns)
    }

    /// Construct from a millisecond count.
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * 1_000_000)
    }

    /// Construct from a microsecond count.
    pub const fn from_micros(us: i64) -> Self {
        Self(us * 1_000)
    }

    /// Construct from a (fractional) second count.
    pub fn from_secs_f64(s: f64) -> Self {
        Self((s * 1e9).round() as i64)
    }

    /// Raw nanosecond count.
    pub const fn into_nanos(self) -> i64 {
        self.0
    }

    /// Value in (fractional) milliseconds, for trace emission.
    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Value in (fractional) seconds, for trace emission.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Checked addition; returns [`Error::ClockOverflow`] on `i64` overflow.
    pub fn checked_add(self, rhs: Clock) -> Result<Clock, Error> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(Error::ClockOverflow)
    }

    /// Checked subtraction; returns [`Error::ClockOverflow`] on `i64`
    /// overflow.
    pub fn checked_sub(self, rhs: Clock) -> Result<Clock, Error> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(Error::ClockOverflow)
    }

    /// Saturating subtraction, clamped at [`Clock::ZERO`]. Used for sojourn
    /// and elapsed-time computations where a negative result would indicate
    /// a scheduling bug rather than a meaningful duration.
    pub fn saturating_sub(self, rhs: Clock) -> Clock {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }

    /// The scaled-multiply primitive used throughout the control loops:
    /// `a ⊗ b = a·b / 1e9`, so that the product of two time-like values
    /// remains a time-like value. Uses an `i128` intermediate to avoid
    /// overflow, per the design notes.
    pub fn scaled_mul(self, rhs: Clock) -> Clock {
        let product = i128::from(self.0) * i128::from(rhs.0);
        let scaled = product / 1_000_000_000;
        Self(scaled as i64)
    }

    /// Divide by a plain integer.
    pub fn checked_div(self, rhs: i64) -> Option<Clock> {
        if rhs == 0 {
            None
        } else {
            Some(Self(self.0 / rhs))
        }
    }
}

impl std::ops::Add for Clock {
    type Output = Clock;
    fn add(self, rhs: Clock) -> Clock {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Clock {
    type Output = Clock;
    fn sub(self, rhs: Clock) -> Clock {
        Self(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Clock {
    fn add_assign(&mut self, rhs: Clock) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Clock {
    fn sub_assign(&mut self, rhs: Clock) {
        self.0 -= rhs.0;
    }
}

impl std::ops::Neg for Clock {
    type Output = Clock;
    fn neg(self) -> Clock {
        Self(-self.0)
    }
}

/// Bits-per-second bitrate. Signed per the data model.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
    Hash,
    derive_more::Add,
    derive_more::Sub,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Bitrate(i64);

impl Bitrate {
    /// Zero bitrate.
    pub const ZERO: Bitrate = Self::new(0);

    /// Construct from a raw bits-per-second count.
    pub const fn new(bps: i64) -> Self {
        Self(bps)
    }

    /// Construct from a megabits-per-second count.
    pub const fn from_mbps(mbps: i64) -> Self {
        Self(mbps * 1_000_000)
    }

    /// Raw bits-per-second value.
    pub const fn into_bps(self) -> i64 {
        self.0
    }

    /// Value in (fractional) megabits per second, for trace emission.
    pub fn as_mbps_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Scale the rate by a floating point factor.
    pub fn scale_by(self, by: f64) -> Self {
        Self((self.0 as f64 * by).round() as i64)
    }

    /// `transfer_time(rate, bytes) = 8e9 * bytes / rate`, in nanoseconds.
    ///
    /// Panics if `rate` is zero; callers must ensure a flow's bottleneck
    /// rate is configured positive before transmitting.
    pub fn transfer_time(self, bytes: Bytes) -> Clock {
        assert!(self.0 != 0, "transfer_time called with zero rate");
        if bytes == Bytes::ZERO {
            return Clock::ZERO;
        }
        let ns = (bytes.into_f64() * 8e9) / self.0 as f64;
        Clock::new(ns.round() as i64)
    }
}

/// A signed sequence number, counted in bytes. Wraparound is not modeled.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
    Hash,
    derive_more::Add,
    derive_more::Sub,
    derive_more::AddAssign,
    derive_more::SubAssign,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Seq(i64);

impl Seq {
    /// Sequence number zero.
    pub const ZERO: Seq = Self::new(0);

    /// Construct a sequence number from a raw byte offset.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Advance the sequence number by a byte count.
    pub fn advance(self, by: Bytes) -> Self {
        Self(self.0 + by.into_u64() as i64)
    }

    /// Difference between two sequence numbers, as a byte count. Panics if
    /// `self < rhs`, which would indicate an ACK referencing unsent data.
    pub fn bytes_since(self, rhs: Seq) -> Bytes {
        assert!(self.0 >= rhs.0, "ack_num precedes receive_next");
        Bytes::new((self.0 - rhs.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_time_matches_spec_formula() {
        let rate = Bitrate::from_mbps(100);
        let bytes = Bytes::new(1500);
        // 8e9 * 1500 / 100e6 = 120_000 ns
        assert_eq!(rate.transfer_time(bytes), Clock::new(120_000));
    }

    #[test]
    fn scaled_mul_is_product_over_billion() {
        let a = Clock::new(5_000_000_000);
        let b = Clock::new(3_000_000_000);
        assert_eq!(a.scaled_mul(b), Clock::new(15_000_000_000));
    }

    #[test]
    fn scaled_mul_handles_large_operands_without_overflow() {
        let a = Clock::new(i64::MAX / 2);
        let b = Clock::new(4_000_000_000);
        // Would overflow i64 without the i128 intermediate.
        let result = a.scaled_mul(b);
        assert!(result.into_nanos() > 0);
    }

    #[test]
    fn checked_add_detects_overflow() {
        let a = Clock::new(i64::MAX);
        let b = Clock::new(1);
        assert!(a.checked_add(b).is_err());
    }

    #[test]
    fn seq_bytes_since() {
        let a = Seq::new(100);
        let b = Seq::new(40);
        assert_eq!(a.bytes_since(b), Bytes::new(60));
    }
}
