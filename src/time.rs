//! Fixed-point simulation time.
//!
//! All scheduling happens on an integer time axis with a resolution of one
//! picosecond. Floating point time only appears at the analog solver
//! boundary ([`SimTime::as_double`], [`SimTime::from_double`]).

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Simulation time in raw ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    /// Number of raw ticks per second.
    pub const RESOLUTION: u64 = 1_000_000_000_000;

    const fn ratio(nom: u64, den: u64) -> Self {
        Self(nom * (Self::RESOLUTION / den))
    }

    /// Time zero.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The smallest representable time step.
    pub const fn quantum() -> Self {
        Self(1)
    }

    /// Infinite horizon, later than any reachable time.
    pub const fn never() -> Self {
        Self(u64::MAX)
    }

    pub const fn from_nsec(ns: u64) -> Self {
        Self::ratio(ns, 1_000_000_000)
    }

    pub const fn from_usec(us: u64) -> Self {
        Self::ratio(us, 1_000_000)
    }

    pub const fn from_msec(ms: u64) -> Self {
        Self::ratio(ms, 1_000)
    }

    /// Period of a frequency in Hz.
    pub const fn from_hz(hz: u64) -> Self {
        Self(Self::RESOLUTION / hz)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Convert seconds to time, truncating towards zero.
    ///
    /// Negative and NaN inputs map to zero, values beyond the range
    /// saturate at [`SimTime::never`].
    pub fn from_double(t: f64) -> Self {
        // `as` saturates for out-of-range floats
        Self((t * Self::RESOLUTION as f64) as u64)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Time in seconds.
    pub fn as_double(self) -> f64 {
        self.0 as f64 / Self::RESOLUTION as f64
    }

    pub const fn is_never(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        *self = *self + rhs;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for SimTime {
    fn sub_assign(&mut self, rhs: SimTime) {
        *self = *self - rhs;
    }
}

impl Mul<u64> for SimTime {
    type Output = SimTime;

    fn mul(self, rhs: u64) -> SimTime {
        SimTime(self.0.saturating_mul(rhs))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "never")
        } else {
            write!(f, "{:.9}s", self.as_double())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_constructors() {
        assert_eq!(SimTime::from_nsec(1).as_raw(), 1_000);
        assert_eq!(SimTime::from_usec(1), SimTime::from_nsec(1_000));
        assert_eq!(SimTime::from_msec(2), SimTime::from_usec(2_000));
        assert_eq!(SimTime::from_hz(1_000), SimTime::from_msec(1));
        assert_eq!(SimTime::quantum().as_raw(), 1);
    }

    #[test]
    fn test_double_conversion() {
        let t = SimTime::from_double(0.25);
        assert_eq!(t, SimTime::from_msec(250));
        assert_eq!(t.as_double(), 0.25);
        assert_eq!(SimTime::from_double(-1.0), SimTime::zero());
    }

    #[test]
    fn test_arithmetic_saturates() {
        let t = SimTime::never() + SimTime::from_nsec(5);
        assert!(t.is_never());
        assert_eq!(SimTime::zero() - SimTime::quantum(), SimTime::zero());
        assert_eq!(SimTime::quantum() * 2, SimTime::from_raw(2));
    }

    #[test]
    fn test_ordering() {
        assert!(SimTime::zero() < SimTime::quantum());
        assert!(SimTime::from_msec(1) < SimTime::never());
    }
}
