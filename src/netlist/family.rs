//! Logic family descriptors.
//!
//! A family describes how a logic level maps to analog quantities when a
//! signal crosses the digital/analog boundary: input thresholds as a fraction
//! of the supply span, output levels as offsets from the rails and output
//! resistances.

use serde::{Deserialize, Serialize};

/// Electrical characteristics of a logic family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogicFamily {
    /// Fixed supply voltage, 0 if the supply comes from the circuit
    pub fixed_v: f64,
    /// Input low threshold as a fraction of the supply span
    pub low_thresh_pcnt: f64,
    /// Input high threshold as a fraction of the supply span
    pub high_thresh_pcnt: f64,
    /// Output low voltage above VN
    pub low_vo: f64,
    /// Output high voltage below VP
    pub high_vo: f64,
    /// Output resistance when driving low
    pub r_low: f64,
    /// Output resistance when driving high
    pub r_high: f64,
}

impl LogicFamily {
    /// Standard TTL (74xx) characteristics.
    pub const fn ttl() -> Self {
        Self {
            fixed_v: 5.0,
            low_thresh_pcnt: 0.8 / 5.0,
            high_thresh_pcnt: 2.0 / 5.0,
            low_vo: 0.1,
            high_vo: 1.0,
            r_low: 1.0,
            r_high: 130.0,
        }
    }

    /// CMOS CD4xxx characteristics. The supply is taken from the circuit.
    pub const fn cd4xxx() -> Self {
        Self {
            fixed_v: 0.0,
            low_thresh_pcnt: 1.5 / 5.0,
            high_thresh_pcnt: 3.5 / 5.0,
            low_vo: 0.05,
            high_vo: 0.05,
            r_low: 10.0,
            r_high: 10.0,
        }
    }

    /// Supply voltage used by proxies; families without a fixed supply fall
    /// back to 5V.
    pub fn supply(&self) -> f64 {
        if self.fixed_v == 0.0 {
            5.0
        } else {
            self.fixed_v
        }
    }

    pub fn low_thresh_v(&self, vn: f64, vp: f64) -> f64 {
        vn + (vp - vn) * self.low_thresh_pcnt
    }

    pub fn high_thresh_v(&self, vn: f64, vp: f64) -> f64 {
        vn + (vp - vn) * self.high_thresh_pcnt
    }

    pub fn low_v(&self, vn: f64) -> f64 {
        vn + self.low_vo
    }

    pub fn high_v(&self, vp: f64) -> f64 {
        vp - self.high_vo
    }
}

impl Default for LogicFamily {
    fn default() -> Self {
        Self::ttl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ttl_thresholds() {
        let f = LogicFamily::ttl();
        assert_relative_eq!(f.low_thresh_v(0.0, f.supply()), 0.8);
        assert_relative_eq!(f.high_thresh_v(0.0, f.supply()), 2.0);
        assert_relative_eq!(f.high_v(5.0), 4.0);
        assert_relative_eq!(f.low_v(0.0), 0.1);
    }

    #[test]
    fn test_cmos_supply_fallback() {
        let f = LogicFamily::cd4xxx();
        assert_eq!(f.supply(), 5.0);
        assert_relative_eq!(f.high_thresh_v(0.0, 10.0), 7.0);
    }
}
