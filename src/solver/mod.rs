//! Analog solver subsystem.
//!
//! The analog part of a netlist is split into groups of nets connected by
//! two-terminal elements. Each group gets a
//! [`MatrixSolver`] which assembles the nodal equations from the terminal
//! stamps and solves them with a method picked by group size:
//!
//! - one or two nets: closed form
//! - below `GS_THRESHOLD` nets: dense Gaussian elimination
//! - from `GS_THRESHOLD` on: the configured iterative method, falling back
//!   to elimination when it does not converge within its budget
//!
//! Groups with dynamic devices run a Newton loop: the devices re-stamp at
//! the new operating point until the voltages stop moving. Groups with
//! timestep devices are stepped at a fixed rate, or at an adaptive rate
//! derived from the local truncation error when `DYNAMIC_TS` is set.

mod direct;
mod direct_cr;
mod gmres;
mod group;
mod matrix;
mod sm;
mod sor;
mod system;
mod terms;
mod w;

use serde::{Deserialize, Serialize};

pub use group::{MatrixSolver, Method, SolverGroupInfo};
pub use matrix::{CrMatrix, DenseMatrix};
pub use system::{MatrixSolverDevice, SolverDevice};
pub use terms::{History, Terms};

pub(crate) use system::post_start;

use crate::config::SolverConfig;
use crate::error::{NetlistError, Result};
use crate::time::SimTime;

/// Largest supported group.
pub const MAX_GROUP_SIZE: usize = 128;

/// Group sizes with a storage layout of their own.
const EXACT_SIZES: [usize; 14] = [1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 15, 31, 49];

/// Storage capacity for a group of `size` nets.
///
/// Returns the capacity and whether it matches the size exactly. Sizes
/// without an exact class are rounded up to 16, 32, 64 or 128.
pub fn storage_capacity(size: usize) -> Result<(usize, bool)> {
    if EXACT_SIZES.contains(&size) {
        return Ok((size, true));
    }
    [16, 32, 64, MAX_GROUP_SIZE]
        .into_iter()
        .find(|&c| size <= c)
        .map(|c| (c, false))
        .ok_or(NetlistError::GroupTooLarge {
            size,
            max: MAX_GROUP_SIZE,
        })
}

/// Row ordering applied before the matrix structure is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortType {
    /// Fewest in-group connections first
    Ascending,
    /// Most in-group connections first
    Descending,
}

/// Parameters shared by all groups, resolved from the `SOLVER` device.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    pub accuracy: f64,
    pub lte: f64,
    pub min_timestep: f64,
    pub max_timestep: f64,
    pub sor: f64,
    pub pivot: bool,
    pub dynamic: bool,
    pub gs_loops: usize,
    pub nr_loops: usize,
    pub gs_threshold: usize,
    pub iterative: String,
    pub sync_delay: SimTime,
    pub log_stats: bool,
    pub parallel: bool,
    pub use_specific: bool,
}

impl SolverParams {
    pub fn from_config(cfg: &SolverConfig) -> Self {
        let max_timestep = SimTime::from_double(1.0 / cfg.freq).as_double();
        Self {
            accuracy: cfg.accuracy,
            lte: cfg.lte,
            min_timestep: if cfg.dynamic_ts { cfg.min_timestep } else { max_timestep },
            max_timestep,
            sor: cfg.sor_factor,
            pivot: cfg.pivot,
            dynamic: cfg.dynamic_ts,
            gs_loops: cfg.gs_loops,
            nr_loops: cfg.nr_loops,
            gs_threshold: cfg.gs_threshold,
            iterative: cfg.iterative.clone(),
            sync_delay: SimTime::from_nsec(cfg.sync_delay_ns),
            log_stats: cfg.log_stats,
            parallel: cfg.parallel,
            use_specific: cfg.use_specific,
        }
    }
}

impl Default for SolverParams {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default())
    }
}

/// Per-group counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverStats {
    /// Linear solves, Newton iterations included
    pub calculations: u64,
    /// Timesteps solved
    pub vsolver_calls: u64,
    /// Newton iterations
    pub newton_loops: u64,
    /// Iterations spent in the iterative method
    pub iterative_total: u64,
    /// Iterative solves that fell back to elimination
    pub iterative_fail: u64,
}

/// Saved state of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverState {
    pub name: String,
    pub last_step: SimTime,
    /// Timestep history per net, in group order
    pub history: Vec<History>,
    pub stats: SolverStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_capacity_classes() {
        assert_eq!(storage_capacity(1).unwrap(), (1, true));
        assert_eq!(storage_capacity(12).unwrap(), (12, true));
        assert_eq!(storage_capacity(9).unwrap(), (16, false));
        assert_eq!(storage_capacity(31).unwrap(), (31, true));
        assert_eq!(storage_capacity(33).unwrap(), (64, false));
        assert_eq!(storage_capacity(128).unwrap(), (128, false));
    }

    #[test]
    fn test_group_too_large() {
        let err = storage_capacity(129).unwrap_err();
        assert!(matches!(err, NetlistError::GroupTooLarge { size: 129, max: 128 }));
    }

    #[test]
    fn test_params_from_config() {
        let p = SolverParams::from_config(&SolverConfig::default());
        assert!((p.max_timestep - 1.0 / 48000.0).abs() < 1e-12);
        assert_eq!(p.min_timestep, p.max_timestep);
        assert_eq!(p.sync_delay, SimTime::from_nsec(10));

        let p = SolverParams::from_config(&SolverConfig::default().with_dynamic_ts(1e-4, 1e-7));
        assert!(p.dynamic);
        assert_eq!(p.min_timestep, 1e-7);
    }
}
