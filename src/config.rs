//! Simulation configuration.
//!
//! [`NetlistConfig`] is owned by each simulation instance. The solver part
//! provides the defaults of the `SOLVER` device parameters; a description
//! that instantiates `SOLVER(...)` with explicit parameters overrides them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NetlistError, Result};

/// Analog solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Fixed step frequency in Hz
    pub freq: f64,
    /// Newton convergence limit on the voltage delta
    pub accuracy: f64,
    /// Iteration budget of the iterative solvers
    pub gs_loops: usize,
    /// Group size from which the iterative solver is used
    pub gs_threshold: usize,
    /// Iterative solver: SOR, SOR_MAT, MAT_CR, MAT, SM, W or GMRES
    pub iterative: String,
    /// Newton loop budget
    pub nr_loops: usize,
    /// Over-relaxation factor
    pub sor_factor: f64,
    /// Retry delay in ns after the Newton budget is exceeded
    pub sync_delay_ns: u64,
    /// Adaptive timestep for groups with timestep devices
    pub dynamic_ts: bool,
    /// Local truncation error target of the adaptive timestep
    pub lte: f64,
    /// Lower clamp of the adaptive timestep in seconds
    pub min_timestep: f64,
    /// Partial pivoting in the dense direct solver
    pub pivot: bool,
    /// Log per-group statistics when the simulation stops
    pub log_stats: bool,
    /// Solve independent groups on the rayon pool
    pub parallel: bool,
    /// Closed-form elimination for groups of one or two nets
    pub use_specific: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            freq: 48000.0,
            accuracy: 1e-7,
            gs_loops: 9,
            gs_threshold: 6,
            iterative: "SOR".to_string(),
            nr_loops: 250,
            sor_factor: 1.059,
            sync_delay_ns: 10,
            dynamic_ts: false,
            lte: 1e-5,
            min_timestep: 1e-6,
            pivot: false,
            log_stats: true,
            parallel: false,
            use_specific: true,
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_freq(mut self, freq: f64) -> Self {
        self.freq = freq;
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Select the iterative solver and the group size it kicks in at.
    pub fn with_iterative(mut self, name: impl Into<String>, threshold: usize) -> Self {
        self.iterative = name.into();
        self.gs_threshold = threshold;
        self
    }

    pub fn with_gs_loops(mut self, loops: usize) -> Self {
        self.gs_loops = loops;
        self
    }

    pub fn with_nr_loops(mut self, loops: usize) -> Self {
        self.nr_loops = loops;
        self
    }

    /// Enable adaptive timestep with the given truncation error target.
    pub fn with_dynamic_ts(mut self, lte: f64, min_timestep: f64) -> Self {
        self.dynamic_ts = true;
        self.lte = lte;
        self.min_timestep = min_timestep;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Route one- and two-net groups through the general selection.
    pub fn without_specific(mut self) -> Self {
        self.use_specific = false;
        self
    }
}

/// Settings of a simulation instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetlistConfig {
    /// Let devices go idle when nobody listens to their outputs
    pub use_deactivate: bool,
    /// 0: update devices with inputs once per input, then the rest;
    /// 1: every device, last to first; 2: every device, first to last
    pub startup_strategy: u32,
    /// Passes of the link resolver before giving up
    pub link_retries: usize,
    /// Event queue capacity, 0 to derive it from the net count
    pub queue_capacity: usize,
    /// Defaults of the SOLVER device parameters
    pub solver: SolverConfig,
}

impl Default for NetlistConfig {
    fn default() -> Self {
        Self {
            use_deactivate: true,
            startup_strategy: 0,
            link_retries: 100,
            queue_capacity: 0,
            solver: SolverConfig::default(),
        }
    }
}

impl NetlistConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deactivate(mut self, on: bool) -> Self {
        self.use_deactivate = on;
        self
    }

    pub fn with_startup_strategy(mut self, strategy: u32) -> Self {
        self.startup_strategy = strategy;
        self
    }

    pub fn with_link_retries(mut self, retries: usize) -> Self {
        self.link_retries = retries;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Load a configuration from a JSON string. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| NetlistError::FileReadError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = NetlistConfig::default();
        assert_eq!(c.link_retries, 100);
        assert_eq!(c.solver.gs_threshold, 6);
        assert_eq!(c.solver.iterative, "SOR");
        assert_eq!(c.solver.nr_loops, 250);
    }

    #[test]
    fn test_from_json_partial() {
        let c = NetlistConfig::from_json(r#"{ "link_retries": 5, "solver": { "iterative": "GMRES" } }"#)
            .unwrap();
        assert_eq!(c.link_retries, 5);
        assert_eq!(c.solver.iterative, "GMRES");
        assert_eq!(c.solver.freq, 48000.0);
        assert!(c.use_deactivate);
    }

    #[test]
    fn test_builders() {
        let s = SolverConfig::new().with_iterative("GMRES", 2).with_dynamic_ts(1e-4, 1e-7);
        assert_eq!(s.gs_threshold, 2);
        assert!(s.dynamic_ts);
        assert_eq!(s.lte, 1e-4);
    }
}
