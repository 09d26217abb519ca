//! # Netlist Core
//!
//! An event-driven simulator for mixed digital/analog circuits.
//!
//! This library provides:
//! - A description language for netlists of devices, links and models
//! - A wiring resolver that turns pending links into nets, inserting
//!   domain-crossing proxies between logic and analog terminals
//! - A discrete-event scheduler propagating logic transitions with delays,
//!   with devices going idle while nobody listens to them
//! - Nodal analysis of the analog nets, split into independent groups with
//!   a solver picked per group size
//! - Devices described by truthtables
//!
//! ## Architecture
//!
//! - [`dsl`] - Parser for netlist descriptions
//! - [`setup`] - Registration tables, device factory and link resolution
//! - [`netlist`] - Arena of devices, terminals and nets, and the event loop
//! - [`queue`] - Time-ordered event queue
//! - [`solver`] - Analog group partitioning and matrix solvers
//! - [`devices`] - Built-in device models and the truthtable engine
//! - [`config`] - Per-instance settings
//!
//! ## Usage
//!
//! ```no_run
//! use netlist_core::{NetlistConfig, Setup, SimTime};
//!
//! # fn main() -> netlist_core::Result<()> {
//! let text = std::fs::read_to_string("divider.nl").unwrap();
//! let setup = Setup::from_str(NetlistConfig::default(), &text, "divider")?;
//! let mut nl = setup.build()?;
//! nl.process_queue_for(SimTime::from_msec(10));
//! nl.stop();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod devices;
pub mod dsl;
pub mod error;
pub mod netlist;
pub mod queue;
pub mod setup;
pub mod solver;
pub mod time;

// Re-export main types for convenience
pub use config::{NetlistConfig, SolverConfig};
pub use error::{NetlistError, Result};
pub use netlist::{Netlist, Snapshot};
pub use setup::{Setup, Source};
pub use time::SimTime;

/// Initialize the tracing subscriber, logging at `level` (`"warn"`,
/// `"info"`, ...) unless `RUST_LOG` says otherwise. Later calls are no-ops.
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
