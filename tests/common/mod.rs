//! Helpers shared by the integration tests.

#![allow(dead_code)]

use netlist_core::{Netlist, NetlistConfig, Result, Setup};

/// Parse `text`, include netlist `name` and run every elaboration phase.
pub fn build(text: &str, name: &str) -> Result<Netlist> {
    build_with(NetlistConfig::default(), text, name)
}

pub fn build_with(config: NetlistConfig, text: &str, name: &str) -> Result<Netlist> {
    Setup::from_str(config, text, name)?.build()
}

/// Logic value currently on the net of terminal `term`.
pub fn logic(nl: &Netlist, term: &str) -> u32 {
    let t = nl.find_term(term).unwrap_or_else(|| panic!("no terminal {}", term));
    let n = nl.terminal(t).net().unwrap_or_else(|| panic!("{} has no net", term));
    nl.net(n).q()
}

/// Voltage currently on the net of terminal `term`.
pub fn volts(nl: &Netlist, term: &str) -> f64 {
    let t = nl.find_term(term).unwrap_or_else(|| panic!("no terminal {}", term));
    let n = nl.terminal(t).net().unwrap_or_else(|| panic!("{} has no net", term));
    nl.net(n).q_analog()
}
