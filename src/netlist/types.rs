//! Core handle and state types for the netlist graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle of a device in the netlist arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Handle of a terminal in the netlist arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub usize);

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Handle of a net in the netlist arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub usize);

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Handle of a parameter in the netlist arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub usize);

/// Signal domain of a net or terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Logic,
    Analog,
}

/// Kind of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// Digital or analog input
    Input(Domain),
    /// Digital or analog output, owns its own rail net
    Output(Domain),
    /// Analog bidirectional terminal, paired with an opposite terminal
    Terminal,
}

impl TermKind {
    pub fn is_input(self) -> bool {
        matches!(self, TermKind::Input(_))
    }

    pub fn is_output(self) -> bool {
        matches!(self, TermKind::Output(_))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TermKind::Terminal)
    }

    pub fn domain(self) -> Domain {
        match self {
            TermKind::Input(d) | TermKind::Output(d) => d,
            TermKind::Terminal => Domain::Analog,
        }
    }

    pub fn is_logic(self) -> bool {
        self.domain() == Domain::Logic
    }

    pub fn is_analog(self) -> bool {
        self.domain() == Domain::Analog
    }

    /// Human readable kind, used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TermKind::Input(Domain::Logic) => "logic input",
            TermKind::Input(Domain::Analog) => "analog input",
            TermKind::Output(Domain::Logic) => "logic output",
            TermKind::Output(Domain::Analog) => "analog output",
            TermKind::Terminal => "terminal",
        }
    }
}

/// Terminal activity state.
///
/// Inputs register interest in high-to-low (`INP_HL`), low-to-high
/// (`INP_LH`) or any (`INP_ACTIVE`) transition. A net update builds a mask
/// from the transition it is delivering and only calls devices whose
/// terminal state intersects that mask.
pub mod state {
    pub const INP_HL_SHIFT: u32 = 0;
    pub const INP_LH_SHIFT: u32 = 1;
    pub const INP_ACTIVE_SHIFT: u32 = 2;

    pub const INP_PASSIVE: u16 = 0;
    pub const INP_HL: u16 = 1 << INP_HL_SHIFT;
    pub const INP_LH: u16 = 1 << INP_LH_SHIFT;
    pub const INP_ACTIVE: u16 = 1 << INP_ACTIVE_SHIFT;
    pub const OUT: u16 = 128;
    pub const BIDIR: u16 = 256;
}

/// Queue status of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QueueStatus {
    /// No pending update
    #[default]
    Delivered,
    /// An entry is in the event queue
    Queued,
    /// A new value was written while nobody listened
    DelayedDueToInactive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_kind_domain() {
        assert!(TermKind::Terminal.is_analog());
        assert!(TermKind::Input(Domain::Logic).is_logic());
        assert!(TermKind::Output(Domain::Analog).is_output());
        assert_eq!(TermKind::Input(Domain::Analog).describe(), "analog input");
    }

    #[test]
    fn test_state_masks_disjoint() {
        assert_eq!(state::INP_HL & state::INP_LH, 0);
        assert_eq!(state::INP_ACTIVE & (state::INP_HL | state::INP_LH), 0);
        assert_eq!(state::OUT & state::INP_ACTIVE, 0);
    }
}
