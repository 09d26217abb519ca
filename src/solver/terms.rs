//! Per-net equation rows of a solver group.

use serde::{Deserialize, Serialize};

use crate::netlist::{NetId, TermId};

/// The terminals attached to one net of a group and their loaded stamps.
///
/// Terminals whose opposite side sits on a net of the same group come
/// first; from `railstart` on, the opposite side is a rail whose voltage
/// only contributes to the right hand side.
#[derive(Debug, Clone, Default)]
pub struct Terms {
    pub(crate) terms: Vec<TermId>,
    /// Group index of the opposite net, `None` for rails
    pub(crate) net_other: Vec<Option<usize>>,
    /// Opposite net, used to read rail voltages
    pub(crate) other_net: Vec<NetId>,
    pub(crate) railstart: usize,

    /// Non-zero columns of the row, diagonal included, sorted
    pub(crate) nz: Vec<usize>,
    /// Non-zero columns right of the diagonal after elimination
    pub(crate) nzrd: Vec<usize>,
    /// Rows below the diagonal touched when eliminating this column
    pub(crate) nzbd: Vec<usize>,

    pub(crate) gt: Vec<f64>,
    pub(crate) go: Vec<f64>,
    pub(crate) idr: Vec<f64>,
    pub(crate) other_v: Vec<f64>,

    pub(crate) history: History,
}

/// Voltage history used by the adaptive timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub last_v: f64,
    pub dd_n_m_1: f64,
    pub h_n_m_1: f64,
}

impl Default for History {
    fn default() -> Self {
        Self {
            last_v: 0.0,
            dd_n_m_1: 0.0,
            h_n_m_1: 1e-6,
        }
    }
}

impl Terms {
    pub fn count(&self) -> usize {
        self.terms.len()
    }

    /// Add a terminal. With `sorted`, it is inserted before the first entry
    /// whose opposite net index is larger.
    pub(crate) fn add(&mut self, term: TermId, other_net: NetId, net_other: Option<usize>, sorted: bool) {
        let pos = if sorted {
            self.net_other
                .iter()
                .position(|&o| o > net_other)
                .unwrap_or(self.terms.len())
        } else {
            self.terms.len()
        };
        self.terms.insert(pos, term);
        self.net_other.insert(pos, net_other);
        self.other_net.insert(pos, other_net);
        self.gt.insert(pos, 0.0);
        self.go.insert(pos, 0.0);
        self.idr.insert(pos, 0.0);
        self.other_v.insert(pos, 0.0);
    }

    /// Append the rail terminals collected during setup.
    pub(crate) fn append_rails(&mut self, rails: Terms) {
        self.railstart = self.count();
        for i in 0..rails.count() {
            self.add(rails.terms[i], rails.other_net[i], None, false);
        }
    }

    /// Sum of the self conductances.
    pub fn gtot(&self) -> f64 {
        self.gt.iter().sum()
    }

    /// Right hand side: injected currents plus rail-driven currents.
    pub fn rhs(&self) -> f64 {
        let idr: f64 = self.idr.iter().sum();
        let rails: f64 = (self.railstart..self.count())
            .map(|i| self.go[i] * self.other_v[i])
            .sum();
        idr + rails
    }
}
