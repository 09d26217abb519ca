//! Terminals: device connection points and their activity state.

use super::types::{state, DeviceId, NetId, TermId, TermKind};
use super::Netlist;

/// A connection point of a device.
#[derive(Debug, Clone)]
pub struct Terminal {
    pub(crate) name: String,
    pub(crate) device: DeviceId,
    pub(crate) kind: TermKind,
    pub(crate) state: u16,
    pub(crate) net: Option<NetId>,
    /// Opposite terminal of a two-terminal element
    pub(crate) other: Option<TermId>,
    /// Stamp: conductance to the opposite net
    pub(crate) go: f64,
    /// Stamp: conductance to self
    pub(crate) gt: f64,
    /// Stamp: injected current
    pub(crate) idr: f64,
    /// Domain-crossing proxy created for this terminal, as the proxy's
    /// terminal in the other domain
    pub(crate) proxy: Option<TermId>,
    /// Placeholder terminal, may stay unconnected
    pub(crate) dummy: bool,
}

impl Terminal {
    pub(crate) fn new(name: String, device: DeviceId, kind: TermKind) -> Self {
        let mut t = Self {
            name,
            device,
            kind,
            state: state::INP_PASSIVE,
            net: None,
            other: None,
            go: 0.0,
            gt: 0.0,
            idr: 0.0,
            proxy: None,
            dummy: false,
        };
        t.reset();
        t
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn kind(&self) -> TermKind {
        self.kind
    }

    pub fn state(&self) -> u16 {
        self.state
    }

    pub fn net(&self) -> Option<NetId> {
        self.net
    }

    pub fn other(&self) -> Option<TermId> {
        self.other
    }

    pub fn proxy(&self) -> Option<TermId> {
        self.proxy
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    pub fn is_passive(&self) -> bool {
        self.state == state::INP_PASSIVE
    }

    /// Stamp as `(go, gt, idr)`.
    pub fn stamp(&self) -> (f64, f64, f64) {
        (self.go, self.gt, self.idr)
    }

    pub(crate) fn reset(&mut self) {
        self.state = match self.kind {
            TermKind::Output(_) => state::OUT,
            TermKind::Terminal => state::BIDIR,
            TermKind::Input(_) => state::INP_ACTIVE,
        };
    }
}

impl Netlist {
    pub fn terminal(&self, t: TermId) -> &Terminal {
        &self.terms[t.0]
    }

    pub fn terminals(&self) -> impl Iterator<Item = (TermId, &Terminal)> + '_ {
        self.terms.iter().enumerate().map(|(i, t)| (TermId(i), t))
    }

    /// Listen for any transition on the input's net.
    pub fn activate(&mut self, t: TermId) {
        self.set_input_state(t, state::INP_ACTIVE);
    }

    /// Listen only for high-to-low transitions.
    pub fn activate_hl(&mut self, t: TermId) {
        self.set_input_state(t, state::INP_HL);
    }

    /// Listen only for low-to-high transitions.
    pub fn activate_lh(&mut self, t: TermId) {
        self.set_input_state(t, state::INP_LH);
    }

    /// Stop listening; the net may go idle if this was its last listener.
    pub fn inactivate(&mut self, t: TermId) {
        if self.terms[t.0].state != state::INP_PASSIVE {
            self.terms[t.0].state = state::INP_PASSIVE;
            if let Some(net) = self.terms[t.0].net {
                self.remove_from_active_list(net, t);
            }
        }
    }

    fn set_input_state(&mut self, t: TermId, st: u16) {
        let term = &mut self.terms[t.0];
        if term.state == st {
            return;
        }
        let was_passive = term.state == state::INP_PASSIVE;
        term.state = st;
        if was_passive {
            if let Some(net) = term.net {
                self.add_to_active_list(net, t);
            }
        }
    }

    /// Current logic value seen by an input.
    pub fn input_q(&self, t: TermId) -> u32 {
        self.terms[t.0].net.map_or(0, |n| self.nets[n.0].cur_q)
    }

    /// Current voltage seen by an analog input or terminal.
    pub fn input_v(&self, t: TermId) -> f64 {
        self.terms[t.0].net.map_or(0.0, |n| self.nets[n.0].cur_analog)
    }

    /// Set the stamp of a terminal.
    pub fn set_stamp(&mut self, t: TermId, go: f64, gt: f64, idr: f64) {
        let term = &mut self.terms[t.0];
        term.go = go;
        term.gt = gt;
        term.idr = idr;
    }

    /// Stamp a two-terminal element: conductance `g`, series voltage `v`
    /// and parallel current `i`, all oriented from `p` to `n`.
    pub fn set_twoterm(&mut self, p: TermId, n: TermId, g: f64, v: f64, i: f64) {
        let gv = g * v - i;
        self.set_stamp(p, g, g, gv);
        self.set_stamp(n, g, g, -gv);
    }

    /// Request an immediate solve of the group the terminal's net belongs to.
    pub fn solve_now(&mut self, t: TermId) {
        let solver = self.terms[t.0].net.and_then(|n| self.nets[n.0].solver);
        if let Some(idx) = solver {
            self.solve_group_now(idx);
        }
    }
}
