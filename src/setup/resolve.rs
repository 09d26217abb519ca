//! Link resolution: turning pending name pairs into nets.
//!
//! Each link is dispatched on the kinds of its two terminals. Outputs own
//! their net, so connecting to an output means joining it; terminals and
//! inputs join whatever net the other side has, or get a fresh one. A link
//! between logic and analog goes through a proxy device that translates
//! levels in one direction:
//!
//! - logic output to analog: `proxy_da_<out>_<n>` drives a resistor whose
//!   free end becomes the analog side of the output
//! - analog to logic input: `proxy_ad_<in>_<n>` samples the voltage against
//!   the family thresholds and drives the input
//!
//! A logic output gets at most one D/A proxy; later analog connections reuse
//! it. Links that cannot be made yet (two inputs, neither connected) are
//! retried on the next pass.

use tracing::{debug, info, warn};

use super::Setup;
use crate::devices::proxy::{AD_INPUT, AD_OUTPUT, A_TO_D_CLASS, DA_INPUT, DA_TERM, D_TO_A_CLASS};
use crate::error::{NetlistError, Result};
use crate::netlist::{Domain, LogicFamily, NetId, TermId, TermKind};

impl Setup {
    /// Terminal by full name. Aliases are followed and `name` falls back to
    /// `name.Q`, so a device name stands for its output.
    pub fn find_terminal(&self, name: &str) -> Result<TermId> {
        let tname = self.resolve_alias(name);
        if let Some(t) = self.nl.find_term(&tname) {
            return Ok(t);
        }
        let qname = self.resolve_alias(&format!("{}.Q", tname));
        self.nl.find_term(&qname).ok_or_else(|| NetlistError::TerminalNotFound {
            name: name.to_string(),
        })
    }

    /// Terminal by full name, which must be of `kind`. Only outputs fall
    /// back to `name.Q`.
    pub fn find_terminal_typed(&self, name: &str, kind: TermKind) -> Result<TermId> {
        let tname = self.resolve_alias(name);
        let found = match self.nl.find_term(&tname) {
            Some(t) => Some(t),
            None if kind.is_output() => self.nl.find_term(&self.resolve_alias(&format!("{}.Q", tname))),
            None => None,
        };
        let t = found.ok_or_else(|| NetlistError::TerminalNotFound {
            name: name.to_string(),
        })?;
        if self.nl.terminal(t).kind() != kind {
            return Err(NetlistError::TerminalKindMismatch {
                name: name.to_string(),
                expected: kind.describe().to_string(),
            });
        }
        Ok(t)
    }

    fn term_name(&self, t: TermId) -> String {
        self.nl.terminal(t).name().to_string()
    }

    fn net_of(&self, t: TermId) -> Option<NetId> {
        self.nl.terminal(t).net()
    }

    fn rail_net(&self, out: TermId) -> Result<NetId> {
        self.net_of(out).ok_or_else(|| NetlistError::ConnectionFailed {
            first: self.term_name(out),
            second: "<rail>".to_string(),
        })
    }

    fn proxy_term(&self, device: &str, pin: &str) -> Result<TermId> {
        let name = format!("{}.{}", device, pin);
        self.nl.find_term(&name).ok_or(NetlistError::TerminalNotFound { name })
    }

    /// Logic terminals with a proxy are connected through it.
    fn resolve_proxy(&self, t: TermId) -> TermId {
        let term = self.nl.terminal(t);
        match term.proxy() {
            Some(p) if term.kind().is_logic() => p,
            _ => t,
        }
    }

    /// Create a proxy device and make its internal connections right away.
    fn create_proxy(&mut self, name: &str, class: &str, family: LogicFamily) -> Result<()> {
        let mark = self.links.len();
        let id = self.create_device(name, class)?;
        self.nl.set_family(id, family);
        let local: Vec<(String, String)> = self.links.drain(mark..).collect();
        for (a, b) in local {
            let (ta, tb) = (self.find_terminal(&a)?, self.find_terminal(&b)?);
            if !self.connect(ta, tb)? {
                return Err(NetlistError::ConnectionFailed { first: a, second: b });
            }
        }
        debug!(proxy = name, "created");
        Ok(())
    }

    /// D/A proxy of a logic output, created on first use. Listeners already
    /// on the output's net move over to the proxy's analog side.
    fn get_d_a_proxy(&mut self, out: TermId) -> Result<TermId> {
        if let Some(p) = self.nl.terminal(out).proxy() {
            return Ok(p);
        }
        let name = format!("proxy_da_{}_{}", self.term_name(out), self.proxy_cnt);
        self.proxy_cnt += 1;
        let family = self.nl.family(self.nl.terminal(out).device());
        self.create_proxy(&name, D_TO_A_CLASS, family)?;
        let pt = self.proxy_term(&name, DA_TERM)?;
        let pi = self.proxy_term(&name, DA_INPUT)?;

        let onet = self.rail_net(out)?;
        let existing = self.nl.net(onet).core_terms().to_vec();
        for p in existing {
            self.nl.remove_terminal_from_net(onet, p)?;
            if !self.connect(pt, p)? {
                return Err(NetlistError::ConnectionFailed {
                    first: self.term_name(pt),
                    second: self.term_name(p),
                });
            }
        }
        self.nl.add_terminal_to_net(onet, pi)?;
        self.nl.set_proxy(out, pt);
        Ok(pt)
    }

    /// A/D proxy for a logic input. Returns the proxy's analog input and
    /// logic output.
    fn create_a_d_proxy(&mut self, inp: TermId) -> Result<(TermId, TermId)> {
        let name = format!("proxy_ad_{}_{}", self.term_name(inp), self.proxy_cnt);
        self.proxy_cnt += 1;
        let family = self.nl.family(self.nl.terminal(inp).device());
        self.create_proxy(&name, A_TO_D_CLASS, family)?;
        let pi = self.proxy_term(&name, AD_INPUT)?;
        let pq = self.proxy_term(&name, AD_OUTPUT)?;
        self.nl.set_proxy(inp, pi);
        Ok((pi, pq))
    }

    fn merge_nets(&mut self, this: NetId, other: NetId) -> Result<()> {
        if this == other {
            warn!(net = self.nl.net(this).name(), "connecting net to itself");
            return Ok(());
        }
        let (this_rail, other_rail) = (self.nl.net(this).is_rail(), self.nl.net(other).is_rail());
        if this_rail && other_rail {
            return Err(NetlistError::RailNetMerge {
                first: self.nl.net(this).name().to_string(),
                second: self.nl.net(other).name().to_string(),
            });
        }
        if other_rail {
            return self.merge_nets(other, this);
        }
        self.nl.move_connections(other, this)?;
        self.nl.retire_net(other);
        Ok(())
    }

    /// Put `t` on `n`, merging if it already sits on another net.
    fn join_net(&mut self, n: NetId, t: TermId) -> Result<()> {
        match self.net_of(t) {
            Some(tn) => self.merge_nets(n, tn),
            None => self.nl.add_terminal_to_net(n, t),
        }
    }

    fn connect_terminals(&mut self, t1: TermId, t2: TermId) -> Result<()> {
        match (self.net_of(t1), self.net_of(t2)) {
            (Some(n1), Some(n2)) => self.merge_nets(n1, n2),
            (None, Some(n2)) => self.nl.add_terminal_to_net(n2, t1),
            (Some(n1), None) => self.nl.add_terminal_to_net(n1, t2),
            (None, None) => {
                let n = self
                    .nl
                    .add_net(format!("net.{}", self.term_name(t1)), Domain::Analog, None);
                self.nl.add_terminal_to_net(n, t2)?;
                self.nl.add_terminal_to_net(n, t1)
            }
        }
    }

    fn connect_input_output(&mut self, inp: TermId, out: TermId) -> Result<()> {
        let in_logic = self.nl.terminal(inp).kind().is_logic();
        let out_logic = self.nl.terminal(out).kind().is_logic();
        let onet = self.rail_net(out)?;
        match (out_logic, in_logic) {
            (false, true) => {
                let (pi, pq) = self.create_a_d_proxy(inp)?;
                let qnet = self.rail_net(pq)?;
                self.join_net(qnet, inp)?;
                self.nl.add_terminal_to_net(onet, pi)
            }
            (true, false) => {
                let pt = self.get_d_a_proxy(out)?;
                self.connect_terminals(pt, inp)
            }
            _ => self.join_net(onet, inp),
        }
    }

    fn connect_terminal_output(&mut self, term: TermId, out: TermId) -> Result<()> {
        if self.nl.terminal(out).kind().is_analog() {
            let onet = self.rail_net(out)?;
            self.join_net(onet, term)
        } else {
            let pt = self.get_d_a_proxy(out)?;
            self.connect_terminals(pt, term)
        }
    }

    fn connect_terminal_input(&mut self, term: TermId, inp: TermId) -> Result<()> {
        if self.nl.terminal(inp).kind().is_analog() {
            self.connect_terminals(inp, term)
        } else {
            let (pi, pq) = self.create_a_d_proxy(inp)?;
            self.connect_terminals(term, pi)?;
            let qnet = self.rail_net(pq)?;
            self.join_net(qnet, inp)
        }
    }

    /// Two inputs can only be joined through a net one of them is already
    /// on: its driving output, or an analog terminal on it.
    fn connect_input_input(&mut self, t1: TermId, t2: TermId) -> Result<bool> {
        for (a, b) in [(t1, t2), (t2, t1)] {
            let Some(n) = self.net_of(a) else {
                continue;
            };
            if let Some(rt) = self.nl.net(n).rail_terminal() {
                if self.connect(b, rt)? {
                    return Ok(true);
                }
                continue;
            }
            let members = self.nl.net(n).core_terms().to_vec();
            for t in members {
                if self.nl.terminal(t).kind().is_terminal() && self.connect(b, t)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn check_input_free(&self, inp: TermId) -> Result<()> {
        if let Some(n) = self.net_of(inp) {
            if self.nl.net(n).is_rail() {
                return Err(NetlistError::InputAlreadyConnected {
                    input: self.term_name(inp),
                });
            }
        }
        Ok(())
    }

    /// Connect two terminals. `Ok(false)` means the link cannot be made
    /// yet and should be retried.
    pub(crate) fn connect(&mut self, t1_in: TermId, t2_in: TermId) -> Result<bool> {
        let t1 = self.resolve_proxy(t1_in);
        let t2 = self.resolve_proxy(t2_in);
        let k1 = self.nl.terminal(t1).kind();
        let k2 = self.nl.terminal(t2).kind();
        use TermKind::{Input, Output, Terminal};
        match (k1, k2) {
            (Output(_), Input(_)) => {
                self.check_input_free(t2)?;
                self.connect_input_output(t2, t1)?;
            }
            (Input(_), Output(_)) => {
                self.check_input_free(t1)?;
                self.connect_input_output(t1, t2)?;
            }
            (Output(_), Terminal) => self.connect_terminal_output(t2, t1)?,
            (Terminal, Output(_)) => self.connect_terminal_output(t1, t2)?,
            (Input(_), Terminal) => self.connect_terminal_input(t2, t1)?,
            (Terminal, Input(_)) => self.connect_terminal_input(t1, t2)?,
            (Terminal, Terminal) => self.connect_terminals(t1, t2)?,
            (Input(_), Input(_)) => return self.connect_input_input(t1, t2),
            (Output(_), Output(_)) => return Ok(false),
        }
        Ok(true)
    }

    /// Resolve every pending link, then check the result.
    ///
    /// Links are retried for up to `link_retries` passes. Afterwards nets
    /// without connections are pruned and every terminal must sit on a
    /// net; dummy terminals only produce a warning.
    pub fn resolve_inputs(&mut self) -> Result<()> {
        info!(links = self.links.len(), "resolving inputs");
        let mut tries = self.nl.config().link_retries;
        while !self.links.is_empty() && tries > 0 {
            let pending = std::mem::take(&mut self.links);
            let mut failed = Vec::new();
            for (a, b) in pending {
                let (ta, tb) = (self.find_terminal(&a)?, self.find_terminal(&b)?);
                if self.connect(ta, tb)? {
                    debug!("connected {} to {}", a, b);
                } else {
                    failed.push((a, b));
                }
            }
            failed.append(&mut self.links);
            self.links = failed;
            tries -= 1;
        }
        if !self.links.is_empty() {
            for (a, b) in &self.links {
                warn!("error connecting {} to {}", a, b);
            }
            return Err(NetlistError::UnresolvedLinks {
                links: std::mem::take(&mut self.links),
            });
        }

        let empty: Vec<NetId> = self
            .nl
            .nets()
            .filter(|(_, n)| n.num_cons() == 0)
            .map(|(id, _)| id)
            .collect();
        for n in empty {
            debug!(net = self.nl.net(n).name(), "deleting net without connections");
            self.nl.retire_net(n);
        }

        let mut missing = Vec::new();
        for (_, t) in self.nl.terminals() {
            match t.net() {
                None if t.is_dummy() => warn!(terminal = t.name(), "found dummy terminal without connections"),
                None => missing.push(t.name().to_string()),
                Some(n) if self.nl.net(n).num_cons() == 0 => {
                    debug!(terminal = t.name(), "found terminal without connections")
                }
                Some(_) => {}
            }
        }
        if !missing.is_empty() {
            return Err(NetlistError::TerminalsWithoutNet { terminals: missing });
        }

        for (_, dev) in self.nl.devices() {
            let on_rails = dev.terms().iter().any(|&t| {
                let term = self.nl.terminal(t);
                let rail = |t: TermId| {
                    self.nl
                        .terminal(t)
                        .net()
                        .is_some_and(|n| self.nl.net(n).is_rail())
                };
                term.kind().is_terminal() && rail(t) && term.other().is_some_and(rail)
            });
            if on_rails {
                warn!(device = dev.name(), "device connected only to rail nets");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::NetlistConfig;
    use crate::error::NetlistError;
    use crate::netlist::TermKind;
    use crate::setup::Setup;

    fn setup() -> Setup {
        Setup::new(NetlistConfig::default()).unwrap()
    }

    #[test]
    fn test_output_fallback_and_typed_lookup() {
        let mut s = setup();
        s.register_dev("LOGIC_INPUT", "A").unwrap();
        s.start_devices().unwrap();
        let q = s.find_terminal("A").unwrap();
        assert_eq!(s.netlist().terminal(q).name(), "A.Q");
        assert!(s.find_terminal_typed("A", TermKind::Output(crate::netlist::Domain::Logic)).is_ok());
        assert!(matches!(
            s.find_terminal_typed("A.Q", TermKind::Terminal),
            Err(NetlistError::TerminalKindMismatch { .. })
        ));
        assert!(matches!(s.find_terminal("B"), Err(NetlistError::TerminalNotFound { .. })));
    }

    #[test]
    fn test_resistor_chain_shares_nets() {
        let mut s = setup();
        s.register_dev("RES", "R1").unwrap();
        s.register_dev("RES", "R2").unwrap();
        s.register_link("R1.2", "R2.1");
        s.register_link("R2.2", "GND");
        s.start_devices().unwrap();
        s.register_link("R1.1", "GND");
        s.resolve_inputs().unwrap();
        let nl = s.netlist();
        let r1_2 = nl.find_term("R1.2").unwrap();
        let r2_1 = nl.find_term("R2.1").unwrap();
        assert_eq!(nl.terminal(r1_2).net(), nl.terminal(r2_1).net());
        let gnd = nl.terminal(nl.find_term("GND.Q").unwrap()).net().unwrap();
        assert_eq!(nl.net(gnd).num_cons(), 2);
    }

    #[test]
    fn test_two_outputs_cannot_link() {
        let mut s = Setup::new(NetlistConfig::default().with_link_retries(3)).unwrap();
        s.register_dev("LOGIC_INPUT", "A").unwrap();
        s.register_dev("LOGIC_INPUT", "B").unwrap();
        s.register_link("A.Q", "B.Q");
        s.start_devices().unwrap();
        match s.resolve_inputs() {
            Err(NetlistError::UnresolvedLinks { links }) => {
                assert_eq!(links, vec![("A.Q".to_string(), "B.Q".to_string())]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rail_merge_rejected() {
        let mut s = setup();
        s.register_dev("ANALOG_INPUT", "V1").unwrap();
        s.register_dev("RES", "R1").unwrap();
        s.register_link("R1.1", "V1");
        s.register_link("R1.1", "GND");
        s.register_link("R1.2", "GND");
        s.start_devices().unwrap();
        assert!(matches!(s.resolve_inputs(), Err(NetlistError::RailNetMerge { .. })));
    }

    #[test]
    fn test_unconnected_terminal_reported() {
        let mut s = setup();
        s.register_dev("RES", "R1").unwrap();
        s.register_link("R1.1", "GND");
        s.start_devices().unwrap();
        match s.resolve_inputs() {
            Err(NetlistError::TerminalsWithoutNet { terminals }) => assert_eq!(terminals, vec!["R1.2"]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
