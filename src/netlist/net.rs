//! Nets and signal propagation.
//!
//! A net carries a pending value (`new_q`) and a committed value (`cur_q`).
//! Writing a new pending value schedules the net; when the event fires the
//! transition is delivered to every active terminal whose state matches the
//! transition direction.
//!
//! Activity: a net keeps the list of its non-passive terminals. When the
//! list runs empty the driving device is told it lost a listener
//! (`dec_active`), and writes are only recorded. When a listener comes back
//! the recorded value is either re-queued or committed immediately if its
//! time has already passed.

use tracing::trace;

use super::types::{state, DeviceId, Domain, NetId, QueueStatus, TermId};
use super::Netlist;
use crate::error::{NetlistError, Result};
use crate::time::SimTime;

/// A node shared by all connected terminals.
#[derive(Debug, Clone)]
pub struct Net {
    pub(crate) name: String,
    pub(crate) domain: Domain,
    pub(crate) new_q: u32,
    pub(crate) cur_q: u32,
    pub(crate) cur_analog: f64,
    pub(crate) in_queue: QueueStatus,
    pub(crate) next_scheduled_time: SimTime,
    /// Driving output, set for rail nets only
    pub(crate) rail_terminal: Option<TermId>,
    /// Connected terminals, excluding the rail terminal
    pub(crate) core_terms: Vec<TermId>,
    /// Non-passive terminals, most recently activated first
    pub(crate) list_active: Vec<TermId>,
    /// Solver group index for analog nets
    pub(crate) solver: Option<usize>,
    /// Absorbed by a merge or pruned after wiring
    pub(crate) retired: bool,
}

impl Net {
    pub(crate) fn new(name: String, domain: Domain, rail_terminal: Option<TermId>) -> Self {
        Self {
            name,
            domain,
            new_q: 0,
            cur_q: 0,
            cur_analog: 0.0,
            in_queue: QueueStatus::Delivered,
            next_scheduled_time: SimTime::zero(),
            rail_terminal,
            core_terms: Vec::new(),
            list_active: Vec::new(),
            solver: None,
            retired: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn is_logic(&self) -> bool {
        self.domain == Domain::Logic
    }

    pub fn is_analog(&self) -> bool {
        self.domain == Domain::Analog
    }

    /// Committed logic value.
    pub fn q(&self) -> u32 {
        self.cur_q
    }

    /// Pending logic value.
    pub fn new_q(&self) -> u32 {
        self.new_q
    }

    /// Voltage of an analog net.
    pub fn q_analog(&self) -> f64 {
        self.cur_analog
    }

    pub fn is_rail(&self) -> bool {
        self.rail_terminal.is_some()
    }

    pub fn rail_terminal(&self) -> Option<TermId> {
        self.rail_terminal
    }

    pub fn num_cons(&self) -> usize {
        self.core_terms.len()
    }

    pub fn core_terms(&self) -> &[TermId] {
        &self.core_terms
    }

    pub fn active_terms(&self) -> &[TermId] {
        &self.list_active
    }

    pub fn solver(&self) -> Option<usize> {
        self.solver
    }

    pub fn in_queue(&self) -> QueueStatus {
        self.in_queue
    }

    pub fn is_queued(&self) -> bool {
        self.in_queue == QueueStatus::Queued
    }

    pub fn next_scheduled_time(&self) -> SimTime {
        self.next_scheduled_time
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    fn reset_values(&mut self) {
        self.next_scheduled_time = SimTime::zero();
        self.in_queue = QueueStatus::Delivered;
        self.new_q = 0;
        self.cur_q = 0;
        self.cur_analog = 0.0;
    }
}

impl Netlist {
    pub fn net(&self, n: NetId) -> &Net {
        &self.nets[n.0]
    }

    /// Live nets, i.e. not absorbed by a merge and not pruned.
    pub fn nets(&self) -> impl Iterator<Item = (NetId, &Net)> + '_ {
        self.nets
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.retired)
            .map(|(i, n)| (NetId(i), n))
    }

    pub(crate) fn add_net(&mut self, name: String, domain: Domain, rail: Option<TermId>) -> NetId {
        let id = NetId(self.nets.len());
        trace!(net = %name, "new net");
        self.net_index.insert(name.clone(), id);
        self.nets.push(Net::new(name, domain, rail));
        id
    }

    /// Attach a terminal to a net.
    pub(crate) fn add_terminal_to_net(&mut self, n: NetId, t: TermId) -> Result<()> {
        if self.nets[n.0].core_terms.contains(&t) {
            return Err(NetlistError::DuplicateNetTerminal {
                net: self.nets[n.0].name.clone(),
                terminal: self.terms[t.0].name.clone(),
            });
        }
        self.terms[t.0].net = Some(n);
        let net = &mut self.nets[n.0];
        net.core_terms.push(t);
        if self.terms[t.0].state != state::INP_PASSIVE {
            net.list_active.push(t);
        }
        Ok(())
    }

    /// Detach a terminal from a net.
    pub(crate) fn remove_terminal_from_net(&mut self, n: NetId, t: TermId) -> Result<()> {
        let net = &mut self.nets[n.0];
        let Some(pos) = net.core_terms.iter().position(|&x| x == t) else {
            return Err(NetlistError::TerminalNotInNet {
                terminal: self.terms[t.0].name.clone(),
                net: net.name.clone(),
            });
        };
        net.core_terms.remove(pos);
        net.list_active.retain(|&x| x != t);
        self.terms[t.0].net = None;
        Ok(())
    }

    /// Move every terminal of `from` onto `to`.
    pub(crate) fn move_connections(&mut self, from: NetId, to: NetId) -> Result<()> {
        let terms = std::mem::take(&mut self.nets[from.0].core_terms);
        self.nets[from.0].list_active.clear();
        for t in terms {
            self.terms[t.0].net = None;
            self.add_terminal_to_net(to, t)?;
        }
        Ok(())
    }

    pub(crate) fn reset_net(&mut self, n: NetId) {
        let terms = self.nets[n.0].core_terms.clone();
        let net = &mut self.nets[n.0];
        net.reset_values();
        net.list_active.clear();
        for t in terms {
            self.terms[t.0].reset();
            if self.terms[t.0].state != state::INP_PASSIVE {
                self.nets[n.0].list_active.push(t);
            }
        }
    }

    /// Recompute the active list from terminal states.
    pub(crate) fn rebuild_list(&mut self, n: NetId) {
        let list: Vec<TermId> = self.nets[n.0]
            .core_terms
            .iter()
            .copied()
            .filter(|t| self.terms[t.0].state != state::INP_PASSIVE)
            .collect();
        self.nets[n.0].list_active = list;
    }

    /// Schedule delivery of the pending value after `delay`.
    pub fn push_to_queue(&mut self, n: NetId, delay: SimTime) {
        if self.nets[n.0].num_cons() == 0 {
            return;
        }
        let now = self.time;
        let net = &mut self.nets[n.0];
        net.next_scheduled_time = now + delay;
        if net.in_queue == QueueStatus::Queued {
            self.queue.remove(n);
        }
        if net.list_active.is_empty() {
            net.in_queue = QueueStatus::DelayedDueToInactive;
        } else {
            net.in_queue = QueueStatus::Queued;
            self.queue.push(net.next_scheduled_time, Some(n));
        }
    }

    /// Move the pending delivery of the net to `now + delay`.
    pub fn reschedule_in_queue(&mut self, n: NetId, delay: SimTime) {
        if self.nets[n.0].in_queue == QueueStatus::Queued {
            self.queue.remove(n);
        }
        let next = self.time + delay;
        let net = &mut self.nets[n.0];
        net.next_scheduled_time = next;
        if net.list_active.is_empty() {
            net.in_queue = QueueStatus::DelayedDueToInactive;
        } else {
            net.in_queue = QueueStatus::Queued;
            self.queue.push(next, Some(n));
        }
    }

    /// Make the next delivery a transition regardless of the pending value.
    pub fn force_queue_execution(&mut self, n: NetId) {
        let net = &mut self.nets[n.0];
        net.new_q = net.cur_q ^ 1;
    }

    pub fn toggle_new_q(&mut self, n: NetId) {
        self.nets[n.0].new_q ^= 1;
    }

    pub fn toggle_and_push_to_queue(&mut self, n: NetId, delay: SimTime) {
        self.toggle_new_q(n);
        self.push_to_queue(n, delay);
    }

    /// Set a value that became effective at `at` without delivering it.
    ///
    /// Used by devices coming out of inactivity: their outputs were never
    /// observed, so the value is committed directly and only the effective
    /// time is recorded.
    pub fn set_q_time(&mut self, n: NetId, value: u32, at: SimTime) {
        let net = &mut self.nets[n.0];
        if value != net.new_q {
            net.in_queue = QueueStatus::DelayedDueToInactive;
            net.next_scheduled_time = at;
        }
        net.cur_q = value;
        net.new_q = value;
    }

    pub(crate) fn add_to_active_list(&mut self, n: NetId, t: TermId) {
        let now = self.time;
        let net = &mut self.nets[n.0];
        let was_empty = net.list_active.is_empty();
        net.list_active.insert(0, t);
        assert!(
            net.list_active.len() <= net.core_terms.len(),
            "net '{}': active count {} exceeds connection count {}",
            net.name,
            net.list_active.len(),
            net.core_terms.len()
        );
        if !was_empty {
            return;
        }
        let rail_dev = net.rail_terminal.map(|rt| self.terms[rt.0].device);
        if let Some(dev) = rail_dev {
            self.do_inc_active(dev);
        }
        let net = &mut self.nets[n.0];
        if net.in_queue == QueueStatus::DelayedDueToInactive {
            if net.next_scheduled_time > now {
                net.in_queue = QueueStatus::Queued;
                self.queue.push(net.next_scheduled_time, Some(n));
            } else {
                net.in_queue = QueueStatus::Delivered;
                net.cur_q = net.new_q;
            }
        }
    }

    pub(crate) fn remove_from_active_list(&mut self, n: NetId, t: TermId) {
        let net = &mut self.nets[n.0];
        let Some(pos) = net.list_active.iter().position(|&x| x == t) else {
            panic!(
                "net '{}': active count would go negative removing '{}'",
                net.name, self.terms[t.0].name
            );
        };
        net.list_active.remove(pos);
        if net.list_active.is_empty() {
            let rail_dev = net.rail_terminal.map(|rt| self.terms[rt.0].device);
            if let Some(dev) = rail_dev {
                self.do_dec_active(dev);
            }
        }
    }

    fn do_inc_active(&mut self, dev: DeviceId) {
        if !self.devices[dev.0].hint_deactivate {
            return;
        }
        self.stats.inc_active += 1;
        self.with_model(dev, |m, nl| m.inc_active(nl));
    }

    fn do_dec_active(&mut self, dev: DeviceId) {
        if !self.devices[dev.0].hint_deactivate {
            return;
        }
        self.with_model(dev, |m, nl| m.dec_active(nl));
    }

    /// Deliver the pending transition of a net to its listeners.
    pub(crate) fn update_devs(&mut self, n: NetId) {
        let net = &mut self.nets[n.0];
        debug_assert!(net.is_rail(), "update_devs on non-rail net '{}'", net.name);
        net.in_queue = QueueStatus::Delivered;
        let new_q = net.new_q;
        let mask = (new_q << state::INP_LH_SHIFT) | (net.cur_q << state::INP_HL_SHIFT);
        match mask as u16 {
            state::INP_HL | state::INP_LH => {
                // terminals of two-terminal elements on a rail hear every change
                self.process(n, mask as u16 | state::INP_ACTIVE | state::BIDIR, new_q);
            }
            _ => {}
        }
    }

    fn process(&mut self, n: NetId, mask: u16, sig: u32) {
        self.nets[n.0].cur_q = sig;
        self.stats.net_updates += 1;
        let mut list = std::mem::take(&mut self.scratch);
        list.clear();
        list.extend_from_slice(&self.nets[n.0].list_active);
        for &t in &list {
            // an earlier device may have inactivated this terminal
            if self.terms[t.0].state & mask != 0 {
                let dev = self.terms[t.0].device;
                self.update_device(dev);
            }
        }
        self.scratch = list;
    }

    /// Drive a logic output.
    pub fn push_logic(&mut self, out: TermId, value: u32, delay: SimTime) {
        let Some(n) = self.terms[out.0].net else {
            return;
        };
        if value != self.nets[n.0].new_q {
            self.nets[n.0].new_q = value;
            self.push_to_queue(n, delay);
        }
    }

    /// Set the value of a logic output without scheduling an event.
    pub fn init_logic(&mut self, out: TermId, value: u32) {
        if let Some(n) = self.terms[out.0].net {
            let net = &mut self.nets[n.0];
            net.cur_q = value;
            net.new_q = value;
        }
    }

    /// Drive an analog output; listeners are notified one quantum later.
    pub fn set_analog(&mut self, out: TermId, v: f64) {
        let Some(n) = self.terms[out.0].net else {
            return;
        };
        if v != self.nets[n.0].cur_analog {
            self.nets[n.0].cur_analog = v;
            self.toggle_and_push_to_queue(n, SimTime::quantum());
        }
    }

    /// Set the value of an analog output without notifying listeners.
    pub fn init_analog(&mut self, out: TermId, v: f64) {
        if let Some(n) = self.terms[out.0].net {
            self.nets[n.0].cur_analog = v;
        }
    }

    /// Net driven by an output terminal.
    pub fn output_net(&self, out: TermId) -> Option<NetId> {
        self.terms[out.0].net
    }
}
