//! Save and restore of the dynamic simulation state.
//!
//! A [`Snapshot`] captures everything that changes while the simulation
//! runs: the time, the pending queue entries, every net's values and
//! activity list, terminal states and stamps, device model state and the
//! solver histories. Entities are stored by name so a snapshot can be
//! loaded into a freshly built instance of the same description.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{DeviceId, NetId, QueueStatus, TermId};
use super::Netlist;
use crate::error::{NetlistError, Result};
use crate::solver::SolverState;
use crate::time::SimTime;

/// Saved state of a net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetState {
    pub name: String,
    pub new_q: u32,
    pub cur_q: u32,
    pub cur_analog: f64,
    pub in_queue: QueueStatus,
    pub next_scheduled_time: SimTime,
    /// Active terminal names, in list order
    pub active: Vec<String>,
}

/// Saved state of a terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermState {
    pub state: u16,
    pub go: f64,
    pub gt: f64,
    pub idr: f64,
}

/// Complete dynamic state of a netlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time: SimTime,
    /// Pending events, earliest first
    pub queue: Vec<(SimTime, String)>,
    pub nets: Vec<NetState>,
    pub terminals: BTreeMap<String, TermState>,
    pub devices: BTreeMap<String, BTreeMap<String, f64>>,
    pub solvers: Vec<SolverState>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Netlist {
    /// Capture the dynamic state.
    pub fn save_state(&self) -> Snapshot {
        let queue = self
            .queue
            .iter()
            .filter_map(|e| e.net.map(|n| (e.time, self.nets[n.0].name.clone())))
            .collect();

        let nets = self
            .nets
            .iter()
            .map(|n| NetState {
                name: n.name.clone(),
                new_q: n.new_q,
                cur_q: n.cur_q,
                cur_analog: n.cur_analog,
                in_queue: n.in_queue,
                next_scheduled_time: n.next_scheduled_time,
                active: n
                    .list_active
                    .iter()
                    .map(|t| self.terms[t.0].name.clone())
                    .collect(),
            })
            .collect();

        let terminals = self
            .terms
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    TermState {
                        state: t.state,
                        go: t.go,
                        gt: t.gt,
                        idr: t.idr,
                    },
                )
            })
            .collect();

        let devices = self
            .devices
            .iter()
            .filter_map(|d| {
                let mut state = BTreeMap::new();
                d.model.as_ref()?.save_state(&mut state);
                (!state.is_empty()).then(|| (d.name.clone(), state))
            })
            .collect();

        let solvers = self
            .solvers
            .iter()
            .flatten()
            .map(|s| s.save_state())
            .collect();

        Snapshot {
            time: self.time,
            queue,
            nets,
            terminals,
            devices,
            solvers,
        }
    }

    fn net_by_name(&self, name: &str) -> Result<NetId> {
        self.net_index
            .get(name)
            .copied()
            .ok_or_else(|| NetlistError::state(format!("unknown net '{}'", name)))
    }

    fn term_by_name(&self, name: &str) -> Result<TermId> {
        self.find_term(name)
            .ok_or_else(|| NetlistError::state(format!("unknown terminal '{}'", name)))
    }

    /// Restore a state captured by [`Netlist::save_state`] on a netlist
    /// built from the same description.
    ///
    /// Every name and shape in the snapshot is checked before anything is
    /// changed, so on error the netlist is left as it was.
    pub fn load_state(&mut self, snap: &Snapshot) -> Result<()> {
        let num_solvers = self.solvers.iter().flatten().count();
        if snap.nets.len() != self.nets.len() || snap.solvers.len() != num_solvers {
            return Err(NetlistError::state(format!(
                "snapshot has {} nets and {} solver groups, netlist has {} and {}",
                snap.nets.len(),
                snap.solvers.len(),
                self.nets.len(),
                num_solvers
            )));
        }

        let mut nets = Vec::with_capacity(snap.nets.len());
        for ns in &snap.nets {
            let id = self.net_by_name(&ns.name)?;
            let active = ns
                .active
                .iter()
                .map(|name| self.term_by_name(name))
                .collect::<Result<Vec<_>>>()?;
            nets.push((id, active));
        }

        let terms = snap
            .terminals
            .keys()
            .map(|name| self.term_by_name(name))
            .collect::<Result<Vec<_>>>()?;

        let devices = snap
            .devices
            .keys()
            .map(|name| {
                self.find_device(name)
                    .ok_or_else(|| NetlistError::state(format!("unknown device '{}'", name)))
            })
            .collect::<Result<Vec<DeviceId>>>()?;

        for (s, state) in self.solvers.iter().flatten().zip(&snap.solvers) {
            s.check_state(state)?;
        }

        if snap.queue.len() > self.queue.capacity() {
            return Err(NetlistError::state(format!(
                "snapshot queues {} events, capacity is {}",
                snap.queue.len(),
                self.queue.capacity()
            )));
        }
        let mut queued = vec![false; self.nets.len()];
        let mut queue = Vec::with_capacity(snap.queue.len());
        for (t, name) in &snap.queue {
            let id = self.net_by_name(name)?;
            if std::mem::replace(&mut queued[id.0], true) {
                return Err(NetlistError::state(format!("net '{}' queued twice", name)));
            }
            queue.push((*t, id));
        }

        for (ns, (id, active)) in snap.nets.iter().zip(nets) {
            let net = &mut self.nets[id.0];
            net.new_q = ns.new_q;
            net.cur_q = ns.cur_q;
            net.cur_analog = ns.cur_analog;
            net.in_queue = ns.in_queue;
            net.next_scheduled_time = ns.next_scheduled_time;
            net.list_active = active;
        }

        for (ts, id) in snap.terminals.values().zip(terms) {
            let t = &mut self.terms[id.0];
            t.state = ts.state;
            t.go = ts.go;
            t.gt = ts.gt;
            t.idr = ts.idr;
        }

        for (state, id) in snap.devices.values().zip(devices) {
            if let Some(model) = self.devices[id.0].model.as_mut() {
                model.load_state(state);
            }
        }

        for (slot, state) in self.solvers.iter_mut().flatten().zip(&snap.solvers) {
            slot.load_state(state)?;
        }

        self.time = snap.time;
        self.queue.clear();
        // pushing in reverse keeps equal-time entries in their saved pop order
        for &(t, id) in queue.iter().rev() {
            self.queue.push(t, Some(id));
        }
        Ok(())
    }
}
