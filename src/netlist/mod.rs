//! The netlist: arena of devices, terminals, nets and parameters, and the
//! event loop driving them.
//!
//! ## Structure
//!
//! Every entity lives in a flat vector of the [`Netlist`] and is referenced
//! by a typed index ([`DeviceId`], [`TermId`], [`NetId`], [`ParamId`]).
//! Terminals point to their net, nets list their terminals, and devices own
//! their terminals and parameters. Nothing holds a reference across calls.
//!
//! ## Event loop
//!
//! [`Netlist::process_queue_for`] pops events in time order and delivers
//! each net's pending transition to the devices listening on it. Device
//! models react by pushing new values onto their outputs, which schedules
//! further events.

mod device;
mod family;
mod net;
mod param;
mod state;
mod terminal;
mod types;

use std::collections::HashMap;

use tracing::{debug, info};

pub use device::{Device, DeviceModel};
pub use family::LogicFamily;
pub use net::Net;
pub use param::{parse_number, Param, ParamValue};
pub use state::{NetState, Snapshot};
pub use terminal::Terminal;
pub use types::{state as term_state, DeviceId, Domain, NetId, ParamId, QueueStatus, TermId, TermKind};

use crate::config::NetlistConfig;
use crate::error::{NetlistError, Result};
use crate::queue::Queue;
use crate::setup::ModelTable;
use crate::solver::MatrixSolver;
use crate::time::SimTime;

/// Event loop counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlistStats {
    /// Queue entries popped
    pub queue_pops: u64,
    /// Transitions delivered to listeners
    pub net_updates: u64,
    /// Devices woken up by a new listener
    pub inc_active: u64,
}

/// A delivered transition, recorded when tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceEntry {
    pub time: SimTime,
    pub net: NetId,
    pub q: u32,
}

/// Fast-path clock net toggled by the event loop itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MainClock {
    pub(crate) net: NetId,
    pub(crate) inc: SimTime,
}

/// A simulation instance.
#[derive(Debug)]
pub struct Netlist {
    pub(crate) config: NetlistConfig,
    pub(crate) time: SimTime,
    pub(crate) queue: Queue,
    pub(crate) devices: Vec<Device>,
    pub(crate) terms: Vec<Terminal>,
    pub(crate) nets: Vec<Net>,
    pub(crate) params: Vec<Param>,
    pub(crate) models: ModelTable,
    pub(crate) families: HashMap<String, LogicFamily>,
    /// Solver groups, taken out while one is solving
    pub(crate) solvers: Vec<Option<Box<MatrixSolver>>>,
    pub(crate) mainclock: Option<MainClock>,
    pub(crate) stats: NetlistStats,
    pub(crate) trace: Option<Vec<TraceEntry>>,
    scratch: Vec<TermId>,
    device_index: HashMap<String, DeviceId>,
    term_index: HashMap<String, TermId>,
    net_index: HashMap<String, NetId>,
    param_index: HashMap<String, ParamId>,
    /// Terminal aliases handed over by the setup once wiring is done
    aliases: HashMap<String, String>,
}

impl Netlist {
    pub fn new(config: NetlistConfig) -> Self {
        Self {
            config,
            time: SimTime::zero(),
            queue: Queue::with_capacity(0),
            devices: Vec::new(),
            terms: Vec::new(),
            nets: Vec::new(),
            params: Vec::new(),
            models: ModelTable::new(),
            families: HashMap::new(),
            solvers: Vec::new(),
            mainclock: None,
            stats: NetlistStats::default(),
            trace: None,
            scratch: Vec::new(),
            device_index: HashMap::new(),
            term_index: HashMap::new(),
            net_index: HashMap::new(),
            param_index: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn config(&self) -> &NetlistConfig {
        &self.config
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn stats(&self) -> NetlistStats {
        self.stats
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    // ============ Lookup ============

    pub fn find_device(&self, name: &str) -> Option<DeviceId> {
        self.device_index.get(name).copied()
    }

    /// Terminal by its full name or by an alias (`D1.A` for `D1.1`).
    pub fn find_term(&self, name: &str) -> Option<TermId> {
        if let Some(&t) = self.term_index.get(name) {
            return Some(t);
        }
        let mut cur = name;
        for _ in 0..=self.aliases.len() {
            cur = self.aliases.get(cur).map(String::as_str)?;
            if let Some(&t) = self.term_index.get(cur) {
                return Some(t);
            }
        }
        None
    }

    pub(crate) fn set_aliases(&mut self, aliases: HashMap<String, String>) {
        self.aliases = aliases;
    }

    pub fn find_net(&self, name: &str) -> Option<NetId> {
        self.net_index
            .get(name)
            .copied()
            .filter(|n| !self.nets[n.0].retired)
    }

    pub fn find_param(&self, name: &str) -> Result<ParamId> {
        self.param_index
            .get(name)
            .copied()
            .ok_or_else(|| NetlistError::ParamNotFound {
                name: name.to_string(),
            })
    }

    /// Devices of a class, in creation order.
    pub fn devices_of_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = DeviceId> + 'a {
        self.devices()
            .filter(move |(_, d)| d.class == class)
            .map(|(id, _)| id)
    }

    // ============ Construction ============

    pub(crate) fn add_device(&mut self, name: &str, class: &str) -> Result<DeviceId> {
        if self.device_index.contains_key(name) {
            return Err(NetlistError::DuplicateDevice {
                name: name.to_string(),
            });
        }
        let id = DeviceId(self.devices.len());
        self.devices
            .push(Device::new(name.to_string(), class.to_string(), LogicFamily::ttl()));
        self.device_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Create a terminal `<device>.<pin>`. Outputs get their own rail net.
    pub(crate) fn add_terminal(&mut self, dev: DeviceId, pin: &str, kind: TermKind) -> Result<TermId> {
        let name = format!("{}.{}", self.devices[dev.0].name, pin);
        if self.term_index.contains_key(&name) {
            return Err(NetlistError::DuplicateTerminal { name });
        }
        let id = TermId(self.terms.len());
        self.terms.push(Terminal::new(name.clone(), dev, kind));
        self.term_index.insert(name.clone(), id);
        self.devices[dev.0].terms.push(id);
        if let TermKind::Output(domain) = kind {
            let net = self.add_net(format!("{}.net", name), domain, Some(id));
            self.terms[id.0].net = Some(net);
        }
        Ok(id)
    }

    pub(crate) fn set_other(&mut self, a: TermId, b: TermId) {
        self.terms[a.0].other = Some(b);
        self.terms[b.0].other = Some(a);
    }

    pub(crate) fn set_dummy(&mut self, t: TermId) {
        self.terms[t.0].dummy = true;
    }

    pub(crate) fn set_proxy(&mut self, t: TermId, proxy: TermId) {
        self.terms[t.0].proxy = Some(proxy);
    }

    pub(crate) fn set_family(&mut self, d: DeviceId, family: LogicFamily) {
        self.devices[d.0].family = family;
    }

    pub(crate) fn add_param(&mut self, dev: DeviceId, name: &str, value: ParamValue) -> Result<ParamId> {
        let full = format!("{}.{}", self.devices[dev.0].name, name);
        if self.param_index.contains_key(&full) {
            return Err(NetlistError::DuplicateParam { name: full });
        }
        let id = ParamId(self.params.len());
        self.params.push(Param {
            name: full.clone(),
            device: dev,
            value,
        });
        self.param_index.insert(full, id);
        self.devices[dev.0].params.push(id);
        Ok(id)
    }

    // ============ Parameters ============

    pub fn param(&self, p: ParamId) -> &Param {
        &self.params[p.0]
    }

    pub fn param_f64(&self, p: ParamId) -> f64 {
        match &self.params[p.0].value {
            ParamValue::Double(v) => *v,
            ParamValue::Int(v) => *v as f64,
            ParamValue::Logic(v) => f64::from(u8::from(*v)),
            ParamValue::Str(s) | ParamValue::Model(s) => parse_number(s).unwrap_or(0.0),
        }
    }

    pub fn param_i64(&self, p: ParamId) -> i64 {
        match &self.params[p.0].value {
            ParamValue::Int(v) => *v,
            _ => self.param_f64(p) as i64,
        }
    }

    pub fn param_bool(&self, p: ParamId) -> bool {
        match &self.params[p.0].value {
            ParamValue::Logic(v) => *v,
            _ => self.param_f64(p) != 0.0,
        }
    }

    pub fn param_str(&self, p: ParamId) -> &str {
        match &self.params[p.0].value {
            ParamValue::Str(s) | ParamValue::Model(s) => s,
            _ => "",
        }
    }

    /// Value `entity` of the model held by a model parameter.
    pub fn param_model_value(&self, p: ParamId, entity: &str) -> Result<f64> {
        self.models.value(self.param_str(p), entity)
    }

    /// Change a parameter at run time and let its device re-read it.
    pub fn set_param(&mut self, name: &str, text: &str) -> Result<()> {
        let id = self.find_param(name)?;
        let value = self.params[id.0].value.parse_like(name, text)?;
        self.params[id.0].value = value;
        let dev = self.params[id.0].device;
        debug!(param = name, value = text, "parameter changed");
        self.with_model(dev, |m, nl| m.update_param(nl));
        Ok(())
    }

    /// Logic family described by a model string, cached per model.
    pub fn family_from_model(&mut self, model: &str) -> Result<LogicFamily> {
        let map = self.models.parse(model)?;
        match map.get("TYPE").map(String::as_str) {
            Some("TTL") => return Ok(LogicFamily::ttl()),
            Some("CD4XXX") => return Ok(LogicFamily::cd4xxx()),
            _ => {}
        }
        if let Some(f) = self.families.get(model) {
            return Ok(*f);
        }
        let v = |key: &str| ModelTable::value_of(&map, model, key);
        let family = LogicFamily {
            fixed_v: v("FV")?,
            low_thresh_pcnt: v("IVL")?,
            high_thresh_pcnt: v("IVH")?,
            low_vo: v("OVL")?,
            high_vo: v("OVH")?,
            r_low: v("ORL")?,
            r_high: v("ORH")?,
        };
        self.families.insert(model.to_string(), family);
        Ok(family)
    }

    // ============ Event loop ============

    /// Enable or disable recording of delivered transitions.
    pub fn set_trace(&mut self, on: bool) {
        self.trace = if on { Some(Vec::new()) } else { None };
    }

    /// Take the recorded transitions, leaving tracing enabled.
    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub(crate) fn set_mainclock(&mut self, out: TermId, inc: SimTime) {
        if let Some(net) = self.terms[out.0].net {
            self.mainclock = Some(MainClock { net, inc });
        }
    }

    fn deliver(&mut self, n: NetId) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceEntry {
                time: self.time,
                net: n,
                q: self.nets[n.0].new_q,
            });
        }
        self.update_devs(n);
    }

    /// Advance simulation time by at most `delta`.
    ///
    /// Returns once every event up to `now + delta` has been delivered; the
    /// time is then exactly `now + delta`.
    pub fn process_queue_for(&mut self, delta: SimTime) {
        let stop = self.time + delta;
        self.queue.push(stop, None);

        match self.mainclock {
            None => loop {
                let e = self.queue.pop();
                self.time = e.time;
                self.stats.queue_pops += 1;
                match e.net {
                    Some(n) => self.deliver(n),
                    None => break,
                }
            },
            Some(mc) => {
                let mut mc_time = self.nets[mc.net.0].next_scheduled_time;
                loop {
                    while self.queue.top().time > mc_time {
                        self.time = mc_time;
                        mc_time += mc.inc;
                        self.toggle_new_q(mc.net);
                        self.deliver(mc.net);
                    }
                    let e = self.queue.pop();
                    self.time = e.time;
                    self.stats.queue_pops += 1;
                    match e.net {
                        Some(n) => self.deliver(n),
                        None => break,
                    }
                }
                self.nets[mc.net.0].next_scheduled_time = mc_time;
            }
        }
    }

    // ============ Startup ============

    fn all_nets(&self) -> Vec<NetId> {
        (0..self.nets.len()).map(NetId).collect()
    }

    /// Bring the whole netlist to time zero and settle it.
    pub fn reset(&mut self) {
        self.time = SimTime::zero();
        self.queue.clear();
        self.mainclock = None;

        let nets = self.all_nets();
        for &n in &nets {
            self.reset_net(n);
        }
        for d in 0..self.devices.len() {
            self.with_model(DeviceId(d), |m, nl| m.reset(nl));
        }
        for d in 0..self.devices.len() {
            self.with_model(DeviceId(d), |m, nl| m.update_param(nl));
        }

        match self.config.startup_strategy {
            1 => {
                debug!("startup: updating all devices, last to first");
                for d in (0..self.devices.len()).rev() {
                    self.update_device(DeviceId(d));
                }
            }
            2 => {
                debug!("startup: updating all devices, first to last");
                for d in 0..self.devices.len() {
                    self.update_device(DeviceId(d));
                }
            }
            _ => self.startup_by_inputs(&nets),
        }

        // the startup updates may have left the lists out of sync with the
        // terminal states
        for &n in &nets {
            self.rebuild_list(n);
        }
    }

    /// Update once per connected input, then every device not reached.
    fn startup_by_inputs(&mut self, nets: &[NetId]) {
        let mut touched = vec![false; self.devices.len()];
        for &n in nets {
            let terms = self.nets[n.0].core_terms.clone();
            for t in terms {
                if self.terms[t.0].kind.is_input() {
                    let dev = self.terms[t.0].device;
                    touched[dev.0] = true;
                    self.update_device(dev);
                }
            }
        }
        debug!(
            "startup: {} devices updated through inputs",
            touched.iter().filter(|t| **t).count()
        );
        for (d, done) in touched.into_iter().enumerate() {
            if !done {
                self.update_device(DeviceId(d));
            }
        }
    }

    /// Stop the simulation and log statistics.
    pub fn stop(&mut self) {
        for d in 0..self.devices.len() {
            self.with_model(DeviceId(d), |m, nl| m.stop(nl));
        }
        info!(
            time = %self.time,
            queue_pops = self.stats.queue_pops,
            net_updates = self.stats.net_updates,
            inc_active = self.stats.inc_active,
            "simulation stopped"
        );
    }

    /// Size the event queue for the final net count.
    pub(crate) fn size_queue(&mut self) {
        let capacity = if self.config.queue_capacity > 0 {
            self.config.queue_capacity
        } else {
            self.nets.len() + 2
        };
        self.queue = Queue::with_capacity(capacity);
    }

    pub(crate) fn retire_net(&mut self, n: NetId) {
        self.nets[n.0].retired = true;
    }
}
