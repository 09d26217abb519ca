//! Devices and the device model interface.
//!
//! A device in the arena is a name, a set of terminals and parameters, and a
//! boxed [`DeviceModel`] holding the behaviour. Calls into a model go through
//! [`Netlist::with_model`], which takes the model out of the arena for the
//! duration of the call so it can mutate the rest of the netlist.

use std::collections::BTreeMap;
use std::fmt::Debug;

use super::family::LogicFamily;
use super::types::{DeviceId, ParamId, TermId};
use super::Netlist;
use crate::time::SimTime;

/// Behaviour of a device.
///
/// Every method has a default so models only implement what they use.
pub trait DeviceModel: Debug + Send {
    /// Bring the device to its power-on state.
    fn reset(&mut self, _nl: &mut Netlist) {}

    /// Re-read parameters after they changed.
    fn update_param(&mut self, _nl: &mut Netlist) {}

    /// An input the device listens to changed.
    fn update(&mut self, _nl: &mut Netlist) {}

    /// Re-stamp at the current operating point. Only called on dynamic
    /// devices, once per Newton iteration.
    fn update_terminals(&mut self, _nl: &mut Netlist) {}

    /// Advance reactive state by `dt` seconds. Only called on timestep
    /// devices, once per solver step.
    fn step_time(&mut self, _nl: &mut Netlist, _dt: f64) {}

    /// First listener appeared on one of the device's outputs.
    fn inc_active(&mut self, _nl: &mut Netlist) {}

    /// Last listener disappeared from one of the device's outputs.
    fn dec_active(&mut self, _nl: &mut Netlist) {}

    /// Simulation is stopping.
    fn stop(&mut self, _nl: &mut Netlist) {}

    /// Stamps depend on the operating point.
    fn is_dynamic(&self) -> bool {
        false
    }

    /// Stamps depend on the time step.
    fn is_timestep(&self) -> bool {
        false
    }

    /// Store internal state into `state`.
    fn save_state(&self, _state: &mut BTreeMap<String, f64>) {}

    /// Restore internal state saved by [`DeviceModel::save_state`].
    fn load_state(&mut self, _state: &BTreeMap<String, f64>) {}
}

/// A device instance in the arena.
#[derive(Debug)]
pub struct Device {
    pub(crate) name: String,
    pub(crate) class: String,
    pub(crate) terms: Vec<TermId>,
    pub(crate) params: Vec<ParamId>,
    pub(crate) model: Option<Box<dyn DeviceModel>>,
    pub(crate) family: LogicFamily,
    /// Device wants inc_active/dec_active notifications
    pub(crate) hint_deactivate: bool,
    pub(crate) is_dynamic: bool,
    pub(crate) is_timestep: bool,
    pub(crate) update_calls: u64,
}

impl Device {
    pub(crate) fn new(name: String, class: String, family: LogicFamily) -> Self {
        Self {
            name,
            class,
            terms: Vec::new(),
            params: Vec::new(),
            model: None,
            family,
            hint_deactivate: false,
            is_dynamic: false,
            is_timestep: false,
            update_calls: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn terms(&self) -> &[TermId] {
        &self.terms
    }

    pub fn params(&self) -> &[ParamId] {
        &self.params
    }

    pub fn family(&self) -> &LogicFamily {
        &self.family
    }

    pub fn is_dynamic(&self) -> bool {
        self.is_dynamic
    }

    pub fn is_timestep(&self) -> bool {
        self.is_timestep
    }

    pub fn update_calls(&self) -> u64 {
        self.update_calls
    }

    pub fn model(&self) -> Option<&dyn DeviceModel> {
        self.model.as_deref()
    }
}

impl Netlist {
    pub fn device(&self, d: DeviceId) -> &Device {
        &self.devices[d.0]
    }

    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &Device)> + '_ {
        self.devices.iter().enumerate().map(|(i, d)| (DeviceId(i), d))
    }

    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    pub fn family(&self, d: DeviceId) -> LogicFamily {
        self.devices[d.0].family
    }

    pub fn set_hint_deactivate(&mut self, d: DeviceId, on: bool) {
        self.devices[d.0].hint_deactivate = on && self.config.use_deactivate;
    }

    pub(crate) fn set_model(&mut self, d: DeviceId, model: Box<dyn DeviceModel>) {
        let dev = &mut self.devices[d.0];
        dev.is_dynamic = model.is_dynamic();
        dev.is_timestep = model.is_timestep();
        dev.model = Some(model);
    }

    /// Run `f` with the model of `d` taken out of the arena.
    ///
    /// Returns `None` without calling `f` if the device has no model or its
    /// model is already executing further up the stack.
    pub fn with_model<R>(
        &mut self,
        d: DeviceId,
        f: impl FnOnce(&mut dyn DeviceModel, &mut Netlist) -> R,
    ) -> Option<R> {
        let mut model = self.devices[d.0].model.take()?;
        let r = f(model.as_mut(), self);
        self.devices[d.0].model = Some(model);
        Some(r)
    }

    pub(crate) fn update_device(&mut self, d: DeviceId) {
        self.devices[d.0].update_calls += 1;
        self.with_model(d, |m, nl| m.update(nl));
    }

    pub(crate) fn step_device(&mut self, d: DeviceId, dt: f64) {
        self.with_model(d, |m, nl| m.step_time(nl, dt));
    }

    pub(crate) fn update_device_terminals(&mut self, d: DeviceId) {
        self.with_model(d, |m, nl| m.update_terminals(nl));
    }

    /// Current simulation time, convenience for models.
    pub fn now(&self) -> SimTime {
        self.time
    }
}
