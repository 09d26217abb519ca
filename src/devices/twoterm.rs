//! Two-terminal analog elements.
//!
//! Every element here is a Norton equivalent between terminals `1` and `2`:
//! a conductance `G`, a series voltage `V` and a parallel current `I`,
//! stamped through [`Netlist::set_twoterm`]. Reactive and non-linear
//! elements recompute their equivalent per timestep or per Newton
//! iteration.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::netlist::{DeviceModel, Netlist, ParamId, TermId};
use crate::setup::DeviceBuilder;

/// Conductance used for open circuits and as the diode leakage floor.
pub const GMIN: f64 = 1e-9;

const R_MIN: f64 = 1e-9;

/// The two terminals of an element.
#[derive(Debug, Clone, Copy)]
pub struct TwoTerm {
    pub p: TermId,
    pub n: TermId,
}

impl TwoTerm {
    pub fn new(b: &mut DeviceBuilder, p: &str, n: &str) -> Result<Self> {
        let (p, n) = b.terminal_pair(p, n)?;
        Ok(Self { p, n })
    }

    /// Terminals `1` and `2`.
    pub fn numbered(b: &mut DeviceBuilder) -> Result<Self> {
        Self::new(b, "1", "2")
    }

    pub fn set(&self, nl: &mut Netlist, g: f64, v: f64, i: f64) {
        nl.set_twoterm(self.p, self.n, g, v, i);
    }

    pub fn set_r(&self, nl: &mut Netlist, r: f64) {
        self.set(nl, 1.0 / r.max(R_MIN), 0.0, 0.0);
    }

    /// Voltage across the element, `1` relative to `2`.
    pub fn delta_v(&self, nl: &Netlist) -> f64 {
        nl.input_v(self.p) - nl.input_v(self.n)
    }

    /// Re-solve the group the element sits in.
    pub fn solve_now(&self, nl: &mut Netlist) {
        let p_on_rail = nl
            .terminal(self.p)
            .net()
            .is_some_and(|n| nl.net(n).is_rail());
        if p_on_rail {
            nl.solve_now(self.n);
        } else {
            nl.solve_now(self.p);
        }
    }
}

/// `RES`: linear resistor.
#[derive(Debug)]
pub struct Resistor {
    t: TwoTerm,
    r: ParamId,
}

impl Resistor {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let t = TwoTerm::numbered(b)?;
        let r = b.param_f64("R", 1e9)?;
        Ok(Box::new(Resistor { t, r }))
    }
}

impl DeviceModel for Resistor {
    fn update_param(&mut self, nl: &mut Netlist) {
        let r = nl.param_f64(self.r);
        self.t.set_r(nl, r);
        self.t.solve_now(nl);
    }

    fn update(&mut self, nl: &mut Netlist) {
        self.t.solve_now(nl);
    }
}

/// `CAP`: capacitor, backward Euler companion model.
#[derive(Debug)]
pub struct Capacitor {
    t: TwoTerm,
    c: ParamId,
}

impl Capacitor {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let t = TwoTerm::numbered(b)?;
        let c = b.param_f64("C", 1e-6)?;
        Ok(Box::new(Capacitor { t, c }))
    }
}

impl DeviceModel for Capacitor {
    fn reset(&mut self, nl: &mut Netlist) {
        self.t.set(nl, GMIN, 0.0, 0.0);
    }

    fn update(&mut self, nl: &mut Netlist) {
        self.t.solve_now(nl);
    }

    fn step_time(&mut self, nl: &mut Netlist, dt: f64) {
        let g = nl.param_f64(self.c) / dt;
        let i = -g * self.t.delta_v(nl);
        self.t.set(nl, g, 0.0, i);
    }

    fn is_timestep(&self) -> bool {
        true
    }
}

/// `VS`: voltage source with internal resistance.
#[derive(Debug)]
pub struct VoltageSource {
    t: TwoTerm,
    r: ParamId,
    v: ParamId,
}

impl VoltageSource {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let t = TwoTerm::new(b, "P", "N")?;
        let r = b.param_f64("R", 0.1)?;
        let v = b.param_f64("V", 0.0)?;
        Ok(Box::new(VoltageSource { t, r, v }))
    }
}

impl DeviceModel for VoltageSource {
    fn update_param(&mut self, nl: &mut Netlist) {
        let (r, v) = (nl.param_f64(self.r).max(R_MIN), nl.param_f64(self.v));
        self.t.set(nl, 1.0 / r, v, 0.0);
        self.t.solve_now(nl);
    }

    fn update(&mut self, nl: &mut Netlist) {
        self.t.solve_now(nl);
    }
}

/// `CS`: ideal current source, current flowing from `P` through the
/// element into `N`.
#[derive(Debug)]
pub struct CurrentSource {
    t: TwoTerm,
    i: ParamId,
}

impl CurrentSource {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let t = TwoTerm::new(b, "P", "N")?;
        let i = b.param_f64("I", 0.0)?;
        Ok(Box::new(CurrentSource { t, i }))
    }
}

impl DeviceModel for CurrentSource {
    fn update_param(&mut self, nl: &mut Netlist) {
        let i = nl.param_f64(self.i);
        self.t.set(nl, 0.0, 0.0, i);
        self.t.solve_now(nl);
    }

    fn update(&mut self, nl: &mut Netlist) {
        self.t.solve_now(nl);
    }
}

/// Shockley diode with junction voltage limiting.
#[derive(Debug, Clone, Copy)]
pub struct DiodeModel {
    is: f64,
    vt: f64,
    vt_inv: f64,
    vcrit: f64,
    vd: f64,
    id: f64,
    g: f64,
}

impl DiodeModel {
    pub fn new(is: f64, n: f64) -> Self {
        let mut d = Self {
            is: 1e-15,
            vt: 0.0258,
            vt_inv: 1.0 / 0.0258,
            vcrit: 0.0,
            vd: 0.0,
            id: 0.0,
            g: GMIN,
        };
        d.set_param(is, n);
        d
    }

    pub fn set_param(&mut self, is: f64, n: f64) {
        self.is = is;
        self.vt = 0.0258 * n;
        self.vt_inv = 1.0 / self.vt;
        self.vcrit = self.vt * (self.vt / self.is / std::f64::consts::SQRT_2).ln();
    }

    /// Move the operating point towards `nvd`. Above the critical voltage
    /// the step is limited logarithmically.
    pub fn update(&mut self, nvd: f64) {
        if nvd < -5.0 * self.vt {
            self.vd = nvd;
            self.g = GMIN;
            self.id = -self.is;
            return;
        }
        if nvd < self.vcrit {
            self.vd = nvd;
        } else {
            let a = ((nvd - self.vd) * self.vt_inv).max(-0.99);
            self.vd += a.ln_1p() * self.vt;
        }
        let e = (self.vd * self.vt_inv).exp();
        self.id = self.is * (e - 1.0);
        self.g = self.is * self.vt_inv * e + GMIN;
    }

    pub fn g(&self) -> f64 {
        self.g
    }

    pub fn id(&self) -> f64 {
        self.id
    }

    pub fn vd(&self) -> f64 {
        self.vd
    }

    /// Equivalent current of the linearized diode.
    pub fn ieq(&self) -> f64 {
        self.id - self.vd * self.g
    }
}

/// `DIODE`: anode `A` (terminal `1`), cathode `K` (terminal `2`).
#[derive(Debug)]
pub struct Diode {
    t: TwoTerm,
    model: ParamId,
    d: DiodeModel,
}

impl Diode {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let t = TwoTerm::numbered(b)?;
        b.alias("A", "1")?;
        b.alias("K", "2")?;
        let model = b.param_model("MODEL", "D")?;
        // fail at setup on a model without IS or N
        let nl = b.netlist();
        let is = nl.param_model_value(model, "IS")?;
        let n = nl.param_model_value(model, "N")?;
        Ok(Box::new(Diode {
            t,
            model,
            d: DiodeModel::new(is, n),
        }))
    }
}

impl DeviceModel for Diode {
    fn reset(&mut self, nl: &mut Netlist) {
        self.d.update(0.0);
        self.t.set(nl, self.d.g(), 0.0, self.d.ieq());
    }

    fn update_param(&mut self, nl: &mut Netlist) {
        let is = nl.param_model_value(self.model, "IS");
        let n = nl.param_model_value(self.model, "N");
        if let (Ok(is), Ok(n)) = (is, n) {
            self.d.set_param(is, n);
        }
    }

    fn update(&mut self, nl: &mut Netlist) {
        self.t.solve_now(nl);
    }

    fn update_terminals(&mut self, nl: &mut Netlist) {
        let v = self.t.delta_v(nl);
        self.d.update(v);
        self.t.set(nl, self.d.g(), 0.0, self.d.ieq());
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn save_state(&self, state: &mut BTreeMap<String, f64>) {
        state.insert("vd".to_string(), self.d.vd);
        state.insert("id".to_string(), self.d.id);
        state.insert("g".to_string(), self.d.g);
    }

    fn load_state(&mut self, state: &BTreeMap<String, f64>) {
        let get = |k: &str, cur: f64| state.get(k).copied().unwrap_or(cur);
        self.d.vd = get("vd", self.d.vd);
        self.d.id = get("id", self.d.id);
        self.d.g = get("g", self.d.g);
    }
}

/// `SWITCH`: resistor between `1` and `2`, closed while `POS` is non-zero.
#[derive(Debug)]
pub struct Switch {
    t: TwoTerm,
    pos: ParamId,
}

const R_ON: f64 = 0.01;
const R_OFF: f64 = 1e20;

impl Switch {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let t = TwoTerm::numbered(b)?;
        let pos = b.param_int("POS", 0)?;
        Ok(Box::new(Switch { t, pos }))
    }
}

impl DeviceModel for Switch {
    fn update_param(&mut self, nl: &mut Netlist) {
        let r = if nl.param_i64(self.pos) != 0 { R_ON } else { R_OFF };
        self.t.set_r(nl, r);
        self.t.solve_now(nl);
    }

    fn update(&mut self, nl: &mut Netlist) {
        self.t.solve_now(nl);
    }
}

/// `RES_SWITCH`: resistor between `P1` and `P2`, `RON` while the logic
/// input `IN` is high and `ROFF` otherwise.
#[derive(Debug)]
pub struct ResSwitch {
    t: TwoTerm,
    input: TermId,
    ron: ParamId,
    roff: ParamId,
    last_state: Option<u32>,
}

impl ResSwitch {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let t = TwoTerm::numbered(b)?;
        let input = b.logic_input("I")?;
        b.alias("IN", "I")?;
        b.alias("P1", "1")?;
        b.alias("P2", "2")?;
        let ron = b.param_f64("RON", 1.0)?;
        let roff = b.param_f64("ROFF", 1e20)?;
        Ok(Box::new(ResSwitch {
            t,
            input,
            ron,
            roff,
            last_state: None,
        }))
    }

    fn apply(&mut self, nl: &mut Netlist, state: u32) {
        let r = if state != 0 { nl.param_f64(self.ron) } else { nl.param_f64(self.roff) };
        self.t.set_r(nl, r);
        self.t.solve_now(nl);
    }
}

impl DeviceModel for ResSwitch {
    fn reset(&mut self, nl: &mut Netlist) {
        self.last_state = None;
        self.apply(nl, 0);
    }

    fn update_param(&mut self, nl: &mut Netlist) {
        let state = self.last_state.unwrap_or(0);
        self.apply(nl, state);
    }

    fn update(&mut self, nl: &mut Netlist) {
        let state = nl.input_q(self.input);
        if self.last_state != Some(state) {
            self.last_state = Some(state);
            self.apply(nl, state);
        } else {
            self.t.solve_now(nl);
        }
    }

    fn save_state(&self, state: &mut BTreeMap<String, f64>) {
        if let Some(s) = self.last_state {
            state.insert("last_state".to_string(), f64::from(s));
        }
    }

    fn load_state(&mut self, state: &BTreeMap<String, f64>) {
        self.last_state = state.get("last_state").map(|&s| s as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_diode_forward_current() {
        let mut d = DiodeModel::new(1e-15, 1.0);
        // below the critical voltage: no limiting
        d.update(0.6);
        assert_relative_eq!(d.vd(), 0.6);
        let expected = 1e-15 * ((0.6f64 / 0.0258).exp() - 1.0);
        assert_relative_eq!(d.id(), expected, max_relative = 1e-6);
        assert_relative_eq!(d.ieq(), d.id() - d.vd() * d.g());
    }

    #[test]
    fn test_diode_reverse_cutoff() {
        let mut d = DiodeModel::new(1e-15, 1.0);
        d.update(-1.0);
        assert_eq!(d.g(), GMIN);
        assert_eq!(d.id(), -1e-15);
    }

    #[test]
    fn test_diode_limiting_above_vcrit() {
        let mut d = DiodeModel::new(1e-15, 1.0);
        d.update(5.0);
        // a single step never jumps straight to 5V
        assert!(d.vd() < 1.0);
        assert!(d.vd() > 0.0);
    }
}
