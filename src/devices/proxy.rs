//! Domain-crossing proxies, inserted by the link resolver.

use std::collections::BTreeMap;

use super::twoterm::TwoTerm;
use crate::error::Result;
use crate::netlist::{DeviceId, DeviceModel, Netlist, TermId};
use crate::setup::DeviceBuilder;
use crate::time::SimTime;

pub const D_TO_A_CLASS: &str = "D_TO_A_PROXY";
pub const A_TO_D_CLASS: &str = "A_TO_D_PROXY";

/// Logic input of a D/A proxy.
pub const DA_INPUT: &str = "I";
/// Analog side of a D/A proxy.
pub const DA_TERM: &str = "RV.1";
/// Analog input of an A/D proxy.
pub const AD_INPUT: &str = "I";
/// Logic output of an A/D proxy.
pub const AD_OUTPUT: &str = "Q";

const AD_DELAY: SimTime = SimTime::from_nsec(1);

/// Drives an analog net from a logic output: a voltage source with the
/// family's output level and resistance, referenced to its own ground rail.
#[derive(Debug)]
pub struct DToAProxy {
    dev: DeviceId,
    input: TermId,
    rv: TwoTerm,
    gnd: TermId,
    last_state: Option<u32>,
}

impl DToAProxy {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let input = b.logic_input(DA_INPUT)?;
        let rv = TwoTerm::new(b, DA_TERM, "RV.2")?;
        let gnd = b.analog_output("_Q")?;
        b.connect("RV.2", "_Q");
        Ok(Box::new(DToAProxy {
            dev: b.id(),
            input,
            rv,
            gnd,
            last_state: None,
        }))
    }

    fn apply(&self, nl: &mut Netlist, state: u32) {
        let f = nl.family(self.dev);
        let (r, v) = if state != 0 {
            (f.r_high, f.high_v(f.supply()))
        } else {
            (f.r_low, f.low_v(0.0))
        };
        self.rv.set(nl, 1.0 / r, v, 0.0);
    }
}

impl DeviceModel for DToAProxy {
    fn reset(&mut self, nl: &mut Netlist) {
        self.last_state = None;
        nl.init_analog(self.gnd, 0.0);
        self.apply(nl, 0);
    }

    fn update(&mut self, nl: &mut Netlist) {
        let state = nl.input_q(self.input);
        if self.last_state != Some(state) {
            self.last_state = Some(state);
            self.apply(nl, state);
            self.rv.solve_now(nl);
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

/// Drives a logic input from an analog net using the family thresholds.
/// Between the thresholds the output holds its value.
#[derive(Debug)]
pub struct AToDProxy {
    dev: DeviceId,
    input: TermId,
    q: TermId,
}

impl AToDProxy {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let input = b.analog_input(AD_INPUT)?;
        let q = b.logic_output(AD_OUTPUT)?;
        Ok(Box::new(AToDProxy {
            dev: b.id(),
            input,
            q,
        }))
    }
}

impl DeviceModel for AToDProxy {
    fn update(&mut self, nl: &mut Netlist) {
        let f = nl.family(self.dev);
        let v = nl.input_v(self.input);
        let vp = f.supply();
        if v > f.high_thresh_v(0.0, vp) {
            nl.push_logic(self.q, 1, AD_DELAY);
        } else if v < f.low_thresh_v(0.0, vp) {
            nl.push_logic(self.q, 0, AD_DELAY);
        }
    }
}
