use std::collections::BTreeMap;
use std::sync::Arc;

use super::TruthTable;
use crate::error::Result;
use crate::netlist::{DeviceModel, Netlist, TermId};
use crate::setup::DeviceBuilder;
use crate::time::SimTime;

/// Device driven by a compiled [`TruthTable`].
///
/// With more than one input the device tracks how many of its outputs are
/// observed. When none is, it stops listening to all inputs; when the first
/// listener returns it re-reads its inputs and sets its outputs as if they
/// had been updated all along.
#[derive(Debug)]
pub struct TruthTableDevice {
    table: Arc<TruthTable>,
    inputs: Vec<TermId>,
    outputs: Vec<TermId>,
    /// Inputs currently not listened to
    ign: u32,
    /// Outputs with at least one listener
    active: u32,
}

impl TruthTableDevice {
    pub fn build(b: &mut DeviceBuilder, table: Arc<TruthTable>) -> Result<Box<dyn DeviceModel>> {
        let family = b.netlist().family_from_model(table.family())?;
        b.set_family(family);
        let inputs = table
            .inputs()
            .iter()
            .map(|name| b.logic_input(name))
            .collect::<Result<Vec<_>>>()?;
        let outputs = table
            .outputs()
            .iter()
            .map(|name| b.logic_output(name))
            .collect::<Result<Vec<_>>>()?;
        for &(o, i) in table.feedback() {
            b.connect(&table.outputs()[o], &table.inputs()[i]);
        }
        b.hint_deactivate();
        Ok(Box::new(TruthTableDevice {
            table,
            inputs,
            outputs,
            ign: 0,
            active: 0,
        }))
    }

    fn multi_input(&self) -> bool {
        self.inputs.len() > 1
    }

    fn process(&mut self, nl: &mut Netlist, do_out: bool) {
        let mut state = 0u32;
        let mut mt = SimTime::zero();
        for (i, &t) in self.inputs.iter().enumerate() {
            if !do_out {
                nl.activate(t);
                if let Some(n) = nl.terminal(t).net() {
                    mt = mt.max(nl.net(n).next_scheduled_time());
                }
            } else if self.multi_input() && self.ign & (1 << i) != 0 {
                nl.activate(t);
            }
            state |= nl.input_q(t) << i;
        }

        let out = self.table.out(state);
        self.ign = self.table.ignore(state);

        for (j, &o) in self.outputs.iter().enumerate() {
            let v = (out >> j) & 1;
            let delay = self.table.delay(state, j);
            if do_out {
                nl.push_logic(o, v, delay);
            } else if let Some(n) = nl.output_net(o) {
                nl.set_q_time(n, v, mt + delay);
            }
        }

        if self.multi_input() {
            for (i, &t) in self.inputs.iter().enumerate() {
                if self.ign & (1 << i) != 0 {
                    nl.inactivate(t);
                }
            }
        }
    }
}

impl DeviceModel for TruthTableDevice {
    fn reset(&mut self, nl: &mut Netlist) {
        for &t in &self.inputs {
            nl.activate(t);
        }
        self.ign = 0;
        self.active = self
            .outputs
            .iter()
            .filter(|&&o| nl.output_net(o).is_some_and(|n| nl.net(n).num_cons() > 0))
            .count() as u32;
    }

    fn update(&mut self, nl: &mut Netlist) {
        self.process(nl, true);
    }

    fn inc_active(&mut self, nl: &mut Netlist) {
        if self.multi_input() {
            self.active += 1;
            if self.active == 1 {
                self.process(nl, false);
            }
        }
    }

    fn dec_active(&mut self, nl: &mut Netlist) {
        if self.multi_input() {
            self.active = self.active.saturating_sub(1);
            if self.active == 0 {
                for &t in &self.inputs {
                    nl.inactivate(t);
                }
                self.ign = !0;
            }
        }
    }

    fn save_state(&self, state: &mut BTreeMap<String, f64>) {
        state.insert("ign".to_string(), f64::from(self.ign));
        state.insert("active".to_string(), f64::from(self.active));
    }

    fn load_state(&mut self, state: &BTreeMap<String, f64>) {
        if let Some(&v) = state.get("ign") {
            self.ign = v as u32;
        }
        if let Some(&v) = state.get("active") {
            self.active = v as u32;
        }
    }
}
