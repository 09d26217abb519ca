//! System devices: rails, constant inputs, clocks, frontiers and log devices.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::warn;

use super::twoterm::TwoTerm;
use crate::error::Result;
use crate::netlist::{DeviceModel, Netlist, ParamId, TermId};
use crate::setup::DeviceBuilder;
use crate::time::SimTime;

/// Analog ground.
#[derive(Debug)]
pub struct Gnd {
    q: TermId,
}

impl Gnd {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        Ok(Box::new(Gnd { q: b.analog_output("Q")? }))
    }
}

impl DeviceModel for Gnd {
    fn reset(&mut self, nl: &mut Netlist) {
        nl.init_analog(self.q, 0.0);
    }
}

/// Constant logic level, settable at run time through `IN`.
#[derive(Debug)]
pub struct LogicInput {
    q: TermId,
    value: ParamId,
}

impl LogicInput {
    /// `LOGIC_INPUT`: family taken from the `FAMILY` model parameter.
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let q = b.logic_output("Q")?;
        let value = b.param_int("IN", 0)?;
        let family = b.param_model("FAMILY", "FAMILY(TYPE=TTL)")?;
        let family = b.family_from_param(family)?;
        b.set_family(family);
        Ok(Box::new(LogicInput { q, value }))
    }

    /// `TTL_INPUT`: always TTL.
    pub fn build_ttl(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let q = b.logic_output("Q")?;
        let value = b.param_int("IN", 0)?;
        Ok(Box::new(LogicInput { q, value }))
    }
}

impl DeviceModel for LogicInput {
    fn reset(&mut self, nl: &mut Netlist) {
        nl.init_logic(self.q, 0);
    }

    fn update_param(&mut self, nl: &mut Netlist) {
        let v = (nl.param_i64(self.value) & 1) as u32;
        nl.push_logic(self.q, v, SimTime::from_nsec(1));
    }
}

/// Constant voltage, settable at run time through `IN`.
#[derive(Debug)]
pub struct AnalogInput {
    q: TermId,
    value: ParamId,
}

impl AnalogInput {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let q = b.analog_output("Q")?;
        let value = b.param_f64("IN", 0.0)?;
        Ok(Box::new(AnalogInput { q, value }))
    }
}

impl DeviceModel for AnalogInput {
    fn reset(&mut self, nl: &mut Netlist) {
        nl.init_analog(self.q, 0.0);
    }

    fn update_param(&mut self, nl: &mut Netlist) {
        let v = nl.param_f64(self.value);
        nl.set_analog(self.q, v);
    }
}

fn half_period(freq: f64) -> SimTime {
    SimTime::from_double(1.0 / (2.0 * freq))
}

/// Square wave through a feedback loop: `Q` drives `FB`, every change of
/// `FB` schedules the inverse half a period later.
#[derive(Debug)]
pub struct Clock {
    q: TermId,
    feedback: TermId,
    freq: ParamId,
    inc: SimTime,
}

impl Clock {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let freq = b.param_f64("FREQ", 7_159_000.0)?;
        let q = b.logic_output("Q")?;
        let feedback = b.logic_input("FB")?;
        b.connect("Q", "FB");
        Ok(Box::new(Clock {
            q,
            feedback,
            freq,
            inc: SimTime::zero(),
        }))
    }
}

impl DeviceModel for Clock {
    fn update_param(&mut self, nl: &mut Netlist) {
        self.inc = half_period(nl.param_f64(self.freq));
    }

    fn update(&mut self, nl: &mut Netlist) {
        let next = nl.input_q(self.feedback) ^ 1;
        nl.push_logic(self.q, next, self.inc);
    }
}

/// Clock toggled directly by the event loop instead of through the queue.
#[derive(Debug)]
pub struct MainClock {
    q: TermId,
    freq: ParamId,
}

impl MainClock {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let freq = b.param_f64("FREQ", 7_159_000.0)?;
        let q = b.logic_output("Q")?;
        Ok(Box::new(MainClock { q, freq }))
    }
}

impl DeviceModel for MainClock {
    fn reset(&mut self, nl: &mut Netlist) {
        nl.init_logic(self.q, 0);
    }

    fn update_param(&mut self, nl: &mut Netlist) {
        let inc = half_period(nl.param_f64(self.freq));
        nl.set_mainclock(self.q, inc);
    }
}

/// Placeholder input that may stay unconnected.
#[derive(Debug)]
pub struct DummyInput;

impl DummyInput {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        b.dummy_input("I")?;
        Ok(Box::new(DummyInput))
    }
}

impl DeviceModel for DummyInput {}

/// Cuts an analog net in two: the input side sees `RIN` to `G`, the output
/// side is driven with the input voltage through `ROUT`.
#[derive(Debug)]
pub struct Frontier {
    r_in: TwoTerm,
    r_out: TwoTerm,
    input: TermId,
    output: TermId,
    p_rin: ParamId,
    p_rout: ParamId,
}

impl Frontier {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let r_in = TwoTerm::new(b, "RIN.1", "RIN.2")?;
        let r_out = TwoTerm::new(b, "ROUT.1", "ROUT.2")?;
        let input = b.analog_input("_I")?;
        let output = b.analog_output("_Q")?;
        let p_rin = b.param_f64("RIN", 1.0e6)?;
        let p_rout = b.param_f64("ROUT", 50.0)?;

        b.alias("I", "RIN.1")?;
        b.alias("G", "RIN.2")?;
        b.connect("_I", "RIN.1");
        b.alias("_OP", "ROUT.1")?;
        b.alias("Q", "ROUT.2")?;
        b.connect("_Q", "ROUT.1");

        Ok(Box::new(Frontier {
            r_in,
            r_out,
            input,
            output,
            p_rin,
            p_rout,
        }))
    }
}

impl DeviceModel for Frontier {
    fn reset(&mut self, nl: &mut Netlist) {
        let (rin, rout) = (nl.param_f64(self.p_rin), nl.param_f64(self.p_rout));
        self.r_in.set(nl, 1.0 / rin, 0.0, 0.0);
        self.r_out.set(nl, 1.0 / rout, 0.0, 0.0);
    }

    fn update(&mut self, nl: &mut Netlist) {
        let v = nl.input_v(self.input);
        nl.set_analog(self.output, v);
    }
}

/// Writes `time value` lines for every change of its input to
/// `<device>.log`.
#[derive(Debug)]
pub struct Log {
    input: TermId,
    path: String,
    writer: Option<BufWriter<File>>,
    /// Samples kept since reset
    samples: usize,
}

impl Log {
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let input = b.analog_input("I")?;
        let path = format!("{}.log", b.name());
        Ok(Box::new(Log {
            input,
            path,
            writer: None,
            samples: 0,
        }))
    }

    fn write(&mut self, time: f64, v: f64) {
        let Some(w) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(w, "{:.9} {}", time, v) {
            warn!(path = %self.path, error = %e, "log write failed, closing");
            self.writer = None;
        }
    }
}

impl DeviceModel for Log {
    fn reset(&mut self, _nl: &mut Netlist) {
        self.samples = 0;
        self.writer = match File::create(&self.path) {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                warn!(path = %self.path, error = %e, "cannot create log file");
                None
            }
        };
    }

    fn update(&mut self, nl: &mut Netlist) {
        self.samples += 1;
        let (t, v) = (nl.time().as_double(), nl.input_v(self.input));
        self.write(t, v);
    }

    fn stop(&mut self, _nl: &mut Netlist) {
        if let Some(mut w) = self.writer.take() {
            if let Err(e) = w.flush() {
                warn!(path = %self.path, error = %e, "log flush failed");
            }
        }
    }

    fn save_state(&self, state: &mut BTreeMap<String, f64>) {
        state.insert("samples".to_string(), self.samples as f64);
    }

    fn load_state(&mut self, state: &BTreeMap<String, f64>) {
        if let Some(&n) = state.get("samples") {
            self.samples = n as usize;
        }
    }
}
