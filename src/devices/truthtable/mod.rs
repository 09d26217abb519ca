//! Truthtable devices.
//!
//! A logic device can be described by a table instead of code:
//!
//! ```text
//! A,B|Q          header: inputs | outputs
//! 0,X|1|22       row: input pattern | outputs | delay per output in ns
//! X,0|1|22
//! 1,1|0|15
//! ```
//!
//! `X` matches both levels. The compiled table holds, per input state, the
//! output word, a timing index per output and an ignore mask: the largest
//! set of inputs whose value cannot change the outputs in that state. At
//! run time the device stops listening to ignored inputs, so their
//! transitions cost nothing until the state changes.
//!
//! An input named `_Q` for an output `Q` is wired to that output. Such
//! feedback inputs are never ignored.

mod device;
mod library;

pub use device::TruthTableDevice;
pub use library::register as register_library;

use crate::error::{NetlistError, Result};
use crate::time::SimTime;

/// Largest supported input count.
pub const MAX_INPUTS: usize = 12;
/// Largest supported output count.
pub const MAX_OUTPUTS: usize = 32;
/// Largest number of distinct delays in one table.
pub const MAX_TIMINGS: usize = 16;

const DEFAULT_DELAY_NS: u64 = 1;

/// Truthtable description as written in a netlist.
#[derive(Debug, Clone, PartialEq)]
pub struct TtDesc {
    /// Device class the table is registered as
    pub name: String,
    pub ni: usize,
    pub no: usize,
    pub def_param: String,
    /// Model string of the logic family
    pub family: String,
    /// Header line first, then the rows
    pub desc: Vec<String>,
}

impl TtDesc {
    pub fn new(name: impl Into<String>, ni: usize, no: usize, def_param: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ni,
            no,
            def_param: def_param.into(),
            family: "74XX".to_string(),
            desc: Vec::new(),
        }
    }

    pub fn line(mut self, l: &str) -> Self {
        self.desc.push(l.to_string());
        self
    }
}

/// A compiled truthtable.
#[derive(Debug, Clone)]
pub struct TruthTable {
    name: String,
    family: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    /// Output word per input state
    outs: Vec<u32>,
    /// Ignore mask per input state
    ign: Vec<u32>,
    /// Timing index per state and output
    timing: Vec<u8>,
    timing_nt: Vec<SimTime>,
    /// `(output, input)` feedback pairs
    feedback: Vec<(usize, usize)>,
}

fn split_trim(s: &str, sep: char) -> Vec<&str> {
    s.split(sep).map(str::trim).collect()
}

/// Distribute the low bits of `b` over the set bits of `v`.
fn set_bits(v: u32, b: u32) -> u32 {
    let mut ret = 0;
    let mut bit = 0;
    for i in 0..32 {
        if v & (1 << i) != 0 {
            if b & (1 << bit) != 0 {
                ret |= 1 << i;
            }
            bit += 1;
        }
    }
    ret
}

impl TruthTable {
    pub fn compile(desc: &TtDesc) -> Result<Self> {
        let name = desc.name.as_str();
        let Some(header) = desc.desc.first() else {
            return Err(NetlistError::tt_header(name, "missing header"));
        };
        let parts = split_trim(header, '|');
        if parts.len() != 2 {
            return Err(NetlistError::tt_header(name, format!("expected 'inputs|outputs', got '{}'", header)));
        }
        let inputs: Vec<String> = split_trim(parts[0], ',').into_iter().map(str::to_string).collect();
        let outputs: Vec<String> = split_trim(parts[1], ',').into_iter().map(str::to_string).collect();
        if inputs.len() != desc.ni {
            return Err(NetlistError::tt_header(
                name,
                format!("expected {} inputs, header has {}", desc.ni, inputs.len()),
            ));
        }
        if outputs.len() != desc.no {
            return Err(NetlistError::tt_header(
                name,
                format!("expected {} outputs, header has {}", desc.no, outputs.len()),
            ));
        }
        if desc.ni == 0 || desc.ni > MAX_INPUTS || desc.no == 0 || desc.no > MAX_OUTPUTS {
            return Err(NetlistError::tt_header(
                name,
                format!("unsupported size {} inputs, {} outputs", desc.ni, desc.no),
            ));
        }

        let mut feedback = Vec::new();
        let mut disabled_ignore = 0u32;
        for (o, out) in outputs.iter().enumerate() {
            let fb = format!("_{}", out);
            if let Some(i) = inputs.iter().position(|n| *n == fb) {
                feedback.push((o, i));
                disabled_ignore |= 1 << i;
            }
        }

        let states = 1usize << desc.ni;
        let mut tt = TruthTable {
            name: name.to_string(),
            family: desc.family.clone(),
            inputs,
            outputs,
            outs: vec![0; states],
            ign: vec![0; states],
            timing: vec![0; states * desc.no],
            timing_nt: Vec::new(),
            feedback,
        };
        let mut set = vec![false; states];

        for row in &desc.desc[1..] {
            tt.parse_row(row, &mut set)?;
        }
        if let Some(s) = set.iter().position(|s| !s) {
            return Err(NetlistError::tt_header(name, format!("state {:#b} is not covered", s)));
        }

        let mut done = vec![false; states];
        for s in 0..states as u32 {
            if done[s as usize] {
                continue;
            }
            let ign = tt.ignored_extended(s);
            // states differing only in ignored inputs behave the same
            let base = s & !ign;
            for b in 0..(1u32 << ign.count_ones()) {
                let t = (base | set_bits(ign, b)) as usize;
                if !done[t] {
                    tt.ign[t] = ign & !disabled_ignore;
                    done[t] = true;
                }
            }
        }
        Ok(tt)
    }

    fn parse_row(&mut self, row: &str, set: &mut [bool]) -> Result<()> {
        let name = self.name.clone();
        let err = |msg: String| NetlistError::tt_row(&name, row, msg);
        let parts = split_trim(row, '|');
        if parts.len() != 2 && parts.len() != 3 {
            return Err(err("expected 'inputs|outputs|delays'".to_string()));
        }
        let ins = split_trim(parts[0], ',');
        if ins.len() != self.inputs.len() {
            return Err(err(format!("expected {} input values", self.inputs.len())));
        }
        let outs = split_trim(parts[1], ',');
        if outs.len() != self.outputs.len() {
            return Err(err(format!("expected {} output values", self.outputs.len())));
        }
        let delays: Vec<u64> = match parts.get(2) {
            Some(t) => {
                let ts = split_trim(t, ',');
                if ts.len() != self.outputs.len() {
                    return Err(err(format!("expected {} delays", self.outputs.len())));
                }
                ts.iter()
                    .map(|d| d.parse::<u64>().map_err(|_| err(format!("invalid delay '{}'", d))))
                    .collect::<Result<_>>()?
            }
            None => vec![DEFAULT_DELAY_NS; self.outputs.len()],
        };

        let mut val = 0u32;
        for (j, o) in outs.iter().enumerate() {
            match *o {
                "0" => {}
                "1" => val |= 1 << j,
                _ => return Err(err(format!("invalid output value '{}'", o))),
            }
        }

        let mut tindex = Vec::with_capacity(delays.len());
        for d in delays {
            let t = SimTime::from_nsec(d);
            let k = match self.timing_nt.iter().position(|x| *x == t) {
                Some(k) => k,
                None => {
                    if self.timing_nt.len() >= MAX_TIMINGS {
                        return Err(err(format!("more than {} distinct delays", MAX_TIMINGS)));
                    }
                    self.timing_nt.push(t);
                    self.timing_nt.len() - 1
                }
            };
            tindex.push(k as u8);
        }

        // expand X into every matching state
        let mut states = vec![0u32];
        for (i, v) in ins.iter().enumerate() {
            match *v {
                "0" => {}
                "1" => states.iter_mut().for_each(|s| *s |= 1 << i),
                "X" | "x" => {
                    let with: Vec<u32> = states.iter().map(|s| s | (1 << i)).collect();
                    states.extend(with);
                }
                _ => return Err(err(format!("invalid input value '{}'", v))),
            }
        }

        let no = self.outputs.len();
        for s in states {
            let s = s as usize;
            if set[s] && self.outs[s] != val {
                return Err(err(format!("state {:#b} already set to a different value", s)));
            }
            set[s] = true;
            self.outs[s] = val;
            self.timing[s * no..(s + 1) * no].copy_from_slice(&tindex);
        }
        Ok(())
    }

    /// Largest set of inputs that can change together without changing the
    /// output of `state`.
    fn ignored_extended(&self, state: u32) -> u32 {
        let ni = self.inputs.len();
        let out = self.outs[state as usize];

        // inputs that are irrelevant on their own
        let mut ignore = 0u32;
        for j in 0..ni {
            if self.outs[(state ^ (1 << j)) as usize] == out {
                ignore |= 1 << j;
            }
        }

        let bits = 1u32 << ignore.count_ones();
        let mut best = 0u32;
        for j in 1..bits {
            let tign = set_bits(ignore, j);
            if tign.count_ones() <= best.count_ones() {
                continue;
            }
            let base = state & !tign;
            let holds = (0..(1u32 << tign.count_ones()))
                .all(|k| self.outs[(base | set_bits(tign, k)) as usize] == out);
            if holds {
                best = tign;
            }
        }
        best
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn feedback(&self) -> &[(usize, usize)] {
        &self.feedback
    }

    /// Output word of an input state.
    pub fn out(&self, state: u32) -> u32 {
        self.outs[state as usize]
    }

    /// Ignore mask of an input state.
    pub fn ignore(&self, state: u32) -> u32 {
        self.ign[state as usize]
    }

    /// Delay of output `j` in an input state.
    pub fn delay(&self, state: u32, j: usize) -> SimTime {
        let k = self.timing[state as usize * self.outputs.len() + j];
        self.timing_nt[k as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nand() -> TtDesc {
        TtDesc::new("NAND", 2, 1, "+A,B")
            .line("A,B|Q")
            .line("0,X|1|22")
            .line("X,0|1|22")
            .line("1,1|0|15")
    }

    #[test]
    fn test_set_bits() {
        assert_eq!(set_bits(0b1010, 0b01), 0b0010);
        assert_eq!(set_bits(0b1010, 0b10), 0b1000);
        assert_eq!(set_bits(0b1010, 0b11), 0b1010);
    }

    #[test]
    fn test_nand_outputs_and_timing() {
        let t = TruthTable::compile(&nand()).unwrap();
        assert_eq!(t.out(0b00), 1);
        assert_eq!(t.out(0b01), 1);
        assert_eq!(t.out(0b10), 1);
        assert_eq!(t.out(0b11), 0);
        assert_eq!(t.delay(0b11, 0), SimTime::from_nsec(15));
        assert_eq!(t.delay(0b00, 0), SimTime::from_nsec(22));
    }

    #[test]
    fn test_nand_ignore_masks() {
        let t = TruthTable::compile(&nand()).unwrap();
        // one low input forces the output, the other one is irrelevant
        assert_eq!(t.ignore(0b00).count_ones(), 1);
        assert_eq!(t.ignore(0b01), 0b01);
        assert_eq!(t.ignore(0b10), 0b10);
        // both inputs matter when both are high
        assert_eq!(t.ignore(0b11), 0);
    }

    #[test]
    fn test_ignore_never_changes_output() {
        let desc = TtDesc::new("AOI", 3, 1, "-")
            .line("A,B,C|Q")
            .line("1,1,X|0")
            .line("X,X,1|0")
            .line("0,X,0|1")
            .line("1,0,0|1");
        let t = TruthTable::compile(&desc).unwrap();
        for s in 0..8u32 {
            let ign = t.ignore(s);
            for k in 0..8u32 {
                let other = (s & !ign) | (k & ign);
                assert_eq!(t.out(other), t.out(s), "state {:03b} ign {:03b}", s, ign);
            }
        }
    }

    #[test]
    fn test_feedback_not_ignored() {
        let desc = TtDesc::new("LATCH", 2, 1, "-")
            .line("S,_Q|Q")
            .line("1,X|1")
            .line("0,0|0")
            .line("0,1|1");
        let t = TruthTable::compile(&desc).unwrap();
        assert_eq!(t.feedback(), &[(0, 1)]);
        for s in 0..4 {
            assert_eq!(t.ignore(s) & 0b10, 0);
        }
    }

    #[test]
    fn test_default_delay() {
        let desc = TtDesc::new("INV", 1, 1, "+A").line("A|Q").line("0|1").line("1|0");
        let t = TruthTable::compile(&desc).unwrap();
        assert_eq!(t.delay(0, 0), SimTime::from_nsec(1));
    }

    #[test]
    fn test_errors() {
        let conflict = TtDesc::new("C", 2, 1, "-")
            .line("A,B|Q")
            .line("0,X|1")
            .line("X,0|0")
            .line("1,1|0");
        assert!(matches!(
            TruthTable::compile(&conflict),
            Err(NetlistError::TruthTableRow { .. })
        ));

        let uncovered = TtDesc::new("U", 2, 1, "-").line("A,B|Q").line("0,X|1");
        assert!(matches!(
            TruthTable::compile(&uncovered),
            Err(NetlistError::TruthTableHeader { .. })
        ));

        let bad_header = TtDesc::new("H", 3, 1, "-").line("A,B|Q");
        assert!(matches!(
            TruthTable::compile(&bad_header),
            Err(NetlistError::TruthTableHeader { .. })
        ));

        let bad_value = TtDesc::new("V", 1, 1, "-").line("A|Q").line("2|1");
        assert!(matches!(
            TruthTable::compile(&bad_value),
            Err(NetlistError::TruthTableRow { .. })
        ));
    }
}
