//! Device factory and the builder handed to device constructors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::NetlistConfig;
use crate::devices::truthtable::{TruthTable, TruthTableDevice, TtDesc};
use crate::error::{NetlistError, Result};
use crate::netlist::{DeviceId, DeviceModel, Domain, LogicFamily, Netlist, ParamId, ParamValue, TermId, TermKind};

/// Constructor of a native device class.
pub type BuildFn = fn(&mut DeviceBuilder<'_>) -> Result<Box<dyn DeviceModel>>;

/// How a factory entry creates its model.
#[derive(Clone)]
pub enum Constructor {
    Native(BuildFn),
    TruthTable(Arc<TruthTable>),
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constructor::Native(_) => f.write_str("Native"),
            Constructor::TruthTable(t) => write!(f, "TruthTable({})", t.name()),
        }
    }
}

/// A registered device class.
///
/// `def_param` tells the description parser how positional arguments map
/// to the device: `"R"` or `"IN,FAMILY"` name parameters, `"+A,B"` names
/// pins to link, `"-"` takes nothing beyond the device name.
#[derive(Debug, Clone)]
pub struct FactoryEntry {
    pub name: String,
    pub def_param: String,
    pub constructor: Constructor,
}

impl FactoryEntry {
    /// Pins filled from positional arguments.
    pub fn term_params(&self) -> Vec<String> {
        match self.def_param.strip_prefix('+') {
            Some(list) => split_list(list),
            None => Vec::new(),
        }
    }

    /// Parameters filled from positional arguments.
    pub fn def_params(&self) -> Vec<String> {
        if self.def_param.starts_with('+') || self.def_param == "-" {
            Vec::new()
        } else {
            split_list(&self.def_param)
        }
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Registry of device classes.
#[derive(Debug, Clone)]
pub struct Factory {
    entries: Vec<FactoryEntry>,
}

impl Factory {
    /// Factory with every built-in class registered.
    pub fn new() -> Result<Self> {
        let mut f = Self::empty();
        crate::devices::register_all(&mut f)?;
        Ok(f)
    }

    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, name: &str, def_param: &str, build: BuildFn) {
        self.push(FactoryEntry {
            name: name.to_string(),
            def_param: def_param.to_string(),
            constructor: Constructor::Native(build),
        });
    }

    /// Compile a truthtable description and register it as a class.
    pub fn register_truthtable(&mut self, desc: &TtDesc) -> Result<()> {
        let table = TruthTable::compile(desc)?;
        self.push(FactoryEntry {
            name: desc.name.clone(),
            def_param: desc.def_param.clone(),
            constructor: Constructor::TruthTable(Arc::new(table)),
        });
        Ok(())
    }

    fn push(&mut self, entry: FactoryEntry) {
        // later registrations shadow earlier ones
        self.entries.retain(|e| e.name != entry.name);
        self.entries.push(entry);
    }

    pub fn get(&self, name: &str) -> Option<&FactoryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[FactoryEntry] {
        &self.entries
    }

    pub(crate) fn create(entry: &FactoryEntry, b: &mut DeviceBuilder<'_>) -> Result<Box<dyn DeviceModel>> {
        match &entry.constructor {
            Constructor::Native(build) => build(b),
            Constructor::TruthTable(table) => TruthTableDevice::build(b, Arc::clone(table)),
        }
    }
}

/// Handed to a device constructor to register terminals, parameters and
/// local connections of the device being created.
pub struct DeviceBuilder<'a> {
    nl: &'a mut Netlist,
    id: DeviceId,
    name: String,
    param_values: &'a HashMap<String, String>,
    links: &'a mut Vec<(String, String)>,
    alias: &'a mut HashMap<String, String>,
}

impl<'a> DeviceBuilder<'a> {
    pub(crate) fn new(
        nl: &'a mut Netlist,
        id: DeviceId,
        param_values: &'a HashMap<String, String>,
        links: &'a mut Vec<(String, String)>,
        alias: &'a mut HashMap<String, String>,
    ) -> Self {
        let name = nl.device(id).name().to_string();
        Self {
            nl,
            id,
            name,
            param_values,
            links,
            alias,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &NetlistConfig {
        self.nl.config()
    }

    pub fn netlist(&mut self) -> &mut Netlist {
        self.nl
    }

    fn full(&self, pin: &str) -> String {
        format!("{}.{}", self.name, pin)
    }

    pub fn logic_input(&mut self, pin: &str) -> Result<TermId> {
        self.nl.add_terminal(self.id, pin, TermKind::Input(Domain::Logic))
    }

    pub fn logic_output(&mut self, pin: &str) -> Result<TermId> {
        self.nl.add_terminal(self.id, pin, TermKind::Output(Domain::Logic))
    }

    pub fn analog_input(&mut self, pin: &str) -> Result<TermId> {
        self.nl.add_terminal(self.id, pin, TermKind::Input(Domain::Analog))
    }

    pub fn analog_output(&mut self, pin: &str) -> Result<TermId> {
        self.nl.add_terminal(self.id, pin, TermKind::Output(Domain::Analog))
    }

    pub fn terminal(&mut self, pin: &str) -> Result<TermId> {
        self.nl.add_terminal(self.id, pin, TermKind::Terminal)
    }

    /// The two sides of a two-terminal element.
    pub fn terminal_pair(&mut self, p: &str, n: &str) -> Result<(TermId, TermId)> {
        let tp = self.terminal(p)?;
        let tn = self.terminal(n)?;
        self.nl.set_other(tp, tn);
        Ok((tp, tn))
    }

    /// Analog input that may stay unconnected.
    pub fn dummy_input(&mut self, pin: &str) -> Result<TermId> {
        let t = self.analog_input(pin)?;
        self.nl.set_dummy(t);
        Ok(t)
    }

    /// Register a parameter, taking a value registered for it by the
    /// description over `default`.
    pub fn param(&mut self, name: &str, default: ParamValue) -> Result<ParamId> {
        let full = self.full(name);
        let value = match self.param_values.get(&full) {
            Some(text) => default.parse_like(&full, text)?,
            None => default,
        };
        self.nl.add_param(self.id, name, value)
    }

    pub fn param_f64(&mut self, name: &str, default: f64) -> Result<ParamId> {
        self.param(name, ParamValue::Double(default))
    }

    pub fn param_int(&mut self, name: &str, default: i64) -> Result<ParamId> {
        self.param(name, ParamValue::Int(default))
    }

    pub fn param_bool(&mut self, name: &str, default: bool) -> Result<ParamId> {
        self.param(name, ParamValue::Logic(default))
    }

    pub fn param_str(&mut self, name: &str, default: &str) -> Result<ParamId> {
        self.param(name, ParamValue::Str(default.to_string()))
    }

    pub fn param_model(&mut self, name: &str, default: &str) -> Result<ParamId> {
        self.param(name, ParamValue::Model(default.to_string()))
    }

    /// Link two pins of this device once wiring starts.
    pub fn connect(&mut self, a: &str, b: &str) {
        self.links.push((self.full(a), self.full(b)));
    }

    /// Make `alias` an alternative name for pin `target`.
    pub fn alias(&mut self, alias: &str, target: &str) -> Result<()> {
        let alias = self.full(alias);
        if self.alias.contains_key(&alias) {
            return Err(NetlistError::DuplicateAlias { alias });
        }
        let target = self.full(target);
        self.alias.insert(alias, target);
        Ok(())
    }

    pub fn set_family(&mut self, family: LogicFamily) {
        self.nl.set_family(self.id, family);
    }

    /// Family from the model held by parameter `p`.
    pub fn family_from_param(&mut self, p: ParamId) -> Result<LogicFamily> {
        let model = self.nl.param_str(p).to_string();
        self.nl.family_from_model(&model)
    }

    /// Ask for inc_active/dec_active notifications.
    pub fn hint_deactivate(&mut self) {
        self.nl.set_hint_deactivate(self.id, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(def: &str) -> FactoryEntry {
        FactoryEntry {
            name: "X".to_string(),
            def_param: def.to_string(),
            constructor: Constructor::Native(|_| Err(NetlistError::NoSolver)),
        }
    }

    #[test]
    fn test_def_param_forms() {
        assert_eq!(entry("R").def_params(), vec!["R"]);
        assert!(entry("R").term_params().is_empty());
        assert_eq!(entry("IN,FAMILY").def_params(), vec!["IN", "FAMILY"]);
        assert_eq!(entry("+A, B").term_params(), vec!["A", "B"]);
        assert!(entry("+A,B").def_params().is_empty());
        assert!(entry("-").def_params().is_empty());
        assert!(entry("-").term_params().is_empty());
    }

    #[test]
    fn test_builtin_classes_registered() {
        let f = Factory::new().unwrap();
        for class in ["RES", "CAP", "DIODE", "VS", "CS", "GND", "SOLVER", "CLOCK", "MAINCLOCK", "TTL_7400_NAND"] {
            assert!(f.get(class).is_some(), "missing {}", class);
        }
        assert!(f.get("NOPE").is_none());
    }
}
