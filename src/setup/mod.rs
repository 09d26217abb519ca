//! Netlist setup: registration of a description and its elaboration into
//! a runnable [`Netlist`].
//!
//! A description is fed in through [`Setup`]'s `register_*` methods, either
//! directly or by the description parser. Nothing is instantiated while
//! registering; [`Setup::build`] then runs the phases in order:
//!
//! 1. [`Setup::start_devices`] creates every registered device through the
//!    [`Factory`], applying registered parameter values.
//! 2. [`Setup::resolve_inputs`] turns the pending links into nets, adding
//!    domain-crossing proxies where logic meets analog.
//! 3. [`Setup::into_netlist`] partitions the analog nets into solver groups,
//!    sizes the queue and resets the netlist to time zero.
//!
//! Names are hierarchical. Sub-netlists included through a library entry
//! push a namespace and every name registered inside is prefixed with it.

mod factory;
mod model;
mod resolve;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

pub use factory::{BuildFn, Constructor, DeviceBuilder, Factory, FactoryEntry};
pub use model::{ModelMap, ModelTable};

use crate::config::NetlistConfig;
use crate::devices::truthtable::TtDesc;
use crate::error::{NetlistError, Result};
use crate::netlist::{DeviceId, Netlist, ParamId};

/// Built-in description source backed by a function.
pub type SourceProc = fn(&mut Setup) -> Result<()>;

/// A place descriptions can be included from.
#[derive(Clone)]
pub enum Source {
    /// Description text; `origin` names it in diagnostics
    Text { origin: String, text: Arc<str> },
    /// Description file, read on every include
    File(PathBuf),
    /// Named built-in netlist
    Proc { name: String, proc: SourceProc },
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Text { origin, .. } => write!(f, "Text({})", origin),
            Source::File(p) => write!(f, "File({})", p.display()),
            Source::Proc { name, .. } => write!(f, "Proc({})", name),
        }
    }
}

impl Source {
    pub fn text(origin: impl Into<String>, text: &str) -> Self {
        Source::Text {
            origin: origin.into(),
            text: Arc::from(text),
        }
    }

    /// Include netlist `name` from this source if it has it.
    fn parse(&self, setup: &mut Setup, name: &str) -> Result<bool> {
        match self {
            Source::Text { origin, text } => crate::dsl::parse_source(setup, origin, text, name),
            Source::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| NetlistError::FileReadError {
                    path: path.display().to_string(),
                    source,
                })?;
                crate::dsl::parse_source(setup, &path.display().to_string(), &Arc::from(text.as_str()), name)
            }
            Source::Proc { name: n, proc } => {
                if n != name {
                    return Ok(false);
                }
                proc(setup)?;
                Ok(true)
            }
        }
    }
}

/// Devices every netlist contains.
fn base_netlist(setup: &mut Setup) -> Result<()> {
    setup.register_dev("TTL_INPUT", "ttlhigh")?;
    setup.register_param("ttlhigh.IN", "1");
    setup.register_dev("TTL_INPUT", "ttllow")?;
    setup.register_param("ttllow.IN", "0");
    setup.register_dev("GND", "GND")?;
    Ok(())
}

/// Registration state of a netlist under construction.
#[derive(Debug)]
pub struct Setup {
    nl: Netlist,
    factory: Factory,
    namespace: Vec<String>,
    lib: Vec<String>,
    sources: Vec<Source>,
    defines: BTreeMap<String, String>,
    /// Devices to instantiate, `(full name, class)` in registration order
    devices: Vec<(String, String)>,
    alias: HashMap<String, String>,
    param_values: HashMap<String, String>,
    links: Vec<(String, String)>,
    proxy_cnt: usize,
    frontier_cnt: usize,
}

impl Setup {
    /// Empty setup holding the built-in models, device classes and the
    /// base netlist (`GND`, `ttlhigh`, `ttllow`).
    pub fn new(config: NetlistConfig) -> Result<Self> {
        let mut nl = Netlist::new(config);
        nl.models.register_library()?;
        let mut setup = Self {
            nl,
            factory: Factory::new()?,
            namespace: Vec::new(),
            lib: Vec::new(),
            sources: Vec::new(),
            defines: BTreeMap::new(),
            devices: Vec::new(),
            alias: HashMap::new(),
            param_values: HashMap::new(),
            links: Vec::new(),
            proxy_cnt: 0,
            frontier_cnt: 0,
        };
        setup.register_source(Source::Proc {
            name: "base".to_string(),
            proc: base_netlist,
        });
        setup.include("base")?;
        Ok(setup)
    }

    /// Setup with `text` registered as a source and netlist `name` included
    /// from it. An empty name includes the first netlist of the text.
    pub fn from_str(config: NetlistConfig, text: &str, name: &str) -> Result<Self> {
        let mut setup = Self::new(config)?;
        setup.register_source(Source::text("<string>", text));
        setup.include(name)?;
        Ok(setup)
    }

    pub fn netlist(&self) -> &Netlist {
        &self.nl
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut Factory {
        &mut self.factory
    }

    pub fn links(&self) -> &[(String, String)] {
        &self.links
    }

    pub fn registered_devices(&self) -> &[(String, String)] {
        &self.devices
    }

    // ============ Namespaces and sources ============

    pub fn namespace_push(&mut self, name: &str) {
        let fqn = self.build_fqn(name);
        self.namespace.push(fqn);
    }

    pub fn namespace_pop(&mut self) {
        self.namespace.pop();
    }

    /// Prefix `name` with the current namespace.
    pub fn build_fqn(&self, name: &str) -> String {
        match self.namespace.last() {
            Some(ns) => format!("{}.{}", ns, name),
            None => name.to_string(),
        }
    }

    /// Make `name` usable as a device class that expands to the netlist of
    /// the same name.
    pub fn register_lib_entry(&mut self, name: &str) {
        if self.lib.iter().any(|l| l == name) {
            warn!(entry = name, "lib entry already registered");
            return;
        }
        self.lib.push(name.to_string());
    }

    pub fn is_lib_entry(&self, name: &str) -> bool {
        self.lib.iter().any(|l| l == name)
    }

    pub fn register_source(&mut self, source: Source) {
        if let Source::Text { origin, .. } = &source {
            let dup = self
                .sources
                .iter()
                .any(|s| matches!(s, Source::Text { origin: o, .. } if o == origin));
            if dup {
                return;
            }
        }
        self.sources.push(source);
    }

    /// Include netlist `name` from the first source providing it.
    pub fn include(&mut self, name: &str) -> Result<()> {
        let sources = self.sources.clone();
        for source in &sources {
            if source.parse(self, name)? {
                debug!(netlist = name, ?source, "included");
                return Ok(());
            }
        }
        Err(NetlistError::SourceNotFound {
            name: name.to_string(),
        })
    }

    /// Register `"NAME=VALUE"`, or `"NAME"` meaning `"NAME=1"`.
    pub fn register_define(&mut self, def: &str) {
        match def.split_once('=') {
            Some((k, v)) => self.defines.insert(k.trim().to_string(), v.trim().to_string()),
            None => self.defines.insert(def.trim().to_string(), "1".to_string()),
        };
    }

    pub fn defines(&self) -> &BTreeMap<String, String> {
        &self.defines
    }

    // ============ Registration ============

    /// Register a device instance, or expand a library entry in a
    /// namespace of that name.
    pub fn register_dev(&mut self, class: &str, name: &str) -> Result<()> {
        if self.is_lib_entry(class) {
            self.namespace_push(name);
            let r = self.include(class);
            self.namespace_pop();
            return r;
        }
        if self.factory.get(class).is_none() {
            return Err(NetlistError::UnknownDeviceClass {
                class: class.to_string(),
            });
        }
        let fqn = self.build_fqn(name);
        if self.devices.iter().any(|(n, _)| *n == fqn) {
            return Err(NetlistError::DuplicateDevice { name: fqn });
        }
        debug!(device = %fqn, class, "registered");
        self.devices.push((fqn, class.to_string()));
        Ok(())
    }

    pub fn register_model(&mut self, model: &str) -> Result<()> {
        self.nl.models.register(model)
    }

    pub fn register_alias(&mut self, alias: &str, target: &str) -> Result<()> {
        let alias = self.build_fqn(alias);
        let target = self.build_fqn(target);
        self.register_alias_nofqn(&alias, &target)
    }

    pub fn register_alias_nofqn(&mut self, alias: &str, target: &str) -> Result<()> {
        if self.alias.contains_key(alias) {
            return Err(NetlistError::DuplicateAlias {
                alias: alias.to_string(),
            });
        }
        self.alias.insert(alias.to_string(), target.to_string());
        Ok(())
    }

    /// Alias DIP package pin numbers to terminals. The list holds the
    /// terminals in pairs, left column top-down and right column bottom-up:
    /// pair `i` becomes pins `i+1` and `n-i`.
    pub fn register_dippins_arr(&mut self, pins: &[String]) -> Result<()> {
        let n = pins.len();
        if n == 0 || n % 2 != 0 {
            return Err(NetlistError::OddDipPins { count: n });
        }
        for i in 0..n / 2 {
            self.register_alias(&(i + 1).to_string(), &pins[i * 2])?;
            self.register_alias(&(n - i).to_string(), &pins[i * 2 + 1])?;
        }
        Ok(())
    }

    /// Value for a parameter of a device still to be instantiated.
    pub fn register_param(&mut self, param: &str, value: &str) {
        let fqn = self.build_fqn(param);
        if let Some(old) = self.param_values.insert(fqn.clone(), value.to_string()) {
            warn!(param = %fqn, old = %old, new = value, "overwriting parameter");
        }
    }

    pub fn register_param_f64(&mut self, param: &str, value: f64) {
        self.register_param(param, &value.to_string());
    }

    pub fn register_link(&mut self, a: &str, b: &str) {
        let a = self.build_fqn(a);
        let b = self.build_fqn(b);
        self.register_link_fqn(&a, &b);
    }

    pub fn register_link_fqn(&mut self, a: &str, b: &str) {
        self.links.push((a.to_string(), b.to_string()));
    }

    /// Link the first name with each of the others.
    pub fn register_link_arr(&mut self, list: &[String]) -> Result<()> {
        if list.len() < 2 {
            return Err(NetlistError::LinkTooShort { list: list.join(",") });
        }
        for other in &list[1..] {
            self.register_link(&list[0], other);
        }
        Ok(())
    }

    /// Drop every pending link touching `pin`.
    pub fn remove_connections(&mut self, pin: &str) -> Result<()> {
        let fqn = self.build_fqn(pin);
        let before = self.links.len();
        self.links.retain(|(a, b)| *a != fqn && *b != fqn);
        if self.links.len() == before {
            return Err(NetlistError::ConnectionNotFound { pin: fqn });
        }
        Ok(())
    }

    /// Split the analog net at `attach` with a frontier device: the
    /// original connections see `r_in` to ground, the attachment point is
    /// driven through `r_out`. The two sides end up in separate solver
    /// groups.
    pub fn register_frontier(&mut self, attach: &str, r_in: f64, r_out: f64) -> Result<()> {
        let attfn = self.build_fqn(attach);
        let name = format!("frontier_{}", self.frontier_cnt);
        self.frontier_cnt += 1;
        self.register_dev("FRONTIER_DEV", &name)?;
        self.register_param_f64(&format!("{}.RIN", name), r_in);
        self.register_param_f64(&format!("{}.ROUT", name), r_out);
        let fqn = self.build_fqn(&name);
        self.register_link_fqn(&format!("{}.G", fqn), "GND");

        let input = format!("{}.I", fqn);
        let mut found = false;
        for (a, b) in self.links.iter_mut() {
            if *a == attfn {
                *a = input.clone();
                found = true;
            } else if *b == attfn {
                *b = input.clone();
                found = true;
            }
        }
        if !found {
            return Err(NetlistError::FrontierNotFound { pin: attfn });
        }
        self.register_link(attach, &format!("{}.Q", name));
        Ok(())
    }

    /// Compile a truthtable and register it as a device class.
    pub fn register_truthtable(&mut self, desc: &TtDesc) -> Result<()> {
        self.factory.register_truthtable(desc)
    }

    /// Attach a `LOG` device recording the voltage of `terminal`.
    pub fn register_log(&mut self, terminal: &str) -> Result<()> {
        let dev = format!("log_{}", terminal);
        self.register_dev("LOG", &dev)?;
        self.register_link(&format!("{}.I", dev), terminal);
        Ok(())
    }

    // ============ Lookup ============

    /// Follow aliases until a name without one is reached.
    pub fn resolve_alias(&self, name: &str) -> String {
        let mut cur = name.to_string();
        // bounded so a cyclic alias chain cannot hang the resolver
        for _ in 0..=self.alias.len() {
            match self.alias.get(&cur) {
                Some(next) => cur = next.clone(),
                None => break,
            }
        }
        cur
    }

    /// Parameter of an instantiated device by (aliased) name.
    pub fn find_param(&self, name: &str) -> Result<ParamId> {
        let fqn = self.build_fqn(name);
        self.nl.find_param(&self.resolve_alias(&fqn))
    }

    // ============ Elaboration ============

    fn create_device(&mut self, name: &str, class: &str) -> Result<DeviceId> {
        let entry = self
            .factory
            .get(class)
            .cloned()
            .ok_or_else(|| NetlistError::UnknownDeviceClass {
                class: class.to_string(),
            })?;
        let id = self.nl.add_device(name, class)?;
        let model = {
            let mut b = DeviceBuilder::new(&mut self.nl, id, &self.param_values, &mut self.links, &mut self.alias);
            Factory::create(&entry, &mut b)?
        };
        self.nl.set_model(id, model);
        Ok(id)
    }

    /// Instantiate every registered device.
    pub fn start_devices(&mut self) -> Result<()> {
        let devices = self.devices.clone();
        for (name, class) in &devices {
            self.create_device(name, class)?;
        }
        info!(devices = devices.len(), "devices instantiated");
        Ok(())
    }

    /// Create the solver groups and bring the netlist to time zero.
    pub fn into_netlist(mut self) -> Result<Netlist> {
        self.nl.set_aliases(std::mem::take(&mut self.alias));
        crate::solver::post_start(&mut self.nl)?;
        self.nl.size_queue();
        self.nl.reset();
        info!(
            devices = self.nl.num_devices(),
            nets = self.nl.nets().count(),
            solvers = self.nl.num_solvers(),
            "netlist ready"
        );
        Ok(self.nl)
    }

    /// Run every elaboration phase.
    pub fn build(mut self) -> Result<Netlist> {
        self.start_devices()?;
        self.resolve_inputs()?;
        self.into_netlist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Setup {
        Setup::new(NetlistConfig::default()).unwrap()
    }

    #[test]
    fn test_base_netlist_registered() {
        let s = setup();
        let names: Vec<&str> = s.registered_devices().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["ttlhigh", "ttllow", "GND"]);
    }

    #[test]
    fn test_namespaces() {
        let mut s = setup();
        assert_eq!(s.build_fqn("R1"), "R1");
        s.namespace_push("U1");
        s.namespace_push("X");
        assert_eq!(s.build_fqn("R1"), "U1.X.R1");
        s.namespace_pop();
        assert_eq!(s.build_fqn("R1"), "U1.R1");
    }

    #[test]
    fn test_alias_chain() {
        let mut s = setup();
        s.register_alias("A", "B").unwrap();
        s.register_alias("B", "C.Q").unwrap();
        assert_eq!(s.resolve_alias("A"), "C.Q");
        assert!(matches!(
            s.register_alias("A", "D"),
            Err(NetlistError::DuplicateAlias { .. })
        ));
    }

    #[test]
    fn test_dippins() {
        let mut s = setup();
        s.namespace_push("U1");
        let pins: Vec<String> = ["A.A", "A.Q", "B.A", "B.Q"].iter().map(|p| p.to_string()).collect();
        s.register_dippins_arr(&pins).unwrap();
        assert_eq!(s.resolve_alias("U1.1"), "U1.A.A");
        assert_eq!(s.resolve_alias("U1.4"), "U1.A.Q");
        assert_eq!(s.resolve_alias("U1.2"), "U1.B.A");
        assert_eq!(s.resolve_alias("U1.3"), "U1.B.Q");

        let odd: Vec<String> = vec!["A".to_string()];
        assert!(matches!(s.register_dippins_arr(&odd), Err(NetlistError::OddDipPins { count: 1 })));
    }

    #[test]
    fn test_links_and_removal() {
        let mut s = setup();
        let list: Vec<String> = ["A.Q", "B.A", "C.A"].iter().map(|p| p.to_string()).collect();
        s.register_link_arr(&list).unwrap();
        assert_eq!(s.links().len(), 2);
        assert!(matches!(
            s.register_link_arr(&list[..1]),
            Err(NetlistError::LinkTooShort { .. })
        ));
        s.remove_connections("B.A").unwrap();
        assert_eq!(s.links(), &[("A.Q".to_string(), "C.A".to_string())]);
        assert!(matches!(
            s.remove_connections("B.A"),
            Err(NetlistError::ConnectionNotFound { .. })
        ));
    }

    #[test]
    fn test_register_dev_errors() {
        let mut s = setup();
        assert!(matches!(
            s.register_dev("NOPE", "X"),
            Err(NetlistError::UnknownDeviceClass { .. })
        ));
        s.register_dev("RES", "R1").unwrap();
        assert!(matches!(
            s.register_dev("RES", "R1"),
            Err(NetlistError::DuplicateDevice { .. })
        ));
        assert!(matches!(s.include("nothing"), Err(NetlistError::SourceNotFound { .. })));
    }

    #[test]
    fn test_frontier_rewrites_links() {
        let mut s = setup();
        s.register_link("R1.2", "R2.1");
        s.register_frontier("R1.2", 1e6, 50.0).unwrap();
        let links = s.links();
        assert!(links.contains(&("frontier_0.I".to_string(), "R2.1".to_string())));
        assert!(links.contains(&("frontier_0.G".to_string(), "GND".to_string())));
        assert!(links.contains(&("R1.2".to_string(), "frontier_0.Q".to_string())));
        assert!(matches!(
            s.register_frontier("X.1", 1e6, 50.0),
            Err(NetlistError::FrontierNotFound { .. })
        ));
    }

    #[test]
    fn test_defines() {
        let mut s = setup();
        s.register_define("FOO=3");
        s.register_define("BAR");
        assert_eq!(s.defines()["FOO"], "3");
        assert_eq!(s.defines()["BAR"], "1");
    }
}
