//! Model strings.
//!
//! A model is a named parameter bag. Its definition names a base model and
//! lists `KEY=VALUE` pairs that override the base:
//!
//! ```text
//! D      _(IS=1e-15 N=1)
//! 1N914  D(IS=2.52n RS=.568 N=1.752)
//! ```
//!
//! The base `_` ends the chain and records the model name as `COREMODEL`.
//! A device parameter may also hold an inline model such as
//! `FAMILY(TYPE=TTL)`, which extends a registered model without a name of
//! its own.

use std::collections::{BTreeMap, HashMap};

use crate::error::{NetlistError, Result};

/// Expanded model: upper-cased keys to their textual values.
pub type ModelMap = BTreeMap<String, String>;

/// Registered models of a netlist.
#[derive(Debug, Clone, Default)]
pub struct ModelTable {
    models: HashMap<String, String>,
}

impl ModelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `"NAME BASE(K=V ...)"`.
    pub fn register(&mut self, model_in: &str) -> Result<()> {
        let model_in = model_in.trim();
        let Some(pos) = model_in.find(' ') else {
            return Err(NetlistError::model_syntax(model_in, "unable to parse model"));
        };
        let name = model_in[..pos].trim().to_uppercase();
        let def = model_in[pos + 1..].trim().to_string();
        if self.models.contains_key(&name) {
            return Err(NetlistError::DuplicateModel { name });
        }
        self.models.insert(name, def);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(&name.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Expand a model name or inline model into its key/value map.
    pub fn parse(&self, model: &str) -> Result<ModelMap> {
        let mut map = ModelMap::new();
        self.parse_into(model, &mut map)?;
        Ok(map)
    }

    fn parse_into(&self, model_in: &str, map: &mut ModelMap) -> Result<()> {
        let mut model = model_in.trim().to_string();
        let mut key = String::new();
        let pos = loop {
            if let Some(pos) = model.find('(') {
                break pos;
            }
            key = model.to_uppercase();
            model = self
                .models
                .get(&key)
                .ok_or_else(|| NetlistError::UnknownModel {
                    model: model_in.to_string(),
                })?
                .clone();
        };

        let base = model[..pos].trim();
        if base == "_" {
            map.insert("COREMODEL".to_string(), key);
        } else if self.contains(base) {
            self.parse_into(base, map)?;
        } else {
            return Err(NetlistError::UnknownModel {
                model: base.to_string(),
            });
        }

        let remainder = model[pos + 1..].trim();
        let Some(body) = remainder.strip_suffix(')') else {
            return Err(NetlistError::model_syntax(model_in, "missing ')'"));
        };
        for pair in body.split_whitespace() {
            let Some((k, v)) = pair.split_once('=') else {
                return Err(NetlistError::model_syntax(
                    model_in,
                    format!("error on pair '{}'", pair),
                ));
            };
            map.insert(k.to_uppercase(), v.to_string());
        }
        Ok(())
    }

    /// Textual value of `entity` in `model`.
    pub fn value_str(&self, model: &str, entity: &str) -> Result<String> {
        let map = self.parse(model)?;
        Self::value_str_of(&map, model, entity).map(str::to_string)
    }

    /// Numeric value of `entity` in `model`.
    pub fn value(&self, model: &str, entity: &str) -> Result<f64> {
        let map = self.parse(model)?;
        Self::value_of(&map, model, entity)
    }

    pub fn value_str_of<'m>(map: &'m ModelMap, model: &str, entity: &str) -> Result<&'m str> {
        if entity != entity.to_uppercase() {
            return Err(NetlistError::model_syntax(
                model,
                format!("model parameters should be uppercase: {}", entity),
            ));
        }
        map.get(entity)
            .map(String::as_str)
            .ok_or_else(|| NetlistError::UnknownModelEntity {
                model: model.to_string(),
                entity: entity.to_string(),
            })
    }

    /// Numeric value of `entity` in an expanded model. Accepts the suffixes
    /// M k m u n p f a.
    pub fn value_of(map: &ModelMap, model: &str, entity: &str) -> Result<f64> {
        let text = Self::value_str_of(map, model, entity)?;
        let bad = || NetlistError::model_syntax(model, format!("invalid number for {}: '{}'", entity, text));
        let last = text.chars().last().ok_or_else(bad)?;
        let factor = match last {
            'M' => 1e6,
            'k' => 1e3,
            'm' => 1e-3,
            'u' => 1e-6,
            'n' => 1e-9,
            'p' => 1e-12,
            'f' => 1e-15,
            'a' => 1e-18,
            c if c.is_ascii_digit() || c == '.' => 1.0,
            _ => return Err(bad()),
        };
        let digits = if factor == 1.0 {
            text
        } else {
            &text[..text.len() - 1]
        };
        digits.parse::<f64>().map(|v| v * factor).map_err(|_| bad())
    }

    /// Models every netlist starts with.
    pub(crate) fn register_library(&mut self) -> Result<()> {
        const LIBRARY: &[&str] = &[
            "D _(IS=1e-15 N=1)",
            "1N914 D(Is=2.52n Rs=.568 N=1.752 Cjo=4p M=.4 tt=20n Iave=200m Vpk=75 mfg=OnSemi type=silicon)",
            "1N4001 D(Is=14.11n N=1.984 Rs=33.89m Ikf=94.81 Xti=3 Eg=1.11 Cjo=25.89p M=.44 Vj=.3245 Fc=.5 Bv=75 Ibv=10u Tt=5.7u Iave=1 Vpk=50 mfg=GI type=silicon)",
            "1N4148 D(Is=2.52n Rs=.568 N=1.752 Cjo=4p M=.4 tt=20n Iave=200m Vpk=75 mfg=OnSemi type=silicon)",
            "LEDRED D(IS=93.2p RS=42M N=3.73 BV=4 IBV=10U CJO=2.97P VJ=.75 M=.333 TT=4.32U Iave=40m Vpk=4 type=LED)",
            "FAMILY _(TYPE=CUSTOM FV=5 IVL=0.16 IVH=0.4 OVL=0.1 OVH=1.0 ORL=1.0 ORH=130)",
            "74XXOC FAMILY(IVL=0.16 IVH=0.4 OVL=0.1 OVH=0.05 ORL=10.0 ORH=1.0e8)",
            "74XX FAMILY(TYPE=TTL)",
            "CD4XXX FAMILY(TYPE=CD4XXX)",
        ];
        for m in LIBRARY {
            self.register(m)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn library() -> ModelTable {
        let mut t = ModelTable::new();
        t.register_library().unwrap();
        t
    }

    #[test]
    fn test_inheritance_and_coremodel() {
        let t = library();
        let map = t.parse("1N914").unwrap();
        assert_eq!(map["COREMODEL"], "D");
        // N overridden by the derived model, case folded
        assert_eq!(map["N"], "1.752");
        assert_eq!(map["IS"], "2.52n");
        assert_relative_eq!(t.value("1N914", "IS").unwrap(), 2.52e-9, max_relative = 1e-12);
    }

    #[test]
    fn test_inline_model() {
        let t = library();
        let map = t.parse("FAMILY(TYPE=TTL)").unwrap();
        assert_eq!(map["TYPE"], "TTL");
        assert_eq!(map["COREMODEL"], "FAMILY");
        assert_eq!(t.value_str("74XXOC", "TYPE").unwrap(), "CUSTOM");
        assert_relative_eq!(t.value("74XXOC", "ORH").unwrap(), 1.0e8);
    }

    #[test]
    fn test_suffixes() {
        let mut t = ModelTable::new();
        t.register("X _(A=1M B=2k C=3m D=4u E=5f F=6a G=7)").unwrap();
        assert_relative_eq!(t.value("X", "A").unwrap(), 1e6);
        assert_relative_eq!(t.value("X", "B").unwrap(), 2e3);
        assert_relative_eq!(t.value("X", "C").unwrap(), 3e-3);
        assert_relative_eq!(t.value("X", "D").unwrap(), 4e-6);
        assert_relative_eq!(t.value("X", "E").unwrap(), 5e-15);
        assert_relative_eq!(t.value("X", "F").unwrap(), 6e-18);
        assert_relative_eq!(t.value("X", "G").unwrap(), 7.0);
    }

    #[test]
    fn test_errors() {
        let mut t = library();
        assert!(matches!(t.register("D _(IS=1)"), Err(NetlistError::DuplicateModel { .. })));
        assert!(matches!(t.register("NOSPACE"), Err(NetlistError::ModelSyntax { .. })));
        assert!(matches!(t.parse("NOPE"), Err(NetlistError::UnknownModel { .. })));
        assert!(matches!(t.value("D", "RS"), Err(NetlistError::UnknownModelEntity { .. })));
        assert!(matches!(t.value("D", "is"), Err(NetlistError::ModelSyntax { .. })));
        t.register("BAD _(IS=1e-15").unwrap();
        assert!(matches!(t.parse("BAD"), Err(NetlistError::ModelSyntax { .. })));
    }
}
