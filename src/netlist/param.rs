//! Typed device parameters.

use serde::{Deserialize, Serialize};

use crate::error::{NetlistError, Result};

use super::types::DeviceId;

/// Value of a device parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Double(f64),
    Int(i64),
    Logic(bool),
    Str(String),
    /// Model string, expanded on demand through the model table
    Model(String),
}

impl ParamValue {
    /// Parse `text` into a value of the same type as `self`.
    pub fn parse_like(&self, name: &str, text: &str) -> Result<ParamValue> {
        let number = || {
            parse_number(text).ok_or_else(|| NetlistError::invalid_param(name, text, "not a number"))
        };
        Ok(match self {
            ParamValue::Double(_) => ParamValue::Double(number()?),
            ParamValue::Int(_) => ParamValue::Int(number()? as i64),
            ParamValue::Logic(_) => ParamValue::Logic(number()? != 0.0),
            ParamValue::Str(_) => ParamValue::Str(text.to_string()),
            ParamValue::Model(_) => ParamValue::Model(text.to_string()),
        })
    }

    /// Render the value the way the description language would write it.
    pub fn to_text(&self) -> String {
        match self {
            ParamValue::Double(v) => format!("{}", v),
            ParamValue::Int(v) => format!("{}", v),
            ParamValue::Logic(v) => if *v { "1" } else { "0" }.to_string(),
            ParamValue::Str(s) | ParamValue::Model(s) => s.clone(),
        }
    }
}

/// Parse a plain number, accepting the SI suffixes of the description
/// language as well.
pub fn parse_number(text: &str) -> Option<f64> {
    crate::dsl::parse_value(text)
}

/// A named parameter owned by a device.
#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) name: String,
    pub(crate) device: DeviceId,
    pub(crate) value: ParamValue,
}

impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn value(&self) -> &ParamValue {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_like_keeps_type() {
        let v = ParamValue::Int(0).parse_like("N", "12.7").unwrap();
        assert_eq!(v, ParamValue::Int(12));
        let v = ParamValue::Logic(false).parse_like("B", "1").unwrap();
        assert_eq!(v, ParamValue::Logic(true));
        let v = ParamValue::Double(0.0).parse_like("R", "4.7k").unwrap();
        assert_eq!(v, ParamValue::Double(4700.0));
    }

    #[test]
    fn test_parse_like_rejects_garbage() {
        let err = ParamValue::Double(0.0).parse_like("R", "abc").unwrap_err();
        assert!(matches!(err, NetlistError::InvalidParameter { .. }));
    }
}
