//! Netlist description language.
//!
//! A description is a sequence of named netlists. Each one is a list of
//! statements of the form `KEYWORD(arg, ...)`; arguments are names, numbers
//! with optional SI suffix, or double-quoted strings. `//` and `/* */`
//! comments are allowed, and lines starting with `#` are preprocessor
//! directives (see [`Preprocessor`]).
//!
//! # Statements
//!
//! | Statement | Effect |
//! |-----------|--------|
//! | `NETLIST_START(name)` ... `NETLIST_END()` | named netlist |
//! | `CLASS(name [, values])` | device instance; values fill the class's default list |
//! | `NET_C(a, b, ...)` | connect `a` with every other terminal |
//! | `ALIAS(alias, target)` | alternative name for a terminal |
//! | `PARAM(dev.param, value)` | parameter value |
//! | `NET_MODEL("NAME BASE(K=V ...)")` | model definition |
//! | `INCLUDE(name)` | netlist `name` in the current namespace |
//! | `SUBMODEL(model, name)` | netlist `model` in namespace `name` |
//! | `LOCAL_SOURCE(name)` | make netlists of this text includable |
//! | `LOCAL_LIB_ENTRY(name)` | as above, and usable as device class `name` |
//! | `NET_REGISTER_DEV(class, name)` | device instance without values |
//! | `DIPPINS(a, b, ...)` | DIP pin numbers as aliases |
//! | `OPTIMIZE_FRONTIER(attach, r_in, r_out)` | split an analog net with a frontier |
//! | `TRUTHTABLE_START(name, ni, no, "defs")` ... `TRUTHTABLE_END()` | truthtable class, with `TT_HEAD`, `TT_LINE`, `TT_FAMILY` |
//!
//! # Example
//!
//! ```text
//! NETLIST_START(divider)
//!     SOLVER(Solver, 48000)
//!     ANALOG_INPUT(V5, 5)
//!     RES(R1, 1k)
//!     RES(R2, 1k)
//!     NET_C(V5.Q, R1.1)
//!     NET_C(R1.2, R2.1)
//!     NET_C(R2.2, GND)
//! NETLIST_END()
//! ```

mod lexer;
mod parser;
mod preprocessor;

use std::sync::Arc;

pub use lexer::{parse_value, Lexer, Token, TokenKind};
pub use parser::Parser;
pub use preprocessor::Preprocessor;

use crate::error::Result;
use crate::setup::Setup;

/// Register netlist `name` from `text` with `setup`, or the first netlist
/// of the text if `name` is empty. Returns false if the text has no such
/// netlist.
pub fn parse_source(setup: &mut Setup, origin: &str, text: &Arc<str>, name: &str) -> Result<bool> {
    let pre = Preprocessor::new(origin, setup.defines()).process(text)?;
    let tokens = Lexer::new(&pre).tokenize()?;
    Parser::new(tokens, origin, text).parse(setup, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetlistConfig;
    use crate::error::NetlistError;

    fn setup_from(text: &str, name: &str) -> Result<Setup> {
        Setup::from_str(NetlistConfig::default(), text, name)
    }

    const TWO: &str = "
NETLIST_START(first)
    RES(R1, 1k)
NETLIST_END()

NETLIST_START(second)
    RES(R2, 2k)
    CAP(C1, 100n)
    NET_C(R2.1, C1.1)
NETLIST_END()
";

    #[test]
    fn test_selects_named_netlist() {
        let s = setup_from(TWO, "second").unwrap();
        let names: Vec<_> = s.registered_devices().iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"R2"));
        assert!(names.contains(&"C1"));
        assert!(!names.contains(&"R1"));
        assert!(s.links().contains(&("R2.1".to_string(), "C1.1".to_string())));
    }

    #[test]
    fn test_first_netlist_by_default() {
        let s = setup_from(TWO, "").unwrap();
        assert!(s.registered_devices().iter().any(|(n, _)| n == "R1"));
    }

    #[test]
    fn test_missing_netlist() {
        assert!(matches!(
            setup_from(TWO, "third"),
            Err(NetlistError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn test_positional_pins() {
        let text = "NETLIST_START(x)\n TTL_7400_NAND(G1, ttlhigh, ttllow)\nNETLIST_END()";
        let s = setup_from(text, "x").unwrap();
        assert!(s.links().contains(&("G1.A".to_string(), "ttlhigh".to_string())));
        assert!(s.links().contains(&("G1.B".to_string(), "ttllow".to_string())));

        let bad = "NETLIST_START(x)\n TTL_7400_NAND(G1, ttlhigh)\nNETLIST_END()";
        assert!(matches!(setup_from(bad, "x"), Err(NetlistError::ParseError { line: 2, .. })));
    }

    #[test]
    fn test_submodel_namespace() {
        let text = "
NETLIST_START(main)
    LOCAL_SOURCE(stage)
    SUBMODEL(stage, S1)
    SUBMODEL(stage, S2)
NETLIST_END()

NETLIST_START(stage)
    RES(R, 1k)
    ALIAS(IN, R.1)
NETLIST_END()
";
        let s = setup_from(text, "main").unwrap();
        let names: Vec<_> = s.registered_devices().iter().map(|(n, _)| n.clone()).collect();
        assert!(names.contains(&"S1.R".to_string()));
        assert!(names.contains(&"S2.R".to_string()));
        assert_eq!(s.resolve_alias("S1.IN"), "S1.R.1");
    }

    #[test]
    fn test_lib_entry_as_class() {
        let text = "
NETLIST_START(main)
    LOCAL_LIB_ENTRY(stage)
    stage(U1)
NETLIST_END()

NETLIST_START(stage)
    RES(R, 1k)
NETLIST_END()
";
        let s = setup_from(text, "main").unwrap();
        assert!(s.registered_devices().iter().any(|(n, _)| n == "U1.R"));
    }

    #[test]
    fn test_truthtable_statement() {
        let text = "
NETLIST_START(tt)
    TRUTHTABLE_START(MY_AND, 2, 1, \"+A,B\")
        TT_HEAD(\"A,B|Q\")
        TT_LINE(\"0,X|0|10\")
        TT_LINE(\"1,0|0|10\")
        TT_LINE(\"1,1|1|10\")
        TT_FAMILY(\"74XX\")
    TRUTHTABLE_END()
    MY_AND(G1, ttlhigh, ttlhigh)
NETLIST_END()
";
        let s = setup_from(text, "tt").unwrap();
        assert!(s.factory().get("MY_AND").is_some());
        assert!(s.registered_devices().iter().any(|(n, c)| n == "G1" && c == "MY_AND"));
    }

    #[test]
    fn test_defines_reach_parser() {
        let text = "
NETLIST_START(x)
#ifdef WITH_CAP
    CAP(C1, VALUE)
#endif
NETLIST_END()
";
        let mut s = Setup::new(NetlistConfig::default()).unwrap();
        s.register_define("WITH_CAP");
        s.register_define("VALUE=47n");
        s.register_source(crate::setup::Source::text("defs", text));
        s.include("x").unwrap();
        assert!(s.registered_devices().iter().any(|(n, _)| n == "C1"));
    }

    #[test]
    fn test_parse_errors_name_line() {
        let text = "NETLIST_START(x)\n RES(R1 1k)\nNETLIST_END()";
        match setup_from(text, "x") {
            Err(NetlistError::ParseError { line, source_name, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(source_name, "<string>");
            }
            other => panic!("expected parse error, got {:?}", other.map(|_| ())),
        }
        assert!(setup_from("NETLIST_START(x)\n RES(R1)", "x").is_err());
    }
}
