//! Built-in truthtable gates.

use super::TtDesc;
use crate::error::Result;
use crate::setup::Factory;

fn gates() -> Vec<TtDesc> {
    vec![
        TtDesc::new("TTL_7400_NAND", 2, 1, "+A,B")
            .line("A,B|Q")
            .line("0,X|1|22")
            .line("X,0|1|22")
            .line("1,1|0|15"),
        TtDesc::new("TTL_7402_NOR", 2, 1, "+A,B")
            .line("A,B|Q")
            .line("0,0|1|22")
            .line("X,1|0|15")
            .line("1,X|0|15"),
        TtDesc::new("TTL_7404_INVERT", 1, 1, "+A")
            .line("A|Q")
            .line("0|1|22")
            .line("1|0|15"),
        TtDesc::new("TTL_7408_AND", 2, 1, "+A,B")
            .line("A,B|Q")
            .line("0,X|0|15")
            .line("X,0|0|15")
            .line("1,1|1|22"),
        TtDesc::new("TTL_7410_NAND", 3, 1, "+A,B,C")
            .line("A,B,C|Q")
            .line("0,X,X|1|22")
            .line("X,0,X|1|22")
            .line("X,X,0|1|22")
            .line("1,1,1|0|15"),
        TtDesc::new("TTL_7432_OR", 2, 1, "+A,B")
            .line("A,B|Q")
            .line("1,X|1|22")
            .line("X,1|1|22")
            .line("0,0|0|15"),
        TtDesc::new("TTL_7486_XOR", 2, 1, "+A,B")
            .line("A,B|Q")
            .line("0,0|0|15")
            .line("0,1|1|22")
            .line("1,0|1|22")
            .line("1,1|0|15"),
        // NOR latch, both inputs high forces Q low
        TtDesc::new("TTL_SR_LATCH", 3, 1, "+S,R")
            .line("S,R,_Q|Q")
            .line("1,0,X|1|20")
            .line("X,1,X|0|20")
            .line("0,0,0|0|20")
            .line("0,0,1|1|20"),
        cmos(
            TtDesc::new("CD4011_NAND", 2, 1, "+A,B")
                .line("A,B|Q")
                .line("0,X|1|85")
                .line("X,0|1|85")
                .line("1,1|0|120"),
        ),
        cmos(
            TtDesc::new("CD4069_INVERT", 1, 1, "+A")
                .line("A|Q")
                .line("0|1|55")
                .line("1|0|55"),
        ),
    ]
}

fn cmos(mut desc: TtDesc) -> TtDesc {
    desc.family = "CD4XXX".to_string();
    desc
}

/// Register the built-in gates with `factory`.
pub fn register(factory: &mut Factory) -> Result<()> {
    for desc in gates() {
        factory.register_truthtable(&desc)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::truthtable::TruthTable;

    #[test]
    fn test_library_compiles() {
        for desc in gates() {
            assert!(TruthTable::compile(&desc).is_ok(), "{} failed to compile", desc.name);
        }
    }

    #[test]
    fn test_xor_outputs() {
        let xor = gates().into_iter().find(|d| d.name == "TTL_7486_XOR").unwrap();
        let t = TruthTable::compile(&xor).unwrap();
        assert_eq!(t.out(0b00), 0);
        assert_eq!(t.out(0b01), 1);
        assert_eq!(t.out(0b10), 1);
        assert_eq!(t.out(0b11), 0);
        // every input matters for XOR
        for s in 0..4 {
            assert_eq!(t.ignore(s), 0);
        }
    }

    #[test]
    fn test_latch_holds() {
        let latch = gates().into_iter().find(|d| d.name == "TTL_SR_LATCH").unwrap();
        let t = TruthTable::compile(&latch).unwrap();
        // S=0, R=0 follows the fed back output
        assert_eq!(t.out(0b000), 0);
        assert_eq!(t.out(0b100), 1);
        assert_eq!(t.feedback(), &[(0, 2)]);
    }
}
