//! Truthtable expansion and runtime behaviour.

mod common;

use common::{build, build_with, logic};
use netlist_core::devices::truthtable::{TruthTable, TtDesc};
use netlist_core::{NetlistConfig, SimTime};

const AND_NET: &str = "
NETLIST_START(and)
    LOGIC_INPUT(A, 0)
    LOGIC_INPUT(B, 0)
    TRUTHTABLE_START(MY_AND, 2, 1, \"+A,B\")
        TT_HEAD(\"A,B|Y\")
        TT_LINE(\"0,X|0|10\")
        TT_LINE(\"1,0|0|10\")
        TT_LINE(\"1,1|1|10\")
    TRUTHTABLE_END()
    MY_AND(G1, A.Q, B.Q)
    TTL_7404_INVERT(G2, G1.Y)
NETLIST_END()
";

#[test]
fn test_and_expansion() {
    let desc = TtDesc::new("AND", 2, 1, "+A,B")
        .line("A,B|Y")
        .line("0,X|0")
        .line("1,0|0")
        .line("1,1|1");
    let t = TruthTable::compile(&desc).unwrap();
    for a in 0..2u32 {
        for b in 0..2u32 {
            let state = a | (b << 1);
            assert_eq!(t.out(state), a & b, "A={} B={}", a, b);
        }
    }
}

#[test]
fn test_and_in_netlist() {
    let mut nl = build(AND_NET, "and").unwrap();
    for (a, b) in [(0, 0), (1, 0), (1, 1), (0, 1), (1, 1)] {
        nl.set_param("A.IN", &a.to_string()).unwrap();
        nl.set_param("B.IN", &b.to_string()).unwrap();
        nl.process_queue_for(SimTime::from_usec(1));
        assert_eq!(logic(&nl, "G1.Y"), a & b, "A={} B={}", a, b);
    }
}

/// Drive A=1, B=1 while the only listener of G1.Y is detached, then
/// reattach it.
fn run_detached(config: NetlistConfig, detach: bool) -> u32 {
    let mut nl = build_with(config, AND_NET, "and").unwrap();
    nl.process_queue_for(SimTime::from_usec(1));
    assert_eq!(logic(&nl, "G1.Y"), 0);

    let listener = nl.find_term("G2.A").unwrap();
    if detach {
        nl.inactivate(listener);
    }
    nl.set_param("A.IN", "1").unwrap();
    nl.set_param("B.IN", "1").unwrap();
    nl.process_queue_for(SimTime::from_usec(1));
    if detach {
        nl.activate(listener);
    }
    nl.process_queue_for(SimTime::from_usec(1));
    logic(&nl, "G1.Y")
}

#[test]
fn test_activity_transparency() {
    let observed = run_detached(NetlistConfig::default(), false);
    let detached = run_detached(NetlistConfig::default(), true);
    assert_eq!(observed, 1);
    assert_eq!(detached, observed);
}

#[test]
fn test_activity_transparency_without_deactivation() {
    let config = NetlistConfig::default().with_deactivate(false);
    assert_eq!(run_detached(config, true), 1);
}

#[test]
fn test_gate_delay() {
    let mut nl = build(AND_NET, "and").unwrap();
    nl.process_queue_for(SimTime::from_usec(1));
    nl.set_param("A.IN", "1").unwrap();
    nl.set_param("B.IN", "1").unwrap();
    // input change lands after 1 ns, the gate adds 10 ns
    nl.process_queue_for(SimTime::from_nsec(5));
    assert_eq!(logic(&nl, "G1.Y"), 0);
    nl.process_queue_for(SimTime::from_nsec(10));
    assert_eq!(logic(&nl, "G1.Y"), 1);
}

#[test]
fn test_sr_latch_holds_state() {
    let text = "
NETLIST_START(latch)
    LOGIC_INPUT(S, 0)
    LOGIC_INPUT(R, 0)
    TTL_SR_LATCH(L1, S.Q, R.Q)
    TTL_7404_INVERT(G1, L1.Q)
NETLIST_END()
";
    let mut nl = build(text, "latch").unwrap();
    nl.process_queue_for(SimTime::from_usec(1));
    assert_eq!(logic(&nl, "L1.Q"), 0);

    nl.set_param("S.IN", "1").unwrap();
    nl.process_queue_for(SimTime::from_usec(1));
    assert_eq!(logic(&nl, "L1.Q"), 1);

    nl.set_param("S.IN", "0").unwrap();
    nl.process_queue_for(SimTime::from_usec(1));
    assert_eq!(logic(&nl, "L1.Q"), 1);

    nl.set_param("R.IN", "1").unwrap();
    nl.process_queue_for(SimTime::from_usec(1));
    assert_eq!(logic(&nl, "L1.Q"), 0);
}
