//! Wiring errors and alias handling seen through netlist descriptions.

mod common;

use common::{build, build_with};
use netlist_core::{NetlistConfig, NetlistError};

fn net_of(nl: &netlist_core::Netlist, term: &str) -> netlist_core::netlist::NetId {
    let t = nl.find_term(term).unwrap();
    nl.terminal(t).net().unwrap()
}

#[test]
fn test_link_order_does_not_matter() {
    let forward = "
NETLIST_START(x)
    LOGIC_INPUT(I, 1)
    TTL_7400_NAND(G1)
    TTL_7404_INVERT(G2, G1.Q)
    NET_C(I.Q, G1.A)
    NET_C(G1.A, G1.B)
NETLIST_END()
";
    let backward = "
NETLIST_START(x)
    LOGIC_INPUT(I, 1)
    TTL_7400_NAND(G1)
    TTL_7404_INVERT(G2, G1.Q)
    NET_C(G1.B, G1.A)
    NET_C(G1.A, I.Q)
NETLIST_END()
";
    for text in [forward, backward] {
        let nl = build(text, "x").unwrap();
        let n = net_of(&nl, "I.Q");
        assert_eq!(net_of(&nl, "G1.A"), n);
        assert_eq!(net_of(&nl, "G1.B"), n);
        assert_eq!(nl.net(n).num_cons(), 2);
    }
}

#[test]
fn test_alias_chain() {
    let text = "
NETLIST_START(x)
    SOLVER(Solver, 48000)
    ANALOG_INPUT(V, 5)
    RES(R1, 1k)
    RES(R2, 1k)
    ALIAS(TOP, R1.1)
    ALIAS(IN, TOP)
    NET_C(V.Q, IN)
    NET_C(R1.2, R2.1)
    NET_C(R2.2, GND)
NETLIST_END()
";
    let nl = build(text, "x").unwrap();
    assert_eq!(net_of(&nl, "R1.1"), net_of(&nl, "V.Q"));
}

#[test]
fn test_outputs_cannot_be_linked() {
    let text = "
NETLIST_START(x)
    LOGIC_INPUT(A, 0)
    LOGIC_INPUT(B, 1)
    NET_C(A.Q, B.Q)
NETLIST_END()
";
    let config = NetlistConfig::default().with_link_retries(3);
    match build_with(config, text, "x") {
        Err(NetlistError::UnresolvedLinks { links }) => {
            assert_eq!(links, vec![("A.Q".to_string(), "B.Q".to_string())]);
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_unknown_terminal() {
    let text = "
NETLIST_START(x)
    RES(R1, 1k)
    NET_C(R1.3, GND)
NETLIST_END()
";
    assert!(matches!(
        build(text, "x"),
        Err(NetlistError::TerminalNotFound { .. })
    ));
}

#[test]
fn test_unconnected_input() {
    let text = "
NETLIST_START(x)
    LOGIC_INPUT(I, 1)
    TTL_7400_NAND(G1)
    NET_C(I.Q, G1.B)
NETLIST_END()
";
    match build(text, "x") {
        Err(NetlistError::TerminalsWithoutNet { terminals }) => {
            assert!(terminals.contains(&"G1.A".to_string()));
            assert!(!terminals.contains(&"G1.B".to_string()));
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_duplicate_device() {
    let text = "
NETLIST_START(x)
    RES(R1, 1k)
    CAP(R1, 1u)
NETLIST_END()
";
    assert!(matches!(
        build(text, "x"),
        Err(NetlistError::DuplicateDevice { .. })
    ));
}

#[test]
fn test_unknown_class() {
    let text = "
NETLIST_START(x)
    FLUX_CAPACITOR(F1)
NETLIST_END()
";
    assert!(matches!(
        build(text, "x"),
        Err(NetlistError::UnknownDeviceClass { .. })
    ));
}
