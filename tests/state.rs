//! Snapshots and deterministic replay.

mod common;

use common::{build, logic};
use netlist_core::{SimTime, Snapshot};

const CLOCKED: &str = "
NETLIST_START(clocked)
    CLOCK(CLK, 1e6)
    TTL_7404_INVERT(G1, CLK.Q)
    TTL_7408_AND(G2, CLK.Q, G1.Q)
    TTL_7404_INVERT(G3, G2.Q)
    TTL_7404_INVERT(G4, G3.Q)
NETLIST_END()
";

#[test]
fn test_clock_toggles() {
    let mut nl = build(CLOCKED, "clocked").unwrap();
    nl.set_trace(true);
    nl.process_queue_for(SimTime::from_usec(10));
    let clk = {
        let t = nl.find_term("CLK.Q").unwrap();
        nl.terminal(t).net().unwrap()
    };
    let toggles = nl.take_trace().iter().filter(|e| e.net == clk).count();
    // 1 MHz, half a period per edge
    assert!((19..=21).contains(&toggles), "{} clock edges", toggles);
}

#[test]
fn test_restore_replays_identically() {
    let t1 = SimTime::from_nsec(3_250);
    let t2 = SimTime::from_usec(5);

    let mut a = build(CLOCKED, "clocked").unwrap();
    a.process_queue_for(t1);
    let snap = a.save_state();
    a.set_trace(true);
    a.process_queue_for(t2);
    let trace_a = a.take_trace();
    assert!(!trace_a.is_empty());

    let mut b = build(CLOCKED, "clocked").unwrap();
    b.load_state(&snap).unwrap();
    assert_eq!(b.time(), a.time() - t2);
    b.set_trace(true);
    b.process_queue_for(t2);
    assert_eq!(b.take_trace(), trace_a);
    assert_eq!(logic(&b, "G3.Q"), logic(&a, "G3.Q"));
}

#[test]
fn test_snapshot_json() {
    let mut nl = build(CLOCKED, "clocked").unwrap();
    nl.process_queue_for(SimTime::from_nsec(1_700));
    let snap = nl.save_state();

    let json = snap.to_json().unwrap();
    let back = Snapshot::from_json(&json).unwrap();
    assert_eq!(back, snap);
    assert!(Snapshot::from_json("{\"time\": 3}").is_err());
}

#[test]
fn test_snapshot_from_other_netlist_rejected() {
    let other = "
NETLIST_START(other)
    CLOCK(CLK, 1e6)
    TTL_7404_INVERT(G1, CLK.Q)
    TTL_7404_INVERT(G2, G1.Q)
NETLIST_END()
";
    let mut a = build(CLOCKED, "clocked").unwrap();
    a.process_queue_for(SimTime::from_usec(1));
    let mut b = build(other, "other").unwrap();
    assert!(b.load_state(&a.save_state()).is_err());
}

#[test]
fn test_reset_is_deterministic() {
    let mut nl = build(CLOCKED, "clocked").unwrap();
    nl.set_trace(true);
    nl.process_queue_for(SimTime::from_usec(4));
    let first = nl.take_trace();

    nl.reset();
    nl.process_queue_for(SimTime::from_usec(4));
    let second = nl.take_trace();

    assert_eq!(first, second);
}

const TWO_INPUTS: &str = "
NETLIST_START(two)
    LOGIC_INPUT(A, 0)
    LOGIC_INPUT(B, 0)
    TTL_7404_INVERT(G1, A.Q)
    TTL_7404_INVERT(G2, B.Q)
    TTL_7400_NAND(G3, G1.Q, G2.Q)
    TTL_7404_INVERT(G4, G3.Q)
NETLIST_END()
";

#[test]
fn test_restore_keeps_equal_time_order() {
    let mut a = build(TWO_INPUTS, "two").unwrap();
    a.process_queue_for(SimTime::from_usec(1));
    a.set_param("A.IN", "1").unwrap();
    a.set_param("B.IN", "1").unwrap();
    let snap = a.save_state();
    assert_eq!(snap.queue.len(), 2);
    assert_eq!(snap.queue[0].0, snap.queue[1].0);

    let mut b = build(TWO_INPUTS, "two").unwrap();
    b.load_state(&snap).unwrap();
    assert_eq!(b.save_state().queue, snap.queue);

    a.set_trace(true);
    b.set_trace(true);
    a.process_queue_for(SimTime::from_usec(1));
    b.process_queue_for(SimTime::from_usec(1));
    assert_eq!(a.take_trace(), b.take_trace());
}

#[test]
fn test_failed_load_leaves_netlist_untouched() {
    let mut a = build(TWO_INPUTS, "two").unwrap();
    a.process_queue_for(SimTime::from_usec(1));
    a.set_param("A.IN", "1").unwrap();
    a.process_queue_for(SimTime::from_usec(1));
    let mut snap = a.save_state();
    snap.devices.insert("NOPE".to_string(), Default::default());

    let mut b = build(TWO_INPUTS, "two").unwrap();
    let before = b.save_state();
    assert!(b.load_state(&snap).is_err());
    assert_eq!(b.save_state(), before);
}

#[test]
fn test_bad_queue_in_snapshot_is_an_error() {
    let mut a = build(TWO_INPUTS, "two").unwrap();
    a.process_queue_for(SimTime::from_usec(1));
    a.set_param("A.IN", "1").unwrap();
    let snap = a.save_state();
    let mut b = build(TWO_INPUTS, "two").unwrap();

    let mut twice = snap.clone();
    let entry = twice.queue[0].clone();
    twice.queue.push(entry);
    assert!(b.load_state(&twice).is_err());

    let mut flood = snap.clone();
    let entry = flood.queue[0].clone();
    flood.queue = vec![entry; snap.nets.len() + 8];
    assert!(b.load_state(&flood).is_err());

    b.load_state(&snap).unwrap();
}
