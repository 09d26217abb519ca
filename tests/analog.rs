//! Analog groups: partitioning, method selection and operating points.

mod common;

use approx::assert_relative_eq;
use common::{build, build_with, volts};
use netlist_core::{NetlistConfig, SimTime, SolverConfig};

const DIVIDER: &str = "
NETLIST_START(divider)
    SOLVER(Solver, 48000)
    ANALOG_INPUT(V5, 5)
    RES(R1, 1k)
    RES(R2, 2k)
    RES(R3, 3k)
    NET_C(V5.Q, R1.1)
    NET_C(R1.2, R2.1)
    NET_C(R2.2, R3.1)
    NET_C(R3.2, GND)
NETLIST_END()
";

const RC: &str = "
NETLIST_START(rc)
    SOLVER(Solver, 48000)
    ANALOG_INPUT(V5, 5)
    RES(R1, 1k)
    CAP(C1, 1u)
    NET_C(V5.Q, R1.1)
    NET_C(R1.2, C1.1)
    NET_C(C1.2, GND)
NETLIST_END()
";

#[test]
fn test_divider_direct() {
    let mut nl = build(DIVIDER, "divider").unwrap();
    nl.process_queue_for(SimTime::from_msec(2));

    assert_relative_eq!(volts(&nl, "R1.2"), 5.0 * 5.0 / 6.0, epsilon = 1e-6);
    assert_relative_eq!(volts(&nl, "R3.1"), 2.5, epsilon = 1e-6);

    let groups = nl.solver_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].method, "direct2");
    assert_eq!(groups[0].nets.len(), 2);
    assert!(groups[0].stats.calculations > 0);
}

#[test]
fn test_rail_change_resolves_group() {
    let mut nl = build(DIVIDER, "divider").unwrap();
    nl.process_queue_for(SimTime::from_msec(1));
    let before = nl.solver_groups()[0].stats.calculations;

    nl.set_param("V5.IN", "10").unwrap();
    nl.process_queue_for(SimTime::from_msec(1));

    assert!(nl.solver_groups()[0].stats.calculations > before);
    assert_relative_eq!(volts(&nl, "R1.2"), 10.0 * 5.0 / 6.0, epsilon = 1e-6);
    assert_relative_eq!(volts(&nl, "R3.1"), 5.0, epsilon = 1e-6);
}

#[test]
fn test_divider_iterative_agrees() {
    let config = NetlistConfig::default().with_solver(
        SolverConfig::default()
            .without_specific()
            .with_iterative("GMRES", 1),
    );
    let mut nl = build_with(config, DIVIDER, "divider").unwrap();
    nl.process_queue_for(SimTime::from_msec(2));

    assert_eq!(nl.solver_groups()[0].method, "GMRES");
    assert_relative_eq!(volts(&nl, "R1.2"), 5.0 * 5.0 / 6.0, epsilon = 1e-4);
    assert_relative_eq!(volts(&nl, "R3.1"), 2.5, epsilon = 1e-4);
}

#[test]
fn test_unknown_iterative_solver() {
    let config = NetlistConfig::default().with_solver(
        SolverConfig::default()
            .without_specific()
            .with_iterative("NOPE", 1),
    );
    assert!(build_with(config, DIVIDER, "divider").is_err());
}

#[test]
fn test_independent_groups() {
    let text = "
NETLIST_START(two)
    SOLVER(Solver, 48000)
    ANALOG_INPUT(V5, 5)
    RES(R1, 1k)
    RES(R2, 1k)
    RES(R3, 1k)
    RES(R4, 3k)
    NET_C(V5.Q, R1.1, R3.1)
    NET_C(R1.2, R2.1)
    NET_C(R3.2, R4.1)
    NET_C(R2.2, R4.2, GND)
NETLIST_END()
";
    let mut nl = build(text, "two").unwrap();
    nl.process_queue_for(SimTime::from_msec(1));

    // V5 and GND are rails, so the two dividers never share a matrix
    let groups = nl.solver_groups();
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.method == "direct1"));
    assert_relative_eq!(volts(&nl, "R1.2"), 2.5, epsilon = 1e-6);
    assert_relative_eq!(volts(&nl, "R3.2"), 3.75, epsilon = 1e-6);
}

#[test]
fn test_rc_charge() {
    let mut nl = build(RC, "rc").unwrap();
    assert_eq!(nl.solver_groups()[0].timestep_devices, 1);

    // one time constant
    nl.process_queue_for(SimTime::from_msec(1));
    let v = volts(&nl, "C1.1");
    assert!(v > 2.9 && v < 3.4, "after 1ms: {}", v);

    nl.process_queue_for(SimTime::from_msec(9));
    assert_relative_eq!(volts(&nl, "C1.1"), 5.0, epsilon = 0.01);
}

#[test]
fn test_diode_forward_voltage() {
    let text = "
NETLIST_START(diode)
    SOLVER(Solver, 48000)
    ANALOG_INPUT(V5, 5)
    RES(R1, 1k)
    DIODE(D1, \"D\")
    NET_C(V5.Q, R1.1)
    NET_C(R1.2, D1.A)
    NET_C(D1.K, GND)
NETLIST_END()
";
    let mut nl = build(text, "diode").unwrap();
    nl.process_queue_for(SimTime::from_msec(1));

    let g = &nl.solver_groups()[0];
    assert_eq!(g.dynamic_devices, 1);
    assert!(g.stats.newton_loops > 0);
    let v = volts(&nl, "D1.A");
    assert!(v > 0.5 && v < 0.85, "diode drop {}", v);
    assert_eq!(nl.find_term("D1.A"), nl.find_term("D1.1"));
}

#[test]
fn test_logic_drives_analog_through_one_proxy() {
    let text = "
NETLIST_START(proxy)
    SOLVER(Solver, 48000)
    LOGIC_INPUT(L, 1)
    RES(R1, 1k)
    RES(R2, 1k)
    NET_C(L.Q, R1.1, R2.1)
    NET_C(R1.2, R2.2, GND)
NETLIST_END()
";
    let mut nl = build(text, "proxy").unwrap();
    assert_eq!(nl.devices_of_class("D_TO_A_PROXY").count(), 1);

    nl.process_queue_for(SimTime::from_msec(1));
    let v = volts(&nl, "R1.1");
    assert!(v > 2.0, "high level {}", v);

    nl.set_param("L.IN", "0").unwrap();
    nl.process_queue_for(SimTime::from_msec(1));
    assert!(volts(&nl, "R1.1") < 0.8);
}

#[test]
fn test_missing_solver_device() {
    let text = "
NETLIST_START(nosolver)
    ANALOG_INPUT(V5, 5)
    RES(R1, 1k)
    RES(R2, 1k)
    NET_C(V5.Q, R1.1)
    NET_C(R1.2, R2.1)
    NET_C(R2.2, GND)
NETLIST_END()
";
    assert!(matches!(
        build(text, "nosolver"),
        Err(netlist_core::NetlistError::NoSolver)
    ));
}

#[test]
fn test_rc_charge_adaptive_timestep() {
    let config = NetlistConfig::default().with_solver(SolverConfig::default().with_dynamic_ts(1e-5, 1e-6));
    let mut nl = build_with(config, RC, "rc").unwrap();

    nl.process_queue_for(SimTime::from_msec(1));
    let v = volts(&nl, "C1.1");
    assert!(v > 2.9 && v < 3.4, "after 1ms: {}", v);
    assert!(nl.solver_groups()[0].stats.vsolver_calls > 0);

    nl.process_queue_for(SimTime::from_msec(9));
    assert_relative_eq!(volts(&nl, "C1.1"), 5.0, epsilon = 0.01);
}

#[test]
fn test_newton_budget_reschedules() {
    let text = "
NETLIST_START(diode)
    SOLVER(Solver, 48000)
    ANALOG_INPUT(V5, 5)
    RES(R1, 1k)
    DIODE(D1, \"D\")
    NET_C(V5.Q, R1.1)
    NET_C(R1.2, D1.A)
    NET_C(D1.K, GND)
NETLIST_END()
";
    let config = NetlistConfig::default().with_solver(SolverConfig::default().with_nr_loops(1));
    let mut nl = build_with(config, text, "diode").unwrap();
    nl.process_queue_for(SimTime::from_msec(1));

    // one Newton step per solve, the rest comes from rescheduled solves
    let g = &nl.solver_groups()[0];
    assert_eq!(g.stats.newton_loops, g.stats.calculations);
    assert!(g.stats.calculations >= 3);
    let v = volts(&nl, "D1.1");
    assert!(v > 0.7 && v < 0.8, "diode drop {}", v);
}

#[test]
fn test_gmres_falls_back_to_direct() {
    let config = NetlistConfig::default().with_solver(
        SolverConfig::default()
            .without_specific()
            .with_iterative("GMRES", 1)
            .with_accuracy(0.0),
    );
    let mut nl = build_with(config, DIVIDER, "divider").unwrap();
    nl.process_queue_for(SimTime::from_msec(2));

    let g = &nl.solver_groups()[0];
    assert_eq!(g.method, "GMRES");
    assert!(g.stats.iterative_fail > 0);
    assert_relative_eq!(volts(&nl, "R1.2"), 5.0 * 5.0 / 6.0, epsilon = 1e-6);
}
