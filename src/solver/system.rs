//! Solver devices and the analog partitioner.
//!
//! The `SOLVER` device is instantiated by the netlist description. After
//! wiring, [`post_start`] splits the analog nets into independent groups
//! and creates one matrix-solver device per group. The `SOLVER` device
//! then steps all groups at the fixed rate `1/FREQ` through its `Q_step`
//! loop; groups with an adaptive timestep schedule themselves through
//! their own `Q_sync` loop.

use tracing::{debug, info};

use super::group::MatrixSolver;
use super::{SolverGroupInfo, SolverParams};
use crate::config::SolverConfig;
use crate::error::{NetlistError, Result};
use crate::netlist::{DeviceId, DeviceModel, Domain, NetId, Netlist, TermId, TermKind};
use crate::setup::DeviceBuilder;
use crate::time::SimTime;

/// Split the live analog nets into connected groups.
///
/// Nets are connected when a two-terminal element sits between them. Rail
/// nets end the walk; nets without connections are skipped.
pub fn split_groups(nl: &Netlist) -> Vec<Vec<NetId>> {
    let mut seen = vec![false; nl.nets.len()];
    let mut groups = Vec::new();
    for (id, net) in nl.nets() {
        if net.is_analog() && !net.is_rail() && net.num_cons() > 0 && !seen[id.0] {
            let mut group = Vec::new();
            process_net(nl, id, &mut seen, &mut group);
            groups.push(group);
        }
    }
    groups
}

fn process_net(nl: &Netlist, n: NetId, seen: &mut [bool], group: &mut Vec<NetId>) {
    if nl.net(n).num_cons() == 0 {
        return;
    }
    seen[n.0] = true;
    group.push(n);
    for &t in nl.net(n).core_terms() {
        let term = nl.terminal(t);
        if !term.kind().is_terminal() {
            continue;
        }
        let other_net = term.other().and_then(|o| nl.terminal(o).net());
        if let Some(on) = other_net {
            if !seen[on.0] && !nl.net(on).is_rail() {
                process_net(nl, on, seen, group);
            }
        }
    }
}

/// Read the `SOLVER` device parameters.
fn read_params(nl: &Netlist, dev: DeviceId) -> Result<SolverParams> {
    let name = nl.device(dev).name().to_string();
    let p = |key: &str| nl.find_param(&format!("{}.{}", name, key));
    let cfg = SolverConfig {
        freq: nl.param_f64(p("FREQ")?),
        accuracy: nl.param_f64(p("ACCURACY")?),
        gs_loops: nl.param_i64(p("GS_LOOPS")?).max(0) as usize,
        gs_threshold: nl.param_i64(p("GS_THRESHOLD")?).max(0) as usize,
        iterative: nl.param_str(p("ITERATIVE")?).to_string(),
        nr_loops: nl.param_i64(p("NR_LOOPS")?).max(0) as usize,
        sor_factor: nl.param_f64(p("SOR_FACTOR")?),
        sync_delay_ns: (nl.param_f64(p("SYNC_DELAY")?) * 1e9).round() as u64,
        dynamic_ts: nl.param_bool(p("DYNAMIC_TS")?),
        lte: nl.param_f64(p("DYNAMIC_LTE")?),
        min_timestep: nl.param_f64(p("MIN_TIMESTEP")?),
        pivot: nl.param_bool(p("PIVOT")?),
        log_stats: nl.param_bool(p("LOG_STATS")?),
        parallel: nl.param_bool(p("PARALLEL")?),
        use_specific: nl.config().solver.use_specific,
    };
    if cfg.freq <= 0.0 {
        return Err(NetlistError::invalid_param(
            format!("{}.FREQ", name),
            cfg.freq.to_string(),
            "must be positive",
        ));
    }
    Ok(SolverParams::from_config(&cfg))
}

/// Partition the analog nets and create a solver per group.
///
/// Fails if analog groups exist but no `SOLVER` device was instantiated,
/// or if a group cannot be handled.
pub(crate) fn post_start(nl: &mut Netlist) -> Result<()> {
    let groups = split_groups(nl);
    let Some(dev) = nl.devices_of_class("SOLVER").next() else {
        if groups.is_empty() {
            return Ok(());
        }
        return Err(NetlistError::NoSolver);
    };
    let params = read_params(nl, dev)?;
    info!(groups = groups.len(), "scanning analog nets");

    let base = nl.device(dev).name().to_string();
    nl.solvers.clear();
    for (i, nets) in groups.into_iter().enumerate() {
        let d = nl.add_device(&format!("{}.Solver_{}", base, i), "MATRIX_SOLVER")?;
        let q_sync = nl.add_terminal(d, "Q_sync", TermKind::Output(Domain::Logic))?;
        let fb_sync = nl.add_terminal(d, "FB_sync", TermKind::Input(Domain::Logic))?;
        if let Some(n) = nl.output_net(q_sync) {
            nl.add_terminal_to_net(n, fb_sync)?;
        }
        let solver = MatrixSolver::new(nl, i, d, q_sync, nets, params.clone())?;
        nl.set_model(d, Box::new(MatrixSolverDevice { index: i }));
        nl.solvers.push(Some(Box::new(solver)));
    }
    Ok(())
}

/// Device of one solver group. Its `FB_sync` input listens on its own
/// `Q_sync` output, which the group pulses to request a solve.
#[derive(Debug)]
pub struct MatrixSolverDevice {
    index: usize,
}

impl DeviceModel for MatrixSolverDevice {
    fn update(&mut self, nl: &mut Netlist) {
        nl.with_solver(self.index, |s, nl| s.update(nl));
    }
}

/// The `SOLVER` device.
#[derive(Debug)]
pub struct SolverDevice {
    dev: DeviceId,
    q_step: TermId,
    params: SolverParams,
}

impl SolverDevice {
    /// Register parameters and terminals, defaults from the netlist config.
    pub fn build(b: &mut DeviceBuilder) -> Result<Box<dyn DeviceModel>> {
        let cfg = b.config().solver.clone();
        b.param_f64("FREQ", cfg.freq)?;
        b.param_f64("ACCURACY", cfg.accuracy)?;
        b.param_int("GS_LOOPS", cfg.gs_loops as i64)?;
        b.param_int("GS_THRESHOLD", cfg.gs_threshold as i64)?;
        b.param_str("ITERATIVE", &cfg.iterative)?;
        b.param_int("NR_LOOPS", cfg.nr_loops as i64)?;
        b.param_f64("SOR_FACTOR", cfg.sor_factor)?;
        b.param_f64("SYNC_DELAY", cfg.sync_delay_ns as f64 * 1e-9)?;
        b.param_bool("DYNAMIC_TS", cfg.dynamic_ts)?;
        b.param_f64("DYNAMIC_LTE", cfg.lte)?;
        b.param_f64("MIN_TIMESTEP", cfg.min_timestep)?;
        b.param_bool("PIVOT", cfg.pivot)?;
        b.param_bool("LOG_STATS", cfg.log_stats)?;
        b.param_bool("PARALLEL", cfg.parallel)?;

        let q_step = b.logic_output("Q_step")?;
        b.logic_input("FB_step")?;
        b.connect("Q_step", "FB_step");

        Ok(Box::new(SolverDevice {
            dev: b.id(),
            q_step,
            params: SolverParams::from_config(&cfg),
        }))
    }
}

impl DeviceModel for SolverDevice {
    fn reset(&mut self, nl: &mut Netlist) {
        for idx in 0..nl.solvers.len() {
            nl.with_solver(idx, |s, _| s.reset());
        }
    }

    fn update_param(&mut self, nl: &mut Netlist) {
        if let Ok(p) = read_params(nl, self.dev) {
            self.params = p;
        }
    }

    fn update(&mut self, nl: &mut Netlist) {
        if self.params.dynamic {
            nl.start_groups();
            return;
        }

        // solve everything during startup, even groups without timestep devices
        let force = nl.time() < SimTime::from_double(2.0 * self.params.max_timestep);
        nl.solve_groups(force, self.params.parallel);

        if let Some(n) = nl.output_net(self.q_step) {
            if !nl.net(n).is_queued() {
                nl.toggle_and_push_to_queue(n, SimTime::from_double(self.params.max_timestep));
            }
        }
    }

    fn stop(&mut self, nl: &mut Netlist) {
        for s in nl.solvers.iter().flatten() {
            s.log_stats(nl);
        }
    }
}

impl Netlist {
    /// Run `f` with solver group `idx` taken out of the netlist.
    pub(crate) fn with_solver<R>(
        &mut self,
        idx: usize,
        f: impl FnOnce(&mut MatrixSolver, &mut Netlist) -> R,
    ) -> Option<R> {
        let mut s = self.solvers.get_mut(idx)?.take()?;
        let r = f(&mut s, self);
        self.solvers[idx] = Some(s);
        Some(r)
    }

    /// Solve group `idx` immediately, on behalf of a device whose stamps
    /// just changed.
    pub(crate) fn solve_group_now(&mut self, idx: usize) {
        self.with_solver(idx, |s, nl| s.update_forced(nl));
    }

    /// Solve the groups with timestep devices, or all of them with `force`.
    pub(crate) fn solve_groups(&mut self, force: bool, parallel: bool) {
        if parallel && self.solvers.len() > 1 {
            self.solve_groups_parallel(force);
        } else {
            self.solve_groups_sequential(force);
        }
    }

    fn solve_groups_sequential(&mut self, force: bool) {
        for idx in 0..self.solvers.len() {
            self.with_solver(idx, |s, nl| {
                if force || s.has_timestep_devices() {
                    s.solve(nl);
                }
            });
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn solve_groups_parallel(&mut self, force: bool) {
        self.solve_groups_sequential(force);
    }

    /// Solve groups on the rayon pool. Groups without dynamic devices have
    /// their linear solve run in parallel; loading stamps, stepping devices
    /// and writing results stays sequential.
    #[cfg(feature = "parallel")]
    fn solve_groups_parallel(&mut self, force: bool) {
        use rayon::prelude::*;

        let mut batch: Vec<(usize, Box<MatrixSolver>, f64)> = Vec::new();
        for idx in 0..self.solvers.len() {
            let Some(s) = self.solvers[idx].as_ref() else {
                continue;
            };
            if !(force || s.has_timestep_devices()) {
                continue;
            }
            if s.has_dynamic_devices() {
                self.with_solver(idx, |s, nl| s.solve(nl));
                continue;
            }
            let Some(mut s) = self.solvers[idx].take() else {
                continue;
            };
            match s.begin(self) {
                Some(dt) => {
                    s.load(self);
                    batch.push((idx, s, dt));
                }
                None => self.solvers[idx] = Some(s),
            }
        }

        batch.par_iter_mut().for_each(|(_, s, _)| s.compute());

        for (idx, mut s, dt) in batch {
            s.store(self, false);
            s.finish(self, dt);
            self.solvers[idx] = Some(s);
        }
    }

    /// Schedule the first step of every group. Groups with timestep
    /// devices keep rescheduling themselves from there.
    fn start_groups(&mut self) {
        for idx in 0..self.solvers.len() {
            self.with_solver(idx, |s, nl| {
                if let Some(n) = nl.output_net(s.q_sync()) {
                    if !nl.net(n).is_queued() {
                        debug!(solver = s.name(), "scheduling first step");
                        nl.force_queue_execution(n);
                        nl.reschedule_in_queue(n, SimTime::from_double(s.params().min_timestep));
                    }
                }
            });
        }
    }

    pub fn num_solvers(&self) -> usize {
        self.solvers.len()
    }

    pub fn solver(&self, idx: usize) -> Option<&MatrixSolver> {
        self.solvers.get(idx)?.as_deref()
    }

    /// Summary of every solver group.
    pub fn solver_groups(&self) -> Vec<SolverGroupInfo> {
        self.solvers.iter().flatten().map(|s| s.info(self)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetlistConfig;

    fn analog_net(nl: &mut Netlist, name: &str) -> NetId {
        nl.add_net(name.to_string(), Domain::Analog, None)
    }

    #[test]
    fn test_split_groups_stops_at_rails() {
        let mut nl = Netlist::new(NetlistConfig::default());
        let a = analog_net(&mut nl, "A");
        let b = analog_net(&mut nl, "B");
        let c = analog_net(&mut nl, "C");

        let gnd = nl.add_device("GND", "GND").unwrap();
        let rail = nl.add_terminal(gnd, "Q", TermKind::Output(Domain::Analog)).unwrap();
        let rail_net = nl.output_net(rail).unwrap();

        // R1: A-B, R2: B-GND, R3: C-GND
        let mut pair = |name: &str, n1: NetId, n2: NetId| {
            let d = nl.add_device(name, "RES").unwrap();
            let p = nl.add_terminal(d, "1", TermKind::Terminal).unwrap();
            let q = nl.add_terminal(d, "2", TermKind::Terminal).unwrap();
            nl.set_other(p, q);
            nl.add_terminal_to_net(n1, p).unwrap();
            nl.add_terminal_to_net(n2, q).unwrap();
        };
        pair("R1", a, b);
        pair("R2", b, rail_net);
        pair("R3", c, rail_net);

        let groups = split_groups(&nl);
        assert_eq!(groups, vec![vec![a, b], vec![c]]);
    }
}
