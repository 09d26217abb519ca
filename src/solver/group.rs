//! The solver of one group of analog nets.

use tracing::{debug, info, warn};

use super::direct::{self, Direct};
use super::direct_cr::DirectCr;
use super::gmres::Gmres;
use super::sm::ShermanMorrison;
use super::sor::{Sor, SorMat};
use super::terms::{History, Terms};
use super::w::Woodbury;
use super::{storage_capacity, SolverParams, SolverState, SolverStats, SortType};
use crate::error::{NetlistError, Result};
use crate::netlist::{DeviceId, Domain, NetId, Netlist, TermId, TermKind};
use crate::time::SimTime;

/// Solution method of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Direct1,
    Direct2,
    Direct,
    Mat,
    MatCr,
    Sor,
    SorMat,
    Sm,
    W,
    Gmres,
}

impl Method {
    /// Pick the method for a group of `size` nets.
    pub fn select(size: usize, params: &SolverParams) -> Result<Self> {
        Ok(match size {
            1 if params.use_specific => Method::Direct1,
            2 if params.use_specific => Method::Direct2,
            n if n >= params.gs_threshold => match params.iterative.as_str() {
                "SOR_MAT" => Method::SorMat,
                "MAT_CR" => Method::MatCr,
                "MAT" => Method::Mat,
                "SM" => Method::Sm,
                "W" => Method::W,
                "SOR" => Method::Sor,
                "GMRES" => Method::Gmres,
                other => {
                    return Err(NetlistError::UnknownSolver {
                        name: other.to_string(),
                    })
                }
            },
            _ => Method::Direct,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Direct1 => "direct1",
            Method::Direct2 => "direct2",
            Method::Direct => "direct",
            Method::Mat => "MAT",
            Method::MatCr => "MAT_CR",
            Method::Sor => "SOR",
            Method::SorMat => "SOR_MAT",
            Method::Sm => "SM",
            Method::W => "W",
            Method::Gmres => "GMRES",
        }
    }

    pub fn sort_type(self) -> SortType {
        match self {
            Method::Sor | Method::SorMat => SortType::Descending,
            _ => SortType::Ascending,
        }
    }
}

/// Method state.
#[derive(Debug, Clone)]
enum Engine {
    Direct1,
    Direct2,
    Direct(Direct),
    MatCr(DirectCr),
    Sor(Sor),
    SorMat(SorMat),
    Sm(ShermanMorrison),
    W(Woodbury),
    Gmres(Gmres),
}

impl Engine {
    fn new(method: Method, rows: &[Terms], capacity: usize, pivot: bool) -> Self {
        let n = rows.len();
        match method {
            Method::Direct1 => Engine::Direct1,
            Method::Direct2 => Engine::Direct2,
            Method::Direct | Method::Mat => Engine::Direct(Direct::new(n, capacity, pivot)),
            Method::MatCr => Engine::MatCr(DirectCr::new(rows)),
            Method::Sor => Engine::Sor(Sor::new(n, capacity, pivot)),
            Method::SorMat => Engine::SorMat(SorMat::new(n, capacity, pivot)),
            Method::Sm => Engine::Sm(ShermanMorrison::new(n, capacity, pivot)),
            Method::W => Engine::W(Woodbury::new(n, capacity, pivot)),
            Method::Gmres => Engine::Gmres(Gmres::new(rows, capacity, pivot)),
        }
    }

    fn solve(&mut self, rows: &[Terms], v: &mut [f64], params: &SolverParams, stats: &mut SolverStats) {
        match self {
            Engine::Direct1 => direct::solve1(rows, v),
            Engine::Direct2 => direct::solve2(rows, v),
            Engine::Direct(d) => d.solve(rows, v),
            Engine::MatCr(d) => d.solve(rows, v),
            Engine::Sor(s) => s.solve(rows, v, params, stats),
            Engine::SorMat(s) => s.solve(rows, v, params, stats),
            Engine::Sm(s) => s.solve(rows, v),
            Engine::W(s) => s.solve(rows, v),
            Engine::Gmres(s) => s.solve(rows, v, params, stats),
        }
    }

    fn invalidate(&mut self) {
        match self {
            Engine::Sm(s) => s.invalidate(),
            Engine::W(s) => s.invalidate(),
            _ => {}
        }
    }
}

/// Summary of a group, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverGroupInfo {
    pub name: String,
    pub method: &'static str,
    pub capacity: usize,
    pub nets: Vec<String>,
    pub dynamic_devices: usize,
    pub timestep_devices: usize,
    pub stats: SolverStats,
}

/// An analog output mirroring the voltage of a group net to the inputs
/// that listen on it.
#[derive(Debug, Clone, Copy)]
struct ProxiedInput {
    out: TermId,
    net: NetId,
}

/// Solver of one connected group of analog nets.
#[derive(Debug, Clone)]
pub struct MatrixSolver {
    name: String,
    method: Method,
    capacity: usize,
    params: SolverParams,
    nets: Vec<NetId>,
    rows: Vec<Terms>,
    inputs: Vec<ProxiedInput>,
    step_devices: Vec<DeviceId>,
    dynamic_devices: Vec<DeviceId>,
    device: DeviceId,
    q_sync: TermId,
    last_step: SimTime,
    stats: SolverStats,
    engine: Engine,
    cur_v: Vec<f64>,
    new_v: Vec<f64>,
}

impl MatrixSolver {
    /// Build the solver of group `index` on the solver device `device`,
    /// whose `Q_sync` output is `q_sync`.
    pub(crate) fn new(
        nl: &mut Netlist,
        index: usize,
        device: DeviceId,
        q_sync: TermId,
        nets: Vec<NetId>,
        params: SolverParams,
    ) -> Result<Self> {
        let method = Method::select(nets.len(), &params)?;
        let (capacity, exact) = storage_capacity(nets.len())?;
        let name = nl.device(device).name().to_string();
        if !exact {
            warn!(
                solver = %name,
                size = nets.len(),
                capacity,
                "no specific solver for this group size"
            );
        }

        let mut solver = Self {
            name,
            method,
            capacity,
            params,
            rows: vec![Terms::default(); nets.len()],
            nets,
            inputs: Vec::new(),
            step_devices: Vec::new(),
            dynamic_devices: Vec::new(),
            device,
            q_sync,
            last_step: SimTime::zero(),
            stats: SolverStats::default(),
            engine: Engine::Direct1,
            cur_v: Vec::new(),
            new_v: Vec::new(),
        };
        solver.setup_base(nl, index)?;
        solver.setup_matrix(nl);
        solver.engine = Engine::new(method, &solver.rows, capacity, solver.params.pivot);
        solver.cur_v = vec![0.0; solver.nets.len()];
        solver.new_v = vec![0.0; solver.nets.len()];

        info!(
            solver = %solver.name,
            method = method.name(),
            nets = solver.nets.len(),
            dynamic = solver.dynamic_devices.len(),
            timestep = solver.step_devices.len(),
            "solver group"
        );
        Ok(solver)
    }

    fn group_index(&self, n: NetId) -> Option<usize> {
        self.nets.iter().position(|&x| x == n)
    }

    /// Collect the terminals of every net and move inputs onto proxy outputs.
    fn setup_base(&mut self, nl: &mut Netlist, index: usize) -> Result<()> {
        let mut rails: Vec<Terms> = vec![Terms::default(); self.nets.len()];

        for k in 0..self.nets.len() {
            let net = self.nets[k];
            nl.nets[net.0].solver = Some(index);
            debug!(solver = %self.name, net = nl.net(net).name(), "setting up net");

            for t in nl.net(net).core_terms().to_vec() {
                match nl.terminal(t).kind() {
                    TermKind::Terminal => {
                        let dev = nl.terminal(t).device();
                        if nl.device(dev).is_timestep() && !self.step_devices.contains(&dev) {
                            self.step_devices.push(dev);
                        }
                        if nl.device(dev).is_dynamic() && !self.dynamic_devices.contains(&dev) {
                            self.dynamic_devices.push(dev);
                        }
                        let missing = || NetlistError::MissingOtherNet {
                            terminal: nl.terminal(t).name().to_string(),
                        };
                        let other = nl.terminal(t).other().ok_or_else(missing)?;
                        let other_net = nl.terminal(other).net().ok_or_else(missing)?;
                        if nl.net(other_net).is_rail() {
                            rails[k].add(t, other_net, None, false);
                        } else {
                            let j = self.group_index(other_net).ok_or_else(missing)?;
                            self.rows[k].add(t, other_net, Some(j), true);
                        }
                    }
                    TermKind::Input(_) => {
                        let out = match self.inputs.iter().find(|p| p.net == net) {
                            Some(p) => p.out,
                            None => {
                                let pin = format!("m{}", self.inputs.len());
                                let out = nl.add_terminal(self.device, &pin, TermKind::Output(Domain::Analog))?;
                                self.inputs.push(ProxiedInput { out, net });
                                out
                            }
                        };
                        let Some(out_net) = nl.output_net(out) else {
                            continue;
                        };
                        nl.remove_terminal_from_net(net, t)?;
                        nl.add_terminal_to_net(out_net, t)?;
                        nl.rebuild_list(out_net);
                        debug!(solver = %self.name, input = nl.terminal(t).name(), "added input");
                    }
                    TermKind::Output(_) => {
                        return Err(NetlistError::UnhandledSolverTerminal {
                            terminal: nl.terminal(t).name().to_string(),
                            net: nl.net(net).name().to_string(),
                        });
                    }
                }
            }
        }

        for (row, r) in self.rows.iter_mut().zip(rails) {
            row.append_rails(r);
        }
        Ok(())
    }

    /// Order the rows for the method and compute the elimination pattern.
    fn setup_matrix(&mut self, nl: &Netlist) {
        let n = self.nets.len();
        let descending = self.method.sort_type() == SortType::Descending;
        for k in 0..n {
            for i in k + 1..n {
                let (rk, ri) = (self.rows[k].railstart, self.rows[i].railstart);
                let swap = if descending { rk < ri } else { rk > ri };
                if swap {
                    self.rows.swap(k, i);
                    self.nets.swap(k, i);
                }
            }
        }
        for row in &mut self.rows {
            for i in 0..row.railstart {
                row.net_other[i] = self.nets.iter().position(|&x| x == row.other_net[i]);
            }
        }
        compute_structure(&mut self.rows);

        for (k, row) in self.rows.iter().enumerate() {
            debug!(
                solver = %self.name,
                net = nl.net(self.nets[k]).name(),
                nz = ?row.nz,
                nzrd = ?row.nzrd,
                nzbd = ?row.nzbd,
                "matrix row"
            );
        }
    }

    // ============ Accessors ============

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn nets(&self) -> &[NetId] {
        &self.nets
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub(crate) fn q_sync(&self) -> TermId {
        self.q_sync
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn has_dynamic_devices(&self) -> bool {
        !self.dynamic_devices.is_empty()
    }

    pub fn has_timestep_devices(&self) -> bool {
        !self.step_devices.is_empty()
    }

    pub fn info(&self, nl: &Netlist) -> SolverGroupInfo {
        SolverGroupInfo {
            name: self.name.clone(),
            method: self.method.name(),
            capacity: self.capacity,
            nets: self.nets.iter().map(|&n| nl.net(n).name().to_string()).collect(),
            dynamic_devices: self.dynamic_devices.len(),
            timestep_devices: self.step_devices.len(),
            stats: self.stats,
        }
    }

    // ============ Solving ============

    /// Start a timestep. Returns the elapsed time in seconds, or `None` if
    /// the group was already solved within the current quantum.
    pub(crate) fn begin(&mut self, nl: &mut Netlist) -> Option<f64> {
        let now = nl.time();
        let delta = now - self.last_step;
        if delta < SimTime::quantum() {
            return None;
        }
        self.last_step = now;
        let dt = delta.as_double();
        for &d in &self.step_devices {
            nl.step_device(d, dt);
        }
        self.stats.vsolver_calls += 1;
        Some(dt)
    }

    /// Copy stamps and voltages from the netlist.
    pub(crate) fn load(&mut self, nl: &Netlist) {
        for (k, row) in self.rows.iter_mut().enumerate() {
            for i in 0..row.count() {
                let t = &nl.terms[row.terms[i].0];
                row.gt[i] = t.gt;
                row.go[i] = t.go;
                row.idr[i] = t.idr;
            }
            for i in row.railstart..row.count() {
                row.other_v[i] = nl.nets[row.other_net[i].0].cur_analog;
            }
            self.cur_v[k] = nl.nets[self.nets[k].0].cur_analog;
        }
    }

    /// Solve the loaded system. Touches nothing but the solver itself.
    pub(crate) fn compute(&mut self) {
        self.stats.calculations += 1;
        self.new_v.copy_from_slice(&self.cur_v);
        self.engine
            .solve(&self.rows, &mut self.new_v, &self.params, &mut self.stats);
    }

    /// Write the new voltages back. With `newton`, returns 2 if the largest
    /// change exceeds the accuracy and 1 otherwise.
    pub(crate) fn store(&mut self, nl: &mut Netlist, newton: bool) -> u32 {
        let mut err: f64 = 0.0;
        for (k, &n) in self.nets.iter().enumerate() {
            err = err.max((self.new_v[k] - self.cur_v[k]).abs());
            nl.nets[n.0].cur_analog = self.new_v[k];
        }
        if newton && err > self.params.accuracy {
            2
        } else {
            1
        }
    }

    fn vsolve(&mut self, nl: &mut Netlist, newton: bool) -> u32 {
        self.load(nl);
        self.compute();
        self.store(nl, newton)
    }

    /// Solve at the current operating point, iterating over the dynamic
    /// devices until the voltages settle.
    fn solve_base(&mut self, nl: &mut Netlist) {
        if self.dynamic_devices.is_empty() {
            self.vsolve(nl, false);
            return;
        }

        let mut loops = 0;
        let mut resched;
        loop {
            for &d in &self.dynamic_devices {
                nl.update_device_terminals(d);
            }
            resched = self.vsolve(nl, true);
            loops += 1;
            if resched <= 1 || loops >= self.params.nr_loops {
                break;
            }
        }
        self.stats.newton_loops += loops as u64;

        if resched > 1 {
            if let Some(sync) = nl.output_net(self.q_sync) {
                if !nl.net(sync).is_queued() {
                    warn!(solver = %self.name, loops, "NEWTON_LOOPS exceeded, rescheduling");
                    nl.toggle_and_push_to_queue(sync, self.params.sync_delay);
                }
            }
        }
    }

    /// Finish a timestep: update the timestep estimate and the inputs.
    pub(crate) fn finish(&mut self, nl: &mut Netlist, dt: f64) -> SimTime {
        let next = self.compute_next_timestep(dt);
        self.update_inputs(nl);
        next
    }

    /// Solve for the current time. Returns the suggested next timestep, or
    /// zero if nothing was done.
    pub fn solve(&mut self, nl: &mut Netlist) -> SimTime {
        let Some(dt) = self.begin(nl) else {
            return SimTime::zero();
        };
        self.solve_base(nl);
        self.finish(nl, dt)
    }

    fn compute_next_timestep(&mut self, cur_ts: f64) -> SimTime {
        let p = &self.params;
        let mut new_ts = p.max_timestep;
        if p.dynamic {
            for (k, row) in self.rows.iter_mut().enumerate() {
                let v = self.new_v[k];
                let h = &mut row.history;
                let dd_n = v - h.last_v;
                let hn = cur_ts;
                let dd2 = (dd_n / hn - h.dd_n_m_1 / h.h_n_m_1) / (hn + h.h_n_m_1);
                h.h_n_m_1 = hn;
                h.dd_n_m_1 = dd_n;
                let net_ts = if dd2.abs() > 1e-60 {
                    (p.lte / (0.5 * dd2).abs()).sqrt()
                } else {
                    p.max_timestep
                };
                new_ts = new_ts.min(net_ts);
                h.last_v = v;
            }
            new_ts = new_ts.max(p.min_timestep);
        }
        SimTime::from_double(new_ts).max(SimTime::quantum() * 2)
    }

    /// Mirror the group voltages to the proxied inputs.
    pub(crate) fn update_inputs(&self, nl: &mut Netlist) {
        for p in &self.inputs {
            let v = nl.net(p.net).q_analog();
            nl.set_analog(p.out, v);
        }
    }

    /// Regular update from the group's sync input.
    pub(crate) fn update(&mut self, nl: &mut Netlist) {
        let new_ts = self.solve(nl);
        if self.params.dynamic && self.has_timestep_devices() && new_ts > SimTime::zero() {
            if let Some(sync) = nl.output_net(self.q_sync) {
                nl.force_queue_execution(sync);
                nl.reschedule_in_queue(sync, new_ts);
            }
        }
    }

    /// Update requested by a device that changed its stamps.
    pub(crate) fn update_forced(&mut self, nl: &mut Netlist) {
        self.solve(nl);
        if self.params.dynamic && self.has_timestep_devices() {
            if let Some(sync) = nl.output_net(self.q_sync) {
                nl.force_queue_execution(sync);
                nl.reschedule_in_queue(sync, SimTime::from_double(self.params.min_timestep));
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last_step = SimTime::zero();
        for row in &mut self.rows {
            row.history = History::default();
        }
        self.engine.invalidate();
    }

    pub(crate) fn log_stats(&self, nl: &Netlist) {
        if !self.params.log_stats {
            return;
        }
        let first = self.nets.first().map(|&n| nl.net(n).name()).unwrap_or("");
        info!(
            solver = %self.name,
            method = self.method.name(),
            nets = self.nets.len(),
            first_net = first,
            has_dynamic = self.has_dynamic_devices(),
            has_timestep = self.has_timestep_devices(),
            calculations = self.stats.calculations,
            vsolver_calls = self.stats.vsolver_calls,
            newton_loops = self.stats.newton_loops,
            iterative_total = self.stats.iterative_total,
            iterative_fail = self.stats.iterative_fail,
            "solver statistics"
        );
    }

    // ============ State ============

    pub fn save_state(&self) -> SolverState {
        SolverState {
            name: self.name.clone(),
            last_step: self.last_step,
            history: self.rows.iter().map(|r| r.history).collect(),
            stats: self.stats,
        }
    }

    /// Check that `state` was saved from a group of the same shape.
    pub fn check_state(&self, state: &SolverState) -> Result<()> {
        if state.name != self.name || state.history.len() != self.rows.len() {
            return Err(NetlistError::state(format!(
                "solver '{}' with {} nets does not match saved '{}' with {}",
                self.name,
                self.rows.len(),
                state.name,
                state.history.len()
            )));
        }
        Ok(())
    }

    pub fn load_state(&mut self, state: &SolverState) -> Result<()> {
        self.check_state(state)?;
        self.last_step = state.last_step;
        for (row, h) in self.rows.iter_mut().zip(&state.history) {
            row.history = *h;
        }
        self.stats = state.stats;
        self.engine.invalidate();
        Ok(())
    }
}

/// Compute the non-zero patterns of a group's rows.
///
/// `nz` holds the in-group columns of the row plus the diagonal. `nzrd`
/// holds the columns right of the diagonal that can be non-zero during
/// elimination: the row's own plus those inherited from the row above.
/// `nzbd` lists the rows below the diagonal that elimination of the column
/// touches, fill-in included.
pub(crate) fn compute_structure(rows: &mut [Terms]) {
    let n = rows.len();
    for (k, row) in rows.iter_mut().enumerate() {
        let mut nz: Vec<usize> = Vec::new();
        for i in 0..row.railstart {
            if let Some(j) = row.net_other[i] {
                if !nz.contains(&j) {
                    nz.push(j);
                }
            }
        }
        if !nz.contains(&k) {
            nz.push(k);
        }
        nz.sort_unstable();
        row.nz = nz;
    }

    for k in 0..n {
        let mut nzrd: Vec<usize> = if k == 0 {
            Vec::new()
        } else {
            rows[k - 1].nzrd.iter().copied().filter(|&j| j > k).collect()
        };
        let row = &rows[k];
        for i in 0..row.railstart {
            if let Some(j) = row.net_other[i] {
                if j > k && !nzrd.contains(&j) {
                    nzrd.push(j);
                }
            }
        }
        nzrd.sort_unstable();
        rows[k].nzrd = nzrd;
    }

    let mut touched = vec![vec![false; n]; n];
    for (k, row) in rows.iter().enumerate() {
        for &j in &row.nz {
            touched[k][j] = true;
        }
    }
    for k in 0..n {
        let mut nzbd = Vec::new();
        for r in k + 1..n {
            if touched[r][k] {
                nzbd.push(r);
                for c in k + 1..n {
                    if touched[k][c] {
                        touched[r][c] = true;
                    }
                }
            }
        }
        rows[k].nzbd = nzbd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::direct::tests::ladder;

    #[test]
    fn test_select_method() {
        let p = SolverParams::default();
        assert_eq!(Method::select(1, &p).unwrap(), Method::Direct1);
        assert_eq!(Method::select(2, &p).unwrap(), Method::Direct2);
        assert_eq!(Method::select(5, &p).unwrap(), Method::Direct);
        assert_eq!(Method::select(6, &p).unwrap(), Method::Sor);

        let p = SolverParams {
            iterative: "GMRES".to_string(),
            gs_threshold: 2,
            ..SolverParams::default()
        };
        // closed form always wins for two nets
        assert_eq!(Method::select(2, &p).unwrap(), Method::Direct2);
        assert_eq!(Method::select(3, &p).unwrap(), Method::Gmres);

        let p = SolverParams {
            use_specific: false,
            ..p
        };
        assert_eq!(Method::select(2, &p).unwrap(), Method::Gmres);

        let p = SolverParams {
            iterative: "CG".to_string(),
            ..SolverParams::default()
        };
        assert!(matches!(
            Method::select(10, &p),
            Err(NetlistError::UnknownSolver { .. })
        ));
    }

    #[test]
    fn test_structure_of_ladder() {
        let rows = ladder(4);
        assert_eq!(rows[0].nz, vec![0, 1]);
        assert_eq!(rows[1].nz, vec![0, 1, 2]);
        assert_eq!(rows[0].nzrd, vec![1]);
        assert_eq!(rows[1].nzrd, vec![2]);
        assert_eq!(rows[3].nzrd, Vec::<usize>::new());
        assert_eq!(rows[0].nzbd, vec![1]);
        assert_eq!(rows[2].nzbd, vec![3]);
    }

    #[test]
    fn test_structure_fill_in() {
        // star: net 0 connects to 1, 2, 3; eliminating 0 couples the rest
        let mut rows: Vec<Terms> = (0..4).map(|_| Terms::default()).collect();
        for j in 1..4 {
            rows[0].add(TermId(j), NetId(j), Some(j), true);
            rows[j].add(TermId(10 + j), NetId(0), Some(0), true);
        }
        for row in &mut rows {
            row.append_rails(Terms::default());
        }
        compute_structure(&mut rows);
        assert_eq!(rows[0].nzbd, vec![1, 2, 3]);
        assert_eq!(rows[1].nzbd, vec![2, 3]);
        assert_eq!(rows[1].nzrd, vec![2, 3]);
        assert_eq!(rows[2].nzrd, vec![3]);
    }
}
