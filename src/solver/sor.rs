//! Successive over-relaxation.
//!
//! Both variants start from the current voltages and fall back to
//! elimination when the iteration budget runs out.

use super::direct::Direct;
use super::matrix::{build_rhs, DenseMatrix};
use super::terms::Terms;
use super::{SolverParams, SolverStats};

/// Gauss-Seidel with over-relaxation, iterating directly on the stamps.
#[derive(Debug, Clone)]
pub struct Sor {
    direct: Direct,
    w: Vec<f64>,
    one_m_w: Vec<f64>,
    rhs: Vec<f64>,
}

impl Sor {
    pub fn new(n: usize, capacity: usize, pivot: bool) -> Self {
        Self {
            direct: Direct::new(n, capacity, pivot),
            w: vec![0.0; n],
            one_m_w: vec![0.0; n],
            rhs: vec![0.0; n],
        }
    }

    pub fn solve(&mut self, rows: &[Terms], v: &mut [f64], params: &SolverParams, stats: &mut SolverStats) {
        let ws = params.sor;
        for (k, row) in rows.iter().enumerate() {
            let gtot = row.gtot();
            let gabs = 0.5 * row.go.iter().map(|g| g.abs()).sum::<f64>();
            self.rhs[k] = row.rhs();
            if gabs <= gtot {
                self.w[k] = ws / gtot;
                self.one_m_w[k] = 1.0 - ws;
            } else {
                self.w[k] = 1.0 / (gtot + gabs);
                self.one_m_w[k] = 1.0 - gtot / (gtot + gabs);
            }
        }

        let mut loops = 0;
        let mut resched;
        loop {
            let mut err: f64 = 0.0;
            for (k, row) in rows.iter().enumerate() {
                let idrive: f64 = (0..row.railstart)
                    .filter_map(|i| row.net_other[i].map(|j| row.go[i] * v[j]))
                    .sum();
                let new_val = v[k] * self.one_m_w[k] + (idrive + self.rhs[k]) * self.w[k];
                err = err.max((new_val - v[k]).abs());
                v[k] = new_val;
            }
            resched = err > params.accuracy;
            loops += 1;
            if !resched || loops >= params.gs_loops {
                break;
            }
        }

        stats.iterative_total += loops as u64;
        if resched {
            stats.iterative_fail += 1;
            self.direct.solve(rows, v);
        }
    }
}

/// SOR on the assembled matrix.
#[derive(Debug, Clone)]
pub struct SorMat {
    direct: Direct,
    a: DenseMatrix,
    rhs: Vec<f64>,
}

impl SorMat {
    pub fn new(n: usize, capacity: usize, pivot: bool) -> Self {
        Self {
            direct: Direct::new(n, capacity, pivot),
            a: DenseMatrix::new(n, capacity),
            rhs: vec![0.0; n],
        }
    }

    pub fn solve(&mut self, rows: &[Terms], v: &mut [f64], params: &SolverParams, stats: &mut SolverStats) {
        self.a.build(rows);
        build_rhs(rows, &mut self.rhs);

        let mut loops = 0;
        let mut resched;
        loop {
            let mut err: f64 = 0.0;
            for (k, row) in rows.iter().enumerate() {
                let idrive: f64 = row.nz.iter().map(|&p| self.a.get(k, p) * v[p]).sum();
                let delta = params.sor * (self.rhs[k] - idrive) / self.a.get(k, k);
                err = err.max(delta.abs());
                v[k] += delta;
            }
            resched = err > params.accuracy;
            loops += 1;
            if !resched || loops >= params.gs_loops {
                break;
            }
        }

        stats.iterative_total += loops as u64;
        if resched {
            stats.iterative_fail += 1;
            self.direct.solve(rows, v);
        }
    }
}
