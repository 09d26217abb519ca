//! Restarted GMRES with an incomplete LU preconditioner.
//!
//! The matrix is kept in compressed row format on the group's own
//! non-zero pattern. ILU(0) on that pattern is used as a left
//! preconditioner; the Krylov basis is orthogonalized with modified
//! Gram-Schmidt and the Hessenberg matrix reduced with Givens rotations.

use super::direct::Direct;
use super::matrix::{axpy, dot, norm, CrMatrix};
use super::terms::Terms;
use super::{SolverParams, SolverStats};

#[derive(Debug, Clone)]
pub struct Gmres {
    mat: CrMatrix,
    term_cr: Vec<Vec<Option<usize>>>,
    a: Vec<f64>,
    lu: Vec<f64>,
    rhs: Vec<f64>,
    residual: Vec<f64>,
    ax: Vec<f64>,
    /// Krylov dimension before restart
    mr: usize,
    ht: Vec<Vec<f64>>,
    s: Vec<f64>,
    c: Vec<f64>,
    g: Vec<f64>,
    y: Vec<f64>,
    v: Vec<Vec<f64>>,
    direct: Direct,
}

/// Apply a Givens rotation to (g0, g1).
#[inline]
fn givens_mult(c: f64, s: f64, g0: &mut f64, g1: &mut f64) {
    let t0 = c * *g0 - s * *g1;
    let t1 = s * *g0 + c * *g1;
    *g0 = t0;
    *g1 = t1;
}

impl Gmres {
    pub fn new(rows: &[Terms], capacity: usize, pivot: bool) -> Self {
        let n = rows.len();
        let pattern: Vec<Vec<usize>> = rows.iter().map(|r| r.nz.clone()).collect();
        let mat = CrMatrix::from_pattern(&pattern);
        let term_cr = mat.term_offsets(rows);
        let nz = mat.nz_num();
        let mr = if n > 3 {
            ((n as f64).sqrt() * 2.0) as usize
        } else {
            n
        };
        Self {
            mat,
            term_cr,
            a: vec![0.0; nz],
            lu: vec![0.0; nz],
            rhs: vec![0.0; n],
            residual: vec![0.0; n],
            ax: vec![0.0; n],
            mr,
            ht: vec![vec![0.0; mr]; mr + 1],
            s: vec![0.0; mr + 1],
            c: vec![0.0; mr + 1],
            g: vec![0.0; mr + 1],
            y: vec![0.0; mr + 1],
            v: vec![vec![0.0; n]; mr + 1],
            direct: Direct::new(n, capacity, pivot),
        }
    }

    #[cfg(test)]
    fn restart_size(&self) -> usize {
        self.mr
    }

    pub fn solve(&mut self, rows: &[Terms], v: &mut [f64], params: &SolverParams, stats: &mut SolverStats) {
        let n = rows.len();
        self.mat.assemble(rows, &self.term_cr, &mut self.a);
        for (k, row) in rows.iter().enumerate() {
            self.rhs[k] = row.rhs();
        }

        let restarts = params.gs_loops.max(1);
        let mut x = v[..n].to_vec();
        let used = self.solve_ilu_gmres(&mut x, restarts, params.accuracy);
        stats.iterative_total += used as u64;

        if used >= self.mr * restarts {
            stats.iterative_fail += 1;
            self.direct.solve(rows, v);
        } else {
            v[..n].copy_from_slice(&x);
        }
    }

    /// Returns the number of iterations used.
    fn solve_ilu_gmres(&mut self, x: &mut [f64], restarts: usize, accuracy: f64) -> usize {
        let n = x.len();
        let mr = self.mr;
        let itr_max = mr * restarts;
        let rho_delta = accuracy * (n as f64).sqrt();
        let mut itr_used = 0;

        self.mat.incomplete_lu(&self.a, &mut self.lu);

        while itr_used < itr_max {
            let mut last_k = mr;

            self.mat.mult_vec(&self.a, x, &mut self.ax);
            for i in 0..n {
                self.residual[i] = self.rhs[i] - self.ax[i];
            }
            self.mat.solve_lu(&self.lu, &mut self.residual);

            let mut rho = norm(&self.residual);
            if rho < rho_delta || rho == 0.0 {
                return itr_used + 1;
            }

            self.g.iter_mut().for_each(|g| *g = 0.0);
            self.g[0] = rho;
            for i in 0..n {
                self.v[0][i] = self.residual[i] / rho;
            }

            for k in 0..mr {
                let kp1 = k + 1;
                {
                    let (head, tail) = self.v.split_at_mut(kp1);
                    let next = &mut tail[0];
                    self.mat.mult_vec(&self.a, &head[k], next);
                    self.mat.solve_lu(&self.lu, next);
                    for (j, vj) in head.iter().enumerate() {
                        let h = dot(next, vj);
                        self.ht[j][k] = h;
                        axpy(-h, vj, next);
                    }
                    let hn = norm(next);
                    self.ht[kp1][k] = hn;
                    if hn != 0.0 {
                        next.iter_mut().for_each(|e| *e /= hn);
                    }
                }

                for j in 0..k {
                    let (c, s) = (self.c[j], self.s[j]);
                    let (upper, lower) = self.ht.split_at_mut(j + 1);
                    givens_mult(c, s, &mut upper[j][k], &mut lower[0][k]);
                }

                let hyp = self.ht[k][k].hypot(self.ht[kp1][k]);
                if hyp == 0.0 {
                    last_k = k;
                    break;
                }
                let mu = 1.0 / hyp;
                self.c[k] = self.ht[k][k] * mu;
                self.s[k] = -self.ht[kp1][k] * mu;
                self.ht[k][k] = self.c[k] * self.ht[k][k] - self.s[k] * self.ht[kp1][k];
                self.ht[kp1][k] = 0.0;

                let (gk, gk1) = self.g.split_at_mut(kp1);
                givens_mult(self.c[k], self.s[k], &mut gk[k], &mut gk1[0]);

                rho = self.g[kp1].abs();
                itr_used += 1;

                if rho <= rho_delta {
                    last_k = k;
                    break;
                }
            }

            if last_k >= mr {
                last_k = mr - 1;
            }

            for i in (0..=last_k).rev() {
                let tmp: f64 = (i + 1..=last_k).map(|j| self.ht[i][j] * self.y[j]).sum();
                self.y[i] = if self.ht[i][i] != 0.0 {
                    (self.g[i] - tmp) / self.ht[i][i]
                } else {
                    0.0
                };
            }
            for i in 0..=last_k {
                axpy(self.y[i], &self.v[i], x);
            }

            if rho <= rho_delta {
                break;
            }
        }
        itr_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::direct::tests::{ladder, ladder_expected};
    use approx::assert_relative_eq;

    #[test]
    fn test_restart_size() {
        assert_eq!(Gmres::new(&ladder(3), 3, false).restart_size(), 3);
        assert_eq!(Gmres::new(&ladder(16), 16, false).restart_size(), 8);
    }

    #[test]
    fn test_ladder_converges() {
        let rows = ladder(12);
        let mut s = Gmres::new(&rows, 12, false);
        let params = SolverParams {
            accuracy: 1e-10,
            ..SolverParams::default()
        };
        let mut stats = SolverStats::default();
        let mut v = vec![0.0; 12];
        s.solve(&rows, &mut v, &params, &mut stats);
        // tridiagonal: ILU(0) is exact, one iteration suffices
        assert_eq!(stats.iterative_fail, 0);
        assert!(stats.iterative_total <= 2);
        for (got, want) in v.iter().zip(ladder_expected(12)) {
            assert_relative_eq!(*got, want, epsilon = 1e-8);
        }
    }
}
