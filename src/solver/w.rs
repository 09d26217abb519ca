//! Inverse-matrix solver with Woodbury corrections.
//!
//! Keeps the inverse of a base matrix. Rows that differ from the base are
//! collected into a low-rank correction `A = A0 + U V` and applied with the
//! Woodbury identity, leaving the base inverse untouched. The base is
//! re-inverted periodically so the correction rank stays small.

use super::direct::Direct;
use super::matrix::{build_rhs, DenseMatrix};
use super::sm::REFRESH;
use super::terms::Terms;

#[derive(Debug, Clone)]
pub struct Woodbury {
    a: DenseMatrix,
    base: DenseMatrix,
    ainv: DenseMatrix,
    rhs: Vec<f64>,
    x0: Vec<f64>,
    /// Changed rows and their (column, delta) entries
    changes: Vec<(usize, Vec<(usize, f64)>)>,
    cnt: u32,
    valid: bool,
    direct: Direct,
}

impl Woodbury {
    pub fn new(n: usize, capacity: usize, pivot: bool) -> Self {
        Self {
            a: DenseMatrix::new(n, capacity),
            base: DenseMatrix::new(n, capacity),
            ainv: DenseMatrix::new(n, capacity),
            rhs: vec![0.0; n],
            x0: vec![0.0; n],
            changes: Vec::new(),
            cnt: 0,
            valid: false,
            direct: Direct::new(n, capacity, pivot),
        }
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    fn refresh(&mut self) -> bool {
        self.valid = self.a.invert_into(&mut self.ainv);
        if self.valid {
            self.base.copy_from(&self.a);
        }
        self.valid
    }

    pub fn solve(&mut self, rows: &[Terms], v: &mut [f64]) {
        let n = rows.len();
        self.a.build(rows);
        build_rhs(rows, &mut self.rhs);

        let refresh = !self.valid || self.cnt % REFRESH == 0;
        self.cnt = self.cnt.wrapping_add(1);
        if refresh && !self.refresh() {
            self.direct.solve(rows, v);
            return;
        }

        self.ainv.mult_vec(&self.rhs, &mut self.x0);
        if !refresh {
            self.collect_changes(rows);
            if !self.changes.is_empty() && !self.correct() {
                // singular correction: start over from the current matrix
                if !self.refresh() {
                    self.direct.solve(rows, v);
                    return;
                }
                self.ainv.mult_vec(&self.rhs, &mut self.x0);
            }
        }
        v[..n].copy_from_slice(&self.x0);
    }

    fn collect_changes(&mut self, rows: &[Terms]) {
        self.changes.clear();
        for (r, row) in rows.iter().enumerate() {
            let delta: Vec<(usize, f64)> = row
                .nz
                .iter()
                .map(|&c| (c, self.a.get(r, c) - self.base.get(r, c)))
                .filter(|&(_, d)| d != 0.0)
                .collect();
            if !delta.is_empty() {
                self.changes.push((r, delta));
            }
        }
    }

    /// x = x0 - Ainv U (I + V Ainv U)^-1 V x0
    fn correct(&mut self) -> bool {
        let n = self.x0.len();
        let k = self.changes.len();
        let mut h = DenseMatrix::new(k, k);
        let mut y = vec![0.0; k];
        for (i, (_, vi)) in self.changes.iter().enumerate() {
            for (j, &(rj, _)) in self.changes.iter().enumerate() {
                let s: f64 = vi.iter().map(|&(c, d)| d * self.ainv.get(c, rj)).sum();
                h.set(i, j, s + if i == j { 1.0 } else { 0.0 });
            }
            y[i] = vi.iter().map(|&(c, d)| d * self.x0[c]).sum();
        }
        if !h.solve_in_place(&mut y) {
            return false;
        }
        for (j, &(rj, _)) in self.changes.iter().enumerate() {
            for m in 0..n {
                self.x0[m] -= self.ainv.get(m, rj) * y[j];
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::direct::tests::ladder;
    use approx::assert_relative_eq;

    #[test]
    fn test_correction_matches_direct() {
        let mut rows = ladder(6);
        let mut s = Woodbury::new(6, 6, false);
        let mut v = vec![0.0; 6];
        s.solve(&rows, &mut v);

        rows[1].go[1] = 0.5;
        rows[1].gt[1] = 0.5;
        rows[4].gt[0] = 3.0;
        s.solve(&rows, &mut v);

        let mut d = Direct::new(6, 6, true);
        let mut want = vec![0.0; 6];
        d.solve(&rows, &mut want);
        for (got, want) in v.iter().zip(want) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
    }
}
