//! Inverse-matrix solver with Sherman-Morrison row updates.
//!
//! The inverse is rebuilt from scratch every [`REFRESH`] solves. In between,
//! every row whose conductances changed is folded in as a rank-one update
//! of the inverse, which is cheaper than a new factorization when only a
//! few devices re-stamp.

use super::direct::Direct;
use super::matrix::{build_rhs, DenseMatrix};
use super::terms::Terms;

/// Solves between full inversions.
pub const REFRESH: u32 = 50;

#[derive(Debug, Clone)]
pub struct ShermanMorrison {
    a: DenseMatrix,
    /// Matrix the inverse belongs to
    la: DenseMatrix,
    ainv: DenseMatrix,
    rhs: Vec<f64>,
    w: Vec<f64>,
    z: Vec<f64>,
    delta: Vec<(usize, f64)>,
    cnt: u32,
    valid: bool,
    direct: Direct,
}

impl ShermanMorrison {
    pub fn new(n: usize, capacity: usize, pivot: bool) -> Self {
        Self {
            a: DenseMatrix::new(n, capacity),
            la: DenseMatrix::new(n, capacity),
            ainv: DenseMatrix::new(n, capacity),
            rhs: vec![0.0; n],
            w: vec![0.0; n],
            z: vec![0.0; n],
            delta: Vec::with_capacity(n),
            cnt: 0,
            valid: false,
            direct: Direct::new(n, capacity, pivot),
        }
    }

    /// Force a full inversion on the next solve.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    fn refresh(&mut self) -> bool {
        self.valid = self.a.invert_into(&mut self.ainv);
        if self.valid {
            self.la.copy_from(&self.a);
        }
        self.valid
    }

    pub fn solve(&mut self, rows: &[Terms], v: &mut [f64]) {
        let n = rows.len();
        self.a.build(rows);
        build_rhs(rows, &mut self.rhs);

        let ok = if !self.valid || self.cnt % REFRESH == 0 {
            self.refresh()
        } else {
            self.update_rows(rows)
        };
        self.cnt = self.cnt.wrapping_add(1);
        if !ok {
            self.valid = false;
            self.direct.solve(rows, v);
            return;
        }
        self.ainv.mult_vec(&self.rhs, &mut v[..n]);
    }

    fn update_rows(&mut self, rows: &[Terms]) -> bool {
        let n = rows.len();
        for (r, row) in rows.iter().enumerate() {
            self.delta.clear();
            for &c in &row.nz {
                let d = self.a.get(r, c) - self.la.get(r, c);
                if d != 0.0 {
                    self.delta.push((c, d));
                }
            }
            if self.delta.is_empty() {
                continue;
            }
            for i in 0..n {
                self.z[i] = self.delta.iter().map(|&(c, d)| d * self.ainv.get(c, i)).sum();
                self.w[i] = self.ainv.get(i, r);
            }
            let lambda = 1.0 + self.z[r];
            if lambda == 0.0 {
                return self.refresh();
            }
            for i in 0..n {
                let f = self.w[i] / lambda;
                if f != 0.0 {
                    for j in 0..n {
                        self.ainv.add(i, j, -f * self.z[j]);
                    }
                }
            }
            for &(c, _) in &self.delta {
                let x = self.a.get(r, c);
                self.la.set(r, c, x);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::direct::tests::{ladder, ladder_expected};
    use approx::assert_relative_eq;

    #[test]
    fn test_rank_one_updates_track_changes() {
        let mut rows = ladder(5);
        let mut s = ShermanMorrison::new(5, 5, false);
        let mut v = vec![0.0; 5];
        s.solve(&rows, &mut v);
        for (got, want) in v.iter().zip(ladder_expected(5)) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }

        // change the conductances on net 2, both sides
        rows[2].go[0] = 2.0;
        rows[2].gt[0] = 2.0;
        s.solve(&rows, &mut v);

        let mut d = Direct::new(5, 5, true);
        let mut want = vec![0.0; 5];
        d.solve(&rows, &mut want);
        for (got, want) in v.iter().zip(want) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
    }
}
