//! Gaussian elimination: closed form for one and two nets, dense for the rest.

use super::matrix::{build_rhs, DenseMatrix};
use super::terms::Terms;

/// Single net: V = RHS / G.
pub fn solve1(rows: &[Terms], v: &mut [f64]) {
    let row = &rows[0];
    v[0] = row.rhs() / row.gtot();
}

/// Two nets, Cramer's rule.
pub fn solve2(rows: &[Terms], v: &mut [f64]) {
    let mut m = DenseMatrix::new(2, 2);
    m.build(rows);
    let (a, b, c, d) = (m.get(0, 0), m.get(0, 1), m.get(1, 0), m.get(1, 1));
    let r0 = rows[0].rhs();
    let r1 = rows[1].rhs();
    let v1 = (a * r1 - c * r0) / (a * d - b * c);
    v[1] = v1;
    v[0] = (r0 - b * v1) / a;
}

/// Dense elimination sized for a capacity class.
#[derive(Debug, Clone)]
pub struct Direct {
    a: DenseMatrix,
    rhs: Vec<f64>,
    pivot: bool,
}

impl Direct {
    pub fn new(n: usize, capacity: usize, pivot: bool) -> Self {
        Self {
            a: DenseMatrix::new(n, capacity),
            rhs: vec![0.0; n],
            pivot,
        }
    }

    pub fn solve(&mut self, rows: &[Terms], v: &mut [f64]) {
        self.a.build(rows);
        build_rhs(rows, &mut self.rhs);
        if self.pivot {
            self.eliminate_pivot();
            self.back_substitute_dense(v);
        } else {
            self.eliminate_sparse(rows);
            self.back_substitute_sparse(rows, v);
        }
    }

    /// Forward elimination restricted to the precomputed fill-in pattern.
    fn eliminate_sparse(&mut self, rows: &[Terms]) {
        let a = &mut self.a;
        for i in 0..a.n() {
            let f = 1.0 / a.get(i, i);
            for &j in &rows[i].nzbd {
                let f1 = -f * a.get(j, i);
                for &k in &rows[i].nzrd {
                    let aik = a.get(i, k);
                    a.add(j, k, aik * f1);
                }
                self.rhs[j] += self.rhs[i] * f1;
            }
        }
    }

    fn eliminate_pivot(&mut self) {
        let n = self.a.n();
        let a = &mut self.a;
        for i in 0..n {
            let mut maxrow = i;
            for j in i + 1..n {
                if a.get(j, i).abs() > a.get(maxrow, i).abs() {
                    maxrow = j;
                }
            }
            if maxrow != i {
                a.swap_rows(i, maxrow);
                self.rhs.swap(i, maxrow);
            }
            let f = 1.0 / a.get(i, i);
            for j in i + 1..n {
                let f1 = -f * a.get(j, i);
                if f1 != 0.0 {
                    for k in i + 1..n {
                        let aik = a.get(i, k);
                        a.add(j, k, aik * f1);
                    }
                    self.rhs[j] += self.rhs[i] * f1;
                }
            }
        }
    }

    fn back_substitute_sparse(&self, rows: &[Terms], x: &mut [f64]) {
        for j in (0..self.a.n()).rev() {
            let tmp: f64 = rows[j].nzrd.iter().map(|&k| self.a.get(j, k) * x[k]).sum();
            x[j] = (self.rhs[j] - tmp) / self.a.get(j, j);
        }
    }

    fn back_substitute_dense(&self, x: &mut [f64]) {
        let n = self.a.n();
        for j in (0..n).rev() {
            let tmp: f64 = (j + 1..n).map(|k| self.a.get(j, k) * x[k]).sum();
            x[j] = (self.rhs[j] - tmp) / self.a.get(j, j);
        }
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::netlist::{NetId, TermId};
    use crate::solver::group::compute_structure;
    use approx::assert_relative_eq;

    /// Rows for a chain of `n` nets: 1 S between neighbours, 1 S from the
    /// first net to a 10 V rail and 1 S from the last net to ground.
    pub fn ladder(n: usize) -> Vec<Terms> {
        let mut rows: Vec<Terms> = (0..n).map(|_| Terms::default()).collect();
        let mut t = 0;
        for k in 0..n {
            if k > 0 {
                rows[k].add(TermId(t), NetId(k - 1), Some(k - 1), true);
                t += 1;
            }
            if k + 1 < n {
                rows[k].add(TermId(t), NetId(k + 1), Some(k + 1), true);
                t += 1;
            }
        }
        for (k, row) in rows.iter_mut().enumerate() {
            let mut rails = Terms::default();
            if k == 0 {
                rails.add(TermId(t), NetId(100), None, false);
            }
            if k == n - 1 {
                rails.add(TermId(t + 1), NetId(101), None, false);
            }
            row.append_rails(rails);
            let c = row.count();
            row.gt = vec![1.0; c];
            row.go = vec![1.0; c];
            row.idr = vec![0.0; c];
            row.other_v = vec![0.0; c];
            if k == 0 {
                let r = row.railstart;
                row.other_v[r] = 10.0;
            }
        }
        compute_structure(&mut rows);
        rows
    }

    /// Node voltages of the ladder: a divider of n + 1 equal resistors.
    pub fn ladder_expected(n: usize) -> Vec<f64> {
        (0..n)
            .map(|k| 10.0 * (n - k) as f64 / (n + 1) as f64)
            .collect()
    }

    #[test]
    fn test_solve1() {
        let rows = ladder(1);
        let mut v = [0.0];
        solve1(&rows, &mut v);
        assert_relative_eq!(v[0], 5.0);
    }

    #[test]
    fn test_solve2_divider() {
        let rows = ladder(2);
        let mut v = [0.0; 2];
        solve2(&rows, &mut v);
        let e = ladder_expected(2);
        assert_relative_eq!(v[0], e[0], epsilon = 1e-12);
        assert_relative_eq!(v[1], e[1], epsilon = 1e-12);
    }

    #[test]
    fn test_direct_with_and_without_pivot() {
        for pivot in [false, true] {
            let rows = ladder(7);
            let mut d = Direct::new(7, 8, pivot);
            let mut v = vec![0.0; 7];
            d.solve(&rows, &mut v);
            for (got, want) in v.iter().zip(ladder_expected(7)) {
                assert_relative_eq!(*got, want, epsilon = 1e-9);
            }
        }
    }
}
