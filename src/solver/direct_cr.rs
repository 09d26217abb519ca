//! Sparse Gaussian elimination on a compressed row matrix.
//!
//! The storage pattern is the non-zero pattern of the group plus all
//! fill-in produced by elimination in row order, so every operation of the
//! elimination can be precomputed as a pair of offsets.

use super::matrix::CrMatrix;
use super::terms::Terms;

/// One elimination step: subtract a multiple of `pivot` from row `row`.
#[derive(Debug, Clone)]
struct Step {
    pivot: usize,
    row: usize,
    /// Offset of A(row, pivot)
    lower: usize,
    /// (offset in pivot row, offset in target row) right of the pivot
    ops: Vec<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct DirectCr {
    mat: CrMatrix,
    term_cr: Vec<Vec<Option<usize>>>,
    steps: Vec<Step>,
    a: Vec<f64>,
    rhs: Vec<f64>,
}

impl DirectCr {
    pub fn new(rows: &[Terms]) -> Self {
        let n = rows.len();
        let mut touched = vec![vec![false; n]; n];
        for (k, row) in rows.iter().enumerate() {
            for &j in &row.nz {
                touched[k][j] = true;
            }
        }
        for k in 0..n {
            for r in k + 1..n {
                if touched[r][k] {
                    for c in k + 1..n {
                        if touched[k][c] {
                            touched[r][c] = true;
                        }
                    }
                }
            }
        }
        let pattern: Vec<Vec<usize>> = touched
            .iter()
            .map(|t| (0..n).filter(|&c| t[c]).collect())
            .collect();
        let mat = CrMatrix::from_pattern(&pattern);

        let mut steps = Vec::new();
        for k in 0..n {
            for r in k + 1..n {
                let Some(lower) = mat.find(r, k) else {
                    continue;
                };
                let ops = (mat.diag[k] + 1..mat.ia[k + 1])
                    .filter_map(|p| mat.find(r, mat.ja[p]).map(|q| (p, q)))
                    .collect();
                steps.push(Step {
                    pivot: k,
                    row: r,
                    lower,
                    ops,
                });
            }
        }

        let term_cr = mat.term_offsets(rows);
        let nz = mat.nz_num();
        Self {
            mat,
            term_cr,
            steps,
            a: vec![0.0; nz],
            rhs: vec![0.0; n],
        }
    }

    #[cfg(test)]
    fn nz_num(&self) -> usize {
        self.mat.nz_num()
    }

    pub fn solve(&mut self, rows: &[Terms], v: &mut [f64]) {
        self.mat.assemble(rows, &self.term_cr, &mut self.a);
        for (k, row) in rows.iter().enumerate() {
            self.rhs[k] = row.rhs();
        }

        for s in &self.steps {
            let f = self.a[s.lower] / self.a[self.mat.diag[s.pivot]];
            for &(p, q) in &s.ops {
                self.a[q] -= f * self.a[p];
            }
            self.rhs[s.row] -= f * self.rhs[s.pivot];
        }

        let m = &self.mat;
        for k in (0..m.n).rev() {
            let d = m.diag[k];
            let tmp: f64 = (d + 1..m.ia[k + 1]).map(|p| self.a[p] * v[m.ja[p]]).sum();
            v[k] = (self.rhs[k] - tmp) / self.a[d];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::direct::tests::{ladder, ladder_expected};
    use approx::assert_relative_eq;

    #[test]
    fn test_ladder() {
        let rows = ladder(9);
        let mut s = DirectCr::new(&rows);
        // tridiagonal: no fill-in
        assert_eq!(s.nz_num(), 9 + 2 * 8);
        let mut v = vec![0.0; 9];
        s.solve(&rows, &mut v);
        for (got, want) in v.iter().zip(ladder_expected(9)) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
    }
}
