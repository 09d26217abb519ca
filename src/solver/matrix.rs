//! Matrix storage and assembly.

use super::terms::Terms;

/// Square matrix with a fixed storage stride.
///
/// The stride is the storage capacity of the group, so groups of similar
/// size share the same memory layout.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    n: usize,
    stride: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    pub fn new(n: usize, stride: usize) -> Self {
        let stride = stride.max(n);
        Self {
            n,
            stride,
            data: vec![0.0; stride * stride],
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.stride + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.stride + c] = v;
    }

    #[inline]
    pub fn add(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.stride + c] += v;
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        for c in 0..self.n {
            self.data.swap(a * self.stride + c, b * self.stride + c);
        }
    }

    pub fn copy_from(&mut self, other: &DenseMatrix) {
        self.data.copy_from_slice(&other.data);
    }

    /// Assemble the conductance matrix of a group.
    ///
    /// A(k,k) is the sum of all self conductances on net k; every terminal
    /// whose opposite side is in the group subtracts its conductance at the
    /// opposite net's column.
    pub fn build(&mut self, rows: &[Terms]) {
        for (k, row) in rows.iter().enumerate() {
            for c in 0..self.n {
                self.set(k, c, 0.0);
            }
            self.set(k, k, row.gtot());
            for i in 0..row.railstart {
                if let Some(j) = row.net_other[i] {
                    self.add(k, j, -row.go[i]);
                }
            }
        }
    }

    /// Identity matrix of the same size.
    pub fn set_identity(&mut self) {
        for r in 0..self.n {
            for c in 0..self.n {
                self.set(r, c, if r == c { 1.0 } else { 0.0 });
            }
        }
    }

    /// res = A * x
    pub fn mult_vec(&self, x: &[f64], res: &mut [f64]) {
        for (r, out) in res.iter_mut().enumerate().take(self.n) {
            *out = (0..self.n).map(|c| self.get(r, c) * x[c]).sum();
        }
    }

    /// Gauss-Jordan inverse with partial pivoting. Returns false if the
    /// matrix is singular; `inv` is garbage then.
    pub fn invert_into(&self, inv: &mut DenseMatrix) -> bool {
        let n = self.n;
        let mut a = self.clone();
        inv.set_identity();
        for i in 0..n {
            let mut p = i;
            for j in i + 1..n {
                if a.get(j, i).abs() > a.get(p, i).abs() {
                    p = j;
                }
            }
            if a.get(p, i) == 0.0 {
                return false;
            }
            a.swap_rows(i, p);
            inv.swap_rows(i, p);
            let f = 1.0 / a.get(i, i);
            for c in 0..n {
                let (x, y) = (a.get(i, c), inv.get(i, c));
                a.set(i, c, x * f);
                inv.set(i, c, y * f);
            }
            for j in (0..n).filter(|&j| j != i) {
                let f1 = a.get(j, i);
                if f1 == 0.0 {
                    continue;
                }
                for c in 0..n {
                    let (x, y) = (a.get(i, c), inv.get(i, c));
                    a.add(j, c, -f1 * x);
                    inv.add(j, c, -f1 * y);
                }
            }
        }
        true
    }

    /// Solve A x = b in place with partial pivoting, destroying A.
    /// Returns false if the matrix is singular.
    pub fn solve_in_place(&mut self, b: &mut [f64]) -> bool {
        let n = self.n;
        for i in 0..n {
            let mut p = i;
            for j in i + 1..n {
                if self.get(j, i).abs() > self.get(p, i).abs() {
                    p = j;
                }
            }
            if self.get(p, i) == 0.0 {
                return false;
            }
            self.swap_rows(i, p);
            b.swap(i, p);
            for j in i + 1..n {
                let f = self.get(j, i) / self.get(i, i);
                if f == 0.0 {
                    continue;
                }
                for c in i..n {
                    let x = self.get(i, c);
                    self.add(j, c, -f * x);
                }
                b[j] -= f * b[i];
            }
        }
        for i in (0..n).rev() {
            let tmp: f64 = (i + 1..n).map(|c| self.get(i, c) * b[c]).sum();
            b[i] = (b[i] - tmp) / self.get(i, i);
        }
        true
    }
}

/// Right hand side of a group.
pub fn build_rhs(rows: &[Terms], rhs: &mut [f64]) {
    for (k, row) in rows.iter().enumerate() {
        rhs[k] = row.rhs();
    }
}

/// Sparse matrix structure in compressed row format.
#[derive(Debug, Clone, Default)]
pub struct CrMatrix {
    pub n: usize,
    /// Row start offsets, `n + 1` entries
    pub ia: Vec<usize>,
    /// Column of each stored element
    pub ja: Vec<usize>,
    /// Offset of the diagonal element of each row
    pub diag: Vec<usize>,
}

impl CrMatrix {
    /// Build the structure from per-row sorted column lists.
    pub fn from_pattern(pattern: &[Vec<usize>]) -> Self {
        let n = pattern.len();
        let mut m = CrMatrix {
            n,
            ia: Vec::with_capacity(n + 1),
            ja: Vec::new(),
            diag: vec![0; n],
        };
        for (k, cols) in pattern.iter().enumerate() {
            m.ia.push(m.ja.len());
            for &c in cols {
                if c == k {
                    m.diag[k] = m.ja.len();
                }
                m.ja.push(c);
            }
        }
        m.ia.push(m.ja.len());
        m
    }

    pub fn nz_num(&self) -> usize {
        self.ja.len()
    }

    /// Offset of element (r, c), if stored.
    pub fn find(&self, r: usize, c: usize) -> Option<usize> {
        (self.ia[r]..self.ia[r + 1]).find(|&p| self.ja[p] == c)
    }

    /// Offsets of the off-diagonal entry of every in-group terminal.
    pub fn term_offsets(&self, rows: &[Terms]) -> Vec<Vec<Option<usize>>> {
        rows.iter()
            .enumerate()
            .map(|(k, row)| {
                (0..row.railstart)
                    .map(|i| row.net_other[i].and_then(|j| self.find(k, j)))
                    .collect()
            })
            .collect()
    }

    /// Load the conductances of a group into `a`.
    pub fn assemble(&self, rows: &[Terms], term_cr: &[Vec<Option<usize>>], a: &mut [f64]) {
        a.iter_mut().for_each(|x| *x = 0.0);
        for (k, row) in rows.iter().enumerate() {
            a[self.diag[k]] = row.gtot();
            for (i, p) in term_cr[k].iter().enumerate() {
                if let Some(p) = p {
                    a[*p] -= row.go[i];
                }
            }
        }
    }

    /// res = A * x
    pub fn mult_vec(&self, a: &[f64], x: &[f64], res: &mut [f64]) {
        for i in 0..self.n {
            res[i] = (self.ia[i]..self.ia[i + 1]).map(|k| a[k] * x[self.ja[k]]).sum();
        }
    }

    /// Incomplete LU factorization without fill-in.
    pub fn incomplete_lu(&self, a: &[f64], lu: &mut [f64]) {
        lu[..self.nz_num()].copy_from_slice(&a[..self.nz_num()]);
        for i in 1..self.n {
            for pk in self.ia[i]..self.diag[i] {
                let k = self.ja[pk];
                let iak1 = self.ia[k + 1];
                lu[pk] /= lu[self.diag[k]];
                let lupk = lu[pk];
                let mut pt = self.ia[k];
                for pj in pk + 1..self.ia[i + 1] {
                    // columns increase within a row
                    let ej = self.ja[pj];
                    while pt < iak1 && self.ja[pt] < ej {
                        pt += 1;
                    }
                    if pt < iak1 && self.ja[pt] == ej {
                        lu[pj] -= lupk * lu[pt];
                    }
                }
            }
        }
    }

    /// Solve LU x = r in place.
    pub fn solve_lu(&self, lu: &[f64], r: &mut [f64]) {
        for i in 1..self.n {
            let tmp: f64 = (self.ia[i]..self.diag[i]).map(|j| lu[j] * r[self.ja[j]]).sum();
            r[i] -= tmp;
        }
        for i in (0..self.n).rev() {
            let di = self.diag[i];
            let tmp: f64 = (di + 1..self.ia[i + 1]).map(|j| lu[j] * r[self.ja[j]]).sum();
            r[i] = (r[i] - tmp) / lu[di];
        }
    }
}

// ============ Vector helpers ============

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// y += s * x
pub fn axpy(s: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += s * xi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tridiag() -> (CrMatrix, Vec<f64>) {
        let pattern = vec![vec![0, 1], vec![0, 1, 2], vec![1, 2]];
        let m = CrMatrix::from_pattern(&pattern);
        let a = vec![4.0, -1.0, -1.0, 4.0, -1.0, -1.0, 4.0];
        (m, a)
    }

    #[test]
    fn test_cr_structure() {
        let (m, _) = tridiag();
        assert_eq!(m.ia, vec![0, 2, 5, 7]);
        assert_eq!(m.diag, vec![0, 3, 6]);
        assert_eq!(m.find(1, 2), Some(4));
        assert_eq!(m.find(0, 2), None);
    }

    #[test]
    fn test_ilu_is_exact_for_tridiagonal() {
        // no fill-in, so ILU(0) equals the full LU
        let (m, a) = tridiag();
        let mut lu = vec![0.0; a.len()];
        m.incomplete_lu(&a, &mut lu);
        let x = [1.0, 2.0, 3.0];
        let mut b = [0.0; 3];
        m.mult_vec(&a, &x, &mut b);
        m.solve_lu(&lu, &mut b);
        for i in 0..3 {
            assert_relative_eq!(b[i], x[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invert_and_solve() {
        let mut a = DenseMatrix::new(2, 4);
        a.set(0, 0, 0.0);
        a.set(0, 1, 2.0);
        a.set(1, 0, 4.0);
        a.set(1, 1, 1.0);
        let mut inv = DenseMatrix::new(2, 4);
        assert!(a.invert_into(&mut inv));
        let mut x = [0.0; 2];
        inv.mult_vec(&[2.0, 6.0], &mut x);
        assert_relative_eq!(x[0], 1.25, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);

        let mut b = [2.0, 6.0];
        assert!(a.solve_in_place(&mut b));
        assert_relative_eq!(b[0], 1.25, epsilon = 1e-12);

        let mut singular = DenseMatrix::new(2, 2);
        singular.set(0, 0, 1.0);
        singular.set(1, 0, 1.0);
        assert!(!singular.invert_into(&mut inv));
    }

    #[test]
    fn test_dense_stride() {
        let mut d = DenseMatrix::new(3, 16);
        d.set(2, 1, 5.0);
        d.add(2, 1, 1.0);
        assert_eq!(d.get(2, 1), 6.0);
        d.swap_rows(1, 2);
        assert_eq!(d.get(1, 1), 6.0);
    }
}
