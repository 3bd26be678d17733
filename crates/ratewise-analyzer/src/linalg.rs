//! Dense symmetric positive-definite solves for the normal equations.

/// Pivots smaller than this fraction of the original diagonal count as zero.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Row-major square matrix.
#[derive(Debug, Clone)]
pub(crate) struct SymMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SymMatrix {
    pub(crate) fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub(crate) fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    pub(crate) fn add(&mut self, i: usize, j: usize, v: f64) {
        self.data[i * self.n + j] += v;
    }

    /// Accumulate `row * row^T` into the upper triangle.
    pub(crate) fn add_outer_upper(&mut self, row: &[f64]) {
        for i in 0..self.n {
            let ri = row[i];
            if ri == 0.0 {
                continue;
            }
            for j in i..self.n {
                self.data[i * self.n + j] += ri * row[j];
            }
        }
    }

    /// Copy the upper triangle into the lower one.
    pub(crate) fn symmetrize(&mut self) {
        for i in 0..self.n {
            for j in 0..i {
                self.data[i * self.n + j] = self.data[j * self.n + i];
            }
        }
    }
}

/// Solve `a x = b` by Cholesky decomposition.
///
/// Returns `None` when `a` is not numerically positive definite.
pub(crate) fn cholesky_solve(a: &SymMatrix, b: &[f64]) -> Option<Vec<f64>> {
    let n = a.n;
    let mut l = vec![0.0; n * n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a.get(i, j);
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= PIVOT_TOLERANCE * a.get(i, i).abs() || !sum.is_finite() {
                    return None;
                }
                l[i * n + i] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }

    // Forward: L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * n + k] * y[k];
        }
        y[i] = sum / l[i * n + i];
    }

    // Backward: L^T x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[k * n + i] * x[k];
        }
        x[i] = sum / l[i * n + i];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_small_system() {
        // [4 2; 2 3] x = [2; 1] => x = [0.5, 0]
        let mut a = SymMatrix::zeros(2);
        a.add(0, 0, 4.0);
        a.add(0, 1, 2.0);
        a.add(1, 1, 3.0);
        a.symmetrize();
        let x = cholesky_solve(&a, &[2.0, 1.0]).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let mut a = SymMatrix::zeros(2);
        a.add_outer_upper(&[1.0, 1.0]);
        a.symmetrize();
        assert!(cholesky_solve(&a, &[1.0, 1.0]).is_none());
    }

    #[test]
    fn outer_product_accumulates() {
        let mut a = SymMatrix::zeros(2);
        a.add_outer_upper(&[1.0, 2.0]);
        a.add_outer_upper(&[3.0, 0.0]);
        a.symmetrize();
        assert_eq!(a.get(0, 0), 10.0);
        assert_eq!(a.get(1, 0), 2.0);
        assert_eq!(a.get(1, 1), 4.0);
    }
}
