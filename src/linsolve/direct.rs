//! Direct solvers for W = M − scale·J: dense LU via Faer, banded LU in-crate.
//!
//! The factorization is computed once per (Jacobian refresh, step-size
//! change) pair and reused for every Newton iteration and the error filter
//! of the step, so `solve` is cheap relative to `factorize`.

use faer::linalg::solvers::{PartialPivLu, Solve};
use faer::{Mat, MatMut};

use crate::error::SolverError;
use crate::matrix::mass::DiagonalView;
use crate::matrix::{Banded, JacobianMatrix, MassMatrix};

/// Assemble dense W = M − scale·J.
pub(crate) fn assemble_dense(mass: &MassMatrix, jac: &JacobianMatrix, scale: f64) -> Mat<f64> {
    let n = jac.nrows();
    Mat::from_fn(n, n, |i, j| {
        let m_ij = match mass {
            MassMatrix::Identity => if i == j { 1.0 } else { 0.0 },
            MassMatrix::Diagonal(d) => if i == j { d[i] } else { 0.0 },
            MassMatrix::Dense(m) => m[(i, j)],
        };
        m_ij - scale * jac.get(i, j)
    })
}

/// Assemble banded W = diag(M) − scale·J, valid only when M is (block) diagonal.
pub(crate) fn assemble_banded(mass: DiagonalView<'_>, jac: &Banded, scale: f64) -> Banded {
    let n = jac.n();
    let mut w = Banded::zeros(n, jac.ml(), jac.mu());
    for j in 0..n {
        let (lo, hi) = jac.col_rows(j);
        for i in lo..=hi {
            w.set(i, j, -scale * jac.get(i, j));
        }
        w.add(j, j, mass.get(j));
    }
    w
}

/// LU factorization of a band matrix, no pivoting (fill stays in band).
///
/// Safe for the diagonally dominant iteration matrices this crate produces;
/// a vanishing pivot is reported as a singular Jacobian rather than patched.
pub struct BandedLu {
    lu: Banded,
}

impl BandedLu {
    pub fn factor(mut w: Banded, t: f64) -> Result<Self, SolverError> {
        let n = w.n();
        let (ml, mu) = (w.ml(), w.mu());
        for k in 0..n {
            let piv = w.get(k, k);
            if !piv.is_finite() || piv.abs() < 1e-300 {
                return Err(SolverError::SingularJacobian { t, row: k });
            }
            let i_hi = (k + ml).min(n - 1);
            let j_hi = (k + mu).min(n - 1);
            for i in (k + 1)..=i_hi {
                let l = w.get(i, k) / piv;
                w.set(i, k, l);
                for j in (k + 1)..=j_hi {
                    w.add(i, j, -l * w.get(k, j));
                }
            }
        }
        Ok(Self { lu: w })
    }

    pub fn solve(&self, b: &[f64], x: &mut [f64]) {
        let n = self.lu.n();
        let (ml, mu) = (self.lu.ml(), self.lu.mu());
        x.copy_from_slice(b);
        // forward substitution with unit lower band
        for k in 0..n {
            let i_hi = (k + ml).min(n - 1);
            for i in (k + 1)..=i_hi {
                x[i] -= self.lu.get(i, k) * x[k];
            }
        }
        // back substitution with upper band
        for k in (0..n).rev() {
            let j_hi = (k + mu).min(n - 1);
            for j in (k + 1)..=j_hi {
                x[k] -= self.lu.get(k, j) * x[j];
            }
            x[k] /= self.lu.get(k, k);
        }
    }
}

enum WFactor {
    Dense(PartialPivLu<f64>),
    Banded(BandedLu),
}

/// Direct stage solver with a cached factorization of W.
pub struct DirectSolver {
    factor: Option<WFactor>,
    scale: Option<f64>,
    factorizations: u64,
}

impl DirectSolver {
    pub fn new() -> Self {
        Self { factor: None, scale: None, factorizations: 0 }
    }

    /// True when no usable factorization exists for this scale = h·γ.
    pub fn needs_factorization(&self, scale: f64) -> bool {
        match (self.factor.as_ref(), self.scale) {
            (Some(_), Some(s)) => (s - scale).abs() > 1e-14 * scale.abs().max(1e-300),
            _ => true,
        }
    }

    /// Drop the cached factorization (after a Jacobian refresh).
    pub fn invalidate(&mut self) {
        self.factor = None;
        self.scale = None;
    }

    /// Factorize W = M − scale·J. Banded Jacobians with diagonal mass use the
    /// banded path; everything else goes dense.
    pub fn factorize(
        &mut self,
        mass: &MassMatrix,
        jac: &JacobianMatrix,
        scale: f64,
        t: f64,
    ) -> Result<(), SolverError> {
        let factor = match (jac, mass.as_diagonal()) {
            (JacobianMatrix::Banded(b), Some(diag)) => {
                let w = assemble_banded(diag, b, scale);
                WFactor::Banded(BandedLu::factor(w, t)?)
            }
            _ => {
                let w = assemble_dense(mass, jac, scale);
                WFactor::Dense(PartialPivLu::new(w.as_ref()))
            }
        };
        self.factor = Some(factor);
        self.scale = Some(scale);
        self.factorizations += 1;
        Ok(())
    }

    /// Solve W x = b with the cached factorization.
    pub fn solve(&self, b: &[f64], x: &mut [f64]) -> Result<(), SolverError> {
        let factor = self
            .factor
            .as_ref()
            .ok_or(SolverError::LinearSolverFailure("solve before factorization".into()))?;
        match factor {
            WFactor::Dense(lu) => {
                x.copy_from_slice(b);
                let n = x.len();
                let x_mat = MatMut::from_column_major_slice_mut(x, n, 1);
                lu.solve_in_place(x_mat);
            }
            WFactor::Banded(lu) => lu.solve(b, x),
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::LinearSolverFailure(
                "non-finite solution from direct solve".into(),
            ));
        }
        Ok(())
    }

    /// Number of factorizations across the run.
    pub fn factorizations(&self) -> u64 {
        self.factorizations
    }
}

impl Default for DirectSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::MatVec;

    #[test]
    fn banded_lu_matches_dense_lu() {
        // Diagonally dominant tridiagonal system.
        let n = 8;
        let mut w = Banded::zeros(n, 1, 1);
        for i in 0..n {
            w.set(i, i, 4.0 + i as f64 * 0.1);
            if i > 0 {
                w.set(i, i - 1, -1.0);
            }
            if i + 1 < n {
                w.set(i, i + 1, -1.3);
            }
        }
        let b: Vec<f64> = (0..n).map(|i| (i as f64).sin() + 0.5).collect();

        let dense = w.to_dense();
        let mut x_dense = b.clone();
        let lu = PartialPivLu::new(dense.as_ref());
        let x_mat = MatMut::from_column_major_slice_mut(&mut x_dense, n, 1);
        lu.solve_in_place(x_mat);

        let banded = BandedLu::factor(w, 0.0).unwrap();
        let mut x_band = vec![0.0; n];
        banded.solve(&b, &mut x_band);

        for (a, c) in x_band.iter().zip(&x_dense) {
            assert!((a - c).abs() < 1e-12, "banded {a} vs dense {c}");
        }
    }

    #[test]
    fn banded_lu_detects_zero_pivot() {
        let mut w = Banded::zeros(3, 1, 1);
        w.set(0, 0, 0.0);
        w.set(1, 1, 1.0);
        w.set(2, 2, 1.0);
        let err = BandedLu::factor(w, 2.5);
        assert!(matches!(err, Err(SolverError::SingularJacobian { row: 0, .. })));
    }

    #[test]
    fn direct_solver_caches_by_scale() {
        let jac = JacobianMatrix::Dense(Mat::from_fn(2, 2, |i, j| if i == j { -1.0 } else { 0.5 }));
        let mut solver = DirectSolver::new();
        assert!(solver.needs_factorization(0.1));
        solver.factorize(&MassMatrix::Identity, &jac, 0.1, 0.0).unwrap();
        assert!(!solver.needs_factorization(0.1));
        assert!(solver.needs_factorization(0.05));
        assert_eq!(solver.factorizations(), 1);
    }

    #[test]
    fn dense_solve_is_finite_across_sizes() {
        // Near-identity iteration matrices of the kind every step produces;
        // the solve must stay finite and accurate well past small n.
        for n in [5, 16, 32, 64] {
            let jac = JacobianMatrix::Dense(Mat::from_fn(n, n, |i, j| {
                if i == j { -1.0 - 0.01 * i as f64 } else { 0.02 / (1.0 + (i + j) as f64) }
            }));
            let mut solver = DirectSolver::new();
            solver.factorize(&MassMatrix::Identity, &jac, 0.05, 0.0).unwrap();
            let b: Vec<f64> = (0..n).map(|i| ((i as f64) * 0.7).cos()).collect();
            let mut x = vec![0.0; n];
            solver.solve(&b, &mut x).unwrap();
            let w = assemble_dense(&MassMatrix::Identity, &jac, 0.05);
            let mut wx = vec![0.0; n];
            w.matvec(&x, &mut wx);
            for (wi, bi) in wx.iter().zip(&b) {
                assert!(wi.is_finite());
                assert!((wi - bi).abs() < 1e-10, "n = {n}: residual {}", (wi - bi).abs());
            }
        }
    }

    #[test]
    fn dense_solve_residual_is_small() {
        let n = 5;
        let jac = JacobianMatrix::Dense(Mat::from_fn(n, n, |i, j| {
            if i == j { -2.0 - i as f64 } else { 0.3 / (1.0 + (i as f64 - j as f64).abs()) }
        }));
        let mut solver = DirectSolver::new();
        solver.factorize(&MassMatrix::Identity, &jac, 0.2, 0.0).unwrap();
        let b: Vec<f64> = (0..n).map(|i| 1.0 + i as f64).collect();
        let mut x = vec![0.0; n];
        solver.solve(&b, &mut x).unwrap();
        let w = assemble_dense(&MassMatrix::Identity, &jac, 0.2);
        let mut wx = vec![0.0; n];
        w.matvec(&x, &mut wx);
        for (wi, bi) in wx.iter().zip(&b) {
            assert!((wi - bi).abs() < 1e-10);
        }
    }
}
