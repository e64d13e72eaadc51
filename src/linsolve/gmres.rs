//! Restarted GMRES (Saad §6.4) over an abstract matrix-vector operator.
//!
//! Works through `MatVec` alone, so it accepts materialized matrices and
//! matrix-free operators alike. Modified Gram-Schmidt with a second
//! orthogonalization pass, Givens rotations for the least-squares update,
//! happy-breakdown detection, and optional left or right preconditioning.

use num_traits::Float;

use crate::core::traits::MatVec;
use crate::error::SolverError;
use crate::linsolve::preconditioner::Preconditioner;
use crate::utils::convergence::{Convergence, SolveStats};
use crate::utils::norms::{dot, norm2};

/// Preconditioning side (none, left, or right).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Preconditioning {
    None,
    Left,
    Right,
}

/// GMRES solver with fixed restart length.
pub struct GmresSolver<T> {
    /// Number of Arnoldi vectors before restart.
    pub restart: usize,
    /// Convergence criteria (relative tolerance and total iteration cap).
    pub conv: Convergence<T>,
    /// Preconditioning side.
    pub preconditioning: Preconditioning,
}

impl<T: Float> GmresSolver<T> {
    pub fn new(restart: usize, tol: T, max_iters: usize) -> Self {
        Self {
            restart: restart.max(1),
            conv: Convergence { tol, max_iters },
            preconditioning: Preconditioning::Left,
        }
    }

    pub fn with_preconditioning(mut self, mode: Preconditioning) -> Self {
        self.preconditioning = mode;
        self
    }

    /// Solve A x = b, writing the result into `x` (input value is the guess).
    ///
    /// Returns stats with `converged = false` when the iteration budget runs
    /// out; errors only on preconditioner failure or a non-finite residual.
    pub fn solve<A>(
        &mut self,
        a: &A,
        pc: Option<&dyn Preconditioner<T>>,
        b: &[T],
        x: &mut [T],
    ) -> Result<SolveStats<T>, SolverError>
    where
        A: MatVec<T> + ?Sized,
    {
        let n = b.len();
        let tiny = num_traits::cast::<f64, T>(1e-14).unwrap_or_else(T::epsilon);
        let mode = match pc {
            Some(_) => self.preconditioning,
            None => Preconditioning::None,
        };

        let mut tmp = vec![T::zero(); n];
        let mut res0 = T::nan();
        let mut stats = SolveStats { iterations: 0, final_residual: T::zero(), converged: false };
        let mut iteration = 0;

        loop {
            // (Preconditioned) residual for this cycle.
            a.matvec(x, &mut tmp);
            let mut r: Vec<T> = b.iter().zip(&tmp).map(|(&bi, &axi)| bi - axi).collect();
            if mode == Preconditioning::Left {
                let pc = pc.expect("left mode implies a preconditioner");
                pc.apply(&r.clone(), &mut r)?;
            }
            let beta = norm2(&r);
            if !beta.is_finite() {
                return Err(SolverError::LinearSolverFailure(
                    "non-finite residual in gmres".into(),
                ));
            }
            if res0.is_nan() {
                res0 = if beta > T::zero() { beta } else { T::one() };
            }
            stats.final_residual = beta;
            stats.converged = beta / res0 <= self.conv.tol;
            if stats.converged || iteration >= self.conv.max_iters {
                stats.iterations = iteration;
                return Ok(stats);
            }

            // Arnoldi with Givens-rotated Hessenberg, restart-length window.
            let m_max = self.restart;
            let mut v: Vec<Vec<T>> = Vec::with_capacity(m_max + 1);
            v.push(r.iter().map(|&ri| ri / beta).collect());
            let mut h = vec![vec![T::zero(); m_max]; m_max + 1];
            let mut g = vec![T::zero(); m_max + 1];
            let mut cs = vec![T::zero(); m_max];
            let mut sn = vec![T::zero(); m_max];
            g[0] = beta;
            let mut m = 0;

            for j in 0..m_max {
                iteration += 1;
                let mut w = self.apply_operator(a, pc, mode, &v[j], &mut tmp)?;
                // Modified Gram-Schmidt, then one refinement pass.
                for _pass in 0..2 {
                    for (i, vi) in v.iter().enumerate().take(j + 1) {
                        let hij = dot(&w, vi);
                        h[i][j] = h[i][j] + hij;
                        for (wk, &vik) in w.iter_mut().zip(vi) {
                            *wk = *wk - hij * vik;
                        }
                    }
                }
                h[j + 1][j] = norm2(&w);
                let happy = h[j + 1][j].abs() < tiny;
                if !happy {
                    let hj1 = h[j + 1][j];
                    v.push(w.iter().map(|&wi| wi / hj1).collect());
                }
                Self::givens_update(&mut h, &mut g, &mut cs, &mut sn, j, tiny);
                m = j + 1;
                let res = g[j + 1].abs();
                let (stop, s) = self.conv.check(res, res0, iteration);
                stats = s;
                if happy || (stop && stats.converged) || iteration >= self.conv.max_iters {
                    break;
                }
            }

            // Least-squares coefficients by back substitution.
            let mut y = vec![T::zero(); m];
            for i in (0..m).rev() {
                let mut yi = g[i];
                for j in (i + 1)..m {
                    yi = yi - h[i][j] * y[j];
                }
                y[i] = if h[i][i].abs() > tiny { yi / h[i][i] } else { T::zero() };
            }
            // x += V y (right preconditioning maps the combination through P).
            let mut update = vec![T::zero(); n];
            for (j, &yj) in y.iter().enumerate().take(m) {
                for (uk, &vjk) in update.iter_mut().zip(&v[j]) {
                    *uk = *uk + yj * vjk;
                }
            }
            if mode == Preconditioning::Right {
                let pc = pc.expect("right mode implies a preconditioner");
                let src = update.clone();
                pc.apply(&src, &mut update)?;
            }
            for (xk, &uk) in x.iter_mut().zip(&update) {
                *xk = *xk + uk;
            }
        }
    }

    /// One operator application in the chosen preconditioning mode.
    fn apply_operator<A>(
        &self,
        a: &A,
        pc: Option<&dyn Preconditioner<T>>,
        mode: Preconditioning,
        vj: &[T],
        tmp: &mut [T],
    ) -> Result<Vec<T>, SolverError>
    where
        A: MatVec<T> + ?Sized,
    {
        let n = vj.len();
        let mut out = vec![T::zero(); n];
        match mode {
            Preconditioning::None => a.matvec(vj, &mut out),
            Preconditioning::Left => {
                a.matvec(vj, tmp);
                pc.expect("left mode implies a preconditioner").apply(tmp, &mut out)?;
            }
            Preconditioning::Right => {
                pc.expect("right mode implies a preconditioner").apply(vj, tmp)?;
                a.matvec(tmp, &mut out);
            }
        }
        Ok(out)
    }

    /// Apply previous Givens rotations to column j, generate the new one, and
    /// update the residual vector g.
    fn givens_update(h: &mut [Vec<T>], g: &mut [T], cs: &mut [T], sn: &mut [T], j: usize, tiny: T) {
        for i in 0..j {
            let temp = cs[i] * h[i][j] + sn[i] * h[i + 1][j];
            h[i + 1][j] = -sn[i] * h[i][j] + cs[i] * h[i + 1][j];
            h[i][j] = temp;
        }
        let (h_kk, h_k1k) = (h[j][j], h[j + 1][j]);
        let r = (h_kk * h_kk + h_k1k * h_k1k).sqrt();
        if r.abs() < tiny {
            cs[j] = T::one();
            sn[j] = T::zero();
        } else {
            cs[j] = h_kk / r;
            sn[j] = h_k1k / r;
        }
        h[j][j] = cs[j] * h_kk + sn[j] * h_k1k;
        h[j + 1][j] = T::zero();
        let temp = cs[j] * g[j] + sn[j] * g[j + 1];
        g[j + 1] = -sn[j] * g[j] + cs[j] * g[j + 1];
        g[j] = temp;
    }
}
