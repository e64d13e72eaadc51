//! Matrix-free Jacobian action via a directional finite-difference probe:
//! J·v ≈ (f(u + εv, p, t) - f(u, p, t)) / ε.

use std::cell::Cell;

use crate::core::traits::{Indexing, MatVec};
use crate::problem::OdeProblem;
use crate::utils::norms::norm2;

/// Directional-derivative operator anchored at one (u, t) point.
///
/// The probe step ε is rescaled per application so the perturbation stays at
/// sqrt(machine eps) relative to ‖u‖ regardless of ‖v‖. A zero direction
/// yields a zero product without any rhs evaluation.
pub struct JvProbe<'a> {
    problem: &'a OdeProblem,
    u: &'a [f64],
    f0: &'a [f64],
    t: f64,
    u_norm: f64,
    nfev: &'a Cell<u64>,
}

impl<'a> JvProbe<'a> {
    pub(crate) fn new(
        problem: &'a OdeProblem,
        u: &'a [f64],
        f0: &'a [f64],
        t: f64,
        nfev: &'a Cell<u64>,
    ) -> Self {
        Self { problem, u, f0, t, u_norm: norm2(u), nfev }
    }
}

impl MatVec<f64> for JvProbe<'_> {
    fn matvec(&self, v: &[f64], out: &mut [f64]) {
        let v_norm = norm2(v);
        if v_norm == 0.0 {
            out.fill(0.0);
            return;
        }
        let eps = f64::EPSILON.sqrt() * (1.0 + self.u_norm) / v_norm;
        let u_pert: Vec<f64> = self.u.iter().zip(v).map(|(&ui, &vi)| ui + eps * vi).collect();
        self.problem.eval_rhs(out, &u_pert, self.t);
        self.nfev.set(self.nfev.get() + 1);
        for (oi, &fi) in out.iter_mut().zip(self.f0) {
            *oi = (*oi - fi) / eps;
        }
    }
}

impl Indexing for JvProbe<'_> {
    fn nrows(&self) -> usize {
        self.u.len()
    }
}
