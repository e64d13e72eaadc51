//! Finite-difference Jacobian builders (forward differences).
//!
//! The dense builder perturbs one component per evaluation, O(n) rhs calls.
//! The colored builder perturbs a whole color group at once and recovers the
//! individual entries from the sparsity prototype, so the cost drops to one
//! rhs call per color. Color groups are independent and may be evaluated in
//! parallel; that parallelism is invisible above this module.

use std::cell::Cell;

use crate::matrix::JacobianMatrix;
use crate::problem::OdeProblem;

/// Forward-difference step for column j: sqrt(machine eps) scaled to |u_j|.
#[inline]
pub(crate) fn fd_delta(uj: f64) -> f64 {
    f64::EPSILON.sqrt() * (1.0 + uj.abs())
}

/// Dense finite differences: J[:, j] = (f(u + δ_j e_j) - f0) / δ_j.
pub(crate) fn dense(
    problem: &OdeProblem,
    u: &[f64],
    f0: &[f64],
    t: f64,
    storage: &mut JacobianMatrix,
    nfev: &Cell<u64>,
) {
    let n = u.len();
    let mut u_pert = u.to_vec();
    let mut f_pert = vec![0.0; n];
    for j in 0..n {
        let delta = fd_delta(u[j]);
        u_pert[j] = u[j] + delta;
        problem.eval_rhs(&mut f_pert, &u_pert, t);
        nfev.set(nfev.get() + 1);
        u_pert[j] = u[j];
        for i in 0..n {
            storage.set(i, j, (f_pert[i] - f0[i]) / delta);
        }
    }
}

/// Colored finite differences: one perturbed evaluation per color group.
///
/// Every column in a group gets its own δ_j; the difference vector is then
/// scattered back through the prototype, which is valid because no two
/// columns of one group share a structurally nonzero row.
#[allow(clippy::too_many_arguments)]
pub(crate) fn colored(
    problem: &OdeProblem,
    u: &[f64],
    f0: &[f64],
    t: f64,
    groups: &[Vec<usize>],
    storage: &mut JacobianMatrix,
    nfev: &Cell<u64>,
    #[cfg(feature = "rayon")] pool: Option<&rayon::ThreadPool>,
) {
    let deltas: Vec<f64> = u.iter().map(|&uj| fd_delta(uj)).collect();

    let eval_group = |group: &Vec<usize>| -> Vec<f64> {
        let mut u_pert = u.to_vec();
        for &j in group {
            u_pert[j] += deltas[j];
        }
        let mut f_pert = vec![0.0; u.len()];
        problem.eval_rhs(&mut f_pert, &u_pert, t);
        f_pert
    };

    #[cfg(feature = "rayon")]
    let diffs: Vec<Vec<f64>> = match pool {
        Some(pool) => {
            use rayon::prelude::*;
            pool.install(|| groups.par_iter().map(eval_group).collect())
        }
        None => groups.iter().map(eval_group).collect(),
    };
    #[cfg(not(feature = "rayon"))]
    let diffs: Vec<Vec<f64>> = groups.iter().map(eval_group).collect();

    nfev.set(nfev.get() + groups.len() as u64);

    for (group, f_pert) in groups.iter().zip(&diffs) {
        for &j in group {
            scatter_column(problem, storage, j, f0, f_pert, deltas[j]);
        }
    }
}

/// Write column j of the Jacobian from one group difference, touching only
/// the structural entries of that column.
fn scatter_column(
    problem: &OdeProblem,
    storage: &mut JacobianMatrix,
    j: usize,
    f0: &[f64],
    f_pert: &[f64],
    delta: f64,
) {
    match storage {
        JacobianMatrix::Banded(b) => {
            let (lo, hi) = b.col_rows(j);
            for i in lo..=hi {
                b.set(i, j, (f_pert[i] - f0[i]) / delta);
            }
        }
        JacobianMatrix::Dense(m) => {
            let pattern = problem
                .sparsity()
                .expect("colored strategy requires a sparsity prototype");
            for &i in pattern.rows_in_col(j) {
                m[(i, j)] = (f_pert[i] - f0[i]) / delta;
            }
        }
    }
}
