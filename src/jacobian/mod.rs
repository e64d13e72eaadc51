//! Jacobian strategies: analytic, dense finite-difference, colored
//! finite-difference, and matrix-free directional probes.
//!
//! The provider owns the Jacobian cache. The cache is rebuilt only on an
//! explicit `refresh` request (the Newton solver asks when its convergence
//! rate degrades), so a single evaluation is typically reused across many
//! steps. For stiff problems this reuse is the main performance lever.

pub mod finite_diff;
pub mod matrix_free;

pub use matrix_free::JvProbe;

use std::cell::Cell;

use crate::config::SolverOptions;
use crate::error::SolverError;
use crate::matrix::JacobianMatrix;
use crate::problem::OdeProblem;
use crate::utils::coloring::{color_columns, group_by_color};

/// How the Jacobian is obtained. Selected at problem construction, never
/// switched mid-run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JacobianStrategy {
    /// User-supplied `jac(J, u, p, t)` function.
    Analytic,
    /// One right-hand-side perturbation per state component.
    DenseFiniteDiff,
    /// One perturbation per color group of the sparsity prototype.
    ColoredFiniteDiff,
    /// Never materialized; only J·v directional probes.
    MatrixFree,
}

pub struct JacobianProvider {
    strategy: JacobianStrategy,
    storage: Option<JacobianMatrix>,
    /// Color groups (colored strategy only): groups[c] = columns of color c.
    groups: Vec<Vec<usize>>,
    fresh: bool,
    nfev: Cell<u64>,
    njev: u64,
    fevals_last_build: u64,
    #[cfg(feature = "rayon")]
    pool: Option<rayon::ThreadPool>,
}

impl JacobianProvider {
    /// Set up storage and coloring for the problem's strategy.
    pub fn for_problem(
        problem: &OdeProblem,
        options: &SolverOptions,
    ) -> Result<Self, SolverError> {
        #[cfg(not(feature = "rayon"))]
        let _ = options;
        let n = problem.n();
        let mut groups = Vec::new();
        let storage = match problem.strategy() {
            JacobianStrategy::Analytic | JacobianStrategy::DenseFiniteDiff => {
                Some(JacobianMatrix::zeros_dense(n))
            }
            JacobianStrategy::ColoredFiniteDiff => {
                let pattern = problem
                    .sparsity()
                    .ok_or(SolverError::InvalidProblem("colored strategy without prototype"))?;
                let colors = match &problem.coloring {
                    Some(c) => c.clone(),
                    None => color_columns(pattern),
                };
                groups = group_by_color(&colors);
                match pattern.bandwidths() {
                    Some((ml, mu)) => Some(JacobianMatrix::zeros_banded(n, ml, mu)),
                    None => Some(JacobianMatrix::zeros_dense(n)),
                }
            }
            JacobianStrategy::MatrixFree => None,
        };
        Ok(Self {
            strategy: problem.strategy(),
            storage,
            groups,
            fresh: false,
            nfev: Cell::new(0),
            njev: 0,
            fevals_last_build: 0,
            #[cfg(feature = "rayon")]
            pool: build_pool(options, problem.strategy()),
        })
    }

    pub fn strategy(&self) -> JacobianStrategy {
        self.strategy
    }

    /// The materialized Jacobian; `None` in matrix-free mode.
    pub fn matrix(&self) -> Option<&JacobianMatrix> {
        self.storage.as_ref()
    }

    /// True while the cache still reflects the last refresh point. Matrix-free
    /// probes are always taken at the current state, so they are never stale.
    pub fn is_fresh(&self) -> bool {
        self.fresh || self.strategy == JacobianStrategy::MatrixFree
    }

    /// Invalidate the cache; the next stage solve will rebuild it.
    pub fn mark_stale(&mut self) {
        self.fresh = false;
    }

    /// Rebuild the Jacobian cache at (u, t), given f0 = f(u, p, t).
    ///
    /// Reports `InvalidJacobianValue` when the user function or a
    /// finite-difference probe produces NaN/Inf; the caller treats that as a
    /// failed iteration, not a fatal error.
    pub fn refresh(
        &mut self,
        problem: &OdeProblem,
        u: &[f64],
        f0: &[f64],
        t: f64,
    ) -> Result<(), SolverError> {
        let fev_before = self.nfev.get();
        match self.strategy {
            JacobianStrategy::MatrixFree => {
                self.fresh = true;
                return Ok(());
            }
            JacobianStrategy::Analytic => {
                let Some(JacobianMatrix::Dense(j)) = self.storage.as_mut() else {
                    unreachable!("analytic strategy always has dense storage");
                };
                problem.eval_jac(j, u, t);
            }
            JacobianStrategy::DenseFiniteDiff => {
                let storage = self.storage.as_mut().expect("dense FD storage");
                finite_diff::dense(problem, u, f0, t, storage, &self.nfev);
            }
            JacobianStrategy::ColoredFiniteDiff => {
                let storage = self.storage.as_mut().expect("colored FD storage");
                #[cfg(feature = "rayon")]
                {
                    finite_diff::colored(
                        problem,
                        u,
                        f0,
                        t,
                        &self.groups,
                        storage,
                        &self.nfev,
                        self.pool.as_ref(),
                    );
                }
                #[cfg(not(feature = "rayon"))]
                {
                    finite_diff::colored(problem, u, f0, t, &self.groups, storage, &self.nfev);
                }
            }
        }
        self.njev += 1;
        self.fevals_last_build = self.nfev.get() - fev_before;
        let ok = self.storage.as_ref().is_none_or(|s| s.all_finite());
        if !ok {
            // Poisoned cache: leave it marked stale so nothing reuses it.
            self.fresh = false;
            return Err(SolverError::InvalidJacobianValue { t });
        }
        self.fresh = true;
        Ok(())
    }

    /// Directional-derivative operator J·v at (u, t), for Krylov solves.
    pub fn probe<'a>(
        &'a self,
        problem: &'a OdeProblem,
        u: &'a [f64],
        f0: &'a [f64],
        t: f64,
    ) -> JvProbe<'a> {
        JvProbe::new(problem, u, f0, t, &self.nfev)
    }

    /// Number of distinct colors (colored strategy only).
    pub fn ncolors(&self) -> Option<usize> {
        if self.strategy == JacobianStrategy::ColoredFiniteDiff {
            Some(self.groups.len())
        } else {
            None
        }
    }

    /// Right-hand-side evaluations spent inside this provider so far.
    pub fn nfev(&self) -> u64 {
        self.nfev.get()
    }

    /// Number of Jacobian builds so far.
    pub fn njev(&self) -> u64 {
        self.njev
    }

    /// Right-hand-side evaluations consumed by the most recent build.
    pub fn fevals_last_build(&self) -> u64 {
        self.fevals_last_build
    }
}

#[cfg(feature = "rayon")]
fn build_pool(options: &SolverOptions, strategy: JacobianStrategy) -> Option<rayon::ThreadPool> {
    if strategy != JacobianStrategy::ColoredFiniteDiff {
        return None;
    }
    let threads = options.num_threads.unwrap_or_else(num_cpus::get);
    if threads <= 1 {
        return None;
    }
    rayon::ThreadPoolBuilder::new().num_threads(threads).build().ok()
}
