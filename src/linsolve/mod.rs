//! Linear solvers for the iteration matrix W = M − h·γ·J.
//!
//! Direct factorization (dense or banded LU) for materialized Jacobians, and
//! restarted GMRES over the matrix-free operator for the Jacobian-free path.
//! Factorizations are cached and reused until the Jacobian is refreshed or
//! the step size changes; that caching is the dominant optimization for
//! stiff systems.

pub mod direct;
pub mod gmres;
pub mod preconditioner;

pub use direct::DirectSolver;
pub use gmres::{GmresSolver, Preconditioning};
pub use preconditioner::{IdentityPc, JacobiPc, Preconditioner};

use crate::config::SolverOptions;
use crate::core::traits::{Indexing, MatVec};
use crate::error::SolverError;
use crate::jacobian::JvProbe;
use crate::matrix::MassMatrix;
use crate::utils::convergence::SolveStats;

/// Which linear solver handles the stage systems.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinearSolverKind {
    /// LU factorization of the materialized W (dense or banded).
    Direct,
    /// Restarted GMRES through J·v probes; never materializes W.
    Gmres,
}

/// W = M − scale·J as an implicit operator over a directional probe.
pub struct WOperator<'a> {
    mass: &'a MassMatrix,
    probe: JvProbe<'a>,
    scale: f64,
}

impl<'a> WOperator<'a> {
    pub fn new(mass: &'a MassMatrix, probe: JvProbe<'a>, scale: f64) -> Self {
        Self { mass, probe, scale }
    }
}

impl MatVec<f64> for WOperator<'_> {
    fn matvec(&self, x: &[f64], y: &mut [f64]) {
        let mut jv = vec![0.0; x.len()];
        self.probe.matvec(x, &mut jv);
        self.mass.matvec_into(x, y);
        for (yi, &jvi) in y.iter_mut().zip(&jv) {
            *yi -= self.scale * jvi;
        }
    }
}

impl Indexing for WOperator<'_> {
    fn nrows(&self) -> usize {
        self.probe.nrows()
    }
}

/// Krylov stage solver: GMRES plus an optional preconditioner.
pub struct KrylovSolver {
    gmres: GmresSolver<f64>,
    pc: Option<Box<dyn Preconditioner<f64> + Send>>,
    iterations: u64,
}

impl KrylovSolver {
    pub fn from_options(options: &SolverOptions) -> Self {
        Self {
            gmres: GmresSolver::new(options.gmres_restart, options.gmres_tol, options.gmres_max_iters),
            pc: None,
            iterations: 0,
        }
    }

    pub fn set_preconditioner(&mut self, pc: Box<dyn Preconditioner<f64> + Send>) {
        self.pc = Some(pc);
    }

    /// Solve W x = b; Krylov non-convergence is a recoverable failure that
    /// the caller answers with a step-size reduction.
    pub fn solve(&mut self, op: &WOperator<'_>, b: &[f64], x: &mut [f64]) -> Result<SolveStats<f64>, SolverError> {
        debug_assert_eq!(op.nrows(), b.len());
        x.fill(0.0);
        let pc = self.pc.as_deref().map(|p| p as &dyn Preconditioner<f64>);
        let stats = self.gmres.solve(op, pc, b, x)?;
        self.iterations += stats.iterations as u64;
        if !stats.converged {
            return Err(SolverError::LinearSolverFailure(format!(
                "gmres stalled at residual {:e} after {} iterations",
                stats.final_residual, stats.iterations
            )));
        }
        Ok(stats)
    }

    /// Cumulative Krylov iterations across the run.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }
}
