//! Integration options.
//!
//! This module provides the `SolverOptions` struct with every tunable of the
//! stepper: tolerances, step-size controller limits, Newton and Krylov
//! budgets, and the shared-memory thread count. Thread count is an explicit
//! construction parameter rather than process-wide state, so two integrations
//! in one process can use different settings.

use crate::linsolve::LinearSolverKind;

/// Tolerances and controller parameters for one integration run.
///
/// Defaults follow common stiff-solver practice: `rtol = 1e-3`,
/// `atol = 1e-6`, safety factor 0.9, step-scale clamp [0.2, 10].
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Relative tolerance (componentwise, WRMS-combined).
    pub rtol: f64,
    /// Absolute tolerance (componentwise, WRMS-combined).
    pub atol: f64,
    /// Initial step size. `None` selects it automatically.
    pub h0: Option<f64>,
    /// Smallest step size before the run aborts with `StepSizeUnderflow`.
    pub h_min: f64,
    /// Hard cap on attempted steps per `solve` call.
    pub max_steps: usize,
    /// Safety factor in the power-law step controller.
    pub safety: f64,
    /// Lower clamp on the step-scale factor.
    pub min_factor: f64,
    /// Upper clamp on the step-scale factor (growth cap).
    pub max_factor: f64,
    /// Newton iteration cap per implicit stage.
    pub max_newton_iters: usize,
    /// Newton convergence target, as a fraction of the step tolerance
    /// (the update must satisfy `wrms(delta) <= newton_tol`).
    pub newton_tol: f64,
    /// Damping applied to each Newton update.
    pub newton_damping: f64,
    /// Convergence rate above which the cached Jacobian is declared stale.
    pub jac_reuse_threshold: f64,
    /// Consecutive rejected steps before the run aborts.
    pub max_rejections: usize,
    /// Linear solver for the iteration matrix W = M - h*gamma*J.
    pub linear_solver: LinearSolverKind,
    /// GMRES restart length (Krylov path only).
    pub gmres_restart: usize,
    /// GMRES relative residual tolerance.
    pub gmres_tol: f64,
    /// GMRES total iteration cap across restarts.
    pub gmres_max_iters: usize,
    /// Threads for colored finite-difference evaluation. `None` uses all
    /// available cores; ignored without the `rayon` feature.
    pub num_threads: Option<usize>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            h0: None,
            h_min: 1e-13,
            max_steps: 100_000,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
            max_newton_iters: 7,
            newton_tol: 1e-2,
            newton_damping: 1.0,
            jac_reuse_threshold: 0.5,
            max_rejections: 10,
            linear_solver: LinearSolverKind::Direct,
            gmres_restart: 30,
            gmres_tol: 1e-8,
            gmres_max_iters: 200,
            num_threads: None,
        }
    }
}

impl SolverOptions {
    /// Override both tolerances at once.
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    /// Select the linear solver for the stage systems.
    pub fn with_linear_solver(mut self, kind: LinearSolverKind) -> Self {
        self.linear_solver = kind;
        self
    }

    /// Fix the initial step size instead of selecting it automatically.
    pub fn with_initial_step(mut self, h0: f64) -> Self {
        self.h0 = Some(h0);
        self
    }
}
