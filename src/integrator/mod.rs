//! Adaptive TR-BDF2 stepper for M u' = f(u, p, t).
//!
//! One step solves two implicit stages sharing the iteration matrix
//! W = M − h·γ·J, estimates the local error with the embedded third-order
//! weights, and drives a power-law step controller in the WRMS norm. The
//! Jacobian and the factorization of W are reused across steps until the
//! Newton convergence rate says otherwise; for stiff problems almost all of
//! the cost sits in those two caches.

mod tableau;

use crate::config::SolverOptions;
use crate::error::SolverError;
use crate::jacobian::{JacobianProvider, JacobianStrategy};
use crate::linsolve::{DirectSolver, KrylovSolver, LinearSolverKind, Preconditioner, WOperator};
use crate::newton::{NewtonSolver, StageError, StageSolver};
use crate::problem::OdeProblem;
use crate::utils::norms::{error_weights, wrms};

/// One accepted step: the state at `t`, the step size that produced it, and
/// the WRMS error estimate (at most 1 for accepted steps).
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub t: f64,
    pub u: Vec<f64>,
    pub h: f64,
    pub error_norm: f64,
}

/// Work counters for one integration run.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Step attempts, accepted or not.
    pub steps: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Right-hand-side evaluations, including finite-difference probes.
    pub nfev: u64,
    /// Jacobian builds.
    pub njev: u64,
    /// LU factorizations of W (direct path only).
    pub factorizations: u64,
    pub newton_iters: u64,
    /// Cumulative GMRES iterations (Krylov path only).
    pub krylov_iters: u64,
}

/// Result of one `step` call.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step was accepted; time advanced to `record.t`.
    Advanced(StepRecord),
    /// The end of the time span was already reached.
    Finished,
}

struct Attempt {
    u: Vec<f64>,
    k3: Vec<f64>,
    err_norm: f64,
}

enum AttemptError {
    /// Newton diverged or the estimate went non-finite.
    Diverged,
    /// A solver-level failure worth remembering for escalation.
    Solver(SolverError),
}

/// Adaptive implicit integrator over a borrowed problem.
///
/// `step` advances one accepted step at a time so callers can cancel between
/// steps; `solve` runs to the end of the time span. After an error the last
/// accepted state stays queryable through `t` and `state`.
pub struct Integrator<'p> {
    problem: &'p OdeProblem,
    options: SolverOptions,
    provider: JacobianProvider,
    newton: NewtonSolver,
    linear: StageSolver,
    t: f64,
    u: Vec<f64>,
    h: f64,
    /// f(u, t) at the current state; TR-BDF2 is stiffly accurate, so the last
    /// stage derivative of an accepted step carries over for free.
    k1: Vec<f64>,
    /// True only while the cached Jacobian was evaluated at exactly (u, t).
    jac_current: bool,
    trajectory: Vec<StepRecord>,
    consecutive_rejections: usize,
    last_failure: Option<SolverError>,
    nfev: u64,
    newton_iters: u64,
    steps: u64,
    accepted: u64,
    rejected: u64,
    finished: bool,
}

impl<'p> Integrator<'p> {
    pub fn new(problem: &'p OdeProblem, options: SolverOptions) -> Result<Self, SolverError> {
        if options.linear_solver == LinearSolverKind::Direct
            && problem.strategy() == JacobianStrategy::MatrixFree
        {
            return Err(SolverError::InvalidProblem(
                "matrix-free jacobians require the gmres linear solver",
            ));
        }
        let provider = JacobianProvider::for_problem(problem, &options)?;
        let newton =
            NewtonSolver::new(options.max_newton_iters, options.newton_tol, options.newton_damping);
        let linear = match options.linear_solver {
            LinearSolverKind::Direct => StageSolver::Direct(DirectSolver::new()),
            LinearSolverKind::Gmres => StageSolver::Krylov(KrylovSolver::from_options(&options)),
        };
        let (t0, t1) = problem.t_span();
        let u = problem.u0().to_vec();
        let n = u.len();
        let mut this = Self {
            problem,
            options,
            provider,
            newton,
            linear,
            t: t0,
            u,
            h: 0.0,
            k1: vec![0.0; n],
            jac_current: false,
            trajectory: Vec::new(),
            consecutive_rejections: 0,
            last_failure: None,
            nfev: 0,
            newton_iters: 0,
            steps: 0,
            accepted: 0,
            rejected: 0,
            finished: false,
        };
        this.trajectory.push(StepRecord { t: t0, u: this.u.clone(), h: 0.0, error_norm: 0.0 });
        this.problem.eval_rhs(&mut this.k1, &this.u, t0);
        this.nfev += 1;
        this.h = match this.options.h0 {
            Some(h0) => h0.min(t1 - t0).max(this.options.h_min),
            None => this.initial_step(),
        };
        Ok(this)
    }

    /// Current time (last accepted step).
    pub fn t(&self) -> f64 {
        self.t
    }

    /// Current state (last accepted step).
    pub fn state(&self) -> &[f64] {
        &self.u
    }

    /// All accepted steps so far, starting with the initial state.
    pub fn trajectory(&self) -> &[StepRecord] {
        &self.trajectory
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Attach a preconditioner to the Krylov stage solver, e.g. a
    /// [`JacobiPc`](crate::linsolve::JacobiPc) built from an approximate
    /// diagonal of W. The direct path factorizes W exactly and takes none.
    pub fn set_preconditioner(
        &mut self,
        pc: Box<dyn Preconditioner<f64> + Send>,
    ) -> Result<(), SolverError> {
        match &mut self.linear {
            StageSolver::Krylov(k) => {
                k.set_preconditioner(pc);
                Ok(())
            }
            StageSolver::Direct(_) => Err(SolverError::InvalidProblem(
                "a preconditioner requires the gmres linear solver",
            )),
        }
    }

    /// Work counters, merged across the stepper and its solver components.
    pub fn stats(&self) -> Stats {
        let (factorizations, krylov_iters) = match &self.linear {
            StageSolver::Direct(d) => (d.factorizations(), 0),
            StageSolver::Krylov(k) => (0, k.iterations()),
        };
        Stats {
            steps: self.steps,
            accepted: self.accepted,
            rejected: self.rejected,
            nfev: self.nfev + self.provider.nfev(),
            njev: self.provider.njev(),
            factorizations,
            newton_iters: self.newton_iters,
            krylov_iters,
        }
    }

    /// Run until the end of the time span.
    pub fn solve(&mut self) -> Result<(), SolverError> {
        loop {
            match self.step()? {
                StepOutcome::Finished => return Ok(()),
                StepOutcome::Advanced(_) => {}
            }
        }
    }

    /// Advance by one accepted step.
    ///
    /// Retries internally across rejections; returns only once a step is
    /// accepted, the span is finished, or a failure escalates. Local solver
    /// failures first trigger a Jacobian refresh (when the cache is not
    /// already at the current state), then step halving; `NonConvergence`,
    /// `StepSizeUnderflow`, or the remembered failure surfaces only after the
    /// rejection budget is spent.
    pub fn step(&mut self) -> Result<StepOutcome, SolverError> {
        if self.finished {
            return Ok(StepOutcome::Finished);
        }
        let (_, t_end) = self.problem.t_span();
        let mut tried_refresh = false;
        loop {
            let remaining = t_end - self.t;
            if remaining <= t_end.abs().max(1.0) * f64::EPSILON {
                self.finished = true;
                return Ok(StepOutcome::Finished);
            }
            if self.steps >= self.options.max_steps as u64 {
                self.finished = true;
                return Err(SolverError::MaxStepsExceeded(self.options.max_steps));
            }
            let h = self.h.min(remaining);
            self.steps += 1;

            match self.attempt(h) {
                Ok(att) if att.err_norm <= 1.0 => {
                    self.t += h;
                    self.u = att.u;
                    self.k1 = att.k3;
                    self.jac_current = false;
                    self.consecutive_rejections = 0;
                    self.last_failure = None;
                    self.accepted += 1;
                    let factor = if att.err_norm > 0.0 {
                        (self.options.safety * att.err_norm.powf(-tableau::ERR_EXPONENT))
                            .clamp(self.options.min_factor, self.options.max_factor)
                    } else {
                        self.options.max_factor
                    };
                    self.h = h * factor;
                    let record = StepRecord {
                        t: self.t,
                        u: self.u.clone(),
                        h,
                        error_norm: att.err_norm,
                    };
                    self.trajectory.push(record.clone());
                    if t_end - self.t <= t_end.abs().max(1.0) * f64::EPSILON {
                        self.finished = true;
                    }
                    return Ok(StepOutcome::Advanced(record));
                }
                Ok(att) => {
                    // Accuracy rejection: shrink by the controller, keep the
                    // cached Jacobian (only the W factorization goes stale).
                    self.rejected += 1;
                    self.consecutive_rejections += 1;
                    let factor = (self.options.safety
                        * att.err_norm.powf(-tableau::ERR_EXPONENT))
                    .clamp(self.options.min_factor, 1.0);
                    self.h = h * factor;
                    tried_refresh = false;
                    self.after_rejection()?;
                }
                Err(e) => {
                    if let AttemptError::Solver(err) = &e {
                        self.last_failure = Some(err.clone());
                    }
                    let can_refresh = !tried_refresh
                        && !self.jac_current
                        && self.provider.matrix().is_some();
                    if can_refresh {
                        // Blame the stale Jacobian first and retry at the same
                        // step size before spending a rejection on it.
                        tried_refresh = true;
                        self.provider.mark_stale();
                        if let StageSolver::Direct(d) = &mut self.linear {
                            d.invalidate();
                        }
                        continue;
                    }
                    self.rejected += 1;
                    self.consecutive_rejections += 1;
                    self.h = h * 0.5;
                    tried_refresh = false;
                    self.after_rejection()?;
                }
            }
        }
    }

    /// One TR-BDF2 attempt at step size `h`; does not move `t` or `u`.
    fn attempt(&mut self, h: f64) -> Result<Attempt, AttemptError> {
        let problem = self.problem;
        let n = problem.n();
        let scale = h * tableau::GAMMA;
        self.ensure_linear(scale).map_err(AttemptError::Solver)?;

        let mut weights = vec![0.0; n];
        error_weights(&mut weights, &self.u, &self.u, self.options.rtol, self.options.atol);

        // Stage 2 at t + 2γh, predicted by the explicit first stage.
        let t2 = self.t + tableau::C2 * h;
        let mut acc = vec![0.0; n];
        let mut guess = vec![0.0; n];
        for i in 0..n {
            acc[i] = h * tableau::A21 * self.k1[i];
            guess[i] = self.u[i] + tableau::C2 * h * self.k1[i];
        }
        let out2 = match self.newton.solve_stage(
            problem,
            &self.provider,
            &mut self.linear,
            problem.mass(),
            &self.u,
            &acc,
            t2,
            scale,
            &guess,
            &weights,
        ) {
            Ok(o) => {
                self.newton_iters += o.iters as u64;
                self.nfev += o.iters as u64;
                o
            }
            Err(e) => return Err(self.stage_failure(e)),
        };
        let mut k2 = vec![0.0; n];
        problem.eval_rhs(&mut k2, &out2.u, t2);
        self.nfev += 1;

        // Stage 3 at t + h; its solution is the step solution.
        let t3 = self.t + tableau::C3 * h;
        for i in 0..n {
            acc[i] = h * (tableau::A31 * self.k1[i] + tableau::A32 * k2[i]);
            guess[i] = self.u[i]
                + h * (tableau::A31 * self.k1[i] + (tableau::A32 + tableau::GAMMA) * k2[i]);
        }
        let out3 = match self.newton.solve_stage(
            problem,
            &self.provider,
            &mut self.linear,
            problem.mass(),
            &self.u,
            &acc,
            t3,
            scale,
            &guess,
            &weights,
        ) {
            Ok(o) => {
                self.newton_iters += o.iters as u64;
                self.nfev += o.iters as u64;
                o
            }
            Err(e) => return Err(self.stage_failure(e)),
        };
        let mut k3 = vec![0.0; n];
        problem.eval_rhs(&mut k3, &out3.u, t3);
        self.nfev += 1;

        if out2.rate.max(out3.rate) > self.options.jac_reuse_threshold {
            self.provider.mark_stale();
        }

        // Embedded estimate, filtered through W⁻¹M so algebraic (singular
        // mass) components stay consistent and stiff components are damped.
        let ew = tableau::err_weights();
        let mut e_raw = vec![0.0; n];
        for i in 0..n {
            e_raw[i] = h * (ew[0] * self.k1[i] + ew[1] * k2[i] + ew[2] * k3[i]);
        }
        let mut rhs = vec![0.0; n];
        problem.mass().matvec_into(&e_raw, &mut rhs);
        let mut e = vec![0.0; n];
        match &mut self.linear {
            StageSolver::Direct(d) => {
                d.solve(&rhs, &mut e).map_err(AttemptError::Solver)?;
            }
            StageSolver::Krylov(kr) => {
                let op = WOperator::new(
                    problem.mass(),
                    self.provider.probe(problem, &out3.u, &k3, t3),
                    scale,
                );
                kr.solve(&op, &rhs, &mut e).map_err(AttemptError::Solver)?;
            }
        }
        error_weights(&mut weights, &self.u, &out3.u, self.options.rtol, self.options.atol);
        let err_norm = wrms(&e, &weights);
        if !err_norm.is_finite() {
            return Err(AttemptError::Diverged);
        }
        Ok(Attempt { u: out3.u, k3, err_norm })
    }

    /// Refresh the Jacobian cache if stale, then make sure the direct solver
    /// holds a factorization for this scale = h·γ.
    fn ensure_linear(&mut self, scale: f64) -> Result<(), SolverError> {
        if !self.provider.is_fresh() {
            self.provider.refresh(self.problem, &self.u, &self.k1, self.t)?;
            self.jac_current = true;
            if let StageSolver::Direct(d) = &mut self.linear {
                d.invalidate();
            }
        }
        if let StageSolver::Direct(d) = &mut self.linear {
            if d.needs_factorization(scale) {
                let jac = self.provider.matrix().ok_or(SolverError::InvalidProblem(
                    "direct solver requires a materialized jacobian",
                ))?;
                d.factorize(self.problem.mass(), jac, scale, self.t)?;
            }
        }
        Ok(())
    }

    fn stage_failure(&mut self, e: StageError) -> AttemptError {
        match e {
            StageError::Diverged { iters } => {
                self.newton_iters += iters as u64;
                self.nfev += iters as u64;
                AttemptError::Diverged
            }
            StageError::Linear { err, iters } => {
                self.newton_iters += iters as u64;
                self.nfev += iters as u64;
                AttemptError::Solver(err)
            }
        }
    }

    /// Underflow and escalation checks after any rejection.
    fn after_rejection(&mut self) -> Result<(), SolverError> {
        if self.h < self.options.h_min {
            self.finished = true;
            return Err(SolverError::StepSizeUnderflow {
                t: self.t,
                h: self.h,
                h_min: self.options.h_min,
            });
        }
        if self.consecutive_rejections >= self.options.max_rejections {
            self.finished = true;
            let err = self.last_failure.clone().unwrap_or(SolverError::NonConvergence {
                t: self.t,
                rejections: self.consecutive_rejections,
            });
            return Err(err);
        }
        Ok(())
    }

    /// Starting step size in the style of Hairer & Wanner §II.4, using two
    /// extra derivative evaluations. Non-identity mass falls back to a small
    /// fraction of the span since u' is not directly available there.
    fn initial_step(&mut self) -> f64 {
        let (t0, t1) = self.problem.t_span();
        let span = t1 - t0;
        if !self.problem.mass().is_identity() {
            return (1e-6 * span).max(self.options.h_min);
        }
        let n = self.u.len();
        let mut w = vec![0.0; n];
        error_weights(&mut w, &self.u, &self.u, self.options.rtol, self.options.atol);
        let d0 = wrms(&self.u, &w);
        let d1 = wrms(&self.k1, &w);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * (d0 / d1) };
        let h0 = h0.min(span);
        let u1: Vec<f64> =
            self.u.iter().zip(&self.k1).map(|(&ui, &fi)| ui + h0 * fi).collect();
        let mut f1 = vec![0.0; n];
        self.problem.eval_rhs(&mut f1, &u1, t0 + h0);
        self.nfev += 1;
        let diff: Vec<f64> = f1.iter().zip(&self.k1).map(|(&a, &b)| a - b).collect();
        let d2 = wrms(&diff, &w) / h0;
        let h1 = if d1.max(d2) <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(tableau::ERR_EXPONENT)
        };
        (100.0 * h0).min(h1).min(span).max(self.options.h_min)
    }
}
