use thiserror::Error;

// Unified error type for stode.
//
// Every variant except StepSizeUnderflow and MaxStepsExceeded is first
// handled internally by step rejection and step-size reduction; it reaches
// the caller only once the consecutive-rejection budget is spent. The last
// accepted state and time stay queryable on the integrator after a failure.

#[derive(Error, Debug, Clone)]
pub enum SolverError {
    #[error("newton iteration failed to converge at t = {t} after {rejections} consecutive rejected steps")]
    NonConvergence { t: f64, rejections: usize },
    #[error("singular iteration matrix at t = {t} (zero pivot in row {row})")]
    SingularJacobian { t: f64, row: usize },
    #[error("linear solve failed: {0}")]
    LinearSolverFailure(String),
    #[error("step size underflow at t = {t}: h = {h:e} below minimum {h_min:e}")]
    StepSizeUnderflow { t: f64, h: f64, h_min: f64 },
    #[error("non-finite value in Jacobian evaluation at t = {t}")]
    InvalidJacobianValue { t: f64 },
    #[error("maximum step count exceeded ({0} steps)")]
    MaxStepsExceeded(usize),
    #[error("invalid problem: {0}")]
    InvalidProblem(&'static str),
}
