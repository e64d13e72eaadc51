//! Problem definition: the immutable bundle handed to the integrator.

use faer::Mat;

use crate::error::SolverError;
use crate::jacobian::JacobianStrategy;
use crate::matrix::{MassMatrix, SparsityPattern};
use crate::utils::coloring::is_valid_coloring;

/// Right-hand side, fill-in-place: `f(du, u, p, t)` writes du = f(u, p, t).
pub type RhsFn = dyn Fn(&mut [f64], &[f64], &[f64], f64) + Send + Sync;

/// Analytic Jacobian, fill-in-place: `jac(J, u, p, t)` writes ∂f/∂u.
pub type JacFn = dyn Fn(&mut Mat<f64>, &[f64], &[f64], f64) + Send + Sync;

/// Immutable description of one initial value problem.
///
/// Built once via [`OdeProblem::builder`]; the integrator never mutates it.
pub struct OdeProblem {
    pub(crate) rhs: Box<RhsFn>,
    pub(crate) jac: Option<Box<JacFn>>,
    pub(crate) mass: MassMatrix,
    pub(crate) sparsity: Option<SparsityPattern>,
    pub(crate) coloring: Option<Vec<usize>>,
    pub(crate) strategy: JacobianStrategy,
    pub(crate) params: Vec<f64>,
    pub(crate) t_span: (f64, f64),
    pub(crate) u0: Vec<f64>,
}

impl OdeProblem {
    pub fn builder(
        u0: Vec<f64>,
        t_span: (f64, f64),
        rhs: impl Fn(&mut [f64], &[f64], &[f64], f64) + Send + Sync + 'static,
    ) -> OdeProblemBuilder {
        OdeProblemBuilder {
            rhs: Box::new(rhs),
            jac: None,
            mass: MassMatrix::Identity,
            sparsity: None,
            coloring: None,
            strategy: None,
            params: Vec::new(),
            t_span,
            u0,
        }
    }

    /// State dimension.
    pub fn n(&self) -> usize {
        self.u0.len()
    }

    pub fn t_span(&self) -> (f64, f64) {
        self.t_span
    }

    pub fn u0(&self) -> &[f64] {
        &self.u0
    }

    pub fn mass(&self) -> &MassMatrix {
        &self.mass
    }

    pub fn strategy(&self) -> JacobianStrategy {
        self.strategy
    }

    pub fn sparsity(&self) -> Option<&SparsityPattern> {
        self.sparsity.as_ref()
    }

    /// Evaluate du = f(u, p, t) with the stored parameter vector.
    pub fn eval_rhs(&self, du: &mut [f64], u: &[f64], t: f64) {
        (self.rhs)(du, u, &self.params, t);
    }

    pub(crate) fn eval_jac(&self, j: &mut Mat<f64>, u: &[f64], t: f64) {
        if let Some(jac) = &self.jac {
            jac(j, u, &self.params, t);
        }
    }
}

/// Builder for [`OdeProblem`]; `build` validates cross-field consistency.
pub struct OdeProblemBuilder {
    rhs: Box<RhsFn>,
    jac: Option<Box<JacFn>>,
    mass: MassMatrix,
    sparsity: Option<SparsityPattern>,
    coloring: Option<Vec<usize>>,
    strategy: Option<JacobianStrategy>,
    params: Vec<f64>,
    t_span: (f64, f64),
    u0: Vec<f64>,
}

impl OdeProblemBuilder {
    /// Supply an analytic Jacobian function.
    pub fn jacobian(
        mut self,
        jac: impl Fn(&mut Mat<f64>, &[f64], &[f64], f64) + Send + Sync + 'static,
    ) -> Self {
        self.jac = Some(Box::new(jac));
        self
    }

    /// Attach a mass matrix (singular diagonals encode DAE constraints).
    pub fn mass(mut self, mass: MassMatrix) -> Self {
        self.mass = mass;
        self
    }

    /// Declare the Jacobian sparsity prototype; fixed for the whole run.
    pub fn sparsity(mut self, pattern: SparsityPattern) -> Self {
        self.sparsity = Some(pattern);
        self
    }

    /// Supply a precomputed column coloring instead of the greedy default.
    pub fn coloring(mut self, colors: Vec<usize>) -> Self {
        self.coloring = Some(colors);
        self
    }

    /// Force a Jacobian strategy instead of inferring one.
    pub fn jacobian_strategy(mut self, strategy: JacobianStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn params(mut self, params: Vec<f64>) -> Self {
        self.params = params;
        self
    }

    pub fn build(self) -> Result<OdeProblem, SolverError> {
        let n = self.u0.len();
        if n == 0 {
            return Err(SolverError::InvalidProblem("empty initial state"));
        }
        if !(self.t_span.1 > self.t_span.0) {
            return Err(SolverError::InvalidProblem("time span must satisfy t1 > t0"));
        }
        if let Some(dim) = self.mass.dim() {
            if dim != n {
                return Err(SolverError::InvalidProblem("mass matrix dimension mismatch"));
            }
        }
        if let Some(p) = &self.sparsity {
            if p.nrows() != n || p.ncols() != n {
                return Err(SolverError::InvalidProblem("sparsity prototype dimension mismatch"));
            }
        }
        // Strategy inference: analytic beats colored beats dense FD.
        let strategy = match self.strategy {
            Some(s) => s,
            None if self.jac.is_some() => JacobianStrategy::Analytic,
            None if self.sparsity.is_some() => JacobianStrategy::ColoredFiniteDiff,
            None => JacobianStrategy::DenseFiniteDiff,
        };
        match strategy {
            JacobianStrategy::Analytic if self.jac.is_none() => {
                return Err(SolverError::InvalidProblem(
                    "analytic strategy requires a jacobian function",
                ));
            }
            JacobianStrategy::ColoredFiniteDiff if self.sparsity.is_none() => {
                return Err(SolverError::InvalidProblem(
                    "colored strategy requires a sparsity prototype",
                ));
            }
            _ => {}
        }
        if let Some(colors) = &self.coloring {
            let Some(pattern) = &self.sparsity else {
                return Err(SolverError::InvalidProblem(
                    "a coloring requires a sparsity prototype",
                ));
            };
            if !is_valid_coloring(pattern, colors) {
                return Err(SolverError::InvalidProblem(
                    "coloring assigns one color to two columns sharing a row",
                ));
            }
        }
        Ok(OdeProblem {
            rhs: self.rhs,
            jac: self.jac,
            mass: self.mass,
            sparsity: self.sparsity,
            coloring: self.coloring,
            strategy,
            params: self.params,
            t_span: self.t_span,
            u0: self.u0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay(du: &mut [f64], u: &[f64], _p: &[f64], _t: f64) {
        du[0] = -u[0];
    }

    #[test]
    fn infers_dense_fd_without_hints() {
        let p = OdeProblem::builder(vec![1.0], (0.0, 1.0), decay).build().unwrap();
        assert_eq!(p.strategy(), JacobianStrategy::DenseFiniteDiff);
    }

    #[test]
    fn infers_analytic_when_jac_given() {
        let p = OdeProblem::builder(vec![1.0], (0.0, 1.0), decay)
            .jacobian(|j, _u, _p, _t| j[(0, 0)] = -1.0)
            .build()
            .unwrap();
        assert_eq!(p.strategy(), JacobianStrategy::Analytic);
    }

    #[test]
    fn rejects_reversed_time_span() {
        let err = OdeProblem::builder(vec![1.0], (1.0, 0.0), decay).build();
        assert!(matches!(err, Err(SolverError::InvalidProblem(_))));
    }

    #[test]
    fn rejects_bad_coloring() {
        let err = OdeProblem::builder(vec![1.0, 1.0], (0.0, 1.0), |du, u, _p, _t| {
            du[0] = -u[0] + u[1];
            du[1] = u[0] - u[1];
        })
        .sparsity(SparsityPattern::dense(2))
        .coloring(vec![0, 0])
        .build();
        assert!(matches!(err, Err(SolverError::InvalidProblem(_))));
    }

    #[test]
    fn colored_without_pattern_is_invalid() {
        let err = OdeProblem::builder(vec![1.0], (0.0, 1.0), decay)
            .jacobian_strategy(JacobianStrategy::ColoredFiniteDiff)
            .build();
        assert!(matches!(err, Err(SolverError::InvalidProblem(_))));
    }
}
