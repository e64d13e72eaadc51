//! Matrix representations for Jacobians and mass matrices.

pub mod banded;
pub mod mass;
pub mod pattern;

pub use banded::Banded;
pub use mass::MassMatrix;
pub use pattern::SparsityPattern;

use crate::core::traits::MatVec;
use faer::Mat;

/// Materialized Jacobian storage.
///
/// The variant is fixed at problem construction (dense for general
/// prototypes, banded when the prototype declares bandwidths) and only the
/// values change across the run; the structure never does.
pub enum JacobianMatrix {
    Dense(Mat<f64>),
    Banded(Banded),
}

impl JacobianMatrix {
    pub fn zeros_dense(n: usize) -> Self {
        JacobianMatrix::Dense(Mat::zeros(n, n))
    }

    pub fn zeros_banded(n: usize, ml: usize, mu: usize) -> Self {
        JacobianMatrix::Banded(Banded::zeros(n, ml, mu))
    }

    pub fn nrows(&self) -> usize {
        match self {
            JacobianMatrix::Dense(m) => m.nrows(),
            JacobianMatrix::Banded(b) => b.n(),
        }
    }

    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        match self {
            JacobianMatrix::Dense(m) => m[(i, j)] = v,
            JacobianMatrix::Banded(b) => b.set(i, j, v),
        }
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            JacobianMatrix::Dense(m) => m[(i, j)],
            JacobianMatrix::Banded(b) => b.get(i, j),
        }
    }

    /// True when every stored value is finite.
    pub fn all_finite(&self) -> bool {
        match self {
            JacobianMatrix::Dense(m) => {
                (0..m.ncols()).all(|j| (0..m.nrows()).all(|i| m[(i, j)].is_finite()))
            }
            JacobianMatrix::Banded(b) => b.values().iter().all(|v| v.is_finite()),
        }
    }
}

impl MatVec<f64> for JacobianMatrix {
    fn matvec(&self, x: &[f64], y: &mut [f64]) {
        match self {
            JacobianMatrix::Dense(m) => m.matvec(x, y),
            JacobianMatrix::Banded(b) => b.matvec(x, y),
        }
    }
}
