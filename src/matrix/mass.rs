//! Mass matrices for problems of the form M u' = f(u, p, t).
//!
//! A singular M (zero diagonal entries, or a rank-deficient dense block)
//! encodes algebraic constraints. The stage equations are written as
//! M(u - uₙ) = h Σ aᵢⱼ kⱼ + h·γ·f(u), which never inverts M on its own, so
//! the same code path integrates ODEs and index-1 DAEs.

use crate::core::traits::MatVec;
use faer::Mat;

pub enum MassMatrix {
    /// Plain ODE: M = I.
    Identity,
    /// Diagonal mass; zero entries mark algebraic equations.
    Diagonal(Vec<f64>),
    /// General dense mass matrix.
    Dense(Mat<f64>),
}

impl MassMatrix {
    pub fn is_identity(&self) -> bool {
        matches!(self, MassMatrix::Identity)
    }

    /// Dimension, when the mass matrix pins one (Identity adapts to any n).
    pub fn dim(&self) -> Option<usize> {
        match self {
            MassMatrix::Identity => None,
            MassMatrix::Diagonal(d) => Some(d.len()),
            MassMatrix::Dense(m) => Some(m.nrows()),
        }
    }

    /// Diagonal view when M has no off-diagonal structure; `None` for dense.
    /// Banded iteration matrices require this to exist.
    pub fn as_diagonal(&self) -> Option<DiagonalView<'_>> {
        match self {
            MassMatrix::Identity => Some(DiagonalView::Unit),
            MassMatrix::Diagonal(d) => Some(DiagonalView::Values(d)),
            MassMatrix::Dense(_) => None,
        }
    }

    pub fn matvec_into(&self, x: &[f64], y: &mut [f64]) {
        match self {
            MassMatrix::Identity => y.copy_from_slice(x),
            MassMatrix::Diagonal(d) => {
                for ((yi, &di), &xi) in y.iter_mut().zip(d).zip(x) {
                    *yi = di * xi;
                }
            }
            MassMatrix::Dense(m) => m.matvec(x, y),
        }
    }
}

/// Borrowed diagonal of a structurally diagonal mass matrix.
pub enum DiagonalView<'a> {
    Unit,
    Values(&'a [f64]),
}

impl DiagonalView<'_> {
    pub fn get(&self, i: usize) -> f64 {
        match self {
            DiagonalView::Unit => 1.0,
            DiagonalView::Values(d) => d[i],
        }
    }
}

impl MatVec<f64> for MassMatrix {
    fn matvec(&self, x: &[f64], y: &mut [f64]) {
        self.matvec_into(x, y);
    }
}
