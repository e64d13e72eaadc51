//! Preconditioners for the Krylov path.
//!
//! A preconditioner approximates W⁻¹ and is applied through the same slice
//! interface whether W is materialized or not. The stepper never requires
//! one; GMRES on well-scaled stage systems often converges bare.

use num_traits::Float;

use crate::error::SolverError;

/// A preconditioner P ≈ W⁻¹: z = P r.
pub trait Preconditioner<T> {
    fn apply(&self, r: &[T], z: &mut [T]) -> Result<(), SolverError>;
}

/// No-op preconditioner (z = r).
pub struct IdentityPc;

impl<T: Float> Preconditioner<T> for IdentityPc {
    fn apply(&self, r: &[T], z: &mut [T]) -> Result<(), SolverError> {
        z.copy_from_slice(r);
        Ok(())
    }
}

/// Diagonal (Jacobi) preconditioner: z_i = r_i / d_i.
///
/// For matrix-free runs the diagonal must come from the caller (e.g. the
/// mass diagonal minus h·γ times a known Jacobian diagonal), since W itself
/// is never formed.
pub struct JacobiPc<T> {
    inv_diag: Vec<T>,
}

impl<T: Float> JacobiPc<T> {
    /// Build from the diagonal of W; zero entries fall back to identity.
    pub fn from_diagonal(diag: Vec<T>) -> Self {
        let inv_diag = diag
            .into_iter()
            .map(|d| if d != T::zero() { T::one() / d } else { T::one() })
            .collect();
        Self { inv_diag }
    }
}

impl<T: Float> Preconditioner<T> for JacobiPc<T> {
    fn apply(&self, r: &[T], z: &mut [T]) -> Result<(), SolverError> {
        for ((zi, &ri), &di) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = di * ri;
        }
        Ok(())
    }
}
