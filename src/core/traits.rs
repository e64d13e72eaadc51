//! Core linear-algebra traits for stode.

/// Matrix–vector product: y ← A x.
///
/// Implemented by materialized Jacobian storage as well as by implicit
/// operators (directional-derivative probes, shifted iteration matrices),
/// so Krylov solvers never need to know whether A exists as entries.
pub trait MatVec<T> {
    /// Compute y = A · x.
    fn matvec(&self, x: &[T], y: &mut [T]);
}

/// Uniform row-count query for operators and vectors.
pub trait Indexing {
    /// Number of rows (or length for a vector).
    fn nrows(&self) -> usize;
}

impl<T: Copy + num_traits::Float> MatVec<T> for faer::Mat<T> {
    fn matvec(&self, x: &[T], y: &mut [T]) {
        debug_assert_eq!(x.len(), self.ncols());
        debug_assert_eq!(y.len(), self.nrows());
        for (i, yi) in y.iter_mut().enumerate() {
            let mut acc = T::zero();
            for (j, xj) in x.iter().enumerate() {
                acc = acc + self[(i, j)] * *xj;
            }
            *yi = acc;
        }
    }
}

impl<T> Indexing for faer::Mat<T> {
    fn nrows(&self) -> usize {
        self.nrows()
    }
}
