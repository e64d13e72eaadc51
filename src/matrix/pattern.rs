//! Jacobian sparsity prototypes.
//!
//! A pattern records the structurally nonzero entries of the Jacobian; it is
//! fixed for the whole integration run (values change, structure does not).
//! Compressed finite differencing recovers individual entries from it, so a
//! wrong pattern silently corrupts the Jacobian: the pattern must cover
//! every entry that can ever be nonzero.

/// Fixed set of structurally nonzero (row, col) positions, stored
/// column-major with sorted row indices.
#[derive(Debug, Clone)]
pub struct SparsityPattern {
    nrows: usize,
    ncols: usize,
    cols: Vec<Vec<usize>>,
    band: Option<(usize, usize)>,
}

impl SparsityPattern {
    /// Build from an arbitrary list of (row, col) pairs. Duplicates are
    /// merged; out-of-range pairs panic.
    pub fn from_pairs(nrows: usize, ncols: usize, pairs: &[(usize, usize)]) -> Self {
        let mut cols: Vec<Vec<usize>> = vec![Vec::new(); ncols];
        for &(i, j) in pairs {
            assert!(i < nrows && j < ncols, "pattern entry ({i}, {j}) out of range");
            cols[j].push(i);
        }
        for col in &mut cols {
            col.sort_unstable();
            col.dedup();
        }
        Self { nrows, ncols, cols, band: None }
    }

    /// Banded prototype with `ml` sub- and `mu` superdiagonals. Carries the
    /// bandwidths so coloring can be derived analytically.
    pub fn banded(n: usize, ml: usize, mu: usize) -> Self {
        let mut cols = Vec::with_capacity(n);
        for j in 0..n {
            let lo = j.saturating_sub(mu);
            let hi = (j + ml).min(n.saturating_sub(1));
            cols.push((lo..=hi).collect());
        }
        Self { nrows: n, ncols: n, cols, band: Some((ml, mu)) }
    }

    /// Tridiagonal prototype.
    pub fn tridiagonal(n: usize) -> Self {
        Self::banded(n, 1, 1)
    }

    /// Fully dense prototype (every entry structural).
    pub fn dense(n: usize) -> Self {
        let mut cols = Vec::with_capacity(n);
        for _ in 0..n {
            cols.push((0..n).collect());
        }
        Self { nrows: n, ncols: n, cols, band: None }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.cols.iter().map(|c| c.len()).sum()
    }

    /// Sorted structural row indices of column `j`.
    pub fn rows_in_col(&self, j: usize) -> &[usize] {
        &self.cols[j]
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.cols[j].binary_search(&i).is_ok()
    }

    /// `(ml, mu)` for patterns declared banded at construction.
    pub fn bandwidths(&self) -> Option<(usize, usize)> {
        self.band
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pairs_sorts_and_dedups() {
        let p = SparsityPattern::from_pairs(3, 3, &[(2, 0), (0, 0), (2, 0), (1, 2)]);
        assert_eq!(p.rows_in_col(0), &[0, 2]);
        assert_eq!(p.rows_in_col(1), &[] as &[usize]);
        assert_eq!(p.rows_in_col(2), &[1]);
        assert_eq!(p.nnz(), 3);
        assert!(p.contains(2, 0));
        assert!(!p.contains(1, 0));
    }

    #[test]
    fn banded_pattern_rows() {
        let p = SparsityPattern::banded(5, 1, 2);
        assert_eq!(p.bandwidths(), Some((1, 2)));
        assert_eq!(p.rows_in_col(0), &[0, 1]);
        assert_eq!(p.rows_in_col(3), &[1, 2, 3, 4]);
        assert_eq!(p.rows_in_col(4), &[2, 3, 4]);
    }
}
