//! Band matrix storage (LAPACK general-band layout, no pivot fill).
//!
//! Entry (i, j) with `j - mu <= i <= j + ml` lives at
//! `data[j * (ml + mu + 1) + (i - j + mu)]`. Used for banded Jacobians and
//! for the banded iteration matrix W = M - h·γ·J.

use crate::core::traits::MatVec;

#[derive(Debug, Clone)]
pub struct Banded {
    n: usize,
    ml: usize,
    mu: usize,
    data: Vec<f64>,
}

impl Banded {
    pub fn zeros(n: usize, ml: usize, mu: usize) -> Self {
        assert!(n > 0, "empty band matrix");
        Self { n, ml, mu, data: vec![0.0; n * (ml + mu + 1)] }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn ml(&self) -> usize {
        self.ml
    }

    pub fn mu(&self) -> usize {
        self.mu
    }

    fn ldab(&self) -> usize {
        self.ml + self.mu + 1
    }

    pub fn in_band(&self, i: usize, j: usize) -> bool {
        i + self.mu >= j && j + self.ml >= i
    }

    /// Structural row range of column `j` (inclusive bounds).
    pub fn col_rows(&self, j: usize) -> (usize, usize) {
        (j.saturating_sub(self.mu), (j + self.ml).min(self.n - 1))
    }

    #[inline]
    fn idx(&self, i: usize, j: usize) -> usize {
        debug_assert!(self.in_band(i, j), "({i}, {j}) outside band");
        j * self.ldab() + (i + self.mu - j)
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if self.in_band(i, j) { self.data[self.idx(i, j)] } else { 0.0 }
    }

    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        let k = self.idx(i, j);
        self.data[k] = v;
    }

    pub fn add(&mut self, i: usize, j: usize, v: f64) {
        let k = self.idx(i, j);
        self.data[k] += v;
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// Dense copy, for tests and small-system fallbacks.
    pub fn to_dense(&self) -> faer::Mat<f64> {
        faer::Mat::from_fn(self.n, self.n, |i, j| self.get(i, j))
    }
}

impl MatVec<f64> for Banded {
    fn matvec(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n);
        debug_assert_eq!(y.len(), self.n);
        y.fill(0.0);
        for j in 0..self.n {
            let (lo, hi) = self.col_rows(j);
            let xj = x[j];
            for i in lo..=hi {
                y[i] += self.data[self.idx(i, j)] * xj;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_roundtrip_within_band() {
        let mut b = Banded::zeros(5, 1, 2);
        b.set(2, 3, 7.0);
        b.set(3, 2, -1.5);
        assert_eq!(b.get(2, 3), 7.0);
        assert_eq!(b.get(3, 2), -1.5);
        assert_eq!(b.get(0, 4), 0.0); // outside band reads as zero
    }

    #[test]
    fn matvec_matches_dense() {
        let mut b = Banded::zeros(6, 2, 1);
        for j in 0..6 {
            let (lo, hi) = b.col_rows(j);
            for i in lo..=hi {
                b.set(i, j, (i * 7 + j + 1) as f64);
            }
        }
        let d = b.to_dense();
        let x: Vec<f64> = (0..6).map(|i| (i as f64) - 2.5).collect();
        let mut yb = vec![0.0; 6];
        let mut yd = vec![0.0; 6];
        b.matvec(&x, &mut yb);
        d.matvec(&x, &mut yd);
        for (a, c) in yb.iter().zip(&yd) {
            assert!((a - c).abs() < 1e-12);
        }
    }
}
