//! Vector norms and inner products.
//!
//! The stepper measures everything in the weighted root-mean-square (WRMS)
//! norm of Hairer & Wanner §IV.8: a value of 1 means "exactly at tolerance".

use num_traits::Float;

/// Euclidean inner product.
pub fn dot<T: Float>(x: &[T], y: &[T]) -> T {
    x.iter()
        .zip(y)
        .fold(T::zero(), |acc, (&xi, &yi)| acc + xi * yi)
}

/// Euclidean norm ‖x‖₂.
pub fn norm2<T: Float>(x: &[T]) -> T {
    dot(x, x).sqrt()
}

/// Componentwise error weights: w_i = atol + rtol · max(|a_i|, |b_i|).
///
/// `a` and `b` are the states at both ends of the step, so the weight covers
/// whichever magnitude is larger.
pub fn error_weights(w: &mut [f64], a: &[f64], b: &[f64], rtol: f64, atol: f64) {
    for ((wi, &ai), &bi) in w.iter_mut().zip(a).zip(b) {
        *wi = atol + rtol * ai.abs().max(bi.abs());
    }
}

/// WRMS norm of `e` under weights `w`: sqrt(Σ (e_i/w_i)² / n).
pub fn wrms(e: &[f64], w: &[f64]) -> f64 {
    debug_assert_eq!(e.len(), w.len());
    let n = e.len() as f64;
    let sum = e
        .iter()
        .zip(w)
        .map(|(&ei, &wi)| {
            let q = ei / wi;
            q * q
        })
        .sum::<f64>();
    (sum / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrms_is_one_at_tolerance() {
        // e_i exactly equal to the weight everywhere => norm 1.
        let a = vec![1.0, -2.0, 0.5];
        let b = vec![1.5, -1.0, 0.5];
        let mut w = vec![0.0; 3];
        error_weights(&mut w, &a, &b, 1e-3, 1e-6);
        let e = w.clone();
        assert!((wrms(&e, &w) - 1.0).abs() < 1e-14);
    }

    #[test]
    fn norm2_matches_dot() {
        let x = vec![3.0, 4.0];
        assert!((norm2(&x) - 5.0_f64).abs() < 1e-15);
        assert!((dot(&x, &x) - 25.0_f64).abs() < 1e-15);
    }
}
