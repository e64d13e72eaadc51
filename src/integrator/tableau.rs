// Reference implementations:
//   M. E. Hosea & L. F. Shampine, "Analysis and implementation of TR-BDF2",
//   Applied Numerical Mathematics 20 (1996)
//   E. Hairer & G. Wanner, "Solving Ordinary Differential Equations II" (1996)

//! TR-BDF2: a stiffly accurate 3-stage ESDIRK pair of order 2(3).
//!
//! Stage 1 is explicit (c₁ = 0), stages 2 and 3 share the diagonal γ, and the
//! last row of A equals b, so the final stage value is the step solution and
//! f(u₃) carries over as the next step's first stage. The embedded
//! third-order weights provide the error estimate.

/// Diagonal coefficient γ = 1 − √2/2.
pub(crate) const GAMMA: f64 = 0.292_893_218_813_452_43;

/// Stage abscissae.
pub(crate) const C2: f64 = 2.0 * GAMMA;
pub(crate) const C3: f64 = 1.0;

/// Strictly lower part of A; the third row doubles as the solution weights.
pub(crate) const A21: f64 = GAMMA;
pub(crate) const A31: f64 = 0.353_553_390_593_273_79; // √2/4
pub(crate) const A32: f64 = A31;

/// Solution weights (order 2, stiffly accurate).
pub(crate) const B: [f64; 3] = [A31, A32, GAMMA];

/// Embedded weights (order 3).
pub(crate) const BHAT: [f64; 3] = [
    (1.0 - A31) / 3.0,
    (3.0 * A31 + 1.0) / 3.0,
    GAMMA / 3.0,
];

/// Error-estimate weights b − b̂.
pub(crate) fn err_weights() -> [f64; 3] {
    [B[0] - BHAT[0], B[1] - BHAT[1], B[2] - BHAT[2]]
}

/// Controller exponent: the estimate is O(h³).
pub(crate) const ERR_EXPONENT: f64 = 1.0 / 3.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_consistent() {
        assert!((B.iter().sum::<f64>() - 1.0).abs() < 1e-15);
        assert!((BHAT.iter().sum::<f64>() - 1.0).abs() < 1e-15);
        assert!(err_weights().iter().sum::<f64>().abs() < 1e-14);
    }

    #[test]
    fn abscissae_match_row_sums() {
        assert!((C2 - (A21 + GAMMA)).abs() < 1e-15);
        assert!((C3 - (A31 + A32 + GAMMA)).abs() < 1e-15);
    }

    #[test]
    fn gamma_is_one_minus_half_sqrt2() {
        assert!((GAMMA - (1.0 - 2.0_f64.sqrt() / 2.0)).abs() < 1e-15);
    }
}
