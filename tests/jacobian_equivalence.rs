//! The four Jacobian strategies must agree on the same problem: colored
//! finite differences reproduce dense finite differences entry for entry, and
//! matrix-free probes reproduce analytic Jacobian-vector products.

use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stode::core::traits::MatVec;
use stode::jacobian::JacobianProvider;
use stode::{JacobianStrategy, OdeProblem, SolverOptions, SparsityPattern};

fn provider_matrix(problem: &OdeProblem, u: &[f64]) -> Vec<Vec<f64>> {
    let n = problem.n();
    let mut provider = JacobianProvider::for_problem(problem, &SolverOptions::default()).unwrap();
    let mut f0 = vec![0.0; n];
    problem.eval_rhs(&mut f0, u, 0.0);
    provider.refresh(problem, u, &f0, 0.0).unwrap();
    let jac = provider.matrix().unwrap();
    (0..n).map(|i| (0..n).map(|j| jac.get(i, j)).collect()).collect()
}

#[test]
fn colored_fd_matches_dense_fd_on_a_banded_problem() {
    let n = 20;
    let rhs = move |du: &mut [f64], u: &[f64], _p: &[f64], _t: f64| {
        for i in 0..u.len() {
            let left = if i > 0 { u[i - 1] } else { 0.0 };
            let right = if i + 1 < u.len() { u[i + 1] } else { 0.0 };
            du[i] = left - 2.0 * u[i] + right + u[i] * u[i];
        }
    };
    let dense = OdeProblem::builder(vec![0.5; n], (0.0, 1.0), rhs).build().unwrap();
    let colored = OdeProblem::builder(vec![0.5; n], (0.0, 1.0), rhs)
        .sparsity(SparsityPattern::tridiagonal(n))
        .build()
        .unwrap();

    let u: Vec<f64> = (0..n).map(|i| 0.3 + 0.1 * (i as f64).sin()).collect();
    let jd = provider_matrix(&dense, &u);
    let jc = provider_matrix(&colored, &u);
    for i in 0..n {
        for j in 0..n {
            assert_abs_diff_eq!(jd[i][j], jc[i][j], epsilon = 1e-6);
        }
    }
}

#[test]
fn colored_fd_matches_dense_fd_on_a_random_pattern() {
    let n = 12;
    let mut rng = StdRng::seed_from_u64(7);
    // Diagonal plus a scattering of off-diagonal couplings.
    let mut pairs: Vec<(usize, usize)> = (0..n).map(|i| (i, i)).collect();
    for _ in 0..2 * n {
        pairs.push((rng.gen_range(0..n), rng.gen_range(0..n)));
    }
    pairs.sort_unstable();
    pairs.dedup();

    let mut cols_of_row: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(i, j) in &pairs {
        cols_of_row[i].push(j);
    }
    let structure = cols_of_row.clone();
    let rhs = move |du: &mut [f64], u: &[f64], _p: &[f64], _t: f64| {
        for (i, cols) in structure.iter().enumerate() {
            du[i] = cols
                .iter()
                .map(|&j| (0.2 + 0.05 * j as f64) * u[j] * u[j] - 0.1 * u[j])
                .sum();
        }
    };

    let dense = OdeProblem::builder(vec![0.4; n], (0.0, 1.0), rhs.clone()).build().unwrap();
    let colored = OdeProblem::builder(vec![0.4; n], (0.0, 1.0), rhs)
        .sparsity(SparsityPattern::from_pairs(n, n, &pairs))
        .build()
        .unwrap();

    let u: Vec<f64> = (0..n).map(|i| 0.2 + 0.05 * i as f64).collect();
    let jd = provider_matrix(&dense, &u);
    let jc = provider_matrix(&colored, &u);
    for i in 0..n {
        for j in 0..n {
            assert_abs_diff_eq!(jd[i][j], jc[i][j], epsilon = 1e-6);
        }
    }
}

#[test]
fn matrix_free_probe_matches_analytic_product() {
    // Robertson kinetics: small, stiff, with an easy analytic Jacobian.
    let problem = OdeProblem::builder(vec![1.0, 2e-5, 0.1], (0.0, 1.0), |du, u, _p, _t| {
        du[0] = -0.04 * u[0] + 1e4 * u[1] * u[2];
        du[1] = 0.04 * u[0] - 1e4 * u[1] * u[2] - 3e7 * u[1] * u[1];
        du[2] = 3e7 * u[1] * u[1];
    })
    .jacobian_strategy(JacobianStrategy::MatrixFree)
    .build()
    .unwrap();

    let provider = JacobianProvider::for_problem(&problem, &SolverOptions::default()).unwrap();
    let u = [1.0, 2e-5, 0.1];
    let mut f0 = vec![0.0; 3];
    problem.eval_rhs(&mut f0, &u, 0.0);

    let jac = [
        [-0.04, 1e4 * u[2], 1e4 * u[1]],
        [0.04, -1e4 * u[2] - 6e7 * u[1], -1e4 * u[1]],
        [0.0, 6e7 * u[1], 0.0],
    ];
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..5 {
        let v: Vec<f64> = (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut jv = vec![0.0; 3];
        let probe = provider.probe(&problem, &u, &f0, 0.0);
        probe.matvec(&v, &mut jv);
        for i in 0..3 {
            let exact: f64 = (0..3).map(|j| jac[i][j] * v[j]).sum();
            let scale = 1.0 + exact.abs();
            // Forward differences carry O(ε·‖f''‖) truncation error, and the
            // 3e7 quadratic term makes that ~1e-4 relative here.
            assert!(
                (jv[i] - exact).abs() / scale < 1e-3,
                "row {i}: probe {} vs analytic {exact}",
                jv[i]
            );
        }
    }
}
