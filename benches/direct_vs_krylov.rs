//! Direct LU against matrix-free GMRES on a stiff reaction-diffusion line,
//! at a few grid sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use stode::{
    Integrator, JacobianStrategy, LinearSolverKind, OdeProblem, SolverOptions, SparsityPattern,
};

fn rhs(du: &mut [f64], u: &[f64], _p: &[f64], _t: f64) {
    let n = u.len();
    let c = (n as f64 + 1.0).powi(2);
    for i in 0..n {
        let left = if i > 0 { u[i - 1] } else { 0.0 };
        let right = if i + 1 < n { u[i + 1] } else { 0.0 };
        du[i] = c * (left - 2.0 * u[i] + right) - u[i] * u[i] * u[i];
    }
}

fn initial(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| (std::f64::consts::PI * (i + 1) as f64 / (n as f64 + 1.0)).sin())
        .collect()
}

fn bench_solvers(c: &mut Criterion) {
    let mut group = c.benchmark_group("stiff_diffusion");
    for n in [32usize, 128] {
        group.bench_with_input(BenchmarkId::new("banded_lu", n), &n, |b, &n| {
            b.iter(|| {
                let problem = OdeProblem::builder(initial(n), (0.0, 0.05), rhs)
                    .sparsity(SparsityPattern::tridiagonal(n))
                    .build()
                    .unwrap();
                let options = SolverOptions::default().with_tolerances(1e-5, 1e-8);
                let mut integrator = Integrator::new(&problem, options).unwrap();
                integrator.solve().unwrap();
                integrator.state()[n / 2]
            })
        });
        group.bench_with_input(BenchmarkId::new("matrix_free_gmres", n), &n, |b, &n| {
            b.iter(|| {
                let problem = OdeProblem::builder(initial(n), (0.0, 0.05), rhs)
                    .jacobian_strategy(JacobianStrategy::MatrixFree)
                    .build()
                    .unwrap();
                let mut options = SolverOptions::default()
                    .with_tolerances(1e-5, 1e-8)
                    .with_linear_solver(LinearSolverKind::Gmres);
                options.gmres_tol = 1e-6;
                let mut integrator = Integrator::new(&problem, options).unwrap();
                integrator.solve().unwrap();
                integrator.state()[n / 2]
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_solvers);
criterion_main!(benches);
