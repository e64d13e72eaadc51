//! Robertson kinetics with an analytic Jacobian, printed at a few times.
//!
//! Run with `cargo run --example rober`.

use faer::Mat;
use stode::{Integrator, OdeProblem, SolverOptions};

fn main() {
    let problem = OdeProblem::builder(vec![1.0, 0.0, 0.0], (0.0, 1e5), |du, u, p, _t| {
        let (k1, k2, k3) = (p[0], p[1], p[2]);
        du[0] = -k1 * u[0] + k3 * u[1] * u[2];
        du[1] = k1 * u[0] - k3 * u[1] * u[2] - k2 * u[1] * u[1];
        du[2] = k2 * u[1] * u[1];
    })
    .jacobian(|j: &mut Mat<f64>, u, p, _t| {
        let (k1, k2, k3) = (p[0], p[1], p[2]);
        j[(0, 0)] = -k1;
        j[(0, 1)] = k3 * u[2];
        j[(0, 2)] = k3 * u[1];
        j[(1, 0)] = k1;
        j[(1, 1)] = -k3 * u[2] - 2.0 * k2 * u[1];
        j[(1, 2)] = -k3 * u[1];
        j[(2, 0)] = 0.0;
        j[(2, 1)] = 2.0 * k2 * u[1];
        j[(2, 2)] = 0.0;
    })
    .params(vec![0.04, 3e7, 1e4])
    .build()
    .expect("valid problem");

    let options = SolverOptions::default().with_tolerances(1e-8, 1e-12);
    let mut integrator = Integrator::new(&problem, options).expect("valid setup");
    integrator.solve().expect("integration failed");

    println!("{:>12}  {:>14}  {:>14}  {:>14}", "t", "y1", "y2", "y3");
    let mut next_print = 1e-4;
    for record in integrator.trajectory() {
        if record.t >= next_print {
            println!(
                "{:>12.4e}  {:>14.8e}  {:>14.8e}  {:>14.8e}",
                record.t, record.u[0], record.u[1], record.u[2]
            );
            next_print *= 10.0;
        }
    }

    let stats = integrator.stats();
    println!();
    println!("steps:          {} ({} accepted, {} rejected)", stats.steps, stats.accepted, stats.rejected);
    println!("rhs evals:      {}", stats.nfev);
    println!("jacobians:      {}", stats.njev);
    println!("factorizations: {}", stats.factorizations);
    println!("newton iters:   {}", stats.newton_iters);
}
