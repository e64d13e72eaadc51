//! stode: implicit ODE/DAE stepping over Faer
//!
//! This crate provides an adaptive implicit integrator for stiff ordinary
//! differential equations and mass-matrix DAEs, with pluggable Jacobian
//! strategies (analytic, dense finite-difference, colored finite-difference,
//! matrix-free) and interchangeable linear solvers (direct LU or
//! preconditioned GMRES).

pub mod config;
pub mod core;
pub mod error;
pub mod integrator;
pub mod jacobian;
pub mod linsolve;
pub mod matrix;
pub mod newton;
pub mod problem;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use error::*;
pub use integrator::*;
pub use jacobian::{JacobianStrategy, JvProbe};
pub use linsolve::{GmresSolver, IdentityPc, JacobiPc, LinearSolverKind, Preconditioner};
pub use matrix::{Banded, JacobianMatrix, MassMatrix, SparsityPattern};
pub use problem::{OdeProblem, OdeProblemBuilder};

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::SolveStats;
