pub mod coloring;
pub mod convergence;
pub mod norms;
