//! Linear solver backends for switchyard.
//!
//! This crate provides:
//! - The [`LinearSolver`] backend contract and [`BackendKind`] selection
//! - Dense LU (nalgebra) and sparse LU with threshold pivoting
//! - Size-based [`AutoSolver`] and explicitly configured [`FallbackSolver`]
//! - [`CachedSolver`], which reuses factors across time steps until the
//!   system matrix actually changes

pub mod backend;
pub mod cached;
pub mod dense;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod sparse;

pub use backend::{BackendKind, LinearSolver};
pub use cached::{CachedSolver, Refresh, SolverStats};
pub use dense::{DenseLu, solve_dense};
pub use dispatch::{
    AutoSolver, SOLUTION_TOLERANCE, SPARSE_THRESHOLD, SolverConfig, relative_difference,
};
pub use error::{Error, Result};
pub use fallback::FallbackSolver;
pub use sparse::{DEFAULT_PIVOT_THRESHOLD, SparseLu};
