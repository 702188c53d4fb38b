//! Solver backend selection and the shared backend contract.
//!
//! [`BackendKind`] names a backend in configuration. [`LinearSolver`] is the
//! capability every backend implements; the rest of the workspace only ever
//! talks to `dyn LinearSolver`. GPU backends live in their own crates and
//! are constructed by the application layer.

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// The linear solver backend to use for the system matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Dense LU on the CPU.
    Dense,
    /// Sparse LU on the CPU.
    Sparse,
    /// Dense or sparse LU on the CPU, picked by system size.
    #[default]
    Auto,
    /// Dense LU through cuBLAS.
    CudaDense {
        /// CUDA device ordinal.
        device_id: usize,
    },
    /// Sparse QR through cuSOLVER.
    CudaSparse {
        /// CUDA device ordinal.
        device_id: usize,
    },
}

impl BackendKind {
    /// Parse a backend name from a configuration string.
    ///
    /// Accepts `"dense"`, `"sparse"`, `"auto"`, `"cuda"`/`"cuda-dense"` and
    /// `"cuda-sparse"`. CUDA backends default to device 0.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "dense" | "lu" => Some(BackendKind::Dense),
            "sparse" | "sparse-lu" => Some(BackendKind::Sparse),
            "auto" => Some(BackendKind::Auto),
            "cuda" | "cuda-dense" => Some(BackendKind::CudaDense { device_id: 0 }),
            "cuda-sparse" => Some(BackendKind::CudaSparse { device_id: 0 }),
            _ => None,
        }
    }

    /// Short name for display.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Dense => "dense LU",
            BackendKind::Sparse => "sparse LU",
            BackendKind::Auto => "auto",
            BackendKind::CudaDense { .. } => "CUDA dense LU",
            BackendKind::CudaSparse { .. } => "CUDA sparse QR",
        }
    }

    /// Whether this backend runs on a GPU.
    pub fn is_gpu(&self) -> bool {
        matches!(
            self,
            BackendKind::CudaDense { .. } | BackendKind::CudaSparse { .. }
        )
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::CudaDense { device_id } | BackendKind::CudaSparse { device_id } => {
                write!(f, "{} (device {})", self.name(), device_id)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// A direct solver for the real system `A x = b`.
///
/// `factorize` is the expensive step and is expected to run only when the
/// matrix structure changes; `solve` runs every step against the stored
/// factors. Backends whose factors depend on the matrix values as well as
/// its structure report `value_sensitive() == true`, and their
/// `refactorize` is a full factorization.
pub trait LinearSolver: fmt::Debug + Send {
    /// Backend currently doing the work.
    fn kind(&self) -> BackendKind;

    /// Compute fresh factors for `matrix`.
    fn factorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()>;

    /// Recompute factors for a matrix whose nonzero structure matches the
    /// last factorized one.
    fn refactorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        self.factorize(matrix)
    }

    /// Solve against the stored factors.
    fn solve(&mut self, rhs: &DVector<f64>) -> Result<DVector<f64>>;

    fn is_factorized(&self) -> bool;

    /// Drop the stored factors.
    fn invalidate(&mut self);

    /// Whether refactorization costs as much as factorization.
    fn value_sensitive(&self) -> bool {
        true
    }
}

/// Reject non-square matrices before a factorization.
pub(crate) fn check_square(matrix: &CscMatrix<f64>) -> Result<usize> {
    if matrix.nrows() != matrix.ncols() {
        return Err(Error::NotSquare {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        });
    }
    Ok(matrix.nrows())
}

/// Reject right-hand sides that do not match the factorized dimension.
pub(crate) fn check_rhs(expected: usize, rhs: &DVector<f64>) -> Result<()> {
    if rhs.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            actual: rhs.len(),
        });
    }
    Ok(())
}
