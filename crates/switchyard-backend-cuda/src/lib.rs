//! CUDA linear solver backends for switchyard.
//!
//! [`CudaDenseLu`] keeps cuBLAS LU factors resident on the device between
//! steps. [`CudaSparseQr`] runs cuSOLVER's sparse QR on every solve and is
//! therefore value-sensitive. Both implement
//! [`LinearSolver`](switchyard_solver::LinearSolver), so they slot into the
//! same factorization cache as the CPU backends.

pub mod context;
pub mod dense;
pub mod error;
pub mod sparse;

pub use context::CudaContext;
pub use dense::CudaDenseLu;
pub use error::{CudaError, Result};
pub use sparse::{CsrMatrixDescriptor, CudaSparseQr};

use std::sync::Arc;
use switchyard_solver::{BackendKind, LinearSolver};

/// Build a GPU backend for `kind`.
///
/// CPU kinds are rejected; they are built by
/// [`SolverConfig::build`](switchyard_solver::SolverConfig::build).
pub fn build_backend(kind: BackendKind) -> switchyard_solver::Result<Box<dyn LinearSolver>> {
    match kind {
        BackendKind::CudaDense { device_id } => {
            let ctx = Arc::new(CudaContext::with_device(device_id)?);
            Ok(Box::new(CudaDenseLu::new(ctx)))
        }
        BackendKind::CudaSparse { device_id } => {
            let ctx = Arc::new(CudaContext::with_device(device_id)?);
            Ok(Box::new(CudaSparseQr::new(ctx)?))
        }
        other => Err(switchyard_solver::Error::BackendUnavailable(format!(
            "{other} is not a CUDA backend"
        ))),
    }
}
