//! Sparse direct solve on the GPU through cuSOLVER.
//!
//! `cusolverSpDcsrlsvqr` factors and solves in one call and keeps nothing
//! between calls, so this backend stores the CSR matrix on the device and
//! runs the QR on every solve. Factorization uploads the matrix and checks
//! its rank with a zero right-hand side.

use crate::context::CudaContext;
use crate::error::{CudaError, Result};
use cudarc::cusolver::sys as cusolver_sys;
use cudarc::cusparse::sys as cusparse_sys;
use cudarc::driver::{CudaSlice, DevicePtr, DevicePtrMut};
use nalgebra::DVector;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use std::sync::Arc;
use switchyard_solver::{BackendKind, LinearSolver};

/// Tolerance below which cuSOLVER treats a pivot as zero.
const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Symmetric reverse Cuthill-McKee reordering inside cuSOLVER.
const REORDER_SYMRCM: i32 = 1;

/// CSR structure for GPU operations, with 32-bit indices as cuSOLVER
/// expects.
#[derive(Debug, Clone)]
pub struct CsrMatrixDescriptor {
    /// Number of rows (and columns).
    pub n: usize,
    /// Number of non-zeros.
    pub nnz: usize,
    /// Row pointers (length n+1).
    pub row_ptr: Vec<i32>,
    /// Column indices (length nnz).
    pub col_idx: Vec<i32>,
}

impl CsrMatrixDescriptor {
    /// Convert a square CSC matrix, returning the structure and the values
    /// in CSR order.
    pub fn from_csc(matrix: &CscMatrix<f64>) -> Result<(Self, Vec<f64>)> {
        if matrix.nrows() != matrix.ncols() {
            return Err(CudaError::InvalidDimension(format!(
                "expected a square matrix, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.nnz() > i32::MAX as usize {
            return Err(CudaError::InvalidDimension(format!(
                "{} nonzeros exceed 32-bit indexing",
                matrix.nnz()
            )));
        }

        let csr = CsrMatrix::from(matrix);
        let descriptor = Self {
            n: csr.nrows(),
            nnz: csr.nnz(),
            row_ptr: csr.row_offsets().iter().map(|&x| x as i32).collect(),
            col_idx: csr.col_indices().iter().map(|&x| x as i32).collect(),
        };
        Ok((descriptor, csr.values().to_vec()))
    }
}

/// cuSOLVER sparse handle plus a general, zero-based matrix descriptor.
struct SparseHandles {
    solver: cusolver_sys::cusolverSpHandle_t,
    descr: cusparse_sys::cusparseMatDescr_t,
}

// The handles are only used from the thread that currently owns the
// backend, and cuSOLVER handles are not bound to a thread.
unsafe impl Send for SparseHandles {}

impl SparseHandles {
    fn new(ctx: &CudaContext) -> Result<Self> {
        let mut solver = std::mem::MaybeUninit::uninit();
        let status = unsafe { cusolver_sys::cusolverSpCreate(solver.as_mut_ptr()) };
        if status != cusolver_sys::cusolverStatus_t::CUSOLVER_STATUS_SUCCESS {
            return Err(CudaError::DeviceInit(format!(
                "cusolverSpCreate failed: {:?}",
                status
            )));
        }
        let solver = unsafe { solver.assume_init() };

        let mut descr = std::mem::MaybeUninit::uninit();
        let status = unsafe { cusparse_sys::cusparseCreateMatDescr(descr.as_mut_ptr()) };
        if status != cusparse_sys::cusparseStatus_t::CUSPARSE_STATUS_SUCCESS {
            unsafe {
                cusolver_sys::cusolverSpDestroy(solver);
            }
            return Err(CudaError::DeviceInit(format!(
                "cusparseCreateMatDescr failed: {:?}",
                status
            )));
        }
        let descr = unsafe { descr.assume_init() };

        log::info!(
            "CUDA sparse solver initialized on device {}",
            ctx.device_id()
        );
        Ok(Self { solver, descr })
    }
}

impl Drop for SparseHandles {
    fn drop(&mut self) {
        unsafe {
            let _ = cusparse_sys::cusparseDestroyMatDescr(self.descr);
            let _ = cusolver_sys::cusolverSpDestroy(self.solver);
        }
    }
}

/// Matrix uploaded for the current topology.
struct DeviceMatrix {
    descriptor: CsrMatrixDescriptor,
    values: CudaSlice<f64>,
    row_ptr: CudaSlice<i32>,
    col_idx: CudaSlice<i32>,
}

/// cuSOLVER sparse QR backend.
pub struct CudaSparseQr {
    ctx: Arc<CudaContext>,
    handles: SparseHandles,
    matrix: Option<DeviceMatrix>,
}

impl std::fmt::Debug for CudaSparseQr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaSparseQr")
            .field("device_id", &self.ctx.device_id())
            .field("size", &self.matrix.as_ref().map(|m| m.descriptor.n))
            .finish()
    }
}

impl CudaSparseQr {
    pub fn new(ctx: Arc<CudaContext>) -> Result<Self> {
        let handles = SparseHandles::new(&ctx)?;
        Ok(Self {
            ctx,
            handles,
            matrix: None,
        })
    }

    fn upload(&self, matrix: &CscMatrix<f64>) -> Result<DeviceMatrix> {
        let (descriptor, values) = CsrMatrixDescriptor::from_csc(matrix)?;
        let stream = &self.ctx.stream;
        let transfer = |e: cudarc::driver::DriverError| {
            CudaError::Transfer(format!("matrix upload failed: {}", e))
        };
        Ok(DeviceMatrix {
            values: stream.memcpy_stod(&values).map_err(transfer)?,
            row_ptr: stream.memcpy_stod(&descriptor.row_ptr).map_err(transfer)?,
            col_idx: stream.memcpy_stod(&descriptor.col_idx).map_err(transfer)?,
            descriptor,
        })
    }

    /// Run QR on `matrix` for `rhs`. `None` means rank deficient.
    fn qr_solve(&self, matrix: &DeviceMatrix, rhs: &[f64]) -> Result<Option<Vec<f64>>> {
        let stream = &self.ctx.stream;
        let n = matrix.descriptor.n;
        let b = stream
            .memcpy_stod(rhs)
            .map_err(|e| CudaError::Transfer(format!("rhs upload failed: {}", e)))?;
        let mut x: CudaSlice<f64> = stream
            .alloc_zeros(n)
            .map_err(|e| CudaError::MemoryAlloc(format!("solution allocation failed: {}", e)))?;
        let mut singularity: i32 = -1;

        {
            let (values, _v_guard) = matrix.values.device_ptr(stream);
            let (row_ptr, _r_guard) = matrix.row_ptr.device_ptr(stream);
            let (col_idx, _c_guard) = matrix.col_idx.device_ptr(stream);
            let (b_ptr, _b_guard) = b.device_ptr(stream);
            let (x_ptr, _x_guard) = x.device_ptr_mut(stream);

            let status = unsafe {
                cusolver_sys::cusolverSpSetStream(self.handles.solver, stream.cu_stream() as _);
                cusolver_sys::cusolverSpDcsrlsvqr(
                    self.handles.solver,
                    n as i32,
                    matrix.descriptor.nnz as i32,
                    self.handles.descr as _,
                    values as *const f64,
                    row_ptr as *const i32,
                    col_idx as *const i32,
                    b_ptr as *const f64,
                    SINGULARITY_TOLERANCE,
                    REORDER_SYMRCM,
                    x_ptr as *mut f64,
                    &mut singularity,
                )
            };
            if status != cusolver_sys::cusolverStatus_t::CUSOLVER_STATUS_SUCCESS {
                return Err(CudaError::Cusolver(format!(
                    "cusolverSpDcsrlsvqr failed: {:?}",
                    status
                )));
            }
        }

        self.ctx.synchronize()?;
        if singularity >= 0 {
            log::debug!("sparse QR rank deficient at row {}", singularity);
            return Ok(None);
        }
        let x = stream
            .memcpy_dtov(&x)
            .map_err(|e| CudaError::Transfer(format!("solution download failed: {}", e)))?;
        Ok(Some(x))
    }
}

impl LinearSolver for CudaSparseQr {
    fn kind(&self) -> BackendKind {
        BackendKind::CudaSparse {
            device_id: self.ctx.device_id(),
        }
    }

    fn factorize(&mut self, matrix: &CscMatrix<f64>) -> switchyard_solver::Result<()> {
        self.matrix = None;
        if matrix.nrows() != matrix.ncols() {
            return Err(switchyard_solver::Error::NotSquare {
                rows: matrix.nrows(),
                cols: matrix.ncols(),
            });
        }
        let device = self.upload(matrix)?;
        let zeros = vec![0.0; device.descriptor.n];
        if self.qr_solve(&device, &zeros)?.is_none() {
            return Err(switchyard_solver::Error::SingularMatrix);
        }
        self.matrix = Some(device);
        Ok(())
    }

    fn solve(&mut self, rhs: &DVector<f64>) -> switchyard_solver::Result<DVector<f64>> {
        let matrix = self
            .matrix
            .as_ref()
            .ok_or(switchyard_solver::Error::NotFactorized)?;
        if rhs.len() != matrix.descriptor.n {
            return Err(switchyard_solver::Error::DimensionMismatch {
                expected: matrix.descriptor.n,
                actual: rhs.len(),
            });
        }
        self.qr_solve(matrix, rhs.as_slice())?
            .map(DVector::from_vec)
            .ok_or(switchyard_solver::Error::SingularMatrix)
    }

    fn is_factorized(&self) -> bool {
        self.matrix.is_some()
    }

    fn invalidate(&mut self) {
        self.matrix = None;
    }
}
