//! Dense LU on the GPU through cuBLAS.
//!
//! The system matrix is densified in column-major order, uploaded once per
//! factorization and factored in place with `cublasDgetrfBatched` (batch of
//! one). The factors and pivots stay resident on the device; each solve
//! uploads the right-hand side and runs `cublasDgetrsBatched`.

use crate::context::CudaContext;
use crate::error::{CudaError, Result};
use cudarc::cublas::sys::{
    cublasDgetrfBatched, cublasDgetrsBatched, cublasOperation_t, cublasStatus_t,
};
use cudarc::driver::{CudaSlice, DevicePtr, DevicePtrMut};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;
use std::sync::Arc;
use switchyard_solver::{BackendKind, LinearSolver};

/// LU factors resident on the device.
struct DeviceFactors {
    /// Packed L and U, column-major n×n. Only read through `lu_ptrs`.
    #[allow(dead_code)]
    lu: CudaSlice<f64>,
    /// Single-entry pointer array addressing `lu`.
    lu_ptrs: CudaSlice<u64>,
    pivots: CudaSlice<i32>,
    n: usize,
}

/// cuBLAS dense LU backend.
pub struct CudaDenseLu {
    ctx: Arc<CudaContext>,
    factors: Option<DeviceFactors>,
}

impl std::fmt::Debug for CudaDenseLu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaDenseLu")
            .field("device_id", &self.ctx.device_id())
            .field("size", &self.factors.as_ref().map(|f| f.n))
            .finish()
    }
}

impl CudaDenseLu {
    pub fn new(ctx: Arc<CudaContext>) -> Self {
        Self { ctx, factors: None }
    }

    /// Upload `data` and build a one-entry pointer array for it.
    fn upload_with_pointer(&self, data: &[f64]) -> Result<(CudaSlice<f64>, CudaSlice<u64>)> {
        let stream = &self.ctx.stream;
        let slice = stream
            .memcpy_stod(data)
            .map_err(|e| CudaError::Transfer(format!("upload failed: {}", e)))?;
        let base = {
            let (ptr, _guard) = slice.device_ptr(stream);
            ptr
        };
        let pointers = stream
            .memcpy_stod(&vec![base])
            .map_err(|e| CudaError::Transfer(format!("pointer array upload failed: {}", e)))?;
        Ok((slice, pointers))
    }

    fn factorize_device(&mut self, matrix: &CscMatrix<f64>) -> Result<bool> {
        let n = matrix.nrows();
        let dense = DMatrix::from(matrix);
        let (lu, lu_ptrs) = self.upload_with_pointer(dense.as_slice())?;

        let stream = &self.ctx.stream;
        let mut pivots: CudaSlice<i32> = stream
            .alloc_zeros(n)
            .map_err(|e| CudaError::MemoryAlloc(format!("pivot allocation failed: {}", e)))?;
        let mut info: CudaSlice<i32> = stream
            .alloc_zeros(1)
            .map_err(|e| CudaError::MemoryAlloc(format!("info allocation failed: {}", e)))?;

        {
            let (a_ptrs, _a_guard) = lu_ptrs.device_ptr(stream);
            let (pivot_ptr, _pivot_guard) = pivots.device_ptr_mut(stream);
            let (info_ptr, _info_guard) = info.device_ptr_mut(stream);

            let status = unsafe {
                cublasDgetrfBatched(
                    *self.ctx.blas.handle(),
                    n as i32,
                    a_ptrs as *const *mut f64,
                    n as i32,
                    pivot_ptr as *mut i32,
                    info_ptr as *mut i32,
                    1,
                )
            };
            if status != cublasStatus_t::CUBLAS_STATUS_SUCCESS {
                return Err(CudaError::Cublas(format!(
                    "cublasDgetrfBatched failed: {:?}",
                    status
                )));
            }
        }

        self.ctx.synchronize()?;
        let info_host = stream
            .memcpy_dtov(&info)
            .map_err(|e| CudaError::Transfer(format!("info download failed: {}", e)))?;
        if info_host.first().is_some_and(|&v| v > 0) {
            return Ok(false);
        }

        self.factors = Some(DeviceFactors {
            lu,
            lu_ptrs,
            pivots,
            n,
        });
        Ok(true)
    }

    fn solve_device(&self, factors: &DeviceFactors, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let stream = &self.ctx.stream;
        let (b, b_ptrs) = self.upload_with_pointer(rhs.as_slice())?;
        let mut info: CudaSlice<i32> = stream
            .alloc_zeros(1)
            .map_err(|e| CudaError::MemoryAlloc(format!("info allocation failed: {}", e)))?;

        {
            let (a_ptrs, _a_guard) = factors.lu_ptrs.device_ptr(stream);
            let (pivot_ptr, _pivot_guard) = factors.pivots.device_ptr(stream);
            let (b_ptr, _b_guard) = b_ptrs.device_ptr(stream);
            let (info_ptr, _info_guard) = info.device_ptr_mut(stream);

            let status = unsafe {
                cublasDgetrsBatched(
                    *self.ctx.blas.handle(),
                    cublasOperation_t::CUBLAS_OP_N,
                    factors.n as i32,
                    1,
                    a_ptrs as *const *const f64,
                    factors.n as i32,
                    pivot_ptr as *const i32,
                    b_ptr as *const *mut f64,
                    factors.n as i32,
                    info_ptr as *mut i32,
                    1,
                )
            };
            if status != cublasStatus_t::CUBLAS_STATUS_SUCCESS {
                return Err(CudaError::Cublas(format!(
                    "cublasDgetrsBatched failed: {:?}",
                    status
                )));
            }
        }

        self.ctx.synchronize()?;
        let x = stream
            .memcpy_dtov(&b)
            .map_err(|e| CudaError::Transfer(format!("solution download failed: {}", e)))?;
        Ok(DVector::from_vec(x))
    }
}

impl LinearSolver for CudaDenseLu {
    fn kind(&self) -> BackendKind {
        BackendKind::CudaDense {
            device_id: self.ctx.device_id(),
        }
    }

    fn factorize(&mut self, matrix: &CscMatrix<f64>) -> switchyard_solver::Result<()> {
        self.factors = None;
        if matrix.nrows() != matrix.ncols() {
            return Err(switchyard_solver::Error::NotSquare {
                rows: matrix.nrows(),
                cols: matrix.ncols(),
            });
        }
        if !self.factorize_device(matrix)? {
            return Err(switchyard_solver::Error::SingularMatrix);
        }
        Ok(())
    }

    fn solve(&mut self, rhs: &DVector<f64>) -> switchyard_solver::Result<DVector<f64>> {
        let factors = self
            .factors
            .as_ref()
            .ok_or(switchyard_solver::Error::NotFactorized)?;
        if rhs.len() != factors.n {
            return Err(switchyard_solver::Error::DimensionMismatch {
                expected: factors.n,
                actual: rhs.len(),
            });
        }
        Ok(self.solve_device(factors, rhs)?)
    }

    fn is_factorized(&self) -> bool {
        self.factors.is_some()
    }

    fn invalidate(&mut self) {
        self.factors = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn try_create_cuda_context() -> Option<Arc<CudaContext>> {
        if !CudaContext::is_available() {
            return None;
        }
        CudaContext::new().ok().map(Arc::new)
    }

    #[test]
    fn test_dense_lu_matches_cpu() {
        let ctx = match try_create_cuda_context() {
            Some(c) => c,
            None => {
                eprintln!("Skipping test: no CUDA device available");
                return;
            }
        };

        // 2x + y = 5, x + 3y = 10
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 2.0);
        coo.push(0, 1, 1.0);
        coo.push(1, 0, 1.0);
        coo.push(1, 1, 3.0);
        let a = CscMatrix::from(&coo);

        let mut lu = CudaDenseLu::new(ctx);
        lu.factorize(&a).unwrap();
        let x = lu.solve(&DVector::from_vec(vec![5.0, 10.0])).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);

        // factors survive repeated solves
        let x = lu.solve(&DVector::from_vec(vec![3.0, 4.0])).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dense_lu_singular() {
        let ctx = match try_create_cuda_context() {
            Some(c) => c,
            None => {
                eprintln!("Skipping test: no CUDA device available");
                return;
            }
        };

        let a = CscMatrix::from(&CooMatrix::<f64>::new(2, 2));
        let mut lu = CudaDenseLu::new(ctx);
        assert!(matches!(
            lu.factorize(&a),
            Err(switchyard_solver::Error::SingularMatrix)
        ));
    }
}
