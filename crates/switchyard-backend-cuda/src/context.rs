//! CUDA device context management.

use crate::error::{CudaError, Result};
use cudarc::cublas::CudaBlas;
use cudarc::driver::{CudaContext as CudarCudaContext, CudaStream};
use std::sync::Arc;

/// CUDA context holding device, stream and cuBLAS handle.
///
/// Create one context per device and share it between backends through
/// an `Arc`.
pub struct CudaContext {
    pub(crate) ctx: Arc<CudarCudaContext>,
    pub(crate) stream: Arc<CudaStream>,
    pub(crate) blas: CudaBlas,
    device_id: usize,
}

impl std::fmt::Debug for CudaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaContext")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl CudaContext {
    /// Create a new CUDA context using device 0.
    ///
    /// # Errors
    ///
    /// Returns `CudaError::NoDevice` if no CUDA device is available.
    /// Returns `CudaError::DeviceInit` if device initialization fails.
    pub fn new() -> Result<Self> {
        Self::with_device(0)
    }

    /// Create a new CUDA context using a specific device.
    pub fn with_device(device_id: usize) -> Result<Self> {
        // With dynamic loading, a missing driver library panics inside cudarc.
        let created = std::panic::catch_unwind(|| CudarCudaContext::new(device_id))
            .map_err(|_| CudaError::NoDevice)?;
        let ctx = created.map_err(|e| {
            let msg = e.to_string();
            if msg.contains("no CUDA-capable device")
                || msg.contains("invalid device")
                || msg.contains("ordinal")
            {
                CudaError::NoDevice
            } else {
                CudaError::DeviceInit(msg)
            }
        })?;

        let stream = ctx.default_stream();

        let blas = CudaBlas::new(stream.clone())
            .map_err(|e| CudaError::DeviceInit(format!("cuBLAS init failed: {}", e)))?;

        log::info!("CUDA context initialized on device {}", device_id);

        Ok(Self {
            ctx,
            stream,
            blas,
            device_id,
        })
    }

    /// Check if CUDA is available on this system.
    ///
    /// Also false when the driver library cannot be loaded at all.
    pub fn is_available() -> bool {
        std::panic::catch_unwind(|| CudarCudaContext::new(0).is_ok()).unwrap_or(false)
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Get the underlying CUDA stream.
    pub fn stream(&self) -> &Arc<CudaStream> {
        &self.stream
    }

    /// Get the underlying CUDA context.
    pub fn cuda_context(&self) -> &Arc<CudarCudaContext> {
        &self.ctx
    }

    pub(crate) fn synchronize(&self) -> Result<()> {
        self.stream
            .synchronize()
            .map_err(|e| CudaError::Transfer(format!("synchronization failed: {}", e)))
    }
}
