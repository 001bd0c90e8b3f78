//! CUDA device context management.
//!
//! Lazily creates one `CudaDevice` handle per GPU index and shares it between
//! streams, backends and buffers on that GPU.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cudarc::driver::CudaDevice;
use mbfill_core::FillError;
use parking_lot::Mutex;

static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<CudaDevice>>>> = OnceLock::new();

fn devices() -> &'static Mutex<HashMap<usize, Arc<CudaDevice>>> {
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create the device handle for GPU `device_idx`.
pub fn get_device(device_idx: usize) -> Result<Arc<CudaDevice>, CudaError> {
    let mut map = devices().lock();
    if let Some(dev) = map.get(&device_idx) {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(device_idx)
        .map_err(|e| CudaError::DeviceInit(format!("device {device_idx}: {e}")))?;
    tracing::debug!(device_idx, name = ?dev.name().ok(), "CUDA device initialized");
    map.insert(device_idx, Arc::clone(&dev));
    Ok(dev)
}

/// Make `dev`'s context current on the calling thread.
///
/// Needed before raw driver calls; the safe `cudarc` wrappers do it themselves.
pub fn bind(dev: &CudaDevice) -> Result<(), CudaError> {
    dev.bind_to_thread().map_err(|e| CudaError::DeviceInit(e.to_string()))
}

pub fn is_cuda_available() -> bool {
    get_device(0).is_ok()
}

/// Number of available CUDA devices.
pub fn device_count() -> usize {
    (0..16).take_while(|&i| get_device(i).is_ok()).count()
}

/// CUDA-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum CudaError {
    #[error("CUDA device init failed: {0}")]
    DeviceInit(String),

    #[error("PTX compilation failed for module '{module}': {msg}")]
    PtxCompile { module: String, msg: String },

    #[error("Failed to load module '{module}': {msg}")]
    ModuleLoad { module: String, msg: String },

    #[error("Function '{func}' not found in module '{module}'")]
    FuncNotFound { module: String, func: String },

    #[error("CUDA kernel launch failed: {0}")]
    Launch(String),

    #[error("CUDA memory error: {0}")]
    Memory(String),

    #[error("CUDA stream error: {0}")]
    Stream(String),
}

impl From<CudaError> for FillError {
    fn from(e: CudaError) -> Self {
        match e {
            CudaError::DeviceInit(_)
            | CudaError::PtxCompile { .. }
            | CudaError::ModuleLoad { .. }
            | CudaError::FuncNotFound { .. } => FillError::Unavailable(e.to_string()),
            CudaError::Launch(_) | CudaError::Memory(_) | CudaError::Stream(_) => {
                FillError::Execution(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbfill_core::ErrorKind;

    #[test]
    fn test_error_mapping() {
        let e: FillError = CudaError::DeviceInit("no driver".into()).into();
        assert_eq!(e.kind(), ErrorKind::Unavailable);
        let e: FillError = CudaError::Launch("bad grid".into()).into();
        assert_eq!(e.kind(), ErrorKind::Execution);
        let e: FillError =
            CudaError::FuncNotFound { module: "m".into(), func: "f".into() }.into();
        assert!(e.to_string().contains("'f'"));
    }
}
