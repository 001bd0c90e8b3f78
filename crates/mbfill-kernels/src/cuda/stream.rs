//! An owned CUDA stream implementing the fill [`Stream`] interface.

use std::sync::Arc;

use cudarc::driver::{result, sys, CudaDevice, CudaStream};
use mbfill_core::{Device, Result, Stream};
use parking_lot::Mutex;

use super::context::{bind, get_device, CudaError};

/// A non-blocking stream forked from a device's default stream.
///
/// Host staging buffers of asynchronous uploads are kept alive here until
/// the next successful synchronization.
pub struct CudaStreamHandle {
    dev: Arc<CudaDevice>,
    device_idx: usize,
    stream: CudaStream,
    pending_host: Mutex<Vec<Vec<u64>>>,
}

impl CudaStreamHandle {
    pub fn new(device_idx: usize) -> std::result::Result<Self, CudaError> {
        let dev = get_device(device_idx)?;
        let stream = dev.fork_default_stream().map_err(|e| CudaError::Stream(e.to_string()))?;
        Ok(Self { dev, device_idx, stream, pending_host: Mutex::new(Vec::new()) })
    }

    pub fn device_idx(&self) -> usize {
        self.device_idx
    }

    pub fn cuda_device(&self) -> &Arc<CudaDevice> {
        &self.dev
    }

    pub fn cuda_stream(&self) -> &CudaStream {
        &self.stream
    }

    pub(crate) fn raw(&self) -> sys::CUstream {
        self.stream.stream
    }

    pub(crate) fn bind(&self) -> std::result::Result<(), CudaError> {
        bind(&self.dev)
    }

    /// Keep `words` alive until the stream has consumed them.
    pub(crate) fn retain_host(&self, words: Vec<u64>) {
        self.pending_host.lock().push(words);
    }
}

impl Stream for CudaStreamHandle {
    fn device(&self) -> Device {
        Device::Cuda(self.device_idx)
    }

    fn synchronize(&self) -> Result<()> {
        self.bind()?;
        unsafe { result::stream::synchronize(self.raw()) }
            .map_err(|e| CudaError::Stream(format!("synchronize: {e}")))?;
        self.pending_host.lock().clear();
        Ok(())
    }
}

impl std::fmt::Debug for CudaStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaStreamHandle")
            .field("device_idx", &self.device_idx)
            .field("pending_host", &self.pending_host.lock().len())
            .finish()
    }
}
