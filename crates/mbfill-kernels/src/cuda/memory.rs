//! GPU memory: stream-ordered scratch and owned fill targets.

use std::marker::PhantomData;

use cudarc::driver::{result, CudaDevice, CudaSlice, DevicePtr};
use mbfill_core::{DeviceSpan, FillElement, FillError, MemoryResource, Result, Scratch};

use super::context::{get_device, CudaError};
use super::stream::CudaStreamHandle;

/// Scratch from the device's default memory pool via `cuMemAllocAsync`.
///
/// Allocation and release are both ordered on the stream passed in, so a
/// release issued right after the last launch is safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct CudaAsyncResource;

impl MemoryResource<CudaStreamHandle> for CudaAsyncResource {
    fn allocate(&self, bytes: usize, stream: &CudaStreamHandle) -> Result<Scratch> {
        stream.bind()?;
        let ptr = unsafe { result::malloc_async(stream.raw(), bytes.max(1)) }
            .map_err(|e| FillError::Allocation { bytes, reason: e.to_string() })?;
        tracing::trace!(bytes, device = stream.device_idx(), "device scratch allocated");
        Ok(unsafe { Scratch::from_raw_parts(ptr, bytes) })
    }

    fn deallocate(&self, scratch: Scratch, stream: &CudaStreamHandle) {
        let freed = stream
            .bind()
            .and_then(|()| {
                unsafe { result::free_async(scratch.addr(), stream.raw()) }
                    .map_err(|e| CudaError::Memory(e.to_string()))
            });
        if let Err(e) = freed {
            tracing::error!(error = %e, bytes = scratch.bytes(), "leaking device scratch");
        }
    }
}

/// An owned, typed device buffer, for callers that do not manage device
/// memory themselves.
#[derive(Debug)]
pub struct CudaBuffer<T> {
    inner: CudaSlice<u8>,
    len: usize,
    device_idx: usize,
    _marker: PhantomData<T>,
}

impl<T: FillElement> CudaBuffer<T> {
    /// Allocate `len` zeroed elements.
    pub fn zeros(device_idx: usize, len: usize) -> std::result::Result<Self, CudaError> {
        let nbytes = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| CudaError::Memory(format!("{len} elements overflow the byte size")))?;
        let dev = get_device(device_idx)?;
        // Zero-byte device allocations are rejected by the driver.
        let inner = dev
            .alloc_zeros::<u8>(nbytes.max(1))
            .map_err(|e| CudaError::Memory(format!("alloc_zeros({nbytes} bytes): {e}")))?;
        settle(&dev)?;
        Ok(Self { inner, len, device_idx, _marker: PhantomData })
    }

    /// Copy host elements into a new buffer.
    pub fn from_host(device_idx: usize, data: &[T]) -> std::result::Result<Self, CudaError> {
        if data.is_empty() {
            return Self::zeros(device_idx, 0);
        }
        let dev = get_device(device_idx)?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let inner = dev
            .htod_sync_copy(bytes)
            .map_err(|e| CudaError::Memory(format!("htod_copy({} bytes): {e}", bytes.len())))?;
        settle(&dev)?;
        Ok(Self { inner, len: data.len(), device_idx, _marker: PhantomData })
    }

    /// Copy the buffer back to the host.
    ///
    /// Synchronize any stream writing to the buffer first.
    pub fn to_host(&self) -> std::result::Result<Vec<T>, CudaError> {
        let dev = get_device(self.device_idx)?;
        let bytes = dev
            .dtoh_sync_copy(&self.inner)
            .map_err(|e| CudaError::Memory(format!("dtoh_sync_copy: {e}")))?;
        let used = self.len * std::mem::size_of::<T>();
        Ok(bytemuck::pod_collect_to_vec(&bytes[..used]))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn device_idx(&self) -> usize {
        self.device_idx
    }

    /// Span over the whole buffer.
    ///
    /// # Safety
    /// The buffer must outlive every fill using the span, up to and including
    /// the synchronization of the fill's stream.
    pub unsafe fn span(&mut self) -> DeviceSpan<T> {
        if self.len == 0 {
            return DeviceSpan::empty();
        }
        DeviceSpan::from_raw_parts(*self.inner.device_ptr(), self.len)
    }
}

/// Wait for work cudarc issued on the default stream, since fill streams do
/// not implicitly order after it.
fn settle(dev: &CudaDevice) -> std::result::Result<(), CudaError> {
    dev.synchronize().map_err(|e| CudaError::Stream(e.to_string()))
}
