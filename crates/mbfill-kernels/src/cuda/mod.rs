//! CUDA backend for the batched fill.
//!
//! Provides:
//! - Device context management (lazy handle per GPU)
//! - Owned streams and stream-ordered scratch (`cuMemAllocAsync`)
//! - Kernel loader with NVRTC compilation and module caching
//! - The fill kernels, one per element width

pub mod context;
pub mod launch;
pub mod memory;
pub mod ops;
pub mod stream;

pub use context::{device_count, get_device, is_cuda_available, CudaError};
pub use memory::{CudaAsyncResource, CudaBuffer};
pub use ops::CudaBackend;
pub use stream::CudaStreamHandle;
