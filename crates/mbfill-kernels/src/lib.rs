//! # mbfill-kernels
//!
//! Execution backends for `mbfill-core`'s batched fill.
//!
//! Provides:
//! - Host backend: ordered worker-thread stream, rayon dispatch
//! - CUDA backend (behind the `cuda` feature flag): NVRTC-compiled
//!   fill kernels, stream-ordered scratch via `cuMemAllocAsync`

pub mod cpu;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use cpu::{fill_host, HostBackend, HostMemoryResource, HostStream};
