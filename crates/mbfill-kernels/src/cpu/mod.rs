//! Host execution of the batched fill.
//!
//! A [`HostStream`] plays the role of a device stream, [`HostMemoryResource`]
//! hands out stream-ordered scratch, and [`HostBackend`] runs each dispatch
//! as a rayon parallel loop.

mod dispatch;
mod memory;
mod stream;

pub use dispatch::HostBackend;
pub use memory::HostMemoryResource;
pub use stream::HostStream;

use mbfill_core::{multibuffer_fill, DeviceSpan, FillConfig, FillElement, MemoryResource, Result};

/// Fill host-resident buffers on `stream` with the default host backend.
pub fn fill_host<T, M>(
    bufs: &[DeviceSpan<T>],
    value: T,
    stream: &HostStream,
    mr: &M,
    config: &FillConfig,
) -> Result<()>
where
    T: FillElement,
    M: MemoryResource<HostStream> + ?Sized,
{
    multibuffer_fill(&HostBackend::new(), bufs, value, stream, mr, config)
}
