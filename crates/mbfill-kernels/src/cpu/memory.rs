//! Stream-ordered scratch allocation in host memory.

use std::alloc::{self, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mbfill_core::{FillError, MemoryResource, Result, Scratch};

use super::stream::HostStream;

/// Alignment of every scratch allocation; one cache line.
const SCRATCH_ALIGN: usize = 64;

fn scratch_layout(bytes: usize) -> Result<Layout> {
    // Zero-size layouts are not allowed by the global allocator.
    Layout::from_size_align(bytes.max(1), SCRATCH_ALIGN).map_err(|e| FillError::Allocation {
        bytes,
        reason: e.to_string(),
    })
}

/// Scratch allocator backed by the global allocator.
///
/// Frees are enqueued on the stream, so memory released while a job still
/// reads it is only returned after that job has run.
#[derive(Debug, Clone, Default)]
pub struct HostMemoryResource {
    outstanding: Arc<AtomicUsize>,
}

impl HostMemoryResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes allocated and not yet freed by the stream.
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

fn release(addr: u64, bytes: usize, outstanding: &AtomicUsize) {
    if let Ok(layout) = scratch_layout(bytes) {
        unsafe { alloc::dealloc(addr as *mut u8, layout) };
        outstanding.fetch_sub(bytes, Ordering::AcqRel);
    }
}

impl MemoryResource<HostStream> for HostMemoryResource {
    fn allocate(&self, bytes: usize, _stream: &HostStream) -> Result<Scratch> {
        let layout = scratch_layout(bytes)?;
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(FillError::Allocation { bytes, reason: "out of host memory".into() });
        }
        self.outstanding.fetch_add(bytes, Ordering::AcqRel);
        tracing::trace!(bytes, addr = ptr as u64, "host scratch allocated");
        Ok(unsafe { Scratch::from_raw_parts(ptr as u64, bytes) })
    }

    fn deallocate(&self, scratch: Scratch, stream: &HostStream) {
        let (addr, bytes) = (scratch.addr(), scratch.bytes());
        let outstanding = Arc::clone(&self.outstanding);
        let queued = stream.enqueue_cleanup(move || {
            release(addr, bytes, &outstanding);
            Ok(())
        });
        if queued.is_err() {
            // The worker is gone, so nothing can still be reading the scratch.
            release(addr, bytes, &self.outstanding);
        }
    }
}
