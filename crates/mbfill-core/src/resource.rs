//! Collaborator interfaces: execution streams and scratch memory resources.
//!
//! Both are passed explicitly into every fill call. Nothing in the fill path
//! reaches for a process-wide default stream or allocator.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::device::Device;
use crate::{FillError, Result};

/// Ordering context onto which fill work is enqueued.
pub trait Stream: Send + Sync {
    fn device(&self) -> Device;

    /// Block until everything enqueued so far has completed.
    ///
    /// Failures of enqueued work are reported here, not when the work was
    /// enqueued.
    fn synchronize(&self) -> Result<()>;
}

/// Raw device-visible allocation handed out by a [`MemoryResource`].
#[derive(Debug, PartialEq, Eq)]
pub struct Scratch {
    addr: u64,
    bytes: usize,
}

impl Scratch {
    /// # Safety
    /// `addr` must be a live allocation of at least `bytes` bytes owned by
    /// the resource that will receive it back through `deallocate`.
    pub unsafe fn from_raw_parts(addr: u64, bytes: usize) -> Self {
        Self { addr, bytes }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Stream-ordered allocator for the small per-call metadata.
pub trait MemoryResource<S: Stream + ?Sized>: Send + Sync {
    fn allocate(&self, bytes: usize, stream: &S) -> Result<Scratch>;

    /// Release `scratch` once all work enqueued on `stream` before this call
    /// has finished with it.
    fn deallocate(&self, scratch: Scratch, stream: &S);
}

impl<S: Stream + ?Sized, M: MemoryResource<S> + ?Sized> MemoryResource<S> for &M {
    fn allocate(&self, bytes: usize, stream: &S) -> Result<Scratch> {
        (**self).allocate(bytes, stream)
    }

    fn deallocate(&self, scratch: Scratch, stream: &S) {
        (**self).deallocate(scratch, stream)
    }
}

/// Returns its scratch to the resource, stream-ordered, when dropped.
pub struct ScratchGuard<'a, S: Stream + ?Sized, M: MemoryResource<S> + ?Sized> {
    scratch: Scratch,
    mr: &'a M,
    stream: &'a S,
}

impl<'a, S: Stream + ?Sized, M: MemoryResource<S> + ?Sized> ScratchGuard<'a, S, M> {
    pub fn allocate(mr: &'a M, bytes: usize, stream: &'a S) -> Result<Self> {
        let scratch = mr.allocate(bytes, stream)?;
        Ok(Self { scratch, mr, stream })
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }
}

impl<S: Stream + ?Sized, M: MemoryResource<S> + ?Sized> Drop for ScratchGuard<'_, S, M> {
    fn drop(&mut self) {
        let scratch = std::mem::replace(&mut self.scratch, Scratch { addr: 0, bytes: 0 });
        self.mr.deallocate(scratch, self.stream);
    }
}

/// Adaptor that caps the bytes outstanding through an upstream resource.
///
/// The budget counts bytes handed out by `allocate` and not yet passed back
/// to `deallocate`. A returned block leaves the budget immediately, even
/// though the upstream may only release it once the stream reaches the free.
/// The cap bounds what callers hold, not what the device has reclaimed.
#[derive(Debug)]
pub struct LimitingResource<M> {
    upstream: M,
    limit: usize,
    allocated: AtomicUsize,
}

impl<M> LimitingResource<M> {
    pub fn new(upstream: M, limit: usize) -> Self {
        Self { upstream, limit, allocated: AtomicUsize::new(0) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes currently handed out and not yet returned.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    pub fn upstream(&self) -> &M {
        &self.upstream
    }
}

impl<S: Stream + ?Sized, M: MemoryResource<S>> MemoryResource<S> for LimitingResource<M> {
    fn allocate(&self, bytes: usize, stream: &S) -> Result<Scratch> {
        let reserved = self.allocated.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
            cur.checked_add(bytes).filter(|&next| next <= self.limit)
        });
        if let Err(current) = reserved {
            return Err(FillError::Allocation {
                bytes,
                reason: format!(
                    "limit of {} bytes exceeded ({} already allocated)",
                    self.limit, current
                ),
            });
        }
        let result = self.upstream.allocate(bytes, stream);
        if result.is_err() {
            self.allocated.fetch_sub(bytes, Ordering::AcqRel);
        }
        result
    }

    fn deallocate(&self, scratch: Scratch, stream: &S) {
        let bytes = scratch.bytes();
        // Stream-ordered; the block may still be in use by queued work.
        self.upstream.deallocate(scratch, stream);
        self.allocated.fetch_sub(bytes, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InlineStream;

    impl Stream for InlineStream {
        fn device(&self) -> Device {
            Device::Cpu
        }

        fn synchronize(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingResource {
        live: AtomicUsize,
        next: AtomicUsize,
    }

    impl MemoryResource<InlineStream> for CountingResource {
        fn allocate(&self, bytes: usize, _stream: &InlineStream) -> Result<Scratch> {
            self.live.fetch_add(1, Ordering::SeqCst);
            let addr = 0x1000 + self.next.fetch_add(bytes, Ordering::SeqCst) as u64;
            Ok(unsafe { Scratch::from_raw_parts(addr, bytes) })
        }

        fn deallocate(&self, _scratch: Scratch, _stream: &InlineStream) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let mr = CountingResource::default();
        let stream = InlineStream;
        {
            let guard = ScratchGuard::allocate(&mr, 64, &stream).unwrap();
            assert_eq!(guard.scratch().bytes(), 64);
            assert_eq!(mr.live.load(Ordering::SeqCst), 1);
        }
        assert_eq!(mr.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_limit_enforced() {
        let mr = LimitingResource::new(CountingResource::default(), 100);
        let stream = InlineStream;
        let a = mr.allocate(60, &stream).unwrap();
        assert_eq!(mr.allocated_bytes(), 60);

        let err = mr.allocate(50, &stream).unwrap_err();
        assert!(matches!(err, FillError::Allocation { bytes: 50, .. }));
        assert_eq!(mr.allocated_bytes(), 60);

        mr.deallocate(a, &stream);
        assert_eq!(mr.allocated_bytes(), 0);
        let b = mr.allocate(100, &stream).unwrap();
        mr.deallocate(b, &stream);
        assert_eq!(mr.upstream().live.load(Ordering::SeqCst), 0);
    }
}
