//! The batched fill driver: builder, stager, planner, then one dispatch per chunk.

use crate::config::FillConfig;
use crate::device::Device;
use crate::error::FillError;
use crate::layout::BufferLayout;
use crate::plan::{effective_ceiling, plan_chunks, Chunk, ChunkPlan};
use crate::resource::{MemoryResource, Scratch, ScratchGuard, Stream};
use crate::span::{DeviceSpan, FillElement};
use crate::stage::{MetadataTables, StagedMetadata};
use crate::Result;

/// An execution backend able to run the two device-side steps of a fill.
pub trait FillBackend {
    type Stream: Stream;

    fn name(&self) -> &'static str;

    /// Device this backend executes on.
    fn device(&self) -> Device;

    /// Reject a stream this backend cannot enqueue onto. Runs before any
    /// scratch is taken from the memory resource.
    fn check_stream(&self, stream: &Self::Stream) -> Result<()> {
        let (backend, on) = (self.device(), stream.device());
        if backend != on {
            return Err(FillError::DeviceMismatch { backend, stream: on });
        }
        Ok(())
    }

    /// Largest number of work items one dispatch can address on this
    /// backend under `config`.
    fn dispatch_capacity(&self, config: &FillConfig) -> u64;

    /// Enqueue the copy of `tables` into `scratch` on `stream`.
    ///
    /// `scratch` holds at least `tables.byte_len()` bytes. Later launches on
    /// the same stream must observe the completed copy.
    fn upload(
        &self,
        tables: MetadataTables,
        scratch: &Scratch,
        stream: &Self::Stream,
    ) -> Result<StagedMetadata>;

    /// Enqueue one data-parallel dispatch writing `value` to every work item
    /// in `chunk`.
    fn launch<T: FillElement>(
        &self,
        staged: &StagedMetadata,
        chunk: Chunk,
        value: T,
        config: &FillConfig,
        stream: &Self::Stream,
    ) -> Result<()>;
}

/// Layout and chunk schedule of one call, computed without touching a device.
#[derive(Debug, Clone)]
pub struct FillPlan {
    layout: BufferLayout,
    chunks: ChunkPlan,
}

impl FillPlan {
    /// Plan a fill of `bufs` for a backend that can address `capacity` work
    /// items per dispatch.
    pub fn new<T>(bufs: &[DeviceSpan<T>], config: &FillConfig, capacity: u64) -> Result<Self> {
        config.validate()?;
        let layout = BufferLayout::build(bufs)?;
        let ceiling = effective_ceiling(config.max_work_per_dispatch, capacity);
        let chunks = plan_chunks(layout.total(), ceiling)?;
        Ok(Self { layout, chunks })
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn total(&self) -> u64 {
        self.layout.total()
    }

    pub fn ceiling(&self) -> u64 {
        self.chunks.ceiling()
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> ChunkPlan {
        self.chunks.clone()
    }
}

/// Fill every element of every buffer in `bufs` with `value`.
///
/// All work is enqueued on `stream` in order: the metadata upload first,
/// then one dispatch per chunk, then the stream-ordered release of the
/// scratch taken from `mr`. The call returns once everything is enqueued;
/// the buffers hold `value` only after `stream` is synchronized, and device
/// faults surface from that synchronization.
///
/// Null or overflowing buffer sets, a stream the backend rejects, and
/// allocation failures are reported before anything is enqueued. An empty set (or one whose buffers all have
/// length zero) enqueues nothing and allocates nothing.
pub fn multibuffer_fill<B, T, M>(
    backend: &B,
    bufs: &[DeviceSpan<T>],
    value: T,
    stream: &B::Stream,
    mr: &M,
    config: &FillConfig,
) -> Result<()>
where
    B: FillBackend,
    T: FillElement,
    M: MemoryResource<B::Stream> + ?Sized,
{
    backend.check_stream(stream)?;
    let capacity = backend.dispatch_capacity(config);
    let plan = FillPlan::new(bufs, config, capacity)?;

    let span = tracing::debug_span!(
        "multibuffer_fill",
        backend = backend.name(),
        device = %stream.device(),
        buffers = bufs.len(),
        total = plan.total(),
        chunks = plan.num_chunks(),
    );
    let _enter = span.enter();

    if plan.total() == 0 {
        tracing::debug!("no work items, nothing enqueued");
        return Ok(());
    }
    if capacity < config.max_work_per_dispatch {
        tracing::debug!(
            configured = config.max_work_per_dispatch,
            capacity,
            "dispatch ceiling clamped to backend capacity"
        );
    }

    let tables = MetadataTables::new(plan.layout(), bufs);
    let scratch = ScratchGuard::allocate(mr, tables.byte_len(), stream)?;
    let staged = backend.upload(tables, scratch.scratch(), stream)?;

    for chunk in plan.chunks() {
        tracing::trace!(start = chunk.start, end = chunk.end, "dispatch");
        backend.launch(&staged, chunk, value, config, stream)?;
    }
    Ok(())
}

/// [`multibuffer_fill`] with the all-zero bit pattern, the usual way null
/// masks and offset arrays are initialized.
pub fn multibuffer_zero<B, T, M>(
    backend: &B,
    bufs: &[DeviceSpan<T>],
    stream: &B::Stream,
    mr: &M,
    config: &FillConfig,
) -> Result<()>
where
    B: FillBackend,
    T: FillElement,
    M: MemoryResource<B::Stream> + ?Sized,
{
    multibuffer_fill(backend, bufs, T::zeroed(), stream, mr, config)
}
