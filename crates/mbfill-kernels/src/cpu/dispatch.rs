//! Host fill backend: rayon data-parallel dispatch over the flattened index space.

use std::sync::Arc;

use mbfill_core::{
    resolve_owner, Chunk, Device, FillBackend, FillConfig, FillElement, FillError, MetadataTables, Result,
    Scratch, StagedMetadata,
};
use rayon::prelude::*;

use super::stream::HostStream;

/// Runs fill dispatches on a rayon pool, ordered by a [`HostStream`].
///
/// Each dispatch is one stream job; inside it every work index of the chunk
/// is resolved to its owning buffer independently, exactly as a device
/// thread would.
#[derive(Debug, Clone, Default)]
pub struct HostBackend {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl HostBackend {
    /// Backend using rayon's global pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with a dedicated pool of `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("mbfill-host-{i}"))
            .build()
            .map_err(|e| FillError::Unavailable(format!("host thread pool: {e}")))?;
        Ok(Self { pool: Some(Arc::new(pool)) })
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

fn index_range(chunk: Chunk) -> Result<std::ops::Range<usize>> {
    let to_usize = |v: u64| {
        usize::try_from(v).map_err(|_| {
            FillError::Execution(format!("work index {v} exceeds the host address space"))
        })
    };
    Ok(to_usize(chunk.start)?..to_usize(chunk.end)?)
}

impl FillBackend for HostBackend {
    type Stream = HostStream;

    fn name(&self) -> &'static str {
        "host"
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn dispatch_capacity(&self, _config: &FillConfig) -> u64 {
        usize::MAX as u64
    }

    fn upload(
        &self,
        tables: MetadataTables,
        scratch: &Scratch,
        stream: &HostStream,
    ) -> Result<StagedMetadata> {
        if scratch.bytes() < tables.byte_len() {
            return Err(FillError::Execution(format!(
                "scratch of {} bytes cannot hold {} bytes of metadata",
                scratch.bytes(),
                tables.byte_len()
            )));
        }
        let staged = StagedMetadata::new(scratch.addr(), tables.num_buffers());
        let dst = scratch.addr();
        stream.enqueue(move || {
            let words = tables.into_words();
            // SAFETY: scratch is live until a later, stream-ordered free and
            // was checked to be large enough above.
            unsafe {
                std::ptr::copy_nonoverlapping(words.as_ptr(), dst as *mut u64, words.len());
            }
            Ok(())
        })?;
        Ok(staged)
    }

    fn launch<T: FillElement>(
        &self,
        staged: &StagedMetadata,
        chunk: Chunk,
        value: T,
        config: &FillConfig,
        stream: &HostStream,
    ) -> Result<()> {
        let range = index_range(chunk)?;
        let n = staged.num_buffers();
        let offsets_addr = staged.offsets_addr();
        let addrs_addr = staged.addrs_addr();
        let min_len = config.host_min_par_len;
        let pool = self.pool.clone();

        stream.enqueue(move || {
            // SAFETY: the upload job ran before this one on the same stream,
            // and the scratch is freed only after it.
            let offsets = unsafe { std::slice::from_raw_parts(offsets_addr as *const u64, n + 1) };
            let addrs = unsafe { std::slice::from_raw_parts(addrs_addr as *const u64, n) };
            let missed = std::sync::atomic::AtomicUsize::new(0);

            let body = || {
                range.into_par_iter().with_min_len(min_len).for_each(|i| {
                    match resolve_owner(offsets, i as u64) {
                        Some(slot) => {
                            let dst = addrs[slot.buffer] as *mut T;
                            // SAFETY: resolve_owner only yields offsets below
                            // the owning buffer's length, and each index maps
                            // to exactly one element.
                            unsafe { dst.add(slot.offset as usize).write(value) };
                        }
                        None => {
                            missed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                });
            };
            match &pool {
                Some(pool) => pool.install(body),
                None => body(),
            }

            match missed.into_inner() {
                0 => Ok(()),
                m => Err(FillError::Execution(format!("{m} work items had no owning buffer"))),
            }
        })
    }
}
