//! CUDA fill backend.
//!
//! The metadata tables go to scratch with one async host-to-device copy; each
//! chunk is then one launch of the width-specific fill kernel.

use std::sync::Arc;

use cudarc::driver::{result, sys, CudaDevice, LaunchAsync};
use mbfill_core::{
    Chunk, Device, ElementWidth, FillBackend, FillConfig, FillElement, FillError, MetadataTables, Result,
    Scratch, StagedMetadata,
};

use super::context::{get_device, CudaError};
use super::launch::{get_or_load_func, grid_1d};
use super::stream::CudaStreamHandle;

const MULTIBUFFER_FILL_CU: &str = include_str!("kernels/multibuffer_fill.cu");
const MODULE: &str = "multibuffer_fill";
const FUNCS: &[&str] = &[
    "multibuffer_fill_b8",
    "multibuffer_fill_b16",
    "multibuffer_fill_b32",
    "multibuffer_fill_b64",
];

/// Fill backend for one GPU.
#[derive(Debug, Clone)]
pub struct CudaBackend {
    dev: Arc<CudaDevice>,
    device_idx: usize,
    max_grid_x: u64,
}

impl CudaBackend {
    pub fn new(device_idx: usize) -> std::result::Result<Self, CudaError> {
        let dev = get_device(device_idx)?;
        let max_grid_x = dev
            .attribute(sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_X)
            .map_err(|e| CudaError::DeviceInit(format!("max grid dim: {e}")))?;
        Ok(Self { dev, device_idx, max_grid_x: max_grid_x.max(1) as u64 })
    }

    pub fn device_idx(&self) -> usize {
        self.device_idx
    }

    /// Largest grid along x this device accepts.
    pub fn max_grid_x(&self) -> u64 {
        self.max_grid_x
    }
}

fn kernel_name(width: ElementWidth) -> String {
    format!("{MODULE}_{}", width.kernel_suffix())
}

/// Reinterpret `value` as the unsigned integer of the same width.
fn value_bits<T: FillElement, U: bytemuck::Pod>(value: T) -> Result<U> {
    bytemuck::try_pod_read_unaligned(bytemuck::bytes_of(&value)).map_err(|e| {
        FillError::InvalidConfig(format!("{value:?} does not match its declared width: {e}"))
    })
}

impl FillBackend for CudaBackend {
    type Stream = CudaStreamHandle;

    fn name(&self) -> &'static str {
        "cuda"
    }

    fn device(&self) -> Device {
        Device::Cuda(self.device_idx)
    }

    fn dispatch_capacity(&self, config: &FillConfig) -> u64 {
        self.max_grid_x.saturating_mul(u64::from(config.block_size))
    }

    fn upload(
        &self,
        tables: MetadataTables,
        scratch: &Scratch,
        stream: &CudaStreamHandle,
    ) -> Result<StagedMetadata> {
        if scratch.bytes() < tables.byte_len() {
            return Err(FillError::Execution(format!(
                "scratch of {} bytes cannot hold {} bytes of metadata",
                scratch.bytes(),
                tables.byte_len()
            )));
        }
        let staged = StagedMetadata::new(scratch.addr(), tables.num_buffers());
        let words = tables.into_words();
        stream.bind()?;
        unsafe { result::memcpy_htod_async(scratch.addr(), &words, stream.raw()) }
            .map_err(|e| CudaError::Memory(format!("metadata upload: {e}")))?;
        stream.retain_host(words);
        Ok(staged)
    }

    fn launch<T: FillElement>(
        &self,
        staged: &StagedMetadata,
        chunk: Chunk,
        value: T,
        config: &FillConfig,
        stream: &CudaStreamHandle,
    ) -> Result<()> {
        let name = kernel_name(T::WIDTH);
        let func = get_or_load_func(
            &self.dev,
            self.device_idx,
            MODULE,
            &name,
            MULTIBUFFER_FILL_CU,
            FUNCS,
        )?;
        let n = usize::try_from(chunk.len())
            .map_err(|_| CudaError::Launch(format!("chunk of {} items", chunk.len())))?;
        let cfg = grid_1d(n, config.block_size as usize)?;

        let offsets = staged.offsets_addr();
        let addrs = staged.addrs_addr();
        let num_buffers = staged.num_buffers() as u64;
        let s = stream.cuda_stream();
        let launched = unsafe {
            match T::WIDTH {
                ElementWidth::W1 => func.launch_on_stream(
                    s,
                    cfg,
                    (offsets, addrs, num_buffers, chunk.start, chunk.end, value_bits::<T, u8>(value)?),
                ),
                ElementWidth::W2 => func.launch_on_stream(
                    s,
                    cfg,
                    (offsets, addrs, num_buffers, chunk.start, chunk.end, value_bits::<T, u16>(value)?),
                ),
                ElementWidth::W4 => func.launch_on_stream(
                    s,
                    cfg,
                    (offsets, addrs, num_buffers, chunk.start, chunk.end, value_bits::<T, u32>(value)?),
                ),
                ElementWidth::W8 => func.launch_on_stream(
                    s,
                    cfg,
                    (offsets, addrs, num_buffers, chunk.start, chunk.end, value_bits::<T, u64>(value)?),
                ),
            }
        };
        launched.map_err(|e| CudaError::Launch(format!("{name}: {e}")))?;
        Ok(())
    }
}
