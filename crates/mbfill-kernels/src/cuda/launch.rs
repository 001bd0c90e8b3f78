//! Kernel loading with NVRTC compilation and a per-device module cache.

use std::collections::HashSet;
use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaFunction, LaunchConfig};
use parking_lot::Mutex;

use super::context::CudaError;

/// Modules already compiled and loaded, keyed by (device index, module name).
static LOADED: std::sync::OnceLock<Mutex<HashSet<(usize, String)>>> =
    std::sync::OnceLock::new();

fn loaded_set() -> &'static Mutex<HashSet<(usize, String)>> {
    LOADED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Compile `source` and load it as `module_name` on the device, exposing
/// `func_names`. No-op if the module is already loaded.
pub fn ensure_module(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    module_name: &str,
    source: &str,
    func_names: &'static [&'static str],
) -> Result<(), CudaError> {
    let key = (device_idx, module_name.to_string());
    // Held across compilation so two threads never load the same module twice.
    let mut set = loaded_set().lock();
    if set.contains(&key) {
        return Ok(());
    }

    let ptx = cudarc::nvrtc::compile_ptx(source).map_err(|e| CudaError::PtxCompile {
        module: module_name.to_string(),
        msg: e.to_string(),
    })?;

    device.load_ptx(ptx, module_name, func_names).map_err(|e| CudaError::ModuleLoad {
        module: module_name.to_string(),
        msg: e.to_string(),
    })?;

    tracing::debug!(device_idx, module = module_name, "PTX module loaded");
    set.insert(key);
    Ok(())
}

/// Get a kernel handle, compiling and loading its module if needed.
pub fn get_or_load_func(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    module_name: &str,
    func_name: &str,
    source: &str,
    func_names: &'static [&'static str],
) -> Result<CudaFunction, CudaError> {
    ensure_module(device, device_idx, module_name, source, func_names)?;
    device
        .get_func(module_name, func_name)
        .ok_or_else(|| CudaError::FuncNotFound {
            module: module_name.to_string(),
            func: func_name.to_string(),
        })
}

/// Grid dimensions for a 1D launch covering `n` threads.
pub fn grid_1d(n: usize, block_size: usize) -> Result<LaunchConfig, CudaError> {
    let grid = n.div_ceil(block_size);
    let grid = u32::try_from(grid)
        .map_err(|_| CudaError::Launch(format!("{n} threads exceed the 1D grid limit")))?;
    Ok(LaunchConfig {
        grid_dim: (grid, 1, 1),
        block_dim: (block_size as u32, 1, 1),
        shared_mem_bytes: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_1d() {
        let cfg = grid_1d(1000, 256).unwrap();
        assert_eq!(cfg.grid_dim, (4, 1, 1));
        assert_eq!(cfg.block_dim, (256, 1, 1));
        assert_eq!(grid_1d(256, 256).unwrap().grid_dim.0, 1);
        assert!(grid_1d(usize::MAX, 1).is_err());
    }
}
