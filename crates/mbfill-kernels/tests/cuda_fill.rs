//! GPU integration tests for the CUDA fill backend.
//! Run with: cargo test -p mbfill-kernels --features cuda -- --nocapture

#![cfg(feature = "cuda")]

use mbfill_core::{
    multibuffer_fill, multibuffer_zero, DeviceSpan, ErrorKind, FillBackend, FillConfig,
    LimitingResource, Stream,
};
use mbfill_kernels::cuda::{CudaAsyncResource, CudaBackend, CudaBuffer, CudaError, CudaStreamHandle};

fn setup() -> (CudaBackend, CudaStreamHandle) {
    let backend = CudaBackend::new(0).expect("no CUDA device 0");
    let stream = CudaStreamHandle::new(0).expect("stream on device 0");
    (backend, stream)
}

fn alloc<T: mbfill_core::FillElement>(sizes: &[usize]) -> Vec<CudaBuffer<T>> {
    sizes.iter().map(|&n| CudaBuffer::zeros(0, n).unwrap()).collect()
}

fn spans<T: mbfill_core::FillElement>(bufs: &mut [CudaBuffer<T>]) -> Vec<DeviceSpan<T>> {
    bufs.iter_mut().map(|b| unsafe { b.span() }).collect()
}

#[test]
fn test_cuda_single_small_buffer() {
    let (backend, stream) = setup();
    let mut bufs = alloc::<u16>(&[2]);
    let handles = spans(&mut bufs);
    multibuffer_fill(&backend, &handles, 0xFFFF, &stream, &CudaAsyncResource, &FillConfig::default())
        .unwrap();
    stream.synchronize().unwrap();
    assert_eq!(bufs[0].to_host().unwrap(), vec![0xFFFF, 0xFFFF]);
}

#[test]
fn test_cuda_zero_length_buffer() {
    let (backend, stream) = setup();
    let mut bufs = alloc::<u32>(&[0, 5, 3]);
    let handles = spans(&mut bufs);
    assert!(handles[0].is_null());
    multibuffer_fill(&backend, &handles, 42, &stream, &CudaAsyncResource, &FillConfig::default())
        .unwrap();
    stream.synchronize().unwrap();
    assert_eq!(bufs[1].to_host().unwrap(), vec![42; 5]);
    assert_eq!(bufs[2].to_host().unwrap(), vec![42; 3]);
}

#[test]
fn test_cuda_chunked_single_buffer() {
    let (backend, stream) = setup();
    let config = FillConfig::with_max_work_per_dispatch(100_000);
    let mut bufs = alloc::<f32>(&[250_000]);
    let handles = spans(&mut bufs);
    multibuffer_fill(&backend, &handles, 1.5, &stream, &CudaAsyncResource, &config).unwrap();
    stream.synchronize().unwrap();
    assert!(bufs[0].to_host().unwrap().iter().all(|&v| v == 1.5));
}

#[test]
fn test_cuda_uneven_buffers_no_overrun() {
    let (backend, stream) = setup();
    let sizes = [131_073usize, 200, 160_000, 300_000, 500_000, 600, 131_700, 800];
    let config = FillConfig::with_max_work_per_dispatch(100_000);

    // Allocated before the fill targets; must keep its contents.
    let guard = CudaBuffer::from_host(0, &[7u8; 1024]).unwrap();
    let mut bufs = alloc::<u8>(&sizes);
    let handles = spans(&mut bufs);
    multibuffer_fill(&backend, &handles, 0xA5, &stream, &CudaAsyncResource, &config).unwrap();
    stream.synchronize().unwrap();

    for (k, b) in bufs.iter().enumerate() {
        let host = b.to_host().unwrap();
        assert_eq!(host.len(), sizes[k]);
        assert!(host.iter().all(|&v| v == 0xA5), "buffer {k}");
    }
    assert!(guard.to_host().unwrap().iter().all(|&v| v == 7));
}

#[test]
fn test_cuda_all_widths() {
    let (backend, stream) = setup();
    let config = FillConfig::default();
    let mut a = alloc::<i8>(&[100, 3]);
    let mut b = alloc::<i64>(&[17, 1]);
    let mut c = vec![CudaBuffer::from_host(0, &[9u32; 64]).unwrap()];
    let (ha, hb, hc) = (spans(&mut a), spans(&mut b), spans(&mut c));
    multibuffer_fill(&backend, &ha, -1i8, &stream, &CudaAsyncResource, &config).unwrap();
    multibuffer_fill(&backend, &hb, i64::MIN, &stream, &CudaAsyncResource, &config).unwrap();
    multibuffer_zero(&backend, &hc, &stream, &CudaAsyncResource, &config).unwrap();
    stream.synchronize().unwrap();
    assert!(a.iter().all(|buf| buf.to_host().unwrap().iter().all(|&v| v == -1)));
    assert!(b.iter().all(|buf| buf.to_host().unwrap().iter().all(|&v| v == i64::MIN)));
    assert_eq!(c[0].to_host().unwrap(), vec![0u32; 64]);
}

#[test]
fn test_cuda_capacity_clamps_ceiling() {
    let backend = CudaBackend::new(0).unwrap();
    let config = FillConfig::default();
    assert_eq!(
        backend.dispatch_capacity(&config),
        backend.max_grid_x() * u64::from(config.block_size)
    );
}

#[test]
fn test_cuda_allocation_failure() {
    let (backend, stream) = setup();
    let mr = LimitingResource::new(CudaAsyncResource, 8);
    let mut bufs = alloc::<u32>(&[4]);
    let handles = spans(&mut bufs);
    let err = multibuffer_fill(&backend, &handles, 1, &stream, &mr, &FillConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Allocation);
    stream.synchronize().unwrap();
    assert_eq!(bufs[0].to_host().unwrap(), vec![0; 4]);
}

#[test]
fn test_cuda_result_independent_of_buffer_order() {
    let (backend, stream) = setup();
    let sizes = [0usize, 5, 3, 0, 17, 1];
    let config = FillConfig::with_max_work_per_dispatch(7);

    let mut forward = alloc::<u32>(&sizes);
    let handles = spans(&mut forward);
    multibuffer_fill(&backend, &handles, 0xC0FFEE, &stream, &CudaAsyncResource, &config).unwrap();

    let reversed_sizes: Vec<usize> = sizes.iter().rev().copied().collect();
    let mut reversed = alloc::<u32>(&reversed_sizes);
    let handles = spans(&mut reversed);
    multibuffer_fill(&backend, &handles, 0xC0FFEE, &stream, &CudaAsyncResource, &config).unwrap();
    stream.synchronize().unwrap();

    let n = sizes.len();
    for k in 0..n {
        let a = forward[k].to_host().unwrap();
        let b = reversed[n - 1 - k].to_host().unwrap();
        assert_eq!(a, vec![0xC0FFEE; sizes[k]]);
        assert_eq!(a, b, "buffer {k}");
    }
}

#[test]
fn test_cuda_buffer_size_overflow_rejected() {
    let err = CudaBuffer::<u64>::zeros(0, usize::MAX).unwrap_err();
    assert!(matches!(err, CudaError::Memory(_)), "{err}");
}
