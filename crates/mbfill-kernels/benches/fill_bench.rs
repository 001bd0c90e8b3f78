//! Benchmark: one batched fill vs one dispatch per buffer, host backend.

use std::time::Instant;

use mbfill_core::{multibuffer_fill, DeviceSpan, FillConfig, Stream};
use mbfill_kernels::{HostBackend, HostMemoryResource, HostStream};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Ctx {
    backend: HostBackend,
    stream: HostStream,
    mr: HostMemoryResource,
    config: FillConfig,
}

fn bench_batched(ctx: &Ctx, spans: &[DeviceSpan<u32>], iters: usize) -> f64 {
    let start = Instant::now();
    for i in 0..iters {
        multibuffer_fill(&ctx.backend, spans, i as u32, &ctx.stream, &ctx.mr, &ctx.config).unwrap();
    }
    ctx.stream.synchronize().unwrap();
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_per_buffer(ctx: &Ctx, spans: &[DeviceSpan<u32>], iters: usize) -> f64 {
    let start = Instant::now();
    for i in 0..iters {
        for span in spans {
            multibuffer_fill(
                &ctx.backend,
                std::slice::from_ref(span),
                i as u32,
                &ctx.stream,
                &ctx.mr,
                &ctx.config,
            )
            .unwrap();
        }
    }
    ctx.stream.synchronize().unwrap();
    start.elapsed().as_secs_f64() / iters as f64
}

fn main() {
    let ctx = Ctx {
        backend: HostBackend::new(),
        stream: HostStream::new().unwrap(),
        mr: HostMemoryResource::new(),
        config: FillConfig::default(),
    };
    println!("=== mbfill Host Benchmark ===");
    println!("threads: {}\n", ctx.backend.num_threads());

    // (buffer count, max elements per buffer)
    let cases: &[(usize, usize)] = &[(8, 1 << 16), (64, 4096), (512, 512), (4096, 64), (16384, 16)];

    println!("{:<16} {:>12} {:>14} {:>14} {:>10}",
        "buffers x max", "elements", "batched (us)", "per-buf (us)", "speedup");
    println!("{}", "-".repeat(70));

    let mut rng = StdRng::seed_from_u64(42);
    for &(count, max_len) in cases {
        let mut bufs: Vec<Vec<u32>> = (0..count).map(|_| vec![0; rng.gen_range(0..=max_len)]).collect();
        let total: usize = bufs.iter().map(Vec::len).sum();
        let spans: Vec<DeviceSpan<u32>> =
            bufs.iter_mut().map(|b| unsafe { DeviceSpan::from_host_slice(b) }).collect();

        let iters = 20;
        bench_batched(&ctx, &spans, 2);
        let batched = bench_batched(&ctx, &spans, iters);
        let per_buffer = bench_per_buffer(&ctx, &spans, iters);

        println!("{:<16} {:>12} {:>14.1} {:>14.1} {:>9.2}x",
            format!("{count} x {max_len}"),
            total,
            batched * 1e6,
            per_buffer * 1e6,
            per_buffer / batched);
        assert!(bufs.iter().flatten().all(|&v| v == iters as u32 - 1));
    }
}
