use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mbfill_core::{resolve_owner, Chunk, DeviceSpan, FillConfig, FillPlan, Stream};
use mbfill_kernels::{fill_host, HostBackend, HostMemoryResource, HostStream};

#[derive(Parser)]
#[command(
    name = "mbfill",
    about = "Batched multi-buffer fill",
    long_about = "Fill many differently sized buffers with one value in as few\ndispatches as the device allows. Inspect chunk plans and benchmark backends.",
    version
)]
struct Cli {
    /// JSON fill config; MBFILL_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backends and the effective fill config
    Info,
    /// Print the chunk schedule for a set of buffer sizes
    Plan {
        /// Buffer element counts (comma-separated)
        #[arg(long, default_value = "131073,200,160000,300000,500000,600,131700,800")]
        sizes: String,
        /// Override the work-per-dispatch ceiling
        #[arg(long)]
        ceiling: Option<u64>,
    },
    /// Fill u32 buffers repeatedly and report throughput
    Bench {
        /// Buffer element counts (comma-separated)
        #[arg(long, default_value = "131073,200,160000,300000,500000,600,131700,800")]
        sizes: String,
        /// Fill value
        #[arg(long, default_value = "4294967295")]
        value: u32,
        /// Timed iterations
        #[arg(long, default_value = "20")]
        iters: usize,
        /// Backend: host, cuda
        #[arg(long, default_value = "host")]
        backend: String,
        /// Override the work-per-dispatch ceiling
        #[arg(long)]
        ceiling: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("MBFILL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Info => cmd_info(cli.config.as_deref()),
        Commands::Plan { sizes, ceiling } => cmd_plan(cli.config.as_deref(), &sizes, ceiling),
        Commands::Bench { sizes, value, iters, backend, ceiling } => {
            let config = load_config(cli.config.as_deref(), ceiling)?;
            let sizes = parse_sizes(&sizes)?;
            match backend.as_str() {
                "host" => bench_host(&config, &sizes, value, iters),
                "cuda" => bench_cuda(&config, &sizes, value, iters),
                other => bail!("unknown backend '{other}' (expected host or cuda)"),
            }
        }
    }
}

fn load_config(path: Option<&Path>, ceiling: Option<u64>) -> anyhow::Result<FillConfig> {
    let config = match path {
        Some(p) => FillConfig::from_json_file(p)?,
        None => FillConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(c) = ceiling {
        config.max_work_per_dispatch = c;
        config.validate()?;
    }
    Ok(config)
}

fn parse_sizes(s: &str) -> anyhow::Result<Vec<u64>> {
    s.split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().parse::<u64>().with_context(|| format!("bad buffer size '{t}'")))
        .collect()
}

fn cmd_info(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("mbfill v{}\n", env!("CARGO_PKG_VERSION"));

    println!("Platform");
    println!("  OS:   {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);

    println!("\nBackends");
    println!("  host: [x] ({} threads)", HostBackend::new().num_threads());
    print_cuda_info();

    let config = load_config(config_path, None)?;
    println!("\nConfig");
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(feature = "cuda")]
fn print_cuda_info() {
    use mbfill_core::FillBackend;
    use mbfill_kernels::cuda;

    let count = cuda::device_count();
    if count == 0 {
        println!("  cuda: [ ] (no device)");
    }
    for idx in 0..count {
        match cuda::CudaBackend::new(idx) {
            Ok(b) => println!(
                "  cuda:{idx} [x] (max grid x {}, capacity {} at default block size)",
                b.max_grid_x(),
                b.dispatch_capacity(&FillConfig::default())
            ),
            Err(e) => println!("  cuda:{idx} [ ] ({e})"),
        }
    }
}

#[cfg(not(feature = "cuda"))]
fn print_cuda_info() {
    println!("  cuda: [ ] (built without the `cuda` feature)");
}

fn cmd_plan(config_path: Option<&Path>, sizes: &str, ceiling: Option<u64>) -> anyhow::Result<()> {
    let config = load_config(config_path, ceiling)?;
    let sizes = parse_sizes(sizes)?;
    let spans: Vec<DeviceSpan<u8>> = sizes
        .iter()
        .map(|&n| usize::try_from(n).map(|len| unsafe { DeviceSpan::from_raw_parts(1, len) }))
        .collect::<Result<_, _>>()
        .context("buffer size exceeds the address space")?;
    let plan = FillPlan::new(&spans, &config, u64::MAX)?;
    let layout = plan.layout();

    println!("buffers: {}  (non-empty: {})", layout.num_buffers(), layout.non_empty_buffers());
    println!("total:   {}", plan.total());
    println!("ceiling: {}", plan.ceiling());
    println!("chunks:  {}\n", plan.num_chunks());

    println!("{:>6} {:>12} {:>12} {:>10} {:>12}", "chunk", "start", "end", "len", "buffers");
    println!("{}", "-".repeat(56));
    let offsets = layout.offsets();
    for (i, chunk) in plan.chunks().enumerate() {
        let owners = chunk_owners(offsets, chunk);
        println!("{:>6} {:>12} {:>12} {:>10} {:>12}", i, chunk.start, chunk.end, chunk.len(), owners);
    }
    Ok(())
}

/// Buffers a chunk touches, as `k` or `first..=last`.
fn chunk_owners(offsets: &[u64], chunk: Chunk) -> String {
    if chunk.start >= chunk.end {
        return "-".to_string();
    }
    let first = resolve_owner(offsets, chunk.start).map(|s| s.buffer);
    let last = resolve_owner(offsets, chunk.end - 1).map(|s| s.buffer);
    match (first, last) {
        (Some(a), Some(b)) if a == b => format!("{a}"),
        (Some(a), Some(b)) => format!("{a}..={b}"),
        _ => "-".to_string(),
    }
}

fn report(backend: &str, sizes: &[u64], iters: usize, secs: f64) {
    let total: u64 = sizes.iter().sum();
    let per_call = secs / iters as f64;
    println!(
        "{backend}: {} buffers, {} elements, {:.3} ms/fill, {:.2} GB/s",
        sizes.len(),
        total,
        per_call * 1e3,
        (total as f64 * 4.0) / per_call / 1e9
    );
}

fn bench_host(config: &FillConfig, sizes: &[u64], value: u32, iters: usize) -> anyhow::Result<()> {
    let stream = HostStream::new()?;
    let mr = HostMemoryResource::new();
    let mut bufs: Vec<Vec<u32>> = sizes
        .iter()
        .map(|&n| usize::try_from(n).map(|n| vec![0u32; n]))
        .collect::<Result<_, _>>()
        .context("buffer size exceeds the address space")?;
    let spans: Vec<DeviceSpan<u32>> =
        bufs.iter_mut().map(|b| unsafe { DeviceSpan::from_host_slice(b) }).collect();

    fill_host(&spans, value, &stream, &mr, config)?;
    stream.synchronize()?;

    let start = Instant::now();
    for _ in 0..iters {
        fill_host(&spans, value, &stream, &mr, config)?;
    }
    stream.synchronize()?;
    report("host", sizes, iters, start.elapsed().as_secs_f64());

    if !bufs.iter().flatten().all(|&v| v == value) {
        bail!("host fill verification failed");
    }
    Ok(())
}

#[cfg(feature = "cuda")]
fn bench_cuda(config: &FillConfig, sizes: &[u64], value: u32, iters: usize) -> anyhow::Result<()> {
    use mbfill_core::multibuffer_fill;
    use mbfill_kernels::cuda::{CudaAsyncResource, CudaBackend, CudaBuffer, CudaStreamHandle};

    let backend = CudaBackend::new(0)?;
    let stream = CudaStreamHandle::new(0)?;
    let mut bufs = sizes
        .iter()
        .map(|&n| Ok(CudaBuffer::<u32>::zeros(0, usize::try_from(n)?)?))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let spans: Vec<DeviceSpan<u32>> = bufs.iter_mut().map(|b| unsafe { b.span() }).collect();

    multibuffer_fill(&backend, &spans, value, &stream, &CudaAsyncResource, config)?;
    stream.synchronize()?;

    let start = Instant::now();
    for _ in 0..iters {
        multibuffer_fill(&backend, &spans, value, &stream, &CudaAsyncResource, config)?;
    }
    stream.synchronize()?;
    report("cuda:0", sizes, iters, start.elapsed().as_secs_f64());

    for b in &bufs {
        if !b.to_host()?.iter().all(|&v| v == value) {
            bail!("cuda fill verification failed");
        }
    }
    Ok(())
}

#[cfg(not(feature = "cuda"))]
fn bench_cuda(_: &FillConfig, _: &[u64], _: u32, _: usize) -> anyhow::Result<()> {
    bail!("built without the `cuda` feature")
}
