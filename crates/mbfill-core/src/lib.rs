//! # mbfill-core
//!
//! Batched multi-buffer fill for columnar decode paths.
//!
//! Fills an arbitrary set of differently sized device buffers with one value
//! using as few data-parallel dispatches as the device allows:
//! - `layout`: per-buffer counts folded into a prefix-sum table
//! - `resolve`: flattened work index -> (buffer, offset) by binary search
//! - `plan`: `[0, total)` split into ceiling-bounded chunks
//! - `stage`: the small metadata tables uploaded once per call
//! - `fill`: the driver, generic over an execution backend
//!
//! Backends (host, CUDA) live in `mbfill-kernels`.

pub mod config;
pub mod device;
pub mod error;
pub mod fill;
pub mod layout;
pub mod plan;
pub mod resolve;
pub mod resource;
pub mod span;
pub mod stage;

pub use config::FillConfig;
pub use device::Device;
pub use error::{ErrorKind, FillError};
pub use fill::{multibuffer_fill, multibuffer_zero, FillBackend, FillPlan};
pub use layout::BufferLayout;
pub use plan::{plan_chunks, Chunk, ChunkPlan};
pub use resolve::{resolve_owner, Slot};
pub use resource::{LimitingResource, MemoryResource, Scratch, ScratchGuard, Stream};
pub use span::{DeviceSpan, ElementWidth, FillElement};
pub use stage::{MetadataTables, StagedMetadata};

pub type Result<T> = std::result::Result<T, FillError>;
