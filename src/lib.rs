//! thin-compute: a GPU-resident compute/draw task runtime
//!
//! Programs are composed from dependency-tracked snippets and shared host/device
//! layouts, buffers are handed out by a manager that infers the barriers between
//! passes, and a particle pipeline spawns, simulates, depth-sorts and draws particles
//! without ever reading a counter back to the host.
//!
//! The backend is abstracted behind [`gpu::Device`]. [`gpu::cpu::CpuDevice`] executes
//! every pass with registered Rust kernels and is what the test-suite runs against.

pub mod camera;
pub mod config;
pub mod error;
pub mod gpu;
pub mod memory;
pub mod particles;
pub mod sort;

pub use camera::ViewTransforms;
pub use config::{MemoryConfig, ParticleConfig, RuntimeConfig};
pub use error::{
    BufferError, CompileError, ConfigError, LayoutError, PackError, RuntimeError, RuntimeResult,
    SnippetError, SortError,
};
pub use gpu::{BarrierBits, Device, GpuRuntime, ShaderLibrary};
pub use memory::{BufferHandle, BufferKind, BufferManager};
pub use particles::{ParticleEmission, ParticleSystem};
pub use sort::SortOrder;
