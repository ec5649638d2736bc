//! GPU task runtime
//!
//! Shared layouts and snippets compose device programs, pipeline states describe what
//! a pass binds, and the executor issues dispatches and draws against a `Device` with
//! the barriers the buffer manager infers.

pub mod barrier;
pub mod commands;
pub mod cpu;
pub mod device;
pub mod layout;
pub mod library;
pub mod pipeline;
pub mod runtime;
pub mod snippet;

pub use barrier::BarrierBits;
pub use commands::{
    CommandLayouts, DispatchIndirectCommand, DrawArraysIndirectCommand, DrawElementsIndirectCommand,
};
pub use device::{
    BufferBinding, BufferUsage, Device, DrawCall, ImageHandle, IndexType, PrimitiveMode, ProgramId,
    ProgramKind, ProgramSource, RawBuffer,
};
pub use library::ShaderLibrary;
pub use pipeline::{
    Access, BlendState, DepthState, ExecutorContext, PipelineAssets, PipelineState, UniformSource,
    UniformType, UniformValue, VertexInputLayout,
};
pub use runtime::GpuRuntime;
pub use snippet::{SnippetGraph, SnippetId};
