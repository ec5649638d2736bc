//! Device boundary
//!
//! The platform layer supplies the device context. Everything above this trait
//! (buffer manager, executor, particle and sort passes) only issues the calls below,
//! in order, from a single host thread.

use crate::error::CompileError;
use crate::gpu::barrier::BarrierBits;
use crate::gpu::pipeline::{BlendState, DepthState, UniformValue, VertexInputLayout};

/// Device-side buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawBuffer(pub u32);

/// Compiled and linked program object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Opaque image supplied by the asset loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u32);

/// Storage hint for a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Contents fixed at creation
    Immutable,
    /// Persistently mapped, written by the host
    HostVisible,
    /// Never visible to the host
    DeviceLocal,
}

/// Primitive assembly mode for draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    Points,
    Lines,
    Triangles,
    TriangleStrip,
}

/// Index element type for indexed draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> u64 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// A draw call as seen by the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCall {
    Arrays {
        mode: PrimitiveMode,
        first: u32,
        count: u32,
        instances: u32,
    },
    ArraysIndirect {
        mode: PrimitiveMode,
        buffer: RawBuffer,
        offset: u64,
    },
    Elements {
        mode: PrimitiveMode,
        index_type: IndexType,
        count: u32,
        index_offset: u64,
        instances: u32,
    },
    ElementsIndirect {
        mode: PrimitiveMode,
        index_type: IndexType,
        buffer: RawBuffer,
        offset: u64,
    },
}

/// Program stage configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Compute { workgroup_size: [u32; 3] },
    Render,
}

/// Binding classes, each numbered independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingClass {
    Uniform,
    StorageBuffer,
    Image,
    VertexAttribute,
}

/// Reflection entry for one declared binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub name: String,
    pub class: BindingClass,
    pub location: u32,
}

/// Everything a device needs to build a program
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    /// Entry point name, also used as the program label
    pub entry: String,
    pub kind: ProgramKind,
    pub source: String,
    pub bindings: Vec<BindingInfo>,
}

/// A storage/vertex binding of a buffer sub-range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    pub buffer: RawBuffer,
    pub offset: u64,
    pub size: u64,
}

/// Device context supplied by the platform layer
pub trait Device {
    fn create_buffer(&mut self, size: u64, usage: BufferUsage, data: Option<&[u8]>) -> RawBuffer;

    fn destroy_buffer(&mut self, buffer: RawBuffer);

    /// Host write through a persistent mapping
    fn write_buffer(&mut self, buffer: RawBuffer, offset: u64, data: &[u8]);

    /// Make host writes in a mapped range visible to the device
    fn flush_mapped_range(&mut self, buffer: RawBuffer, offset: u64, size: u64);

    /// Debug read-back. Never used on the per-frame path.
    fn read_buffer(&mut self, buffer: RawBuffer, offset: u64, size: u64) -> Vec<u8>;

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, CompileError>;

    fn bind_program(&mut self, program: ProgramId);

    fn bind_storage_buffer(&mut self, binding: u32, buffer: BufferBinding);

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferBinding, stride: u32);

    fn bind_index_buffer(&mut self, buffer: BufferBinding);

    fn bind_image(&mut self, unit: u32, image: ImageHandle);

    fn set_uniform(&mut self, location: u32, value: &UniformValue);

    fn set_vertex_input(&mut self, layout: Option<&VertexInputLayout>);

    fn set_depth_state(&mut self, depth: DepthState);

    fn set_blend_state(&mut self, blend: Option<BlendState>);

    fn memory_barrier(&mut self, bits: BarrierBits);

    fn dispatch(&mut self, groups: [u32; 3]);

    /// Dispatch with group counts read from `buffer` at `offset` when the device executes it
    fn dispatch_indirect(&mut self, buffer: RawBuffer, offset: u64);

    fn draw(&mut self, call: DrawCall);
}
