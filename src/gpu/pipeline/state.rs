//! Pipeline state declarations
//!
//! A `PipelineState` is an immutable description of one program and everything bound
//! around it. The compiled program is filled in lazily, once, by the executor.

use std::cell::OnceCell;

use super::uniform::{GlobalUniformId, UniformType, UniformValue};
use crate::gpu::device::{ImageHandle, IndexType, ProgramId, ProgramKind};
use crate::gpu::layout::Encoding;
use crate::gpu::snippet::SnippetId;
use crate::memory::BufferHandle;

/// How a pass accesses a storage buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn writes(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }

    pub fn wgsl(self) -> &'static str {
        match self {
            Access::ReadOnly => "read",
            Access::WriteOnly | Access::ReadWrite => "read_write",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformType,
}

/// Storage buffer slot
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSlot {
    pub name: String,
    /// WGSL element type of the runtime-sized array
    pub element: String,
    pub access: Access,
}

/// Declared image type of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Texture2d,
    Texture2dArray,
    TextureCube,
    Texture3d,
}

impl ImageType {
    pub fn wgsl(self) -> &'static str {
        match self {
            ImageType::Texture2d => "texture_2d<f32>",
            ImageType::Texture2dArray => "texture_2d_array<f32>",
            ImageType::TextureCube => "texture_cube<f32>",
            ImageType::Texture3d => "texture_3d<f32>",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSlot {
    pub name: String,
    pub ty: ImageType,
}

/// One vertex attribute, sourced from `binding` at byte `offset`
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    pub binding: u32,
    pub format: Encoding,
    pub components: u32,
    pub name: String,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub stride: u32,
    /// 0 for per-vertex data, n to advance once every n instances
    pub divisor: u32,
}

/// Vertex input configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VertexInputLayout {
    pub attributes: Vec<VertexAttribute>,
    pub bindings: Vec<VertexBinding>,
}

impl VertexInputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(mut self, stride: u32, divisor: u32) -> Self {
        self.bindings.push(VertexBinding { stride, divisor });
        self
    }

    pub fn attribute(mut self, binding: u32, format: Encoding, components: u32, name: &str, offset: u32) -> Self {
        self.attributes.push(VertexAttribute {
            binding,
            format,
            components,
            name: name.to_string(),
            offset,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub range: (f32, f32),
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            range: (0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendState {
    /// Straight alpha compositing, back to front
    pub const ALPHA: BlendState = BlendState {
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::OneMinusSrcAlpha,
    };

    pub const ADDITIVE: BlendState = BlendState {
        src: BlendFactor::One,
        dst: BlendFactor::One,
    };
}

/// Immutable description of a program and its bindings
#[derive(Debug)]
pub struct PipelineState {
    pub entry: String,
    pub kind: ProgramKind,
    pub snippets: Vec<SnippetId>,
    pub uniforms: Vec<UniformDecl>,
    pub globals: Vec<GlobalUniformId>,
    pub buffers: Vec<BufferSlot>,
    pub images: Vec<ImageSlot>,
    pub vertex_input: Option<VertexInputLayout>,
    pub depth: DepthState,
    pub blend: Option<BlendState>,
    compiled: OnceCell<ProgramId>,
}

impl PipelineState {
    fn new(entry: &str, kind: ProgramKind) -> Self {
        Self {
            entry: entry.to_string(),
            kind,
            snippets: Vec::new(),
            uniforms: Vec::new(),
            globals: Vec::new(),
            buffers: Vec::new(),
            images: Vec::new(),
            vertex_input: None,
            depth: DepthState::default(),
            blend: None,
            compiled: OnceCell::new(),
        }
    }

    pub fn compute(entry: &str, workgroup_size: [u32; 3]) -> Self {
        Self::new(entry, ProgramKind::Compute { workgroup_size })
    }

    pub fn render(entry: &str) -> Self {
        Self::new(entry, ProgramKind::Render)
    }

    /// Root snippet of the program body
    pub fn snippet(mut self, id: SnippetId) -> Self {
        self.snippets.push(id);
        self
    }

    pub fn uniform(mut self, name: &str, ty: UniformType) -> Self {
        self.uniforms.push(UniformDecl {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn global(mut self, id: GlobalUniformId) -> Self {
        self.globals.push(id);
        self
    }

    pub fn buffer(mut self, name: &str, element: &str, access: Access) -> Self {
        self.buffers.push(BufferSlot {
            name: name.to_string(),
            element: element.to_string(),
            access,
        });
        self
    }

    pub fn image(mut self, name: &str, ty: ImageType) -> Self {
        self.images.push(ImageSlot {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn vertex_input(mut self, layout: VertexInputLayout) -> Self {
        self.vertex_input = Some(layout);
        self
    }

    pub fn depth(mut self, depth: DepthState) -> Self {
        self.depth = depth;
        self
    }

    pub fn blend(mut self, blend: BlendState) -> Self {
        self.blend = Some(blend);
        self
    }

    /// Compiled program, once initialized
    pub fn compiled(&self) -> Option<ProgramId> {
        self.compiled.get().copied()
    }

    pub(crate) fn compiled_or_init(&self, init: impl FnOnce() -> ProgramId) -> ProgramId {
        *self.compiled.get_or_init(init)
    }
}

/// Per-call resources, in declaration order of the state's slots
#[derive(Debug, Clone, Default)]
pub struct PipelineAssets {
    pub uniforms: Vec<UniformValue>,
    pub buffers: Vec<BufferHandle>,
    pub images: Vec<ImageHandle>,
    pub vertex_buffers: Vec<BufferHandle>,
    pub index_buffer: Option<(BufferHandle, IndexType)>,
}

impl PipelineAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uniform(mut self, value: UniformValue) -> Self {
        self.uniforms.push(value);
        self
    }

    pub fn buffer(mut self, handle: BufferHandle) -> Self {
        self.buffers.push(handle);
        self
    }

    pub fn image(mut self, image: ImageHandle) -> Self {
        self.images.push(image);
        self
    }

    pub fn vertex_buffer(mut self, handle: BufferHandle) -> Self {
        self.vertex_buffers.push(handle);
        self
    }

    pub fn index_buffer(mut self, handle: BufferHandle, index_type: IndexType) -> Self {
        self.index_buffer = Some((handle, index_type));
        self
    }
}
