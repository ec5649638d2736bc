//! Pipeline state declarations and the executor that applies them

pub mod executor;
pub mod source;
pub mod state;
pub mod uniform;

pub use executor::ExecutorContext;
pub use source::build_program_source;
pub use state::{
    Access, BlendFactor, BlendState, BufferSlot, DepthState, ImageSlot, ImageType, PipelineAssets,
    PipelineState, UniformDecl, VertexAttribute, VertexBinding, VertexInputLayout,
};
pub use uniform::{
    GlobalUniformId, GlobalUniforms, ResourceId, UniformSource, UniformType, UniformValue,
};
