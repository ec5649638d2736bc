//! Dispatch executor
//!
//! `ExecutorContext` remembers the last state it applied to the device and filters out
//! redundant binding calls. It is owned by the runtime and passed explicitly into every
//! call; nothing else touches it.
//!
//! Every dispatch and draw runs the same sequence: diff and bind, flush each bound buffer
//! into one barrier mask, issue that barrier, issue the call, then record which buffers
//! the pass may have written.

use rustc_hash::FxHashMap;

use super::source::build_program_source;
use super::state::{BlendState, DepthState, PipelineAssets, PipelineState, VertexInputLayout};
use super::uniform::{GlobalUniforms, UniformValue};
use crate::camera::ViewTransforms;
use crate::error::BufferError;
use crate::gpu::barrier::BarrierBits;
use crate::gpu::device::{
    BufferBinding, Device, DrawCall, ImageHandle, IndexType, PrimitiveMode, ProgramId, ProgramKind,
};
use crate::gpu::library::ShaderLibrary;
use crate::memory::{BufferHandle, BufferManager};

/// Device state as last set by the executor
#[derive(Debug, Default)]
struct AppliedState {
    program: Option<ProgramId>,
    vertex_input: Option<Option<VertexInputLayout>>,
    depth: Option<DepthState>,
    blend: Option<Option<BlendState>>,
    storage: Vec<Option<BufferBinding>>,
    vertex_buffers: Vec<Option<BufferBinding>>,
    index_buffer: Option<BufferBinding>,
    images: Vec<Option<ImageHandle>>,
    /// Uniform values are program state, keyed by program and location
    uniforms: FxHashMap<(ProgramId, u32), UniformValue>,
}

fn changed<T: PartialEq + Copy>(cache: &mut Vec<Option<T>>, slot: usize, value: T) -> bool {
    if cache.len() <= slot {
        cache.resize(slot + 1, None);
    }
    if cache[slot] == Some(value) {
        return false;
    }
    cache[slot] = Some(value);
    true
}

/// Redundant-call filter and per-draw bookkeeping for one device
#[derive(Debug, Default)]
pub struct ExecutorContext {
    applied: AppliedState,
    draw_index: u64,
    globals: GlobalUniforms,
    view: ViewTransforms,
}

impl ExecutorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dispatches and draws issued so far
    pub fn draw_index(&self) -> u64 {
        self.draw_index
    }

    pub fn globals(&self) -> &GlobalUniforms {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut GlobalUniforms {
        &mut self.globals
    }

    /// View transforms computed globals are derived from
    pub fn set_view(&mut self, view: ViewTransforms) {
        self.view = view;
        self.globals.invalidate();
    }

    pub fn view(&self) -> &ViewTransforms {
        &self.view
    }

    /// Forget everything applied, e.g. after another party touched the device
    pub fn invalidate(&mut self) {
        self.applied = AppliedState::default();
    }

    /// Compose, compile and cache the state's program. Idempotent.
    ///
    /// A compile failure is an authoring defect and aborts.
    pub fn initialize(
        &mut self,
        device: &mut dyn Device,
        library: &mut ShaderLibrary,
        state: &PipelineState,
    ) -> ProgramId {
        let globals = &self.globals;
        state.compiled_or_init(|| {
            let source = build_program_source(state, &mut library.snippets, globals);
            match device.compile_program(&source) {
                Ok(program) => {
                    log::debug!(
                        "[Executor] Built program '{}' ({} bindings, {} bytes of source)",
                        state.entry,
                        source.bindings.len(),
                        source.source.len()
                    );
                    program
                }
                Err(err) => {
                    log::error!("[Executor] Failed to build program '{}': {}", state.entry, err);
                    panic!("program '{}' failed to build: {}", state.entry, err);
                }
            }
        })
    }

    fn check_assets(state: &PipelineState, assets: &PipelineAssets) {
        let mismatch = if assets.uniforms.len() != state.uniforms.len() {
            Some(format!("{} uniforms for {} slots", assets.uniforms.len(), state.uniforms.len()))
        } else if assets.buffers.len() != state.buffers.len() {
            Some(format!("{} buffers for {} slots", assets.buffers.len(), state.buffers.len()))
        } else if assets.images.len() != state.images.len() {
            Some(format!("{} images for {} slots", assets.images.len(), state.images.len()))
        } else {
            state
                .uniforms
                .iter()
                .zip(&assets.uniforms)
                .find(|(decl, value)| decl.ty != value.ty())
                .map(|(decl, value)| format!("uniform '{}' is {:?}, got {:?}", decl.name, decl.ty, value))
        };

        if let Some(reason) = mismatch {
            log::error!("[Executor] Assets do not match state '{}': {}", state.entry, reason);
            panic!("assets do not match pipeline state '{}': {}", state.entry, reason);
        }
    }

    fn set_uniform(
        &mut self,
        device: &mut dyn Device,
        program: ProgramId,
        location: u32,
        value: UniformValue,
    ) {
        if self.applied.uniforms.get(&(program, location)) != Some(&value) {
            device.set_uniform(location, &value);
            self.applied.uniforms.insert((program, location), value);
        }
    }

    /// Bring the device to `state` with `assets` bound; returns the barrier the next call needs
    pub fn apply(
        &mut self,
        device: &mut dyn Device,
        buffers: &mut BufferManager,
        state: &PipelineState,
        assets: &PipelineAssets,
    ) -> Result<BarrierBits, BufferError> {
        let Some(program) = state.compiled() else {
            log::error!("[Executor] State '{}' applied before initialize", state.entry);
            panic!("pipeline state '{}' applied before initialize", state.entry);
        };
        Self::check_assets(state, assets);

        if self.applied.program != Some(program) {
            device.bind_program(program);
            self.applied.program = Some(program);
        }

        if state.kind == ProgramKind::Render {
            if self.applied.vertex_input.as_ref() != Some(&state.vertex_input) {
                device.set_vertex_input(state.vertex_input.as_ref());
                self.applied.vertex_input = Some(state.vertex_input.clone());
            }
            if self.applied.depth != Some(state.depth) {
                device.set_depth_state(state.depth);
                self.applied.depth = Some(state.depth);
            }
            if self.applied.blend != Some(state.blend) {
                device.set_blend_state(state.blend);
                self.applied.blend = Some(state.blend);
            }
        }

        let mut barrier = BarrierBits::empty();

        for (slot, &handle) in assets.buffers.iter().enumerate() {
            let range = buffers.binding(device, handle)?;
            barrier |= buffers.flush(device, handle, BarrierBits::SHADER_STORAGE)?;
            if changed(&mut self.applied.storage, slot, range) {
                device.bind_storage_buffer(slot as u32, range);
            }
        }

        for (slot, &handle) in assets.vertex_buffers.iter().enumerate() {
            let stride = state
                .vertex_input
                .as_ref()
                .and_then(|input| input.bindings.get(slot))
                .map_or(0, |b| b.stride);
            let range = buffers.binding(device, handle)?;
            barrier |= buffers.flush(device, handle, BarrierBits::VERTEX_ATTRIB_ARRAY)?;
            if changed(&mut self.applied.vertex_buffers, slot, range) {
                device.bind_vertex_buffer(slot as u32, range, stride);
            }
        }

        if let Some((handle, _)) = assets.index_buffer {
            let range = buffers.binding(device, handle)?;
            barrier |= buffers.flush(device, handle, BarrierBits::ELEMENT_ARRAY)?;
            if self.applied.index_buffer != Some(range) {
                device.bind_index_buffer(range);
                self.applied.index_buffer = Some(range);
            }
        }

        for (unit, &image) in assets.images.iter().enumerate() {
            if changed(&mut self.applied.images, unit, image) {
                device.bind_image(unit as u32, image);
            }
        }

        for (location, &value) in assets.uniforms.iter().enumerate() {
            self.set_uniform(device, program, location as u32, value);
        }
        let base = state.uniforms.len();
        for (i, &id) in state.globals.iter().enumerate() {
            let value = self.globals.resolve(id, self.draw_index, &self.view);
            self.set_uniform(device, program, (base + i) as u32, value);
        }

        Ok(barrier)
    }

    fn issue_barrier(device: &mut dyn Device, barrier: BarrierBits) {
        if !barrier.is_empty() {
            device.memory_barrier(barrier);
        }
    }

    /// Record writes of the call just issued and advance the draw index
    fn finish(
        &mut self,
        buffers: &mut BufferManager,
        state: &PipelineState,
        assets: &PipelineAssets,
    ) -> Result<(), BufferError> {
        for (slot, &handle) in state.buffers.iter().zip(&assets.buffers) {
            if slot.access.writes() {
                buffers.mark_device_written(handle)?;
            }
        }
        self.draw_index += 1;
        Ok(())
    }

    /// Flush an indirect argument buffer and return its device range
    fn indirect(
        device: &mut dyn Device,
        buffers: &mut BufferManager,
        handle: BufferHandle,
        barrier: &mut BarrierBits,
    ) -> Result<BufferBinding, BufferError> {
        let range = buffers.binding(device, handle)?;
        *barrier |= buffers.flush(device, handle, BarrierBits::COMMAND)?;
        Ok(range)
    }

    pub fn dispatch(
        &mut self,
        device: &mut dyn Device,
        buffers: &mut BufferManager,
        state: &PipelineState,
        assets: &PipelineAssets,
        groups: [u32; 3],
    ) -> Result<(), BufferError> {
        let barrier = self.apply(device, buffers, state, assets)?;
        Self::issue_barrier(device, barrier);
        device.dispatch(groups);
        self.finish(buffers, state, assets)
    }

    /// Dispatch with group counts read by the device from `args` at byte `offset`
    pub fn dispatch_indirect(
        &mut self,
        device: &mut dyn Device,
        buffers: &mut BufferManager,
        state: &PipelineState,
        assets: &PipelineAssets,
        args: BufferHandle,
        offset: u64,
    ) -> Result<(), BufferError> {
        let mut barrier = self.apply(device, buffers, state, assets)?;
        let range = Self::indirect(device, buffers, args, &mut barrier)?;
        Self::issue_barrier(device, barrier);
        device.dispatch_indirect(range.buffer, range.offset + offset);
        self.finish(buffers, state, assets)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_arrays(
        &mut self,
        device: &mut dyn Device,
        buffers: &mut BufferManager,
        state: &PipelineState,
        assets: &PipelineAssets,
        mode: PrimitiveMode,
        first: u32,
        count: u32,
        instances: u32,
    ) -> Result<(), BufferError> {
        let barrier = self.apply(device, buffers, state, assets)?;
        Self::issue_barrier(device, barrier);
        device.draw(DrawCall::Arrays {
            mode,
            first,
            count,
            instances,
        });
        self.finish(buffers, state, assets)
    }

    pub fn draw_arrays_indirect(
        &mut self,
        device: &mut dyn Device,
        buffers: &mut BufferManager,
        state: &PipelineState,
        assets: &PipelineAssets,
        mode: PrimitiveMode,
        args: BufferHandle,
        offset: u64,
    ) -> Result<(), BufferError> {
        let mut barrier = self.apply(device, buffers, state, assets)?;
        let range = Self::indirect(device, buffers, args, &mut barrier)?;
        Self::issue_barrier(device, barrier);
        device.draw(DrawCall::ArraysIndirect {
            mode,
            buffer: range.buffer,
            offset: range.offset + offset,
        });
        self.finish(buffers, state, assets)
    }

    fn index_type(state: &PipelineState, assets: &PipelineAssets) -> IndexType {
        match assets.index_buffer {
            Some((_, index_type)) => index_type,
            None => {
                log::error!("[Executor] Indexed draw of '{}' without an index buffer", state.entry);
                panic!("indexed draw of '{}' without an index buffer", state.entry);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_elements(
        &mut self,
        device: &mut dyn Device,
        buffers: &mut BufferManager,
        state: &PipelineState,
        assets: &PipelineAssets,
        mode: PrimitiveMode,
        count: u32,
        first_index: u32,
        instances: u32,
    ) -> Result<(), BufferError> {
        let index_type = Self::index_type(state, assets);
        let barrier = self.apply(device, buffers, state, assets)?;
        Self::issue_barrier(device, barrier);
        device.draw(DrawCall::Elements {
            mode,
            index_type,
            count,
            index_offset: first_index as u64 * index_type.size(),
            instances,
        });
        self.finish(buffers, state, assets)
    }

    pub fn draw_elements_indirect(
        &mut self,
        device: &mut dyn Device,
        buffers: &mut BufferManager,
        state: &PipelineState,
        assets: &PipelineAssets,
        mode: PrimitiveMode,
        args: BufferHandle,
        offset: u64,
    ) -> Result<(), BufferError> {
        let index_type = Self::index_type(state, assets);
        let mut barrier = self.apply(device, buffers, state, assets)?;
        let range = Self::indirect(device, buffers, args, &mut barrier)?;
        Self::issue_barrier(device, barrier);
        device.draw(DrawCall::ElementsIndirect {
            mode,
            index_type,
            buffer: range.buffer,
            offset: range.offset + offset,
        });
        self.finish(buffers, state, assets)
    }
}
