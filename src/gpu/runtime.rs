//! Runtime bundle
//!
//! Owns the device together with the buffer manager, shader library and executor
//! context, and forwards the per-frame calls with the borrows split correctly.

use crate::camera::ViewTransforms;
use crate::config::MemoryConfig;
use crate::error::BufferError;
use crate::gpu::barrier::BarrierBits;
use crate::gpu::device::{Device, PrimitiveMode, ProgramId};
use crate::gpu::library::ShaderLibrary;
use crate::gpu::pipeline::{ExecutorContext, PipelineAssets, PipelineState};
use crate::memory::{BufferHandle, BufferManager};

/// Device plus everything the host keeps about it
pub struct GpuRuntime<D: Device> {
    pub device: D,
    pub buffers: BufferManager,
    pub library: ShaderLibrary,
    pub executor: ExecutorContext,
}

impl<D: Device> GpuRuntime<D> {
    pub fn new(device: D, config: &MemoryConfig) -> Self {
        log::info!(
            "[GpuRuntime] Initialized (temporary blocks of {} bytes, alignment {})",
            config.temporary_block_size,
            config.temporary_alignment
        );
        Self {
            device,
            buffers: BufferManager::new(config),
            library: ShaderLibrary::new(),
            executor: ExecutorContext::new(),
        }
    }

    pub fn set_view(&mut self, view: ViewTransforms) {
        self.executor.set_view(view);
    }

    /// Frame boundary: recycle every temporary buffer
    pub fn end_frame(&mut self) {
        self.buffers.reset_temporary();
    }

    pub fn initialize(&mut self, state: &PipelineState) -> ProgramId {
        self.executor
            .initialize(&mut self.device, &mut self.library, state)
    }

    pub fn apply(
        &mut self,
        state: &PipelineState,
        assets: &PipelineAssets,
    ) -> Result<BarrierBits, BufferError> {
        self.initialize(state);
        self.executor
            .apply(&mut self.device, &mut self.buffers, state, assets)
    }

    pub fn dispatch(
        &mut self,
        state: &PipelineState,
        assets: &PipelineAssets,
        groups: [u32; 3],
    ) -> Result<(), BufferError> {
        self.initialize(state);
        self.executor
            .dispatch(&mut self.device, &mut self.buffers, state, assets, groups)
    }

    pub fn dispatch_indirect(
        &mut self,
        state: &PipelineState,
        assets: &PipelineAssets,
        args: BufferHandle,
        offset: u64,
    ) -> Result<(), BufferError> {
        self.initialize(state);
        self.executor
            .dispatch_indirect(&mut self.device, &mut self.buffers, state, assets, args, offset)
    }

    pub fn draw_arrays(
        &mut self,
        state: &PipelineState,
        assets: &PipelineAssets,
        mode: PrimitiveMode,
        first: u32,
        count: u32,
        instances: u32,
    ) -> Result<(), BufferError> {
        self.initialize(state);
        self.executor.draw_arrays(
            &mut self.device,
            &mut self.buffers,
            state,
            assets,
            mode,
            first,
            count,
            instances,
        )
    }

    pub fn draw_arrays_indirect(
        &mut self,
        state: &PipelineState,
        assets: &PipelineAssets,
        mode: PrimitiveMode,
        args: BufferHandle,
        offset: u64,
    ) -> Result<(), BufferError> {
        self.initialize(state);
        self.executor.draw_arrays_indirect(
            &mut self.device,
            &mut self.buffers,
            state,
            assets,
            mode,
            args,
            offset,
        )
    }

    pub fn draw_elements(
        &mut self,
        state: &PipelineState,
        assets: &PipelineAssets,
        mode: PrimitiveMode,
        count: u32,
        first_index: u32,
        instances: u32,
    ) -> Result<(), BufferError> {
        self.initialize(state);
        self.executor.draw_elements(
            &mut self.device,
            &mut self.buffers,
            state,
            assets,
            mode,
            count,
            first_index,
            instances,
        )
    }

    pub fn draw_elements_indirect(
        &mut self,
        state: &PipelineState,
        assets: &PipelineAssets,
        mode: PrimitiveMode,
        args: BufferHandle,
        offset: u64,
    ) -> Result<(), BufferError> {
        self.initialize(state);
        self.executor.draw_elements_indirect(
            &mut self.device,
            &mut self.buffers,
            state,
            assets,
            mode,
            args,
            offset,
        )
    }

    /// Debug read-back of a buffer's contents as `T`s
    pub fn read_buffer<T: bytemuck::Pod>(&mut self, handle: BufferHandle) -> Result<Vec<T>, BufferError> {
        self.buffers.read_pod(&mut self.device, handle)
    }
}
