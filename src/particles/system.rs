//! Particle system facade
//!
//! Emissions are queued on the host and uploaded in one batch. `draw_particles` then
//! issues, in this order: emit, presimulate, simulate, postsimulate, the sort passes
//! and the indirect draw. The host never learns how many particles are alive; every
//! count after the emission batch lives in device memory only.

use std::sync::Arc;

use glam::{Vec3, Vec4};

use super::kernels;
use super::motion::{particle_layout_fields, MotionRecord, PARTICLE_LAYOUT, PARTICLE_WORDS};
use super::passes::{ParticlePasses, ParticleState};
use crate::config::ParticleConfig;
use crate::error::{BufferError, RuntimeError, RuntimeResult};
use crate::gpu::cpu::CpuDevice;
use crate::gpu::device::{Device, PrimitiveMode, ProgramId};
use crate::gpu::layout::Layout;
use crate::gpu::pipeline::{PipelineAssets, UniformValue};
use crate::gpu::runtime::GpuRuntime;
use crate::memory::BufferHandle;
use crate::sort::{GpuSort, SortBuffers, SortOrder, WORKGROUP_SIZE};

/// Arguments of one emitted particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleEmission {
    pub origin: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub color_front: Vec4,
    pub color_back: Vec4,
    pub alpha: f32,
    pub alpha_velocity: f32,
    pub incandescence: f32,
    pub incandescence_velocity: f32,
}

impl Default for ParticleEmission {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            color_front: Vec4::ONE,
            color_back: Vec4::ONE,
            alpha: 1.0,
            alpha_velocity: 0.0,
            incandescence: 0.0,
            incandescence_velocity: 0.0,
        }
    }
}

impl ParticleEmission {
    /// The record stored for this emission at simulation time `time`
    pub fn record(&self, time: f32) -> MotionRecord {
        MotionRecord {
            origin: self.origin,
            time,
            velocity: self.velocity,
            alpha: self.alpha,
            acceleration: self.acceleration,
            alpha_velocity: self.alpha_velocity,
            color_front: self.color_front,
            color_back: self.color_back,
            incandescence: self.incandescence,
            incandescence_velocity: self.incandescence_velocity,
        }
    }
}

/// Debug read-back of the state block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParticleCounters {
    pub alive: u32,
    pub dead: u32,
    pub simulate: u32,
    pub dropped: u32,
}

/// Device buffers owned by the system
#[derive(Debug, Clone, Copy)]
struct ParticleBuffers {
    state: BufferHandle,
    free_list: BufferHandle,
    alive_list: BufferHandle,
    particles: BufferHandle,
    sort: SortBuffers,
}

pub struct ParticleSystem {
    config: ParticleConfig,
    layout: Arc<Layout>,
    state: ParticleState,
    passes: ParticlePasses,
    sort: GpuSort,
    buffers: ParticleBuffers,
    pending: Vec<ParticleEmission>,
    needs_reset: bool,
}

impl ParticleSystem {
    pub fn new<D: Device>(runtime: &mut GpuRuntime<D>, config: &ParticleConfig) -> RuntimeResult<Self> {
        let library = &mut runtime.library;
        let layout_id = match library.layouts.lookup(PARTICLE_LAYOUT) {
            Some(id) => id,
            None => library.define_layout(PARTICLE_LAYOUT, particle_layout_fields())?,
        };
        let layout = Arc::clone(library.layout(layout_id)?);
        let sort = GpuSort::new(library)?;
        let passes = ParticlePasses::new(library, runtime.executor.globals_mut(), &layout)?;
        let state = ParticleState::new();

        let capacity = config.capacity as u64;
        let memory = &mut runtime.buffers;
        let buffers = ParticleBuffers {
            state: memory.allocate_device_only(state.arena.size),
            free_list: memory.allocate_device_only(capacity * 4),
            alive_list: memory.allocate_device_only(capacity * 4),
            particles: memory.allocate_device_only(capacity * layout.size as u64),
            sort: sort.allocate(memory, config.capacity),
        };

        log::info!(
            "[ParticleSystem] Initialized with {} slots ({} bytes of particle records)",
            config.capacity,
            capacity * layout.size as u64
        );

        Ok(Self {
            config: config.clone(),
            layout,
            state,
            passes,
            sort,
            buffers,
            pending: Vec::new(),
            needs_reset: true,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.config.capacity
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// Register the host kernels of every particle and sort pass
    pub fn install_cpu_kernels(&self, device: &mut CpuDevice) {
        self.sort.install_cpu_kernels(device);
        kernels::install(device, Arc::clone(&self.layout), &self.state, self.sort.control().clone());
    }

    /// Build the program of every particle and sort pass up front
    ///
    /// Building is otherwise deferred to first use, where a program that fails to
    /// compile aborts mid-frame.
    pub fn build_programs<D: Device>(&self, runtime: &mut GpuRuntime<D>) -> Vec<ProgramId> {
        let programs: Vec<ProgramId> = self
            .passes
            .states()
            .into_iter()
            .chain(self.sort.states())
            .map(|state| runtime.initialize(state))
            .collect();
        log::debug!("[ParticleSystem] Built {} programs", programs.len());
        programs
    }

    /// Queue one particle; it is spawned by the next emission flush
    ///
    /// Never fails. When the pool is full at flush time the particle is dropped.
    pub fn emit(&mut self, emission: ParticleEmission) {
        self.pending.push(emission);
    }

    pub fn pending_emissions(&self) -> usize {
        self.pending.len()
    }

    fn reset_if_needed<D: Device>(&mut self, runtime: &mut GpuRuntime<D>) -> Result<(), BufferError> {
        if !self.needs_reset {
            return Ok(());
        }
        log::debug!("[ParticleSystem] Resetting {} slots", self.config.capacity);
        runtime.dispatch(
            &self.passes.reset,
            &PipelineAssets::new()
                .uniform(UniformValue::U32(self.config.capacity))
                .buffer(self.buffers.state)
                .buffer(self.buffers.free_list),
            [self.config.capacity.div_ceil(WORKGROUP_SIZE), 1, 1],
        )?;
        self.needs_reset = false;
        Ok(())
    }

    /// Upload queued emissions stamped with simulation time `time` and spawn them
    pub fn flush_emissions<D: Device>(&mut self, runtime: &mut GpuRuntime<D>, time: f32) -> RuntimeResult<()> {
        self.reset_if_needed(runtime)?;
        if self.pending.is_empty() {
            return Ok(());
        }

        let count = self.pending.len() as u32;
        let words_per = PARTICLE_WORDS as usize;
        let mut words = vec![0u32; self.pending.len() * words_per];
        for (emission, out) in self.pending.iter().zip(words.chunks_exact_mut(words_per)) {
            self.layout.pack_into(&emission.record(time).to_fields(), out)?;
        }
        self.pending.clear();

        let GpuRuntime { device, buffers, .. } = &mut *runtime;
        let emitted = buffers.allocate_temporary_from(device, bytemuck::cast_slice(&words))?;
        log::debug!("[ParticleSystem] Emitting {} particles at t={}", count, time);

        runtime.dispatch(
            &self.passes.emit,
            &PipelineAssets::new()
                .uniform(UniformValue::U32(count))
                .buffer(emitted)
                .buffer(self.buffers.state)
                .buffer(self.buffers.free_list)
                .buffer(self.buffers.alive_list)
                .buffer(self.buffers.particles),
            [count.div_ceil(WORKGROUP_SIZE), 1, 1],
        )?;
        Ok(())
    }

    /// Advance to simulation time `time` and draw every live particle back to front
    pub fn draw_particles<D: Device>(&mut self, runtime: &mut GpuRuntime<D>, time: f32) -> RuntimeResult<()> {
        self.flush_emissions(runtime, time)?;
        let b = self.buffers;

        runtime.dispatch(
            &self.passes.presimulate,
            &PipelineAssets::new().buffer(b.state),
            [1, 1, 1],
        )?;

        runtime.dispatch_indirect(
            &self.passes.simulate,
            &PipelineAssets::new()
                .uniform(UniformValue::F32(time))
                .buffer(b.state)
                .buffer(b.alive_list)
                .buffer(b.free_list)
                .buffer(b.particles)
                .buffer(b.sort.keys_a)
                .buffer(b.sort.values_a),
            b.state,
            self.state.simulate_args.offset,
        )?;

        runtime.dispatch(
            &self.passes.postsimulate,
            &PipelineAssets::new().buffer(b.state).buffer(b.sort.control),
            [1, 1, 1],
        )?;

        self.sort
            .encode(runtime, &b.sort, b.alive_list, SortOrder::Descending)?;

        runtime.draw_arrays_indirect(
            &self.passes.draw,
            &self
                .point_uniforms(PipelineAssets::new())
                .uniform(UniformValue::F32(time))
                .buffer(b.particles)
                .buffer(b.alive_list),
            PrimitiveMode::Points,
            b.state,
            self.state.draw_args.offset,
        )?;
        Ok(())
    }

    /// Point size and attenuation uniforms shared by both draw paths
    pub(crate) fn point_uniforms(&self, assets: PipelineAssets) -> PipelineAssets {
        point_uniforms(&self.config, assets)
    }

    pub(crate) fn passes(&self) -> &ParticlePasses {
        &self.passes
    }

    /// Debug read-back of the counters. Not for use on the per-frame path.
    pub fn debug_counters<D: Device>(&self, runtime: &mut GpuRuntime<D>) -> Result<ParticleCounters, RuntimeError> {
        let words: Vec<u32> = runtime.read_buffer(self.buffers.state)?;
        let counters = ParticleCounters {
            alive: words.first().copied().unwrap_or(0),
            dead: words.get(1).copied().unwrap_or(0),
            simulate: words.get(2).copied().unwrap_or(0),
            dropped: words.get(3).copied().unwrap_or(0),
        };
        if counters.dropped > 0 {
            log::warn!(
                "[ParticleSystem] Pool saturated: {} emissions dropped so far",
                counters.dropped
            );
        }
        Ok(counters)
    }

    /// Debug read-back of the first `count` alive slot ids
    pub fn debug_alive_slots<D: Device>(&self, runtime: &mut GpuRuntime<D>, count: u32) -> Result<Vec<u32>, RuntimeError> {
        let mut slots: Vec<u32> = runtime.read_buffer(self.buffers.alive_list)?;
        slots.truncate(count as usize);
        Ok(slots)
    }

    /// Debug read-back of one slot's record
    pub fn debug_record<D: Device>(&self, runtime: &mut GpuRuntime<D>, slot: u32) -> Result<Option<MotionRecord>, RuntimeError> {
        let words: Vec<u32> = runtime.read_buffer(self.buffers.particles)?;
        let start = (slot * PARTICLE_WORDS) as usize;
        let Some(record) = words.get(start..start + PARTICLE_WORDS as usize) else {
            return Ok(None);
        };
        Ok(MotionRecord::from_fields(&self.layout.unpack(record)?))
    }
}

pub(crate) fn point_uniforms(config: &ParticleConfig, assets: PipelineAssets) -> PipelineAssets {
    assets
        .uniform(UniformValue::Vec3(Vec3::new(
            config.point_size,
            config.point_size_min,
            config.point_size_max,
        )))
        .uniform(UniformValue::Vec3(config.attenuation))
}
