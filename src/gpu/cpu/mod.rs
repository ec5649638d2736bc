//! CPU reference device
//!
//! Implements `Device` over host memory. Programs are parsed and validated as WGSL
//! with naga before they are accepted. Compute programs execute through kernels
//! registered under their entry point name; render programs only record the draw.
//! Every call is counted, and a read of a buffer whose last write has not been made
//! visible by a matching barrier is reported as a hazard.

mod kernel;
mod store;

use std::rc::Rc;

use rustc_hash::FxHashMap;

pub use kernel::{Kernel, KernelContext};

use store::BufferStore;

use crate::error::CompileError;
use crate::gpu::barrier::BarrierBits;
use crate::gpu::device::{
    BindingClass, BufferBinding, BufferUsage, Device, DrawCall, ImageHandle, PrimitiveMode,
    ProgramId, ProgramKind, ProgramSource, RawBuffer,
};
use crate::gpu::pipeline::{BlendState, DepthState, UniformValue, VertexInputLayout};

/// A draw as executed, with indirect counts resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub mode: PrimitiveMode,
    pub first: u32,
    pub count: u32,
    pub instances: u32,
    pub indexed: bool,
}

/// Call counters of the CPU device
#[derive(Debug, Clone, Default)]
pub struct DeviceStats {
    pub buffers_created: u64,
    pub program_binds: u64,
    pub buffer_binds: u64,
    pub image_binds: u64,
    pub uniform_sets: u64,
    pub state_changes: u64,
    pub mapped_flushes: u64,
    pub barriers: Vec<BarrierBits>,
    pub dispatches: u64,
    pub empty_dispatches: u64,
    pub draws: Vec<DrawRecord>,
}

struct CpuProgram {
    source: ProgramSource,
    kernel: Option<Rc<dyn Kernel>>,
    /// Uniform values by location; program state, kept across binds
    uniforms: Vec<Option<UniformValue>>,
}

/// Host-memory device with registered compute kernels
#[derive(Default)]
pub struct CpuDevice {
    store: BufferStore,
    kernels: FxHashMap<String, Rc<dyn Kernel>>,
    programs: Vec<CpuProgram>,
    program: Option<ProgramId>,
    storage: Vec<Option<BufferBinding>>,
    vertex_buffers: Vec<Option<(BufferBinding, u32)>>,
    index_buffer: Option<BufferBinding>,
    images: Vec<Option<ImageHandle>>,
    vertex_input: Option<VertexInputLayout>,
    depth: DepthState,
    blend: Option<BlendState>,
    stats: DeviceStats,
}

fn set_slot<T>(slots: &mut Vec<Option<T>>, slot: u32, value: T) {
    let slot = slot as usize;
    if slots.len() <= slot {
        slots.resize_with(slot + 1, || None);
    }
    slots[slot] = Some(value);
}

impl CpuDevice {
    pub fn new() -> Self {
        log::info!("[CpuDevice] Created CPU reference device");
        Self::default()
    }

    /// Register the kernel that runs programs whose entry point is `entry`
    pub fn register_kernel(&mut self, entry: &str, kernel: impl Kernel + 'static) {
        if self.kernels.insert(entry.to_string(), Rc::new(kernel)).is_some() {
            log::debug!("[CpuDevice] Replaced kernel '{}'", entry);
        }
    }

    pub fn has_kernel(&self, entry: &str) -> bool {
        self.kernels.contains_key(entry)
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DeviceStats::default();
    }

    /// Out-of-range accesses and invalid calls seen so far
    pub fn faults(&self) -> u64 {
        self.store.faults
    }

    /// Reads that happened without the barrier their last write required
    pub fn hazards(&self) -> u64 {
        self.store.hazards
    }

    pub fn live_buffers(&self) -> usize {
        self.store.len()
    }

    pub fn depth_state(&self) -> DepthState {
        self.depth
    }

    pub fn blend_state(&self) -> Option<BlendState> {
        self.blend
    }

    /// Source of a compiled program
    pub fn program_source(&self, program: ProgramId) -> Option<&ProgramSource> {
        self.programs.get(program.0 as usize).map(|p| &p.source)
    }

    fn current(&mut self) -> Option<ProgramId> {
        if self.program.is_none() {
            self.store.fault(format_args!("call issued with no program bound"));
        }
        self.program
    }

    /// Check every storage binding the program declares against a shader-storage read
    fn check_storage_reads(&mut self, program: ProgramId) {
        let Some(cpu) = self.programs.get(program.0 as usize) else {
            return;
        };
        for info in &cpu.source.bindings {
            if info.class != BindingClass::StorageBuffer {
                continue;
            }
            if let Some(Some(binding)) = self.storage.get(info.location as usize) {
                self.store
                    .check_read(binding.buffer, BarrierBits::SHADER_STORAGE, &cpu.source.entry);
            }
        }
    }

    fn indirect_words(&mut self, buffer: RawBuffer, offset: u64, count: u32) -> Vec<u32> {
        self.store.check_read(buffer, BarrierBits::COMMAND, "indirect arguments");
        let binding = BufferBinding {
            buffer,
            offset,
            size: count as u64 * 4,
        };
        self.store.words(&binding, count)
    }

    fn run_compute(&mut self, groups: [u32; 3]) {
        let Some(program) = self.current() else {
            return;
        };
        self.check_storage_reads(program);
        self.stats.dispatches += 1;

        let cpu = &self.programs[program.0 as usize];
        let ProgramKind::Compute { workgroup_size } = cpu.source.kind else {
            self.store
                .fault(format_args!("dispatch of render program '{}'", cpu.source.entry));
            return;
        };
        if groups.contains(&0) {
            self.stats.empty_dispatches += 1;
            return;
        }
        let Some(kernel) = cpu.kernel.clone() else {
            return;
        };

        let mut storage = FxHashMap::default();
        let mut uniforms = FxHashMap::default();
        for info in &cpu.source.bindings {
            match info.class {
                BindingClass::StorageBuffer => {
                    let bound = self.storage.get(info.location as usize).copied().flatten();
                    storage.insert(info.name.as_str(), bound);
                }
                BindingClass::Uniform => {
                    if let Some(Some(value)) = cpu.uniforms.get(info.location as usize) {
                        uniforms.insert(info.name.as_str(), *value);
                    }
                }
                _ => {}
            }
        }

        let mut ctx = KernelContext {
            store: &mut self.store,
            entry: &cpu.source.entry,
            storage,
            uniforms,
            workgroup_size,
        };
        kernel.dispatch(&mut ctx, groups);
    }
}

impl Device for CpuDevice {
    fn create_buffer(&mut self, size: u64, usage: BufferUsage, data: Option<&[u8]>) -> RawBuffer {
        let raw = self.store.create(size, usage, data);
        self.stats.buffers_created += 1;
        log::debug!("[CpuDevice] Created {:?} buffer {:?} ({} bytes)", usage, raw, size);
        raw
    }

    fn destroy_buffer(&mut self, buffer: RawBuffer) {
        self.store.destroy(buffer);
    }

    fn write_buffer(&mut self, buffer: RawBuffer, offset: u64, data: &[u8]) {
        self.store.host_write(buffer, offset, data);
    }

    fn flush_mapped_range(&mut self, _buffer: RawBuffer, _offset: u64, _size: u64) {
        self.stats.mapped_flushes += 1;
    }

    fn read_buffer(&mut self, buffer: RawBuffer, offset: u64, size: u64) -> Vec<u8> {
        self.store.read(buffer, offset, size)
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, CompileError> {
        let kernel = match source.kind {
            ProgramKind::Compute { .. } => match self.kernels.get(&source.entry) {
                Some(kernel) => Some(kernel.clone()),
                None => return Err(CompileError::MissingEntry(source.entry.clone())),
            },
            ProgramKind::Render => None,
        };
        if source.source.trim().is_empty() {
            return Err(CompileError::Rejected {
                program: source.entry.clone(),
                log: "empty source".to_string(),
            });
        }
        if let Err(err) = validate_wgsl(source) {
            log::warn!("[CpuDevice] Rejected program '{}'", source.entry);
            return Err(err);
        }

        self.programs.push(CpuProgram {
            source: source.clone(),
            kernel,
            uniforms: Vec::new(),
        });
        Ok(ProgramId((self.programs.len() - 1) as u32))
    }

    fn bind_program(&mut self, program: ProgramId) {
        if program.0 as usize >= self.programs.len() {
            self.store.fault(format_args!("bind of unknown program {:?}", program));
            return;
        }
        self.program = Some(program);
        self.stats.program_binds += 1;
    }

    fn bind_storage_buffer(&mut self, binding: u32, buffer: BufferBinding) {
        set_slot(&mut self.storage, binding, buffer);
        self.stats.buffer_binds += 1;
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferBinding, stride: u32) {
        set_slot(&mut self.vertex_buffers, slot, (buffer, stride));
        self.stats.buffer_binds += 1;
    }

    fn bind_index_buffer(&mut self, buffer: BufferBinding) {
        self.index_buffer = Some(buffer);
        self.stats.buffer_binds += 1;
    }

    fn bind_image(&mut self, unit: u32, image: ImageHandle) {
        set_slot(&mut self.images, unit, image);
        self.stats.image_binds += 1;
    }

    fn set_uniform(&mut self, location: u32, value: &UniformValue) {
        let Some(program) = self.current() else {
            return;
        };
        set_slot(&mut self.programs[program.0 as usize].uniforms, location, *value);
        self.stats.uniform_sets += 1;
    }

    fn set_vertex_input(&mut self, layout: Option<&VertexInputLayout>) {
        self.vertex_input = layout.cloned();
        self.stats.state_changes += 1;
    }

    fn set_depth_state(&mut self, depth: DepthState) {
        self.depth = depth;
        self.stats.state_changes += 1;
    }

    fn set_blend_state(&mut self, blend: Option<BlendState>) {
        self.blend = blend;
        self.stats.state_changes += 1;
    }

    fn memory_barrier(&mut self, bits: BarrierBits) {
        self.store.barrier(bits);
        self.stats.barriers.push(bits);
    }

    fn dispatch(&mut self, groups: [u32; 3]) {
        self.run_compute(groups);
    }

    fn dispatch_indirect(&mut self, buffer: RawBuffer, offset: u64) {
        let words = self.indirect_words(buffer, offset, 3);
        self.run_compute([words[0], words[1], words[2]]);
    }

    fn draw(&mut self, call: DrawCall) {
        let Some(program) = self.current() else {
            return;
        };
        self.check_storage_reads(program);

        let vertex_slots = self.vertex_input.as_ref().map_or(0, |input| input.bindings.len());
        for slot in 0..vertex_slots {
            if let Some(Some((binding, _))) = self.vertex_buffers.get(slot) {
                let raw = binding.buffer;
                self.store
                    .check_read(raw, BarrierBits::VERTEX_ATTRIB_ARRAY, "vertex fetch");
            }
        }

        let indexed = matches!(call, DrawCall::Elements { .. } | DrawCall::ElementsIndirect { .. });
        if indexed {
            match self.index_buffer {
                Some(binding) => self
                    .store
                    .check_read(binding.buffer, BarrierBits::ELEMENT_ARRAY, "index fetch"),
                None => self.store.fault(format_args!("indexed draw with no index buffer")),
            }
        }

        let (mode, first, count, instances) = match call {
            DrawCall::Arrays {
                mode,
                first,
                count,
                instances,
            } => (mode, first, count, instances),
            DrawCall::ArraysIndirect { mode, buffer, offset } => {
                let words = self.indirect_words(buffer, offset, 4);
                (mode, words[2], words[0], words[1])
            }
            DrawCall::Elements {
                mode,
                index_type,
                count,
                index_offset,
                instances,
            } => (mode, (index_offset / index_type.size()) as u32, count, instances),
            DrawCall::ElementsIndirect { mode, buffer, offset, .. } => {
                let words = self.indirect_words(buffer, offset, 5);
                (mode, words[2], words[0], words[1])
            }
        };

        self.stats.draws.push(DrawRecord {
            program,
            mode,
            first,
            count,
            instances,
            indexed,
        });
    }
}

/// Parse and validate the program as WGSL, and check it declares its entry point
fn validate_wgsl(source: &ProgramSource) -> Result<(), CompileError> {
    let rejected = |log: String| CompileError::Rejected {
        program: source.entry.clone(),
        log,
    };

    let module = naga::front::wgsl::parse_str(&source.source)
        .map_err(|err| rejected(err.emit_to_string(&source.source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|err| rejected(err.emit_to_string(&source.source)))?;

    let stage = match source.kind {
        ProgramKind::Compute { .. } => naga::ShaderStage::Compute,
        ProgramKind::Render => naga::ShaderStage::Vertex,
    };
    if !module
        .entry_points
        .iter()
        .any(|ep| ep.stage == stage && ep.name == source.entry)
    {
        return Err(rejected(format!("no {:?} entry point named '{}'", stage, source.entry)));
    }
    Ok(())
}
