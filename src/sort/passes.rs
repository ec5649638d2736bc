//! Device sort passes
//!
//! `encode` issues fill → row sort → rotate → column sort → merge, each as an indirect
//! dispatch whose group counts were derived on the device from the element count. The
//! control block holding that count and the derived arguments is an arena of typed
//! regions, written either by a producing device pass or by [`GpuSort::upload`].

use super::matrix::SquareSymmetry;
use super::shaders;
use super::{grid_capacity, grid_dimensions, SortOrder, PASSES, WORKGROUP_SIZE};
use crate::error::{BufferError, RuntimeError, SnippetError, SortError};
use crate::gpu::commands::DispatchIndirectCommand;
use crate::gpu::cpu::CpuDevice;
use crate::gpu::device::Device;
use crate::gpu::library::ShaderLibrary;
use crate::gpu::pipeline::{Access, PipelineAssets, PipelineState, UniformType, UniformValue};
use crate::gpu::runtime::GpuRuntime;
use crate::gpu::snippet::SnippetId;
use crate::memory::{ArenaBuilder, ArenaDescriptor, BufferHandle, BufferManager, Region};

/// Layout of the sort control block
#[derive(Debug, Clone, PartialEq)]
pub struct SortControl {
    pub arena: ArenaDescriptor,
    /// `[count, width, height, cells]`
    pub counters: Region<u32>,
    pub fill: Region<DispatchIndirectCommand>,
    pub rows: Region<DispatchIndirectCommand>,
    pub rotate: Region<DispatchIndirectCommand>,
    pub columns: Region<DispatchIndirectCommand>,
    pub merge: Region<DispatchIndirectCommand>,
}

impl Default for SortControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SortControl {
    pub fn new() -> Self {
        let mut builder = ArenaBuilder::new();
        let counters = builder.region::<u32>("counters", 4);
        let fill = builder.region::<DispatchIndirectCommand>("fill_args", 1);
        let rows = builder.region::<DispatchIndirectCommand>("row_args", 1);
        let rotate = builder.region::<DispatchIndirectCommand>("rotate_args", 1);
        let columns = builder.region::<DispatchIndirectCommand>("column_args", 1);
        let merge = builder.region::<DispatchIndirectCommand>("merge_args", 1);
        Self {
            arena: builder.build(),
            counters,
            fill,
            rows,
            rotate,
            columns,
            merge,
        }
    }

    pub fn words(&self) -> usize {
        (self.arena.size / 4) as usize
    }
}

/// Everything the sort passes derive from the element count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortArguments {
    pub count: u32,
    pub width: u32,
    pub height: u32,
    pub fill: DispatchIndirectCommand,
    pub rows: DispatchIndirectCommand,
    pub rotate: DispatchIndirectCommand,
    pub columns: DispatchIndirectCommand,
    pub merge: DispatchIndirectCommand,
}

impl SortArguments {
    /// Zero elements give a zero grid and zero-group dispatches
    pub fn for_count(count: u32) -> Self {
        let (width, height) = grid_dimensions(count);
        let cells = width * height;
        Self {
            count,
            width,
            height,
            fill: DispatchIndirectCommand::covering(cells, WORKGROUP_SIZE),
            rows: DispatchIndirectCommand::covering(height, WORKGROUP_SIZE),
            rotate: DispatchIndirectCommand::covering(cells, WORKGROUP_SIZE),
            columns: DispatchIndirectCommand::covering(width, WORKGROUP_SIZE),
            merge: DispatchIndirectCommand::covering(cells, WORKGROUP_SIZE),
        }
    }

    pub fn cells(&self) -> u32 {
        self.width * self.height
    }

    /// Word image of the whole control block
    pub fn image(&self, control: &SortControl) -> Vec<u32> {
        let mut words = vec![0u32; control.words()];
        let bytes = bytemuck::cast_slice_mut::<u32, u8>(&mut words);
        if let Some(counters) = control.counters.view_mut(bytes) {
            counters.copy_from_slice(&[self.count, self.width, self.height, self.cells()]);
        }
        for (region, args) in [
            (control.fill, self.fill),
            (control.rows, self.rows),
            (control.rotate, self.rotate),
            (control.columns, self.columns),
            (control.merge, self.merge),
        ] {
            if let Some(slot) = region.view_mut(bytes) {
                slot[0] = args;
            }
        }
        words
    }
}

/// Device buffers of one sort instance
#[derive(Debug, Clone, Copy)]
pub struct SortBuffers {
    /// Input side; written by the producer, sorted in place by rows
    pub keys_a: BufferHandle,
    pub values_a: BufferHandle,
    /// Rotated side; holds the sorted matrix before the merge
    pub keys_b: BufferHandle,
    pub values_b: BufferHandle,
    pub control: BufferHandle,
    pub capacity: u32,
}

/// Register a snippet, or reuse one already registered under `name`
pub(crate) fn shared_snippet(
    library: &mut ShaderLibrary,
    name: &str,
    body: &str,
    requires: &[SnippetId],
) -> Result<SnippetId, SnippetError> {
    match library.snippets.lookup(name) {
        Ok(id) => Ok(id),
        Err(_) => library.register_snippet(name, body, requires),
    }
}

/// Pipeline states of the sort, grade and select passes
pub struct GpuSort {
    control: SortControl,
    symmetry: SquareSymmetry,
    fill: PipelineState,
    rows: PipelineState,
    rotate: PipelineState,
    columns: PipelineState,
    merge: PipelineState,
    grade_init: PipelineState,
    histogram: PipelineState,
    scan: PipelineState,
    scatter: PipelineState,
    copy: PipelineState,
    select: PipelineState,
}

const WG: [u32; 3] = [WORKGROUP_SIZE, 1, 1];

impl GpuSort {
    pub fn new(library: &mut ShaderLibrary) -> Result<Self, SnippetError> {
        let common = shared_snippet(library, "sort_common", shaders::SORT_COMMON, &[])?;
        let symmetry = shared_snippet(library, "square_symmetry", shaders::SQUARE_SYMMETRY, &[])?;
        let radix = shared_snippet(library, "radix_row", shaders::RADIX_ROW, &[common])?;
        let rank = shared_snippet(library, "sorted_matrix_rank", shaders::SORTED_MATRIX_RANK, &[common])?;

        let pass = |library: &mut ShaderLibrary, name: &str, body: &str, requires: &[SnippetId]| {
            shared_snippet(library, name, body, requires)
        };
        let fill_body = pass(library, "sort_fill", shaders::SORT_FILL, &[common])?;
        let rows_body = pass(library, "sort_rows", shaders::SORT_ROWS, &[radix])?;
        let rotate_body = pass(library, "sort_rotate", shaders::SORT_ROTATE, &[common, symmetry])?;
        let columns_body = pass(library, "sort_columns", shaders::SORT_COLUMNS, &[radix])?;
        let merge_body = pass(library, "sort_merge", shaders::SORT_MERGE, &[rank])?;
        let init_body = pass(library, "grade_init", shaders::GRADE_INIT, &[])?;
        let histogram_body = pass(library, "grade_histogram", shaders::GRADE_HISTOGRAM, &[])?;
        let scan_body = pass(library, "grade_scan", shaders::GRADE_SCAN, &[])?;
        let scatter_body = pass(library, "grade_scatter", shaders::GRADE_SCATTER, &[])?;
        let copy_body = pass(library, "copy_words", shaders::COPY_WORDS, &[])?;
        let select_body = pass(library, "select_gather", shaders::SELECT, &[])?;

        let both_sides = |state: PipelineState, sorted: &str, scratch: &str| {
            state
                .buffer(&format!("keys_{}", sorted), "u32", Access::ReadWrite)
                .buffer(&format!("values_{}", sorted), "u32", Access::ReadWrite)
                .buffer(&format!("keys_{}", scratch), "u32", Access::ReadWrite)
                .buffer(&format!("values_{}", scratch), "u32", Access::ReadWrite)
        };

        Ok(Self {
            control: SortControl::new(),
            symmetry: SquareSymmetry::Transpose,
            fill: PipelineState::compute("sort_fill", WG)
                .snippet(fill_body)
                .buffer("sort_control", "u32", Access::ReadOnly)
                .buffer("keys_a", "u32", Access::ReadWrite)
                .buffer("values_a", "u32", Access::ReadWrite),
            rows: both_sides(
                PipelineState::compute("sort_rows", WG)
                    .snippet(rows_body)
                    .buffer("sort_control", "u32", Access::ReadOnly),
                "a",
                "b",
            ),
            rotate: PipelineState::compute("sort_rotate", WG)
                .snippet(rotate_body)
                .uniform("u_symmetry", UniformType::U32)
                .buffer("sort_control", "u32", Access::ReadOnly)
                .buffer("keys_a", "u32", Access::ReadOnly)
                .buffer("values_a", "u32", Access::ReadOnly)
                .buffer("keys_b", "u32", Access::WriteOnly)
                .buffer("values_b", "u32", Access::WriteOnly),
            columns: both_sides(
                PipelineState::compute("sort_columns", WG)
                    .snippet(columns_body)
                    .buffer("sort_control", "u32", Access::ReadOnly),
                "b",
                "a",
            ),
            merge: PipelineState::compute("sort_merge", WG)
                .snippet(merge_body)
                .uniform("u_descending", UniformType::U32)
                .buffer("sort_control", "u32", Access::ReadOnly)
                .buffer("keys_b", "u32", Access::ReadOnly)
                .buffer("values_b", "u32", Access::ReadOnly)
                .buffer("sorted_values", "u32", Access::WriteOnly),
            grade_init: PipelineState::compute("grade_init", WG)
                .snippet(init_body)
                .uniform("u_count", UniformType::U32)
                .buffer("grade_input", "u32", Access::ReadOnly)
                .buffer("keys_dst", "u32", Access::WriteOnly)
                .buffer("tags_dst", "u32", Access::WriteOnly),
            histogram: PipelineState::compute("grade_histogram", WG)
                .snippet(histogram_body)
                .uniform("u_count", UniformType::U32)
                .uniform("u_shift", UniformType::U32)
                .uniform("u_mask", UniformType::U32)
                .buffer("keys_src", "u32", Access::ReadOnly)
                .buffer("histogram", "u32", Access::WriteOnly),
            scan: PipelineState::compute("grade_scan", [1, 1, 1])
                .snippet(scan_body)
                .uniform("u_length", UniformType::U32)
                .buffer("histogram", "u32", Access::ReadWrite),
            scatter: PipelineState::compute("grade_scatter", WG)
                .snippet(scatter_body)
                .uniform("u_count", UniformType::U32)
                .uniform("u_shift", UniformType::U32)
                .uniform("u_mask", UniformType::U32)
                .buffer("keys_src", "u32", Access::ReadOnly)
                .buffer("tags_src", "u32", Access::ReadOnly)
                .buffer("histogram", "u32", Access::ReadOnly)
                .buffer("keys_dst", "u32", Access::WriteOnly)
                .buffer("tags_dst", "u32", Access::WriteOnly),
            copy: PipelineState::compute("copy_words", WG)
                .snippet(copy_body)
                .uniform("u_count", UniformType::U32)
                .buffer("copy_src", "u32", Access::ReadOnly)
                .buffer("copy_dst", "u32", Access::WriteOnly),
            select: PipelineState::compute("select_gather", WG)
                .snippet(select_body)
                .uniform("u_count", UniformType::U32)
                .buffer("haystack", "u32", Access::ReadOnly)
                .buffer("indexes", "u32", Access::ReadOnly)
                .buffer("selected", "u32", Access::WriteOnly),
        })
    }

    pub fn control(&self) -> &SortControl {
        &self.control
    }

    /// States of every pass: the five sort passes, then grade and select
    pub fn states(&self) -> [&PipelineState; 11] {
        [
            &self.fill,
            &self.rows,
            &self.rotate,
            &self.columns,
            &self.merge,
            &self.grade_init,
            &self.histogram,
            &self.scan,
            &self.scatter,
            &self.copy,
            &self.select,
        ]
    }

    /// Symmetry the rotate pass applies between the row and column sorts
    pub fn symmetry(&self) -> SquareSymmetry {
        self.symmetry
    }

    /// Register the host kernels of every pass on a CPU device
    pub fn install_cpu_kernels(&self, device: &mut CpuDevice) {
        super::kernels::install(device, &self.control);
    }

    /// Buffers for sorting up to `capacity` elements
    ///
    /// The A side and the control block are host-mapped so that host callers can
    /// upload; device producers write them like any other buffer.
    pub fn allocate(&self, buffers: &mut BufferManager, capacity: u32) -> SortBuffers {
        let cells = grid_capacity(capacity) as u64 * 4;
        log::debug!(
            "[GpuSort] Allocating sort buffers for {} elements ({} cells)",
            capacity,
            cells / 4
        );
        SortBuffers {
            keys_a: buffers.allocate_host_mapped(cells),
            values_a: buffers.allocate_host_mapped(cells),
            keys_b: buffers.allocate_device_only(cells),
            values_b: buffers.allocate_device_only(cells),
            control: buffers.allocate_host_mapped(self.control.arena.size),
            capacity,
        }
    }

    /// Host path: write `keys`/`values` into the A side and the derived control block
    ///
    /// Keys must be below [`super::SENTINEL`]; a sentinel key is rejected before
    /// anything is written, since the merge would drop it as padding.
    pub fn upload<D: Device>(
        &self,
        runtime: &mut GpuRuntime<D>,
        sort: &SortBuffers,
        keys: &[u32],
        values: &[u32],
    ) -> Result<SortArguments, RuntimeError> {
        if keys.len() != values.len() {
            return Err(SortError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            }
            .into());
        }
        if keys.len() > sort.capacity as usize {
            return Err(BufferError::OutOfRange {
                offset: 0,
                len: keys.len() as u64 * 4,
                size: sort.capacity as u64 * 4,
            }
            .into());
        }
        if let Some(index) = keys.iter().position(|&k| k == super::SENTINEL) {
            log::warn!("[GpuSort] Rejecting upload: key {} is the sentinel", index);
            return Err(SortError::ReservedKey {
                index,
                key: super::SENTINEL,
            }
            .into());
        }

        let args = SortArguments::for_count(keys.len() as u32);
        let GpuRuntime { device, buffers, .. } = runtime;
        buffers.write_pod(device, sort.keys_a, 0, keys)?;
        buffers.write_pod(device, sort.values_a, 0, values)?;
        buffers.write_pod(device, sort.control, 0, &args.image(&self.control))?;
        Ok(args)
    }

    /// Sort the A side and write the values, in `order`, to the front of `output`
    pub fn encode<D: Device>(
        &self,
        runtime: &mut GpuRuntime<D>,
        sort: &SortBuffers,
        output: BufferHandle,
        order: SortOrder,
    ) -> Result<(), BufferError> {
        log::debug!("[GpuSort] Encoding {:?} sort", order);
        let control = sort.control;
        let a = PipelineAssets::new()
            .buffer(control)
            .buffer(sort.keys_a)
            .buffer(sort.values_a);

        runtime.dispatch_indirect(&self.fill, &a, control, self.control.fill.offset)?;

        let rows = a.clone().buffer(sort.keys_b).buffer(sort.values_b);
        runtime.dispatch_indirect(&self.rows, &rows, control, self.control.rows.offset)?;

        let rotate = PipelineAssets::new()
            .uniform(UniformValue::U32(self.symmetry.index()))
            .buffer(control)
            .buffer(sort.keys_a)
            .buffer(sort.values_a)
            .buffer(sort.keys_b)
            .buffer(sort.values_b);
        runtime.dispatch_indirect(&self.rotate, &rotate, control, self.control.rotate.offset)?;

        let columns = PipelineAssets::new()
            .buffer(control)
            .buffer(sort.keys_b)
            .buffer(sort.values_b)
            .buffer(sort.keys_a)
            .buffer(sort.values_a);
        runtime.dispatch_indirect(&self.columns, &columns, control, self.control.columns.offset)?;

        let merge = PipelineAssets::new()
            .uniform(UniformValue::U32(order.as_uniform()))
            .buffer(control)
            .buffer(sort.keys_b)
            .buffer(sort.values_b)
            .buffer(output);
        runtime.dispatch_indirect(&self.merge, &merge, control, self.control.merge.offset)
    }

    /// Device argsort of the first `count` words of `input` on their low `bits` bits;
    /// the permutation lands in `output`. Ties keep index order.
    pub fn grade<D: Device>(
        &self,
        runtime: &mut GpuRuntime<D>,
        input: BufferHandle,
        count: u32,
        bits: u32,
        output: BufferHandle,
    ) -> Result<(), BufferError> {
        if count == 0 {
            return Ok(());
        }
        let blocks = count.div_ceil(WORKGROUP_SIZE);
        let bytes = count as u64 * 4;
        let keys = [
            runtime.buffers.allocate_temporary(bytes),
            runtime.buffers.allocate_temporary(bytes),
        ];
        let tags = [output, runtime.buffers.allocate_temporary(bytes)];
        let histogram = runtime
            .buffers
            .allocate_temporary(super::NUM_BINS as u64 * blocks as u64 * 4);
        let count_uniform = UniformValue::U32(count);

        runtime.dispatch(
            &self.grade_init,
            &PipelineAssets::new()
                .uniform(count_uniform)
                .buffer(input)
                .buffer(keys[0])
                .buffer(tags[0]),
            [blocks, 1, 1],
        )?;

        let passes = bits.min(32).div_ceil(super::BITS_PER_PASS).min(PASSES);
        for pass in 0..passes {
            let shift = pass * super::BITS_PER_PASS;
            let mask = super::radix::pass_mask(shift, bits);
            let (src, dst) = ((pass % 2) as usize, ((pass + 1) % 2) as usize);
            let digit_uniforms = |assets: PipelineAssets| {
                assets
                    .uniform(count_uniform)
                    .uniform(UniformValue::U32(shift))
                    .uniform(UniformValue::U32(mask))
            };

            runtime.dispatch(
                &self.histogram,
                &digit_uniforms(PipelineAssets::new()).buffer(keys[src]).buffer(histogram),
                [blocks, 1, 1],
            )?;
            runtime.dispatch(
                &self.scan,
                &PipelineAssets::new()
                    .uniform(UniformValue::U32(super::NUM_BINS as u32 * blocks))
                    .buffer(histogram),
                [1, 1, 1],
            )?;
            runtime.dispatch(
                &self.scatter,
                &digit_uniforms(PipelineAssets::new())
                    .buffer(keys[src])
                    .buffer(tags[src])
                    .buffer(histogram)
                    .buffer(keys[dst])
                    .buffer(tags[dst]),
                [blocks, 1, 1],
            )?;
        }

        if passes % 2 == 1 {
            runtime.dispatch(
                &self.copy,
                &PipelineAssets::new()
                    .uniform(count_uniform)
                    .buffer(tags[1])
                    .buffer(output),
                [blocks, 1, 1],
            )?;
        }
        Ok(())
    }

    /// Device gather: `output[i] = haystack[indexes[i]]` for `i < count`
    pub fn select<D: Device>(
        &self,
        runtime: &mut GpuRuntime<D>,
        haystack: BufferHandle,
        indexes: BufferHandle,
        count: u32,
        output: BufferHandle,
    ) -> Result<(), BufferError> {
        runtime.dispatch(
            &self.select,
            &PipelineAssets::new()
                .uniform(UniformValue::U32(count))
                .buffer(haystack)
                .buffer(indexes)
                .buffer(output),
            [count.div_ceil(WORKGROUP_SIZE), 1, 1],
        )
    }
}
