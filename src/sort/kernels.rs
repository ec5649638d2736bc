//! Host kernels of the sort passes for [`CpuDevice`]
//!
//! Each kernel follows its WGSL entry point over the same named bindings, so a
//! misrouted buffer shows up as a fault or a hazard on the CPU device too.

use super::matrix::{staircase_rank, SquareSymmetry};
use super::passes::SortControl;
use super::radix::{histogram, radix_sort_pairs_with};
use super::{SortOrder, NUM_BINS, SENTINEL};
use crate::gpu::cpu::{CpuDevice, KernelContext};

/// `(count, width, height, cells)` from the control block
fn counters(ctx: &mut KernelContext<'_>, offset: u32) -> (u32, u32, u32, u32) {
    let words = ctx.read_range("sort_control", offset, 4);
    (words[0], words[1], words[2], words[3])
}

/// Sort `rows` consecutive runs of `len` words in `primary`, using `scratch` for the
/// ping-pong
fn sort_runs(
    ctx: &mut KernelContext<'_>,
    invocations: u32,
    primary: (&str, &str),
    scratch: (&str, &str),
    rows: u32,
    len: u32,
) {
    for row in 0..rows.min(invocations) {
        let base = row * len;
        let mut keys = ctx.read_range(primary.0, base, len);
        let mut values = ctx.read_range(primary.1, base, len);
        let mut scratch_keys = ctx.read_range(scratch.0, base, len);
        let mut scratch_values = ctx.read_range(scratch.1, base, len);
        let scattered = radix_sort_pairs_with(
            &mut keys,
            &mut values,
            &mut scratch_keys,
            &mut scratch_values,
            32,
        );
        ctx.write_range(primary.0, base, &keys);
        ctx.write_range(primary.1, base, &values);
        if scattered > 0 {
            ctx.write_range(scratch.0, base, &scratch_keys);
            ctx.write_range(scratch.1, base, &scratch_values);
        }
    }
}

pub(crate) fn install(device: &mut CpuDevice, control: &SortControl) {
    let counters_at = control.counters.word_offset();

    device.register_kernel("sort_fill", move |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let (count, _, _, cells) = counters(ctx, counters_at);
        for i in count..cells.min(ctx.invocations_x(groups)) {
            ctx.store("keys_a", i, SENTINEL);
            ctx.store("values_a", i, SENTINEL);
        }
    });

    device.register_kernel("sort_rows", move |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let (_, width, height, _) = counters(ctx, counters_at);
        let invocations = ctx.invocations_x(groups);
        sort_runs(ctx, invocations, ("keys_a", "values_a"), ("keys_b", "values_b"), height, width);
    });

    device.register_kernel("sort_rotate", move |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let (_, width, height, cells) = counters(ctx, counters_at);
        let index = ctx.uniform_u32("u_symmetry");
        let Some(symmetry) = SquareSymmetry::from_index(index) else {
            log::warn!("[GpuSort] Unknown symmetry index {}, rotate skipped", index);
            return;
        };
        let remap = symmetry.remap(height, width);
        for i in 0..cells.min(ctx.invocations_x(groups)) {
            let dst = remap.apply(i / width, i % width) as u32;
            let key = ctx.load("keys_a", i);
            let value = ctx.load("values_a", i);
            ctx.store("keys_b", dst, key);
            ctx.store("values_b", dst, value);
        }
    });

    device.register_kernel("sort_columns", move |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let (_, width, height, _) = counters(ctx, counters_at);
        let invocations = ctx.invocations_x(groups);
        sort_runs(ctx, invocations, ("keys_b", "values_b"), ("keys_a", "values_a"), width, height);
    });

    device.register_kernel("sort_merge", move |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let (count, width, height, cells) = counters(ctx, counters_at);
        let order = SortOrder::from_uniform(ctx.uniform_u32("u_descending"));
        let (rows, cols) = (width, height);
        let keys = ctx.read_range("keys_b", 0, cells);
        for i in 0..cells.min(ctx.invocations_x(groups)) {
            let rank = staircase_rank(&keys, rows, cols, i / cols, i % cols);
            if rank >= count {
                continue;
            }
            let value = ctx.load("values_b", i);
            ctx.store("sorted_values", order.position(rank, count), value);
        }
    });

    install_grade(device);
}

fn install_grade(device: &mut CpuDevice) {
    device.register_kernel("grade_init", |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let count = ctx.uniform_u32("u_count");
        for i in 0..count.min(ctx.invocations_x(groups)) {
            let key = ctx.load("grade_input", i);
            ctx.store("keys_dst", i, key);
            ctx.store("tags_dst", i, i);
        }
    });

    // histogram[digit * blocks + block]
    device.register_kernel("grade_histogram", |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let count = ctx.uniform_u32("u_count");
        let shift = ctx.uniform_u32("u_shift");
        let mask = ctx.uniform_u32("u_mask");
        let block_size = ctx.workgroup_size()[0];
        let blocks = groups[0];
        for block in 0..blocks {
            let start = (block * block_size).min(count);
            let end = (start + block_size).min(count);
            let keys = ctx.read_range("keys_src", start, end - start);
            let bins = histogram(&keys, shift, mask);
            for (digit, &n) in bins.iter().enumerate() {
                ctx.store("histogram", digit as u32 * blocks + block, n);
            }
        }
    });

    device.register_kernel("grade_scan", |ctx: &mut KernelContext<'_>, _groups: [u32; 3]| {
        let length = ctx.uniform_u32("u_length");
        let mut running = 0u32;
        for i in 0..length {
            let count = ctx.load("histogram", i);
            ctx.store("histogram", i, running);
            running += count;
        }
    });

    device.register_kernel("grade_scatter", |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let count = ctx.uniform_u32("u_count");
        let shift = ctx.uniform_u32("u_shift");
        let mask = ctx.uniform_u32("u_mask");
        let block_size = ctx.workgroup_size()[0];
        let blocks = groups[0];
        for block in 0..blocks {
            let mut offsets = [0u32; NUM_BINS];
            for (digit, offset) in offsets.iter_mut().enumerate() {
                *offset = ctx.load("histogram", digit as u32 * blocks + block);
            }
            let start = (block * block_size).min(count);
            let end = (start + block_size).min(count);
            for i in start..end {
                let key = ctx.load("keys_src", i);
                let tag = ctx.load("tags_src", i);
                let digit = ((key >> shift) & mask) as usize;
                ctx.store("keys_dst", offsets[digit], key);
                ctx.store("tags_dst", offsets[digit], tag);
                offsets[digit] += 1;
            }
        }
    });

    device.register_kernel("copy_words", |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let count = ctx.uniform_u32("u_count").min(ctx.invocations_x(groups));
        let words = ctx.read_range("copy_src", 0, count);
        ctx.write_range("copy_dst", 0, &words);
    });

    device.register_kernel("select_gather", |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let count = ctx.uniform_u32("u_count").min(ctx.invocations_x(groups));
        for i in 0..count {
            let index = ctx.load("indexes", i);
            let value = ctx.load("haystack", index);
            ctx.store("selected", i, value);
        }
    });
}
