//! Host kernels of the particle passes for [`CpuDevice`]

use std::sync::Arc;

use super::lifecycle::{self, SlotArray, SlotMemory, SIMULATE};
use super::motion::{distance_key, MotionRecord, PARTICLE_WORDS};
use super::passes::ParticleState;
use crate::gpu::cpu::{CpuDevice, KernelContext};
use crate::gpu::layout::Layout;
use crate::sort::SortControl;

/// Slot memory over a kernel's named bindings
struct DeviceSlots<'c, 'a> {
    ctx: &'c mut KernelContext<'a>,
}

impl DeviceSlots<'_, '_> {
    fn binding(array: SlotArray) -> &'static str {
        match array {
            SlotArray::Counters => "particle_state",
            SlotArray::FreeList => "free_list",
            SlotArray::AliveList => "alive_list",
            SlotArray::SortKeys => "keys_a",
            SlotArray::SortValues => "values_a",
        }
    }
}

impl SlotMemory for DeviceSlots<'_, '_> {
    fn load(&mut self, array: SlotArray, index: u32) -> u32 {
        self.ctx.load(Self::binding(array), index)
    }

    fn store(&mut self, array: SlotArray, index: u32, value: u32) {
        self.ctx.store(Self::binding(array), index, value);
    }

    fn atomic_add(&mut self, array: SlotArray, index: u32, value: u32) -> u32 {
        self.ctx.atomic_add(Self::binding(array), index, value)
    }

    fn atomic_sub(&mut self, array: SlotArray, index: u32, value: u32) -> u32 {
        self.ctx.atomic_sub(Self::binding(array), index, value)
    }
}

pub(crate) fn install(device: &mut CpuDevice, layout: Arc<Layout>, state: &ParticleState, control: SortControl) {
    let simulate_args = state.simulate_args.word_offset();
    let draw_args = state.draw_args.word_offset();

    device.register_kernel("particle_reset", |ctx: &mut KernelContext<'_>, _groups: [u32; 3]| {
        let capacity = ctx.uniform_u32("u_capacity");
        lifecycle::reset_slots(&mut DeviceSlots { ctx }, capacity);
    });

    device.register_kernel("particle_emit", |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let count = ctx.uniform_u32("u_count").min(ctx.invocations_x(groups));
        for i in 0..count {
            let Some(slot) = lifecycle::pop_free_slot(&mut DeviceSlots { ctx: &mut *ctx }) else {
                continue;
            };
            let record = ctx.read_range("emitted", i * PARTICLE_WORDS, PARTICLE_WORDS);
            ctx.write_range("particles", slot * PARTICLE_WORDS, &record);
            lifecycle::push_alive(&mut DeviceSlots { ctx: &mut *ctx }, slot);
        }
    });

    device.register_kernel("particle_presimulate", move |ctx: &mut KernelContext<'_>, _groups: [u32; 3]| {
        let args = lifecycle::presimulate(&mut DeviceSlots { ctx: &mut *ctx });
        ctx.write_range("particle_state", simulate_args, &args.groups());
    });

    device.register_kernel("particle_simulate", move |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let now = ctx.uniform_f32("u_time");
        let camera = ctx.uniform_vec3("u_camera_position");
        let count = ctx.load("particle_state", SIMULATE).min(ctx.invocations_x(groups));
        for i in 0..count {
            let slot = ctx.load("alive_list", i);
            let words = ctx.read_range("particles", slot * PARTICLE_WORDS, PARTICLE_WORDS);
            let record = layout
                .unpack(&words)
                .ok()
                .and_then(|fields| MotionRecord::from_fields(&fields));
            let (alpha, key) = match record {
                Some(record) => {
                    let sample = record.evaluate(now);
                    (sample.alpha, distance_key(sample.position.distance(camera)))
                }
                None => {
                    log::warn!("[ParticleSystem] Slot {} holds an unreadable record, retiring it", slot);
                    (0.0, 0)
                }
            };
            lifecycle::retire_or_keep(&mut DeviceSlots { ctx: &mut *ctx }, slot, alpha, key);
        }
    });

    device.register_kernel("particle_postsimulate", move |ctx: &mut KernelContext<'_>, _groups: [u32; 3]| {
        let (draw, sort) = lifecycle::postsimulate(&mut DeviceSlots { ctx: &mut *ctx });
        ctx.write_range("particle_state", draw_args, bytemuck::cast_slice(std::slice::from_ref(&draw)));
        ctx.write_range("sort_control", 0, &sort.image(&control));
    });
}
