//! Particle pipeline states and the device state block

use crate::error::RuntimeError;
use crate::gpu::commands::{DispatchIndirectCommand, DrawArraysIndirectCommand};
use crate::gpu::layout::{Encoding, Layout};
use crate::gpu::library::ShaderLibrary;
use crate::gpu::pipeline::{
    Access, BlendState, DepthState, GlobalUniforms, PipelineState, ResourceId, UniformSource, UniformType,
    VertexInputLayout,
};
use crate::memory::{ArenaBuilder, ArenaDescriptor, Region};
use crate::sort::passes::shared_snippet;
use crate::sort::WORKGROUP_SIZE;

use super::shaders;

/// Layout of the device-only state block
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleState {
    pub arena: ArenaDescriptor,
    /// `[alive, dead, simulate, dropped]`
    pub counters: Region<u32>,
    pub simulate_args: Region<DispatchIndirectCommand>,
    pub draw_args: Region<DrawArraysIndirectCommand>,
}

impl Default for ParticleState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleState {
    pub fn new() -> Self {
        let mut builder = ArenaBuilder::new();
        let counters = builder.region::<u32>("counters", 4);
        let simulate_args = builder.region::<DispatchIndirectCommand>("simulate_args", 1);
        let draw_args = builder.region::<DrawArraysIndirectCommand>("draw_args", 1);
        Self {
            arena: builder.build(),
            counters,
            simulate_args,
            draw_args,
        }
    }
}

/// Every pipeline state the particle system issues
pub struct ParticlePasses {
    pub reset: PipelineState,
    pub emit: PipelineState,
    pub presimulate: PipelineState,
    pub simulate: PipelineState,
    pub postsimulate: PipelineState,
    pub draw: PipelineState,
    pub immediate: PipelineState,
}

const WG: [u32; 3] = [WORKGROUP_SIZE, 1, 1];

/// Point sprites: depth tested but not written, alpha blended
fn point_sprite(state: PipelineState) -> PipelineState {
    state
        .uniform("u_point_size_sizemin_sizemax", UniformType::Vec3)
        .uniform("u_point_a_b_c", UniformType::Vec3)
        .depth(DepthState {
            test: true,
            write: false,
            range: (0.0, 1.0),
        })
        .blend(BlendState::ALPHA)
}

impl ParticlePasses {
    pub fn new(
        library: &mut ShaderLibrary,
        globals: &mut GlobalUniforms,
        layout: &Layout,
    ) -> Result<Self, RuntimeError> {
        let camera_position = globals.declare(
            "u_camera_position",
            UniformType::Vec3,
            UniformSource::ComputedFrom(ResourceId::CameraPosition),
        );
        let view = globals.declare("u_view", UniformType::Mat4, UniformSource::ComputedFrom(ResourceId::View));
        let view_projection = globals.declare(
            "u_view_projection",
            UniformType::Mat4,
            UniformSource::ComputedFrom(ResourceId::ViewProjection),
        );

        let common = shared_snippet(library, "particle_common", shaders::PARTICLE_COMMON, &[])?;
        // free-list helpers only go into passes that bind `free_list`
        let pop_free = shared_snippet(library, "particle_pop_free", shaders::PARTICLE_POP_FREE, &[common])?;
        let push_free = shared_snippet(library, "particle_push_free", shaders::PARTICLE_PUSH_FREE, &[common])?;
        let reset = shared_snippet(library, "particle_reset", shaders::PARTICLE_RESET, &[common])?;
        let emit = shared_snippet(
            library,
            "particle_emit",
            shaders::PARTICLE_EMIT,
            &[pop_free, layout.snippet],
        )?;
        let presimulate = shared_snippet(library, "particle_presimulate", shaders::PARTICLE_PRESIMULATE, &[common])?;
        let simulate = shared_snippet(
            library,
            "particle_simulate",
            shaders::PARTICLE_SIMULATE,
            &[push_free, layout.snippet],
        )?;
        let postsimulate = shared_snippet(library, "particle_postsimulate", shaders::PARTICLE_POSTSIMULATE, &[common])?;
        let draw = shared_snippet(library, "particle_draw", shaders::PARTICLE_DRAW, &[layout.snippet])?;
        let immediate = shared_snippet(library, "particle_immediate", shaders::PARTICLE_IMMEDIATE, &[])?;

        let packed = layout.packed_name();
        let state = "atomic<u32>";

        Ok(Self {
            reset: PipelineState::compute("particle_reset", WG)
                .snippet(reset)
                .uniform("u_capacity", UniformType::U32)
                .buffer("particle_state", state, Access::ReadWrite)
                .buffer("free_list", "u32", Access::WriteOnly),
            emit: PipelineState::compute("particle_emit", WG)
                .snippet(emit)
                .uniform("u_count", UniformType::U32)
                .buffer("emitted", &packed, Access::ReadOnly)
                .buffer("particle_state", state, Access::ReadWrite)
                .buffer("free_list", "u32", Access::ReadOnly)
                .buffer("alive_list", "u32", Access::WriteOnly)
                .buffer("particles", &packed, Access::WriteOnly),
            presimulate: PipelineState::compute("particle_presimulate", [1, 1, 1])
                .snippet(presimulate)
                .buffer("particle_state", state, Access::ReadWrite),
            simulate: PipelineState::compute("particle_simulate", WG)
                .snippet(simulate)
                .uniform("u_time", UniformType::F32)
                .global(camera_position)
                .buffer("particle_state", state, Access::ReadWrite)
                .buffer("alive_list", "u32", Access::ReadOnly)
                .buffer("free_list", "u32", Access::ReadWrite)
                .buffer("particles", &packed, Access::ReadOnly)
                .buffer("keys_a", "u32", Access::WriteOnly)
                .buffer("values_a", "u32", Access::WriteOnly),
            postsimulate: PipelineState::compute("particle_postsimulate", [1, 1, 1])
                .snippet(postsimulate)
                .buffer("particle_state", state, Access::ReadWrite)
                .buffer("sort_control", "u32", Access::WriteOnly),
            draw: point_sprite(PipelineState::render("particle_draw").snippet(draw))
                .uniform("u_time", UniformType::F32)
                .global(view)
                .global(view_projection)
                .buffer("particles", &packed, Access::ReadOnly)
                .buffer("alive_list", "u32", Access::ReadOnly),
            immediate: point_sprite(PipelineState::render("particle_immediate").snippet(immediate))
                .global(view)
                .global(view_projection)
                .vertex_input(
                    VertexInputLayout::new()
                        .binding(16, 0)
                        .attribute(0, Encoding::Float32, 3, "in_position", 0)
                        .attribute(0, Encoding::Unorm8, 4, "in_color", 12),
                ),
        })
    }

    pub fn states(&self) -> [&PipelineState; 7] {
        [
            &self.reset,
            &self.emit,
            &self.presimulate,
            &self.simulate,
            &self.postsimulate,
            &self.draw,
            &self.immediate,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_block_word_offsets() {
        // the WGSL passes address these words directly
        let state = ParticleState::new();
        assert_eq!(state.counters.word_offset(), 0);
        assert_eq!(state.simulate_args.word_offset(), 4);
        assert_eq!(state.draw_args.word_offset(), 7);
        assert_eq!(state.arena.size, 44);
    }
}
