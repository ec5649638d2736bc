//! Program source assembly
//!
//! Composes the state's snippets and appends the binding declarations. Locations are
//! assigned in declaration order and numbered separately per binding class: uniforms in
//! group 0, storage buffers in group 1, images in group 2, vertex attributes as
//! `@location`s of the `VertexInput` struct.

use std::fmt::Write as FmtWrite;

use super::state::PipelineState;
use super::uniform::GlobalUniforms;
use crate::gpu::device::{BindingClass, BindingInfo, ProgramKind, ProgramSource};
use crate::gpu::snippet::SnippetGraph;

pub const UNIFORM_GROUP: u32 = 0;
pub const STORAGE_GROUP: u32 = 1;
pub const IMAGE_GROUP: u32 = 2;

/// Build the full program source and binding reflection for `state`
pub fn build_program_source(
    state: &PipelineState,
    snippets: &mut SnippetGraph,
    globals: &GlobalUniforms,
) -> ProgramSource {
    let mut source = String::new();
    let mut bindings = Vec::new();

    writeln!(&mut source, "// Program: {}", state.entry)
        .expect("[ProgramSource] writeln! to String should never fail");
    if let ProgramKind::Compute { workgroup_size: [x, y, z] } = state.kind {
        writeln!(
            &mut source,
            "const WORKGROUP_SIZE: vec3<u32> = vec3<u32>({}u, {}u, {}u);",
            x, y, z
        )
        .expect("[ProgramSource] writeln! to String should never fail");
    }

    source.push_str(&snippets.compose(&state.snippets));

    let uniforms = state
        .uniforms
        .iter()
        .map(|u| (u.name.clone(), u.ty))
        .chain(state.globals.iter().map(|&g| (globals.name(g).to_string(), globals.ty(g))));
    for (location, (name, ty)) in uniforms.enumerate() {
        writeln!(
            &mut source,
            "@group({}) @binding({}) var<uniform> {}: {};",
            UNIFORM_GROUP,
            location,
            name,
            ty.wgsl_type()
        )
        .expect("[ProgramSource] writeln! to String should never fail");
        bindings.push(BindingInfo {
            name,
            class: BindingClass::Uniform,
            location: location as u32,
        });
    }

    for (binding, slot) in state.buffers.iter().enumerate() {
        writeln!(
            &mut source,
            "@group({}) @binding({}) var<storage, {}> {}: array<{}>;",
            STORAGE_GROUP,
            binding,
            slot.access.wgsl(),
            slot.name,
            slot.element
        )
        .expect("[ProgramSource] writeln! to String should never fail");
        bindings.push(BindingInfo {
            name: slot.name.clone(),
            class: BindingClass::StorageBuffer,
            location: binding as u32,
        });
    }

    for (unit, image) in state.images.iter().enumerate() {
        writeln!(
            &mut source,
            "@group({}) @binding({}) var {}: {};",
            IMAGE_GROUP,
            unit,
            image.name,
            image.ty.wgsl()
        )
        .expect("[ProgramSource] writeln! to String should never fail");
        bindings.push(BindingInfo {
            name: image.name.clone(),
            class: BindingClass::Image,
            location: unit as u32,
        });
    }

    if let Some(input) = &state.vertex_input {
        source.push_str("struct VertexInput {\n");
        for (location, attribute) in input.attributes.iter().enumerate() {
            writeln!(
                &mut source,
                "    @location({}) {}: {},",
                location,
                attribute.name,
                attribute.format.wgsl_unpacked_type(attribute.components)
            )
            .expect("[ProgramSource] writeln! to String should never fail");
            bindings.push(BindingInfo {
                name: attribute.name.clone(),
                class: BindingClass::VertexAttribute,
                location: location as u32,
            });
        }
        source.push_str("}\n");
    }

    ProgramSource {
        entry: state.entry.clone(),
        kind: state.kind,
        source,
        bindings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::layout::Encoding;
    use crate::gpu::pipeline::{Access, ImageType, UniformSource, UniformType, VertexInputLayout};

    #[test]
    fn test_locations_numbered_per_class() {
        let mut snippets = SnippetGraph::new();
        let mut globals = GlobalUniforms::new();
        let body = snippets.register("body", "fn main() {}", &[]).unwrap();
        let time = globals.declare("u_time", UniformType::F32, UniformSource::None);

        let state = PipelineState::render("sprite")
            .snippet(body)
            .uniform("u_size", UniformType::Vec3)
            .global(time)
            .buffer("positions", "vec4<f32>", Access::ReadOnly)
            .buffer("counts", "u32", Access::ReadWrite)
            .image("u_sprite", ImageType::Texture2d)
            .vertex_input(
                VertexInputLayout::new()
                    .binding(16, 0)
                    .attribute(0, Encoding::Float32, 3, "position", 0)
                    .attribute(0, Encoding::Unorm8, 4, "color", 12),
            );

        let program = build_program_source(&state, &mut snippets, &globals);
        let src = &program.source;
        assert!(src.contains("@group(0) @binding(0) var<uniform> u_size: vec3<f32>;"));
        assert!(src.contains("@group(0) @binding(1) var<uniform> u_time: f32;"));
        assert!(src.contains("@group(1) @binding(0) var<storage, read> positions: array<vec4<f32>>;"));
        assert!(src.contains("@group(1) @binding(1) var<storage, read_write> counts: array<u32>;"));
        assert!(src.contains("@group(2) @binding(0) var u_sprite: texture_2d<f32>;"));
        assert!(src.contains("    @location(1) color: vec4<f32>,"));
        assert!(src.find("// Begin snippet: body").unwrap() < src.find("@group(0)").unwrap());

        let storage: Vec<_> = program
            .bindings
            .iter()
            .filter(|b| b.class == BindingClass::StorageBuffer)
            .map(|b| (b.name.as_str(), b.location))
            .collect();
        assert_eq!(storage, vec![("positions", 0), ("counts", 1)]);
    }

    #[test]
    fn test_compute_header() {
        let mut snippets = SnippetGraph::new();
        let state = PipelineState::compute("scan", [64, 1, 1]);
        let program = build_program_source(&state, &mut snippets, &GlobalUniforms::new());
        assert!(program
            .source
            .contains("const WORKGROUP_SIZE: vec3<u32> = vec3<u32>(64u, 1u, 1u);"));
        assert!(program.bindings.is_empty());
    }
}
