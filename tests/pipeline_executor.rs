//! Executor behaviour on the CPU device: program caching, redundant-call filtering,
//! computed globals and the render entry points

use glam::Vec3;
use thin_compute::camera::ViewTransforms;
use thin_compute::gpu::cpu::{CpuDevice, KernelContext};
use thin_compute::gpu::pipeline::{ImageType, ResourceId};
use thin_compute::gpu::{
    Access, BlendState, DepthState, ImageHandle, IndexType, PipelineAssets, PipelineState, PrimitiveMode,
    UniformSource, UniformType, UniformValue,
};
use thin_compute::{GpuRuntime, MemoryConfig};

const SCALE: &str = r#"
@compute @workgroup_size(32)
fn scale_words(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&words)) {
        words[id.x] = words[id.x] * u_factor;
    }
}
"#;

const EYE: &str = r#"
@compute @workgroup_size(1)
fn store_eye() {
    eye[0] = u_eye.x;
    eye[1] = u_eye.y;
    eye[2] = u_eye.z;
}
"#;

const QUAD: &str = r#"
@vertex
fn quad_vs(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    return u_view_projection * vec4<f32>(corners[index], 1.0);
}
"#;

fn runtime() -> GpuRuntime<CpuDevice> {
    let mut runtime = GpuRuntime::new(CpuDevice::new(), &MemoryConfig::default());
    runtime
        .device
        .register_kernel("scale_words", |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
            let factor = ctx.uniform_u32("u_factor");
            let n = ctx.invocations_x(groups).min(ctx.binding_len("words"));
            for i in 0..n {
                let word = ctx.load("words", i);
                ctx.store("words", i, word * factor);
            }
        });
    runtime
        .device
        .register_kernel("store_eye", |ctx: &mut KernelContext<'_>, _groups: [u32; 3]| {
            let eye = ctx.uniform_vec3("u_eye");
            ctx.write_range("eye", 0, &[eye.x.to_bits(), eye.y.to_bits(), eye.z.to_bits()]);
        });
    runtime
}

fn scale_state(runtime: &mut GpuRuntime<CpuDevice>) -> PipelineState {
    let body = runtime.library.register_snippet("scale_words", SCALE, &[]).unwrap();
    PipelineState::compute("scale_words", [32, 1, 1])
        .snippet(body)
        .uniform("u_factor", UniformType::U32)
        .buffer("words", "u32", Access::ReadWrite)
}

fn quad_state(runtime: &mut GpuRuntime<CpuDevice>) -> PipelineState {
    let view_projection = runtime.executor.globals_mut().declare(
        "u_view_projection",
        UniformType::Mat4,
        UniformSource::ComputedFrom(ResourceId::ViewProjection),
    );
    let body = runtime.library.register_snippet("quad_vs", QUAD, &[]).unwrap();
    PipelineState::render("quad_vs")
        .snippet(body)
        .global(view_projection)
        .buffer("corners", "vec3<f32>", Access::ReadOnly)
        .image("u_albedo", ImageType::Texture2d)
        .depth(DepthState {
            test: true,
            write: false,
            range: (0.0, 1.0),
        })
        .blend(BlendState::ADDITIVE)
}

#[test]
fn test_program_is_built_once() {
    let mut runtime = runtime();
    let state = scale_state(&mut runtime);

    let first = runtime.initialize(&state);
    let second = runtime.initialize(&state);
    assert_eq!(first, second);
    assert_eq!(state.compiled(), Some(first));

    let source = runtime.device.program_source(first).unwrap();
    assert_eq!(source.entry, "scale_words");
    assert!(source.source.contains("fn scale_words"));
}

#[test]
fn test_redundant_calls_are_filtered() {
    let mut runtime = runtime();
    let state = scale_state(&mut runtime);
    let words = runtime.buffers.allocate_host_mapped(64 * 4);
    let data: Vec<u32> = (0..64).collect();
    {
        let GpuRuntime { device, buffers, .. } = &mut runtime;
        buffers.write_pod(device, words, 0, &data).unwrap();
    }

    let assets = PipelineAssets::new().uniform(UniformValue::U32(2)).buffer(words);
    runtime.dispatch(&state, &assets, [2, 1, 1]).unwrap();
    runtime.dispatch(&state, &assets, [2, 1, 1]).unwrap();

    let stats = runtime.device.stats();
    assert_eq!(stats.program_binds, 1);
    assert_eq!(stats.buffer_binds, 1);
    assert_eq!(stats.uniform_sets, 1);
    assert_eq!(stats.dispatches, 2);

    // only the changed uniform is set again
    let tripled = PipelineAssets::new().uniform(UniformValue::U32(3)).buffer(words);
    runtime.dispatch(&state, &tripled, [2, 1, 1]).unwrap();
    let stats = runtime.device.stats();
    assert_eq!(stats.program_binds, 1);
    assert_eq!(stats.buffer_binds, 1);
    assert_eq!(stats.uniform_sets, 2);

    let result: Vec<u32> = runtime.read_buffer(words).unwrap();
    assert_eq!(result[5], 5 * 2 * 2 * 3);
    assert_eq!(runtime.device.hazards(), 0);
}

#[test]
fn test_invalidate_forces_rebinding() {
    let mut runtime = runtime();
    let state = scale_state(&mut runtime);
    let words = runtime.buffers.allocate_device_only(16);
    let assets = PipelineAssets::new().uniform(UniformValue::U32(1)).buffer(words);

    runtime.dispatch(&state, &assets, [1, 1, 1]).unwrap();
    runtime.executor.invalidate();
    runtime.dispatch(&state, &assets, [1, 1, 1]).unwrap();

    let stats = runtime.device.stats();
    assert_eq!(stats.program_binds, 2);
    assert_eq!(stats.buffer_binds, 2);
}

#[test]
fn test_computed_global_follows_the_view() {
    let mut runtime = runtime();
    let eye_global = runtime.executor.globals_mut().declare(
        "u_eye",
        UniformType::Vec3,
        UniformSource::ComputedFrom(ResourceId::CameraPosition),
    );
    let body = runtime.library.register_snippet("store_eye", EYE, &[]).unwrap();
    let state = PipelineState::compute("store_eye", [1, 1, 1])
        .snippet(body)
        .global(eye_global)
        .buffer("eye", "f32", Access::WriteOnly);
    let out = runtime.buffers.allocate_device_only(12);
    let assets = PipelineAssets::new().buffer(out);

    for eye in [Vec3::new(1.0, 2.0, 3.0), Vec3::new(-4.0, 0.5, 8.0)] {
        runtime.set_view(ViewTransforms::look_at(eye, Vec3::ZERO, 1.0, 1.0));
        runtime.dispatch(&state, &assets, [1, 1, 1]).unwrap();
        let words: Vec<f32> = runtime.read_buffer(out).unwrap();
        assert_eq!(Vec3::from_slice(&words), eye);
    }
    assert_eq!(runtime.device.hazards(), 0);
}

#[test]
fn test_render_state_applied_once() {
    let mut runtime = runtime();
    let state = quad_state(&mut runtime);
    let corners = runtime.buffers.allocate_static_from(&[0.0f32; 12]);
    let assets = PipelineAssets::new().buffer(corners).image(ImageHandle(3));

    runtime
        .draw_arrays(&state, &assets, PrimitiveMode::TriangleStrip, 0, 4, 1)
        .unwrap();
    let changes = runtime.device.stats().state_changes;
    runtime
        .draw_arrays(&state, &assets, PrimitiveMode::TriangleStrip, 0, 4, 1)
        .unwrap();

    let stats = runtime.device.stats();
    assert_eq!(stats.state_changes, changes);
    assert_eq!(stats.image_binds, 1);
    assert_eq!(stats.draws.len(), 2);
    assert_eq!(stats.draws[1].count, 4);
    assert!(!stats.draws[1].indexed);
    assert_eq!(runtime.device.blend_state(), Some(BlendState::ADDITIVE));
    assert!(!runtime.device.depth_state().write);
}

#[test]
fn test_indexed_draw_offsets_by_index_size() {
    let mut runtime = runtime();
    let state = quad_state(&mut runtime);
    let corners = runtime.buffers.allocate_static_from(&[0.0f32; 12]);
    let indices = runtime.buffers.allocate_static_from(&[0u16, 1, 2, 2, 1, 3]);
    let assets = PipelineAssets::new()
        .buffer(corners)
        .image(ImageHandle(0))
        .index_buffer(indices, IndexType::U16);

    runtime
        .draw_elements(&state, &assets, PrimitiveMode::Triangles, 3, 3, 2)
        .unwrap();

    let draw = runtime.device.stats().draws[0];
    assert!(draw.indexed);
    assert_eq!((draw.first, draw.count, draw.instances), (3, 3, 2));
    assert_eq!(runtime.device.faults(), 0);
}

#[test]
#[should_panic(expected = "without an index buffer")]
fn test_indexed_draw_without_indices_panics() {
    let mut runtime = runtime();
    let state = quad_state(&mut runtime);
    let corners = runtime.buffers.allocate_static_from(&[0.0f32; 12]);
    let assets = PipelineAssets::new().buffer(corners).image(ImageHandle(0));
    let _ = runtime.draw_elements(&state, &assets, PrimitiveMode::Triangles, 3, 0, 1);
}

#[test]
#[should_panic(expected = "failed to build")]
fn test_missing_kernel_is_fatal() {
    let mut runtime = runtime();
    let body = runtime
        .library
        .register_snippet("orphan", "fn orphan() {}", &[])
        .unwrap();
    let state = PipelineState::compute("orphan", [1, 1, 1]).snippet(body);
    runtime.initialize(&state);
}

#[test]
#[should_panic(expected = "assets do not match")]
fn test_mismatched_assets_are_fatal() {
    let mut runtime = runtime();
    let state = scale_state(&mut runtime);
    let words = runtime.buffers.allocate_device_only(16);
    let assets = PipelineAssets::new().uniform(UniformValue::F32(2.0)).buffer(words);
    let _ = runtime.dispatch(&state, &assets, [1, 1, 1]);
}
