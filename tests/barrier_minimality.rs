//! Barrier inference through the executor
//!
//! Every barrier the device sees must be one a later read actually needs, and a
//! needed one must never be missing.

use glam::Vec3;
use thin_compute::gpu::cpu::{CpuDevice, KernelContext};
use thin_compute::gpu::{Access, PipelineAssets, PipelineState, UniformType, UniformValue};
use thin_compute::{
    BarrierBits, BufferManager, GpuRuntime, MemoryConfig, ParticleConfig, ParticleEmission, ParticleSystem,
};

const WRITE_RAMP: &str = r#"
@compute @workgroup_size(64)
fn write_ramp(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&data)) {
        data[id.x] = id.x * 2u;
    }
}
"#;

const SUM_WORDS: &str = r#"
@compute @workgroup_size(1)
fn sum_words() {
    var total = 0u;
    for (var i = 0u; i < arrayLength(&data); i++) {
        total += data[i];
    }
    sum[0] = total;
}
"#;

const WRITE_ARGS: &str = r#"
@compute @workgroup_size(1)
fn write_args() {
    args[0] = u_groups;
    args[1] = 1u;
    args[2] = 1u;
}
"#;

struct Passes {
    write_ramp: PipelineState,
    sum_words: PipelineState,
    write_args: PipelineState,
}

fn setup() -> (GpuRuntime<CpuDevice>, Passes) {
    let mut runtime = GpuRuntime::new(CpuDevice::new(), &MemoryConfig::default());
    let library = &mut runtime.library;
    let ramp = library.register_snippet("write_ramp", WRITE_RAMP, &[]).unwrap();
    let sum = library.register_snippet("sum_words", SUM_WORDS, &[]).unwrap();
    let args = library.register_snippet("write_args", WRITE_ARGS, &[]).unwrap();

    let device = &mut runtime.device;
    device.register_kernel("write_ramp", |ctx: &mut KernelContext<'_>, groups: [u32; 3]| {
        let n = ctx.invocations_x(groups).min(ctx.binding_len("data"));
        for i in 0..n {
            ctx.store("data", i, i * 2);
        }
    });
    device.register_kernel("sum_words", |ctx: &mut KernelContext<'_>, _groups: [u32; 3]| {
        let n = ctx.binding_len("data");
        let total = ctx.read_range("data", 0, n).iter().fold(0u32, |a, &w| a.wrapping_add(w));
        ctx.store("sum", 0, total);
    });
    device.register_kernel("write_args", |ctx: &mut KernelContext<'_>, _groups: [u32; 3]| {
        let groups = ctx.uniform_u32("u_groups");
        ctx.write_range("args", 0, &[groups, 1, 1]);
    });

    let passes = Passes {
        write_ramp: PipelineState::compute("write_ramp", [64, 1, 1])
            .snippet(ramp)
            .buffer("data", "u32", Access::WriteOnly),
        sum_words: PipelineState::compute("sum_words", [1, 1, 1])
            .snippet(sum)
            .buffer("data", "u32", Access::ReadOnly)
            .buffer("sum", "u32", Access::WriteOnly),
        write_args: PipelineState::compute("write_args", [1, 1, 1])
            .snippet(args)
            .uniform("u_groups", UniformType::U32)
            .buffer("args", "u32", Access::WriteOnly),
    };
    (runtime, passes)
}

#[test]
fn test_static_buffer_never_needs_a_barrier() {
    let mut device = CpuDevice::new();
    let mut buffers = BufferManager::new(&MemoryConfig::default());
    let handle = buffers.allocate_static_from(&[1u32, 2, 3, 4]);

    for _ in 0..3 {
        let bits = buffers.flush(&mut device, handle, BarrierBits::SHADER_STORAGE).unwrap();
        assert_eq!(bits, BarrierBits::empty());
    }
}

#[test]
fn test_device_write_needs_exactly_the_read_class_once() {
    let mut device = CpuDevice::new();
    let mut buffers = BufferManager::new(&MemoryConfig::default());
    let handle = buffers.allocate_device_only(64);

    buffers.mark_device_written(handle).unwrap();
    let mask = BarrierBits::SHADER_STORAGE;
    assert_eq!(buffers.flush(&mut device, handle, mask).unwrap(), mask);
    assert_eq!(buffers.flush(&mut device, handle, mask).unwrap(), BarrierBits::empty());

    // a different read class still owes its own barrier
    assert_eq!(
        buffers.flush(&mut device, handle, BarrierBits::COMMAND).unwrap(),
        BarrierBits::COMMAND
    );
}

#[test]
fn test_host_write_flushes_the_mapped_range() {
    let mut device = CpuDevice::new();
    let mut buffers = BufferManager::new(&MemoryConfig::default());
    let handle = buffers.allocate_host_mapped(16);

    buffers.write_pod(&mut device, handle, 0, &[9u32, 8, 7, 6]).unwrap();
    let bits = buffers.flush(&mut device, handle, BarrierBits::SHADER_STORAGE).unwrap();
    assert_eq!(bits, BarrierBits::CLIENT_MAPPED_BUFFER);
    assert_eq!(device.stats().mapped_flushes, 1);

    let bits = buffers.flush(&mut device, handle, BarrierBits::SHADER_STORAGE).unwrap();
    assert_eq!(bits, BarrierBits::empty());
    assert_eq!(device.stats().mapped_flushes, 1);
}

#[test]
fn test_reading_static_data_issues_no_barriers() {
    let (mut runtime, passes) = setup();
    let data = runtime.buffers.allocate_static_from(&[1u32, 2, 3, 4, 5]);
    let sum = runtime.buffers.allocate_device_only(4);
    let assets = PipelineAssets::new().buffer(data).buffer(sum);

    runtime.dispatch(&passes.sum_words, &assets, [1, 1, 1]).unwrap();
    assert!(runtime.device.stats().barriers.is_empty());

    let total: Vec<u32> = runtime.read_buffer(sum).unwrap();
    assert_eq!(total, vec![15]);
    assert_eq!(runtime.device.hazards(), 0);
}

#[test]
fn test_write_then_read_issues_one_storage_barrier() {
    let (mut runtime, passes) = setup();
    let data = runtime.buffers.allocate_device_only(64 * 4);
    let sum = runtime.buffers.allocate_device_only(4);

    runtime
        .dispatch(&passes.write_ramp, &PipelineAssets::new().buffer(data), [1, 1, 1])
        .unwrap();
    assert!(runtime.device.stats().barriers.is_empty(), "nothing was written yet");

    runtime
        .dispatch(&passes.sum_words, &PipelineAssets::new().buffer(data).buffer(sum), [1, 1, 1])
        .unwrap();
    assert_eq!(runtime.device.stats().barriers, vec![BarrierBits::SHADER_STORAGE]);

    let total: Vec<u32> = runtime.read_buffer(sum).unwrap();
    assert_eq!(total, vec![(0..64u32).map(|i| i * 2).sum::<u32>()]);
    assert_eq!(runtime.device.hazards(), 0);
    assert_eq!(runtime.device.faults(), 0);
}

#[test]
fn test_device_written_arguments_need_a_command_barrier() {
    let (mut runtime, passes) = setup();
    let args = runtime.buffers.allocate_device_only(12);
    let data = runtime.buffers.allocate_device_only(128 * 4);

    runtime
        .dispatch(
            &passes.write_args,
            &PipelineAssets::new().uniform(UniformValue::U32(2)).buffer(args),
            [1, 1, 1],
        )
        .unwrap();
    runtime
        .dispatch_indirect(&passes.write_ramp, &PipelineAssets::new().buffer(data), args, 0)
        .unwrap();

    assert_eq!(runtime.device.stats().barriers, vec![BarrierBits::COMMAND]);
    let words: Vec<u32> = runtime.read_buffer(data).unwrap();
    assert_eq!(words[127], 254);
    assert_eq!(runtime.device.hazards(), 0);
}

#[test]
fn test_particle_frames_are_hazard_free() {
    let mut runtime = GpuRuntime::new(CpuDevice::new(), &MemoryConfig::default());
    let config = ParticleConfig {
        capacity: 256,
        ..Default::default()
    };
    let mut system = ParticleSystem::new(&mut runtime, &config).unwrap();
    system.install_cpu_kernels(&mut runtime.device);

    for frame in 0..5 {
        for i in 0..40 {
            system.emit(ParticleEmission {
                origin: Vec3::new(i as f32, frame as f32, 0.0),
                alpha_velocity: -0.5,
                ..Default::default()
            });
        }
        system.draw_particles(&mut runtime, frame as f32 * 0.25).unwrap();
        for bits in &runtime.device.stats().barriers {
            assert!(!bits.is_empty());
        }
        runtime.end_frame();
    }
    assert_eq!(runtime.device.hazards(), 0);
    assert_eq!(runtime.device.faults(), 0);
}
