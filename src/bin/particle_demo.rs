use std::time::Instant;

use anyhow::{Context, Result};
use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thin_compute::camera::ViewTransforms;
use thin_compute::gpu::cpu::CpuDevice;
use thin_compute::particles::{draw_immediate, ImmediateParticle};
use thin_compute::{GpuRuntime, ParticleEmission, ParticleSystem, RuntimeConfig};

const FRAMES: u32 = 120;
const FRAME_TIME: f32 = 1.0 / 60.0;
const EMISSIONS_PER_FRAME: u32 = 200;

fn fountain_particle(rng: &mut StdRng) -> ParticleEmission {
    let spread = Vec3::new(rng.gen_range(-1.0..1.0), 0.0, rng.gen_range(-1.0..1.0));
    ParticleEmission {
        origin: Vec3::ZERO,
        velocity: Vec3::new(0.0, rng.gen_range(4.0..8.0), 0.0) + spread,
        acceleration: Vec3::new(0.0, -4.9, 0.0),
        color_front: Vec4::new(1.0, 0.8, 0.3, 1.0),
        color_back: Vec4::new(0.6, 0.1, 0.0, 1.0),
        alpha: 1.0,
        alpha_velocity: -rng.gen_range(0.5..1.5),
        incandescence: 1.0,
        incandescence_velocity: -0.8,
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => RuntimeConfig::default(),
    };

    println!("=== Particle Pipeline Demo (CPU device) ===\n");
    println!("Capacity: {}", config.particles.capacity);
    println!("Frames: {} at {:.1} ms\n", FRAMES, FRAME_TIME * 1000.0);

    let mut runtime = GpuRuntime::new(CpuDevice::new(), &config.memory);
    runtime.set_view(ViewTransforms::look_at(
        Vec3::new(0.0, 4.0, 12.0),
        Vec3::new(0.0, 3.0, 0.0),
        16.0 / 9.0,
        60f32.to_radians(),
    ));

    let mut particles = ParticleSystem::new(&mut runtime, &config.particles)?;
    particles.install_cpu_kernels(&mut runtime.device);
    particles.build_programs(&mut runtime);

    let mut rng = StdRng::seed_from_u64(0xF0_0D);
    let start = Instant::now();
    let mut time = 0.0f32;

    for frame in 0..FRAMES {
        for _ in 0..EMISSIONS_PER_FRAME {
            particles.emit(fountain_particle(&mut rng));
        }
        runtime.device.reset_stats();
        particles.draw_particles(&mut runtime, time)?;

        // a few host-side sparks through the immediate path
        let sparks: Vec<ImmediateParticle> = (0..8)
            .map(|_| ImmediateParticle {
                origin: Vec3::new(rng.gen_range(-2.0..2.0), rng.gen_range(0.0..1.0), 0.0),
                color: Vec4::ONE,
                alpha: 0.5,
            })
            .collect();
        draw_immediate(&mut runtime, &particles, &sparks)?;

        if frame % 20 == 0 || frame == FRAMES - 1 {
            let stats = runtime.device.stats();
            let drawn = stats.draws.first().map_or(0, |d| d.count);
            let (dispatches, empty, barriers) = (stats.dispatches, stats.empty_dispatches, stats.barriers.len());
            let counters = particles.debug_counters(&mut runtime)?;
            println!(
                "frame {:3}: drawn {:5}  dead {:5}  dropped {:5}  dispatches {:2} (empty {})  barriers {:2}",
                frame,
                drawn,
                counters.dead,
                counters.dropped,
                dispatches, empty, barriers
            );
        }

        runtime.end_frame();
        time += FRAME_TIME;
    }

    let elapsed = start.elapsed();
    println!("\n=== Summary ===");
    println!("Total time: {:.2?} ({:.2?} per frame)", elapsed, elapsed / FRAMES);
    println!("Device faults: {}", runtime.device.faults());
    println!("Barrier hazards: {}", runtime.device.hazards());
    let (allocated, used) = runtime.buffers.temporary_stats();
    println!("Temporary ring: {} bytes allocated, {} in use", allocated, used);

    if runtime.device.hazards() > 0 || runtime.device.faults() > 0 {
        anyhow::bail!("device reported hazards or faults");
    }
    Ok(())
}
