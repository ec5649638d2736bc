//! Particle pool lifecycle on the CPU device
//!
//! Saturation, expiry and conservation of the slot pool, observed through the debug
//! read-backs only.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thin_compute::camera::ViewTransforms;
use thin_compute::gpu::cpu::CpuDevice;
use thin_compute::{GpuRuntime, MemoryConfig, ParticleConfig, ParticleEmission, ParticleSystem};

fn setup(capacity: u32) -> (GpuRuntime<CpuDevice>, ParticleSystem) {
    let mut runtime = GpuRuntime::new(CpuDevice::new(), &MemoryConfig::default());
    runtime.set_view(ViewTransforms::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 1.0));
    let config = ParticleConfig {
        capacity,
        ..Default::default()
    };
    let system = ParticleSystem::new(&mut runtime, &config).unwrap();
    system.install_cpu_kernels(&mut runtime.device);
    (runtime, system)
}

fn assert_clean(runtime: &GpuRuntime<CpuDevice>) {
    assert_eq!(runtime.device.hazards(), 0, "barrier hazards");
    assert_eq!(runtime.device.faults(), 0, "device faults");
}

fn last_draw_count(runtime: &GpuRuntime<CpuDevice>) -> u32 {
    runtime.device.stats().draws.last().map(|d| d.count).unwrap()
}

#[test]
fn test_saturation_drops_excess_emissions() {
    let (mut runtime, mut system) = setup(4);

    for _ in 0..6 {
        system.emit(ParticleEmission {
            alpha: 1.0,
            alpha_velocity: 0.0,
            ..Default::default()
        });
    }
    assert_eq!(system.pending_emissions(), 6);
    system.flush_emissions(&mut runtime, 0.0).unwrap();
    assert_eq!(system.pending_emissions(), 0);

    let counters = system.debug_counters(&mut runtime).unwrap();
    assert_eq!(counters.alive, 4);
    assert_eq!(counters.dead, 0);
    assert_eq!(counters.dropped, 2);

    // all four survive a frame since alpha never decays
    system.draw_particles(&mut runtime, 1.0).unwrap();
    assert_eq!(last_draw_count(&runtime), 4);
    let counters = system.debug_counters(&mut runtime).unwrap();
    assert_eq!(counters.alive + counters.dead, 4);
    assert_clean(&runtime);
}

#[test]
fn test_expired_particle_frees_its_slot() {
    let (mut runtime, mut system) = setup(8);

    system.emit(ParticleEmission {
        alpha: 1.0,
        alpha_velocity: -1.0,
        ..Default::default()
    });
    system.draw_particles(&mut runtime, 0.0).unwrap();
    assert_eq!(last_draw_count(&runtime), 1);

    runtime.end_frame();
    runtime.device.reset_stats();
    system.draw_particles(&mut runtime, 1.5).unwrap();
    assert_eq!(last_draw_count(&runtime), 0);

    let counters = system.debug_counters(&mut runtime).unwrap();
    assert_eq!(counters.alive, 0);
    assert_eq!(counters.dead, 8);
    assert_eq!(counters.dropped, 0);
    assert_clean(&runtime);
}

#[test]
fn test_empty_frame_draws_nothing() {
    let (mut runtime, mut system) = setup(16);
    system.draw_particles(&mut runtime, 0.0).unwrap();

    let stats = runtime.device.stats();
    assert_eq!(stats.draws.len(), 1);
    assert_eq!(stats.draws[0].count, 0);
    // simulate and every sort pass see zero groups
    assert!(stats.empty_dispatches >= 6);
    assert_clean(&runtime);
}

#[test]
fn test_alive_list_is_back_to_front() {
    let (mut runtime, mut system) = setup(32);

    // camera sits at z = 10 looking down -z
    let depths = [3.0f32, -4.0, 0.0, 7.5, -1.0, 2.0, 9.0];
    for &z in &depths {
        system.emit(ParticleEmission {
            origin: Vec3::new(0.0, 0.0, z),
            ..Default::default()
        });
    }
    system.draw_particles(&mut runtime, 0.0).unwrap();
    assert_eq!(last_draw_count(&runtime), depths.len() as u32);

    let slots = system.debug_alive_slots(&mut runtime, depths.len() as u32).unwrap();
    let camera = Vec3::new(0.0, 0.0, 10.0);
    let distances: Vec<f32> = slots
        .iter()
        .map(|&slot| {
            let record = system.debug_record(&mut runtime, slot).unwrap().unwrap();
            record.origin.distance(camera)
        })
        .collect();

    assert!(
        distances.windows(2).all(|w| w[0] >= w[1]),
        "not back to front: {:?}",
        distances
    );
    assert_clean(&runtime);
}

#[test]
fn test_records_follow_closed_form_motion() {
    let (mut runtime, mut system) = setup(4);
    system.emit(ParticleEmission {
        origin: Vec3::new(1.0, 2.0, 3.0),
        velocity: Vec3::new(0.0, 1.0, 0.0),
        acceleration: Vec3::new(0.0, -2.0, 0.0),
        alpha: 1.0,
        alpha_velocity: -0.25,
        ..Default::default()
    });
    system.draw_particles(&mut runtime, 0.5).unwrap();

    let slot = system.debug_alive_slots(&mut runtime, 1).unwrap()[0];
    let record = system.debug_record(&mut runtime, slot).unwrap().unwrap();
    assert_eq!(record.time, 0.5);

    // one second after spawn: y = 2 + 1 * 1 - 2 * 1 * 1
    let sample = record.evaluate(1.5);
    assert!((sample.position - Vec3::new(1.0, 1.0, 3.0)).length() < 1e-5);
    assert!((sample.alpha - 0.75).abs() < 1e-6);
    assert_clean(&runtime);
}

#[test]
fn test_pool_conserves_slots_across_frames() {
    let capacity = 64;
    let (mut runtime, mut system) = setup(capacity);
    let mut rng = StdRng::seed_from_u64(17);
    let mut time = 0.0f32;

    for _ in 0..40 {
        for _ in 0..rng.gen_range(0..24) {
            system.emit(ParticleEmission {
                origin: Vec3::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), 0.0),
                alpha: 1.0,
                alpha_velocity: -rng.gen_range(0.5..4.0),
                ..Default::default()
            });
        }
        runtime.device.reset_stats();
        system.draw_particles(&mut runtime, time).unwrap();

        let counters = system.debug_counters(&mut runtime).unwrap();
        assert_eq!(counters.alive + counters.dead, capacity);
        assert_eq!(last_draw_count(&runtime), counters.alive);

        let mut slots = system.debug_alive_slots(&mut runtime, counters.alive).unwrap();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len() as u32, counters.alive, "slot listed twice");
        assert!(slots.iter().all(|&s| s < capacity));

        runtime.end_frame();
        time += 0.1;
    }
    assert_clean(&runtime);
}
