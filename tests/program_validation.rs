//! Every program the particle, sort, grade and select passes issue is valid WGSL

use thin_compute::gpu::cpu::CpuDevice;
use thin_compute::gpu::device::ProgramKind;
use thin_compute::{GpuRuntime, MemoryConfig, ParticleConfig, ParticleSystem};

const ENTRIES: [&str; 18] = [
    "particle_reset",
    "particle_emit",
    "particle_presimulate",
    "particle_simulate",
    "particle_postsimulate",
    "particle_draw",
    "particle_immediate",
    "sort_fill",
    "sort_rows",
    "sort_rotate",
    "sort_columns",
    "sort_merge",
    "grade_init",
    "grade_histogram",
    "grade_scan",
    "grade_scatter",
    "copy_words",
    "select_gather",
];

#[test]
fn test_every_program_builds_and_validates() {
    let mut runtime = GpuRuntime::new(CpuDevice::new(), &MemoryConfig::default());
    let system = ParticleSystem::new(&mut runtime, &ParticleConfig::default()).unwrap();
    system.install_cpu_kernels(&mut runtime.device);

    let programs = system.build_programs(&mut runtime);
    assert_eq!(programs.len(), ENTRIES.len());

    for (program, entry) in programs.iter().zip(ENTRIES) {
        let source = runtime.device.program_source(*program).unwrap();
        assert_eq!(source.entry, entry);

        let module = naga::front::wgsl::parse_str(&source.source)
            .unwrap_or_else(|err| panic!("{}:\n{}", entry, err.emit_to_string(&source.source)));
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        if let Err(err) = validator.validate(&module) {
            panic!("{}:\n{}", entry, err.emit_to_string(&source.source));
        }

        let stage = match source.kind {
            ProgramKind::Compute { .. } => naga::ShaderStage::Compute,
            ProgramKind::Render => naga::ShaderStage::Vertex,
        };
        let ep = module
            .entry_points
            .iter()
            .find(|ep| ep.name == entry)
            .unwrap_or_else(|| panic!("{} has no entry point", entry));
        assert_eq!(ep.stage, stage, "{}", entry);
    }
}

#[test]
fn test_programs_are_built_once() {
    let mut runtime = GpuRuntime::new(CpuDevice::new(), &MemoryConfig::default());
    let system = ParticleSystem::new(&mut runtime, &ParticleConfig::default()).unwrap();
    system.install_cpu_kernels(&mut runtime.device);

    let first = system.build_programs(&mut runtime);
    let second = system.build_programs(&mut runtime);
    assert_eq!(first, second);
}

#[test]
fn test_compute_workgroup_size_matches_the_header() {
    let mut runtime = GpuRuntime::new(CpuDevice::new(), &MemoryConfig::default());
    let system = ParticleSystem::new(&mut runtime, &ParticleConfig::default()).unwrap();
    system.install_cpu_kernels(&mut runtime.device);

    for program in system.build_programs(&mut runtime) {
        let source = runtime.device.program_source(program).unwrap();
        let ProgramKind::Compute { workgroup_size } = source.kind else {
            continue;
        };
        let module = naga::front::wgsl::parse_str(&source.source).unwrap();
        let ep = module.entry_points.iter().find(|ep| ep.name == source.entry).unwrap();
        assert_eq!(ep.workgroup_size, workgroup_size, "{}", source.entry);
    }
}
