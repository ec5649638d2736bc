//! WGSL bodies of the particle passes
//!
//! `particle_state` holds the counters `[alive, dead, simulate, dropped]` followed by the
//! simulate dispatch arguments and the draw arguments.

pub const PARTICLE_COMMON: &str = r#"
const ALIVE: u32 = 0u;
const DEAD: u32 = 1u;
const SIMULATE: u32 = 2u;
const DROPPED: u32 = 3u;
const SIMULATE_ARGS: u32 = 4u;
const DRAW_ARGS: u32 = 7u;
const KEY_LIMIT: u32 = 0xfffffffeu;
"#;

/// Needs `free_list` bound readable
pub const PARTICLE_POP_FREE: &str = r#"
fn pop_free_slot() -> i32 {
    let old = i32(atomicSub(&particle_state[DEAD], 1u));
    if (old <= 0) {
        atomicAdd(&particle_state[DEAD], 1u);
        atomicAdd(&particle_state[DROPPED], 1u);
        return -1;
    }
    return i32(free_list[old - 1]);
}
"#;

/// Needs `free_list` bound writable
pub const PARTICLE_PUSH_FREE: &str = r#"
fn push_free_slot(slot: u32) {
    free_list[atomicAdd(&particle_state[DEAD], 1u)] = slot;
}
"#;

pub const PARTICLE_RESET: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn particle_reset(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i < u_capacity) { free_list[i] = i; }
    if (i == 0u) {
        atomicStore(&particle_state[ALIVE], 0u);
        atomicStore(&particle_state[DEAD], u_capacity);
        atomicStore(&particle_state[SIMULATE], 0u);
        atomicStore(&particle_state[DROPPED], 0u);
    }
}
"#;

pub const PARTICLE_EMIT: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn particle_emit(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= u_count) { return; }
    let slot = pop_free_slot();
    if (slot < 0) { return; }
    particles[slot] = emitted[id.x];
    alive_list[atomicAdd(&particle_state[ALIVE], 1u)] = u32(slot);
}
"#;

pub const PARTICLE_PRESIMULATE: &str = r#"
const SIMULATE_GROUP_SIZE: u32 = 128u;

@compute @workgroup_size(1)
fn particle_presimulate() {
    let alive = atomicLoad(&particle_state[ALIVE]);
    atomicStore(&particle_state[SIMULATE], alive);
    atomicStore(&particle_state[SIMULATE_ARGS], (alive + SIMULATE_GROUP_SIZE - 1u) / SIMULATE_GROUP_SIZE);
    atomicStore(&particle_state[SIMULATE_ARGS + 1u], 1u);
    atomicStore(&particle_state[SIMULATE_ARGS + 2u], 1u);
    atomicStore(&particle_state[ALIVE], 0u);
}
"#;

pub const PARTICLE_SIMULATE: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn particle_simulate(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= atomicLoad(&particle_state[SIMULATE])) { return; }
    let slot = alive_list[id.x];
    let p = Particle_unpack(particles[slot]);
    let t = u_time - p.time;
    let position = p.origin + p.velocity * t + p.acceleration * (t * t);
    let alpha = p.alpha + p.alpha_velocity * t;
    if (alpha > 0.0) {
        let index = atomicAdd(&particle_state[ALIVE], 1u);
        keys_a[index] = min(bitcast<u32>(length(position - u_camera_position)), KEY_LIMIT);
        values_a[index] = slot;
    } else {
        push_free_slot(slot);
    }
}
"#;

pub const PARTICLE_POSTSIMULATE: &str = r#"
@compute @workgroup_size(1)
fn particle_postsimulate() {
    let n = atomicLoad(&particle_state[ALIVE]);
    atomicStore(&particle_state[DRAW_ARGS], n);
    atomicStore(&particle_state[DRAW_ARGS + 1u], 1u);
    atomicStore(&particle_state[DRAW_ARGS + 2u], 0u);
    atomicStore(&particle_state[DRAW_ARGS + 3u], 0u);

    var width = u32(ceil(sqrt(f32(n))));
    while (width * width < n) { width++; }
    var height = 0u;
    if (width > 0u) { height = (n + width - 1u) / width; }
    let cells = width * height;
    let groups = vec3<u32>(
        (cells + 127u) / 128u,
        (height + 127u) / 128u,
        (width + 127u) / 128u,
    );
    sort_control[0] = n;
    sort_control[1] = width;
    sort_control[2] = height;
    sort_control[3] = cells;
    // fill, rows, rotate, columns, merge
    var counts = array<u32, 5>(groups.x, groups.y, groups.x, groups.z, groups.x);
    for (var i = 0u; i < 5u; i++) {
        sort_control[4u + i * 3u] = counts[i];
        sort_control[5u + i * 3u] = 1u;
        sort_control[6u + i * 3u] = 1u;
    }
}
"#;

pub const PARTICLE_DRAW: &str = r#"
struct ParticleVarying {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) point_size: f32,
}

@vertex
fn particle_draw(@builtin(vertex_index) vertex: u32) -> ParticleVarying {
    let p = Particle_unpack(particles[alive_list[vertex]]);
    let t = u_time - p.time;
    let position = p.origin + p.velocity * t + p.acceleration * (t * t);
    let alpha = p.alpha + p.alpha_velocity * t;
    let glow = p.incandescence + p.incandescence_velocity * t;

    var out: ParticleVarying;
    out.clip = u_view_projection * vec4<f32>(position, 1.0);
    let d = length((u_view * vec4<f32>(position, 1.0)).xyz);
    let atten = 1.0 / (u_point_a_b_c.x + u_point_a_b_c.y * d + u_point_a_b_c.z * d * d);
    out.point_size = clamp(u_point_size_sizemin_sizemax.x * atten, u_point_size_sizemin_sizemax.y, u_point_size_sizemin_sizemax.z);
    let color = mix(p.color_back, p.color_front, clamp(glow, 0.0, 1.0));
    out.color = vec4<f32>(color.rgb, color.a * alpha);
    return out;
}
"#;

/// Immediate path: host-built vertices
pub const PARTICLE_IMMEDIATE: &str = r#"
struct ImmediateVarying {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) point_size: f32,
}

@vertex
fn particle_immediate(input: VertexInput) -> ImmediateVarying {
    var out: ImmediateVarying;
    out.clip = u_view_projection * vec4<f32>(input.in_position, 1.0);
    let d = length((u_view * vec4<f32>(input.in_position, 1.0)).xyz);
    let atten = 1.0 / (u_point_a_b_c.x + u_point_a_b_c.y * d + u_point_a_b_c.z * d * d);
    out.point_size = clamp(u_point_size_sizemin_sizemax.x * atten, u_point_size_sizemin_sizemax.y, u_point_size_sizemin_sizemax.z);
    out.color = input.in_color;
    return out;
}
"#;
