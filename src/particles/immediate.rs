//! Immediate particle path
//!
//! For particles owned by the host (one frame's worth of effects built on the CPU). They
//! are copied into a temporary vertex buffer and drawn directly, with the same point
//! sprite state as the device-resident particles.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use super::system::{point_uniforms, ParticleSystem};
use crate::error::RuntimeResult;
use crate::gpu::device::{Device, PrimitiveMode};
use crate::gpu::layout::Encoding;
use crate::gpu::pipeline::PipelineAssets;
use crate::gpu::runtime::GpuRuntime;

/// Vertex of the immediate path: float32x3 position, unorm8x4 color
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ImmediateVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

impl ImmediateVertex {
    pub fn new(position: Vec3, color: Vec4, alpha: f32) -> Self {
        let unorm = |v: f32| Encoding::Unorm8.quantize(v) as u8;
        Self {
            position: position.to_array(),
            color: [unorm(color.x), unorm(color.y), unorm(color.z), unorm(alpha)],
        }
    }
}

/// A host-side particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImmediateParticle {
    pub origin: Vec3,
    pub color: Vec4,
    pub alpha: f32,
}

/// Draw `particles` this frame; the vertex data lives in a temporary buffer
pub fn draw_immediate<D: Device>(
    runtime: &mut GpuRuntime<D>,
    system: &ParticleSystem,
    particles: &[ImmediateParticle],
) -> RuntimeResult<()> {
    if particles.is_empty() {
        return Ok(());
    }
    let vertices: Vec<ImmediateVertex> = particles
        .iter()
        .map(|p| ImmediateVertex::new(p.origin, p.color, p.alpha))
        .collect();

    let GpuRuntime { device, buffers, .. } = &mut *runtime;
    let vertex_buffer = buffers.allocate_temporary_from(device, bytemuck::cast_slice(&vertices))?;

    let assets = point_uniforms(system.config(), PipelineAssets::new()).vertex_buffer(vertex_buffer);
    runtime.draw_arrays(
        &system.passes().immediate,
        &assets,
        PrimitiveMode::Points,
        0,
        vertices.len() as u32,
        1,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<ImmediateVertex>(), 16);
        let v = ImmediateVertex::new(Vec3::new(1.0, 2.0, 3.0), Vec4::new(1.0, 0.0, 0.5, 1.0), 0.25);
        assert_eq!(v.color[0], 255);
        assert_eq!(v.color[1], 0);
        assert_eq!(v.color[2], 128);
        assert_eq!(v.color[3], 64);
    }
}
