//! Uniform values and global uniforms
//!
//! Global uniforms are process-wide values visible to every pipeline state that lists
//! them. A global is either set by the host (`UniformSource::None`) or derived from one
//! of the frame's view resources, in which case the executor recomputes it at most once
//! per draw index.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::camera::ViewTransforms;

/// Declared type of a uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    U32,
    I32,
    F32,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    pub fn wgsl_type(self) -> &'static str {
        match self {
            UniformType::U32 => "u32",
            UniformType::I32 => "i32",
            UniformType::F32 => "f32",
            UniformType::Vec2 => "vec2<f32>",
            UniformType::Vec3 => "vec3<f32>",
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Mat4 => "mat4x4<f32>",
        }
    }

    pub fn zero(self) -> UniformValue {
        match self {
            UniformType::U32 => UniformValue::U32(0),
            UniformType::I32 => UniformValue::I32(0),
            UniformType::F32 => UniformValue::F32(0.0),
            UniformType::Vec2 => UniformValue::Vec2(Vec2::ZERO),
            UniformType::Vec3 => UniformValue::Vec3(Vec3::ZERO),
            UniformType::Vec4 => UniformValue::Vec4(Vec4::ZERO),
            UniformType::Mat4 => UniformValue::Mat4(Mat4::ZERO),
        }
    }
}

/// A uniform value as passed to the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    U32(u32),
    I32(i32),
    F32(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::U32(_) => UniformType::U32,
            UniformValue::I32(_) => UniformType::I32,
            UniformValue::F32(_) => UniformType::F32,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }
}

/// View resources a global uniform can be computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    View,
    Projection,
    ViewProjection,
    CameraPosition,
}

impl ResourceId {
    pub fn ty(self) -> UniformType {
        match self {
            ResourceId::CameraPosition => UniformType::Vec3,
            _ => UniformType::Mat4,
        }
    }

    pub fn resolve(self, view: &ViewTransforms) -> UniformValue {
        match self {
            ResourceId::View => UniformValue::Mat4(view.view),
            ResourceId::Projection => UniformValue::Mat4(view.projection),
            ResourceId::ViewProjection => UniformValue::Mat4(view.view_projection()),
            ResourceId::CameraPosition => UniformValue::Vec3(view.camera_position),
        }
    }
}

/// Where a global uniform's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformSource {
    /// Set explicitly by the host
    None,
    ComputedFrom(ResourceId),
}

/// Handle to a global uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalUniformId(usize);

#[derive(Debug)]
struct GlobalUniform {
    name: String,
    ty: UniformType,
    source: UniformSource,
    value: UniformValue,
    /// Draw index the value was last computed for
    resolved_at: Option<u64>,
}

/// Process-wide uniforms shared between pipeline states
#[derive(Debug, Default)]
pub struct GlobalUniforms {
    entries: Vec<GlobalUniform>,
}

impl GlobalUniforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a global. Declaring an existing name again returns the existing id.
    pub fn declare(&mut self, name: &str, ty: UniformType, source: UniformSource) -> GlobalUniformId {
        if let Some(index) = self.entries.iter().position(|e| e.name == name) {
            debug_assert_eq!(self.entries[index].ty, ty, "global '{}' redeclared with a new type", name);
            return GlobalUniformId(index);
        }
        if let UniformSource::ComputedFrom(resource) = source {
            debug_assert_eq!(resource.ty(), ty, "global '{}' computed from {:?}", name, resource);
        }
        self.entries.push(GlobalUniform {
            name: name.to_string(),
            ty,
            source,
            value: ty.zero(),
            resolved_at: None,
        });
        GlobalUniformId(self.entries.len() - 1)
    }

    pub fn name(&self, id: GlobalUniformId) -> &str {
        &self.entries[id.0].name
    }

    pub fn ty(&self, id: GlobalUniformId) -> UniformType {
        self.entries[id.0].ty
    }

    /// Set a host-sourced global
    pub fn set(&mut self, id: GlobalUniformId, value: UniformValue) {
        let entry = &mut self.entries[id.0];
        debug_assert_eq!(entry.ty, value.ty(), "global '{}' set with wrong type", entry.name);
        entry.value = value;
    }

    /// Current value, recomputing computed globals once per draw index
    pub fn resolve(&mut self, id: GlobalUniformId, draw_index: u64, view: &ViewTransforms) -> UniformValue {
        let entry = &mut self.entries[id.0];
        if let UniformSource::ComputedFrom(resource) = entry.source {
            if entry.resolved_at != Some(draw_index) {
                entry.value = resource.resolve(view);
                entry.resolved_at = Some(draw_index);
            }
        }
        entry.value
    }

    /// Force computed globals to refresh on their next use
    pub fn invalidate(&mut self) {
        for entry in &mut self.entries {
            entry.resolved_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_computed_global_tracks_view_per_draw() {
        let mut globals = GlobalUniforms::new();
        let eye = globals.declare(
            "u_camera_position",
            UniformType::Vec3,
            UniformSource::ComputedFrom(ResourceId::CameraPosition),
        );

        let mut view = ViewTransforms::default();
        view.camera_position = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(globals.resolve(eye, 0, &view), UniformValue::Vec3(view.camera_position));

        // Same draw index: the cached value stands
        let moved = ViewTransforms {
            camera_position: Vec3::X,
            ..view
        };
        assert_eq!(globals.resolve(eye, 0, &moved), UniformValue::Vec3(view.camera_position));
        assert_eq!(globals.resolve(eye, 1, &moved), UniformValue::Vec3(Vec3::X));
    }

    #[test]
    fn test_host_global_and_redeclaration() {
        let mut globals = GlobalUniforms::new();
        let time = globals.declare("u_time", UniformType::F32, UniformSource::None);
        assert_eq!(globals.resolve(time, 0, &ViewTransforms::default()), UniformValue::F32(0.0));

        globals.set(time, UniformValue::F32(2.5));
        assert_eq!(globals.resolve(time, 7, &ViewTransforms::default()), UniformValue::F32(2.5));
        assert_eq!(globals.declare("u_time", UniformType::F32, UniformSource::None), time);
        assert_eq!(globals.name(time), "u_time");
    }
}
