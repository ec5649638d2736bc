//! View transforms consumed from the render collaborator
//!
//! The entity/render layer owns the camera. This core only needs the resulting
//! matrices and the eye position, to evaluate particle distance keys and to feed
//! the vertex stage through computed global uniforms.

use glam::{Mat4, Vec3};

/// Camera/view/projection transforms for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
}

impl Default for ViewTransforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
        }
    }
}

impl ViewTransforms {
    /// Build transforms for a perspective camera looking from `eye` towards `target`
    pub fn look_at(eye: Vec3, target: Vec3, aspect_ratio: f32, fovy_radians: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fovy_radians, aspect_ratio, 0.1, 1000.0),
            camera_position: eye,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Distance from the eye to a world-space point
    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.camera_position.distance(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_projection_order() {
        let transforms = ViewTransforms::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 1.0);
        let expected = transforms.projection * transforms.view;
        assert_eq!(transforms.view_projection(), expected);
    }

    #[test]
    fn test_eye_maps_to_view_origin() {
        let eye = Vec3::new(3.0, 4.0, 5.0);
        let transforms = ViewTransforms::look_at(eye, Vec3::ZERO, 1.0, 1.0);
        let origin = transforms.view.transform_point3(eye);
        assert!(origin.length() < 1e-4);
        assert!((transforms.distance_to(Vec3::ZERO) - eye.length()).abs() < 1e-5);
    }
}
