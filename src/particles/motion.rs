//! Closed-form particle motion
//!
//! A particle stores where and when it was spawned plus constant rates. Its state at
//! any later time is evaluated directly from those, never integrated step by step:
//!
//! ```text
//! position      = origin + velocity * t + acceleration * t^2
//! alpha         = alpha0 + alpha_velocity * t
//! incandescence = incandescence0 + incandescence_velocity * t
//! ```

use glam::{Vec3, Vec4};

use crate::gpu::layout::{Encoding, FieldSpec, FieldValue};

/// Name of the shared particle layout
pub const PARTICLE_LAYOUT: &str = "Particle";

/// Packed size of one particle record in 32-bit words
pub const PARTICLE_WORDS: u32 = 16;

/// Fields of the shared particle layout, in packed order
pub fn particle_layout_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("origin", Encoding::Float32, 3),
        FieldSpec::new("time", Encoding::Float32, 1),
        FieldSpec::new("velocity", Encoding::Float32, 3),
        FieldSpec::new("alpha", Encoding::Float32, 1),
        FieldSpec::new("acceleration", Encoding::Float32, 3),
        FieldSpec::new("alpha_velocity", Encoding::Float32, 1),
        FieldSpec::new("color_front", Encoding::Unorm8, 4),
        FieldSpec::new("color_back", Encoding::Unorm8, 4),
        FieldSpec::new("incandescence", Encoding::Float32, 1),
        FieldSpec::new("incandescence_velocity", Encoding::Float32, 1),
    ]
}

/// Unpacked particle record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRecord {
    pub origin: Vec3,
    /// Simulation time of the spawn
    pub time: f32,
    pub velocity: Vec3,
    pub alpha: f32,
    pub acceleration: Vec3,
    pub alpha_velocity: f32,
    pub color_front: Vec4,
    pub color_back: Vec4,
    pub incandescence: f32,
    pub incandescence_velocity: f32,
}

/// A record evaluated at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub position: Vec3,
    pub alpha: f32,
    pub incandescence: f32,
}

impl MotionRecord {
    /// State at simulation time `now`
    pub fn evaluate(&self, now: f32) -> MotionSample {
        let t = now - self.time;
        MotionSample {
            position: self.origin + self.velocity * t + self.acceleration * (t * t),
            alpha: self.alpha + self.alpha_velocity * t,
            incandescence: self.incandescence + self.incandescence_velocity * t,
        }
    }

    /// Field values in layout order
    pub fn to_fields(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::vec3(self.origin),
            FieldValue::scalar(self.time),
            FieldValue::vec3(self.velocity),
            FieldValue::scalar(self.alpha),
            FieldValue::vec3(self.acceleration),
            FieldValue::scalar(self.alpha_velocity),
            FieldValue::vec4(self.color_front),
            FieldValue::vec4(self.color_back),
            FieldValue::scalar(self.incandescence),
            FieldValue::scalar(self.incandescence_velocity),
        ]
    }

    pub fn from_fields(fields: &[FieldValue]) -> Option<Self> {
        let [origin, time, velocity, alpha, acceleration, alpha_velocity, color_front, color_back, incandescence, incandescence_velocity] =
            fields
        else {
            return None;
        };
        Some(Self {
            origin: origin.as_vec3()?,
            time: time.as_f32()?,
            velocity: velocity.as_vec3()?,
            alpha: alpha.as_f32()?,
            acceleration: acceleration.as_vec3()?,
            alpha_velocity: alpha_velocity.as_f32()?,
            color_front: color_front.as_vec4()?,
            color_back: color_back.as_vec4()?,
            incandescence: incandescence.as_f32()?,
            incandescence_velocity: incandescence_velocity.as_f32()?,
        })
    }
}

/// Sort key of a particle at `distance` from the camera
///
/// Non-negative floats order like their bit patterns. The top value is reserved for
/// sort padding.
pub fn distance_key(distance: f32) -> u32 {
    distance.max(0.0).to_bits().min(crate::sort::SENTINEL - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::library::ShaderLibrary;

    fn record() -> MotionRecord {
        MotionRecord {
            origin: Vec3::new(1.0, 2.0, 3.0),
            time: 10.0,
            velocity: Vec3::new(1.0, 0.0, -1.0),
            alpha: 1.0,
            alpha_velocity: -0.5,
            acceleration: Vec3::new(0.0, -2.0, 0.0),
            color_front: Vec4::new(1.0, 0.0, 0.0, 1.0),
            color_back: Vec4::new(0.0, 0.0, 1.0, 1.0),
            incandescence: 0.0,
            incandescence_velocity: 2.0,
        }
    }

    #[test]
    fn test_layout_is_sixty_four_bytes() {
        let mut library = ShaderLibrary::new();
        let id = library
            .define_layout(PARTICLE_LAYOUT, particle_layout_fields())
            .unwrap();
        let layout = library.layout(id).unwrap();
        assert_eq!(layout.words(), PARTICLE_WORDS as usize);

        let offsets: Vec<u32> = layout.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 12, 16, 28, 32, 44, 48, 52, 56, 60]);
    }

    #[test]
    fn test_closed_form_evaluation() {
        let sample = record().evaluate(12.0);
        assert_eq!(sample.position, Vec3::new(3.0, -6.0, 1.0));
        assert_eq!(sample.alpha, 0.0);
        assert_eq!(sample.incandescence, 4.0);

        // evaluation at the spawn time is the record itself
        let start = record().evaluate(10.0);
        assert_eq!(start.position, record().origin);
        assert_eq!(start.alpha, 1.0);
    }

    #[test]
    fn test_packed_record_round_trip() {
        let mut library = ShaderLibrary::new();
        let id = library
            .define_layout(PARTICLE_LAYOUT, particle_layout_fields())
            .unwrap();
        let layout = library.layout(id).unwrap();

        let words = layout.pack(&record().to_fields()).unwrap();
        let back = MotionRecord::from_fields(&layout.unpack(&words).unwrap()).unwrap();
        assert_eq!(back, record());
    }

    #[test]
    fn test_distance_key_orders_like_distance() {
        assert!(distance_key(0.5) < distance_key(1.0));
        assert!(distance_key(1.0) < distance_key(100.0));
        assert_eq!(distance_key(-1.0), 0);
        assert!(distance_key(f32::INFINITY) < crate::sort::SENTINEL);
    }
}
