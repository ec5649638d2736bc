//! GPU-resident particles
//!
//! A fixed pool of slots recycled through a device-side free list. Particles move by a
//! closed-form law, are culled when their alpha reaches zero, sorted back to front by
//! view distance and drawn with an indirect draw.

pub mod immediate;
mod kernels;
pub mod lifecycle;
pub mod motion;
pub mod passes;
mod shaders;
pub mod system;

pub use immediate::{draw_immediate, ImmediateParticle, ImmediateVertex};
pub use lifecycle::{HostSlots, SlotArray, SlotMemory};
pub use motion::{distance_key, MotionRecord, MotionSample, PARTICLE_LAYOUT, PARTICLE_WORDS};
pub use passes::{ParticlePasses, ParticleState};
pub use system::{ParticleCounters, ParticleEmission, ParticleSystem};
