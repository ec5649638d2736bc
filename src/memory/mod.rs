//! Device memory management
//!
//! Buffer allocation with four strategies, the per-frame temporary ring behind the
//! Temporary strategy, and arena descriptors for carving one allocation into typed
//! sub-regions.

pub mod arena;
pub mod buffer_manager;
pub mod ring;

pub use arena::{ArenaBuilder, ArenaDescriptor, Region, RegionInfo};
pub use buffer_manager::{BufferHandle, BufferKind, BufferManager};
pub use ring::{RingSlice, TemporaryRing};
