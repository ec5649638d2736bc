//! Visibility sort
//!
//! Orders up to a few hundred thousand `(key, value)` pairs on the device with bounded
//! work per invocation: the list is laid out as a `width × height` grid, rows and then
//! columns are radix sorted, and every cell finds its global rank in the resulting
//! sorted matrix with a staircase search.
//!
//! The host-side functions in [`radix`], [`matrix`] and [`grade`] are the reference
//! algorithms; [`passes`] issues them as device passes.

pub mod grade;
mod kernels;
pub mod matrix;
pub mod passes;
pub mod radix;
mod shaders;

pub use grade::{grade, grade_nbits, select};
pub use matrix::{place_sorted_matrix, staircase_rank, IndexRemap, SquareSymmetry};
pub use passes::{GpuSort, SortArguments, SortBuffers, SortControl};
pub use radix::{radix_sort_pairs, radix_sort_pairs_with};

/// Bits of the key consumed by one radix pass
pub const BITS_PER_PASS: u32 = 4;

/// Bins of one radix pass
pub const NUM_BINS: usize = 1 << BITS_PER_PASS;

/// Passes for a full 32-bit key
pub const PASSES: u32 = 32 / BITS_PER_PASS;

/// Invocations per workgroup of every sort pass
pub const WORKGROUP_SIZE: u32 = 128;

/// Key of padding cells; sorts after every real key
pub const SENTINEL: u32 = u32::MAX;

/// Order of the final placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    /// Largest key first, e.g. farthest particle first for back-to-front blending
    Descending,
}

impl SortOrder {
    /// Output position of the element with ascending `rank` among `count`
    pub fn position(self, rank: u32, count: u32) -> u32 {
        match self {
            SortOrder::Ascending => rank,
            SortOrder::Descending => count - 1 - rank,
        }
    }

    pub fn as_uniform(self) -> u32 {
        match self {
            SortOrder::Ascending => 0,
            SortOrder::Descending => 1,
        }
    }

    pub fn from_uniform(value: u32) -> Self {
        if value == 0 {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        }
    }
}

/// Grid shape for `count` elements: `width = ceil(sqrt(count))`, `height = ceil(count / width)`
pub fn grid_dimensions(count: u32) -> (u32, u32) {
    if count == 0 {
        return (0, 0);
    }
    let mut width = (count as f64).sqrt().ceil() as u32;
    while (width as u64) * (width as u64) < count as u64 {
        width += 1;
    }
    while width > 1 && ((width - 1) as u64) * ((width - 1) as u64) >= count as u64 {
        width -= 1;
    }
    (width, count.div_ceil(width))
}

/// Cells needed to hold any padded grid of up to `capacity` elements
pub fn grid_capacity(capacity: u32) -> u32 {
    // width * height < count + width, and width only grows with count
    capacity + grid_dimensions(capacity).0
}
