//! Arena descriptors
//!
//! One allocation carved into named sub-regions. Each region's offset and length is
//! fixed when the descriptor is built, and typed views are checked against those bounds
//! rather than recomputed by hand at every use site.

use std::marker::PhantomData;

use bytemuck::Pod;

/// A typed sub-region of an arena
#[derive(Debug)]
pub struct Region<T> {
    /// Byte offset from the start of the arena
    pub offset: u64,
    /// Element count
    pub len: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for Region<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Region<T> {}

impl<T> PartialEq for Region<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.len == other.len
    }
}

impl<T: Pod> Region<T> {
    /// Element stride in bytes
    pub const STRIDE: u64 = std::mem::size_of::<T>() as u64;

    pub fn byte_len(&self) -> u64 {
        self.len as u64 * Self::STRIDE
    }

    /// Offset in 32-bit words, for word-addressed device memory
    pub fn word_offset(&self) -> u32 {
        (self.offset / 4) as u32
    }

    /// Byte offset of element `index`
    pub fn element_offset(&self, index: usize) -> u64 {
        debug_assert!(index < self.len, "element {} out of region of {}", index, self.len);
        self.offset + index as u64 * Self::STRIDE
    }

    /// View the region inside the arena's bytes
    pub fn view<'a>(&self, arena: &'a [u8]) -> Option<&'a [T]> {
        let start = self.offset as usize;
        let bytes = arena.get(start..start + self.byte_len() as usize)?;
        bytemuck::try_cast_slice(bytes).ok()
    }

    pub fn view_mut<'a>(&self, arena: &'a mut [u8]) -> Option<&'a mut [T]> {
        let start = self.offset as usize;
        let bytes = arena.get_mut(start..start + self.byte_len() as usize)?;
        bytemuck::try_cast_slice_mut(bytes).ok()
    }
}

/// Record of one region, kept by the descriptor for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub name: &'static str,
    pub offset: u64,
    pub size: u64,
}

/// Builds an [`ArenaDescriptor`] one region at a time
#[derive(Debug, Default)]
pub struct ArenaBuilder {
    regions: Vec<RegionInfo>,
    cursor: u64,
}

impl ArenaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `len` elements of `T`, aligned to at least 4 bytes
    pub fn region<T: Pod>(&mut self, name: &'static str, len: usize) -> Region<T> {
        self.aligned_region(name, len, 4)
    }

    /// Reserve `len` elements of `T` at a caller-chosen alignment
    pub fn aligned_region<T: Pod>(&mut self, name: &'static str, len: usize, align: u64) -> Region<T> {
        let align = align.max(std::mem::align_of::<T>() as u64).max(4);
        let offset = self.cursor.next_multiple_of(align);
        let size = len as u64 * std::mem::size_of::<T>() as u64;
        self.cursor = offset + size;
        self.regions.push(RegionInfo { name, offset, size });
        Region {
            offset,
            len,
            _marker: PhantomData,
        }
    }

    pub fn build(self) -> ArenaDescriptor {
        ArenaDescriptor {
            size: self.cursor.next_multiple_of(4),
            regions: self.regions,
        }
    }
}

/// Finished arena: total size plus every region's placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaDescriptor {
    pub size: u64,
    pub regions: Vec<RegionInfo>,
}

impl ArenaDescriptor {
    pub fn region(&self, name: &str) -> Option<&RegionInfo> {
        self.regions.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Pair {
        a: u32,
        b: u32,
    }

    #[test]
    fn test_regions_are_disjoint_and_aligned() {
        let mut builder = ArenaBuilder::new();
        let flags = builder.region::<u8>("flags", 3);
        let pairs = builder.region::<Pair>("pairs", 2);
        let wide = builder.aligned_region::<u32>("wide", 1, 16);
        let arena = builder.build();

        assert_eq!(flags.offset, 0);
        assert_eq!(pairs.offset, 4);
        assert_eq!(wide.offset, 32);
        assert_eq!(arena.size, 36);
        assert_eq!(arena.region("pairs").unwrap().size, 16);

        for pair in arena.regions.windows(2) {
            assert!(pair[0].offset + pair[0].size <= pair[1].offset);
        }
    }

    #[test]
    fn test_typed_views() {
        let mut builder = ArenaBuilder::new();
        let head = builder.region::<u32>("head", 1);
        let pairs = builder.region::<Pair>("pairs", 2);
        let arena = builder.build();

        let mut words = vec![0u32; (arena.size / 4) as usize];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words);
        pairs.view_mut(bytes).unwrap()[1] = Pair { a: 7, b: 9 };
        head.view_mut(bytes).unwrap()[0] = 3;

        assert_eq!(words, vec![3, 0, 0, 7, 9]);
        assert_eq!(pairs.word_offset(), 1);
        assert_eq!(pairs.element_offset(1), 12);
    }

    #[test]
    fn test_view_outside_arena_is_rejected() {
        let mut builder = ArenaBuilder::new();
        let region = builder.region::<u32>("values", 8);
        let short = vec![0u8; 16];
        assert!(region.view(&short).is_none());
    }
}
