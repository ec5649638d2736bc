//! Temporary buffer ring
//!
//! Per-frame allocations are bump-allocated from a list of host-mapped blocks. When no
//! block has room a new one is appended, sized to a multiple of the block granularity.
//! Offsets only grow within a frame; `reset` rewinds every block at the frame boundary
//! and starts a new epoch so stale handles can be recognised.

use crate::gpu::device::{BufferUsage, Device, RawBuffer};

/// One backing block of the ring
#[derive(Debug)]
struct RingBlock {
    /// Realized on first touch
    raw: Option<RawBuffer>,
    size: u64,
    offset: u64,
}

/// Location of a temporary sub-allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSlice {
    pub block: usize,
    pub offset: u64,
    pub size: u64,
}

/// Growable ring of temporary blocks
#[derive(Debug)]
pub struct TemporaryRing {
    blocks: Vec<RingBlock>,
    block_size: u64,
    alignment: u64,
    epoch: u32,
}

impl TemporaryRing {
    pub fn new(block_size: u64, alignment: u64) -> Self {
        Self {
            blocks: Vec::new(),
            block_size,
            alignment,
            epoch: 0,
        }
    }

    /// Current frame epoch; bumped by every reset
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Carve `size` bytes from the first block with enough headroom, growing the ring if none has
    pub fn allocate(&mut self, size: u64) -> RingSlice {
        for (index, block) in self.blocks.iter_mut().enumerate() {
            let offset = block.offset.next_multiple_of(self.alignment);
            if offset + size <= block.size {
                block.offset = offset + size;
                return RingSlice { block: index, offset, size };
            }
        }

        let block_size = size.max(1).div_ceil(self.block_size) * self.block_size;
        log::debug!(
            "[TemporaryRing] Growing ring: block {} of {} bytes for a {} byte request",
            self.blocks.len(),
            block_size,
            size
        );
        self.blocks.push(RingBlock {
            raw: None,
            size: block_size,
            offset: size,
        });
        RingSlice {
            block: self.blocks.len() - 1,
            offset: 0,
            size,
        }
    }

    /// Device buffer backing `block`, created on first use
    pub fn realize(&mut self, device: &mut dyn Device, block: usize) -> RawBuffer {
        let entry = &mut self.blocks[block];
        let size = entry.size;
        *entry.raw.get_or_insert_with(|| {
            log::debug!("[TemporaryRing] Realizing block {} ({} bytes)", block, size);
            device.create_buffer(size, BufferUsage::HostVisible, None)
        })
    }

    /// Rewind every block to offset zero and start a new epoch
    pub fn reset(&mut self) -> u32 {
        for block in &mut self.blocks {
            block.offset = 0;
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    /// `(allocated, used)` bytes across all blocks
    pub fn stats(&self) -> (u64, u64) {
        self.blocks
            .iter()
            .fold((0, 0), |(allocated, used), b| (allocated + b.size, used + b.offset))
    }

    /// Release every backing block
    pub fn release(&mut self, device: &mut dyn Device) {
        for block in self.blocks.drain(..) {
            if let Some(raw) = block.raw {
                device.destroy_buffer(raw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_aligned_and_monotonic() {
        let mut ring = TemporaryRing::new(4096, 256);
        let a = ring.allocate(10);
        let b = ring.allocate(300);
        let c = ring.allocate(1);
        assert_eq!((a.block, a.offset), (0, 0));
        assert_eq!((b.block, b.offset), (0, 256));
        assert_eq!((c.block, c.offset), (0, 768));
    }

    #[test]
    fn test_grows_when_no_headroom() {
        let mut ring = TemporaryRing::new(1024, 256);
        ring.allocate(1000);
        let next = ring.allocate(512);
        assert_eq!(next.block, 1);
        assert_eq!(ring.block_count(), 2);

        // Oversized requests get a block rounded to the granularity
        let big = ring.allocate(3000);
        assert_eq!(big.block, 2);
        assert_eq!(ring.stats().0, 1024 + 1024 + 3072);
    }

    #[test]
    fn test_earlier_block_reused_when_it_fits() {
        let mut ring = TemporaryRing::new(1024, 256);
        ring.allocate(700);
        ring.allocate(700);
        let small = ring.allocate(200);
        assert_eq!((small.block, small.offset), (0, 768));
    }

    #[test]
    fn test_reset_rewinds_and_bumps_epoch() {
        let mut ring = TemporaryRing::new(1024, 256);
        ring.allocate(600);
        ring.allocate(600);
        assert_eq!(ring.stats(), (2048, 1200));

        assert_eq!(ring.reset(), 1);
        assert_eq!(ring.stats(), (2048, 0));
        let again = ring.allocate(600);
        assert_eq!((again.block, again.offset), (0, 0));
    }
}
