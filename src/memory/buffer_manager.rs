//! Buffer manager
//!
//! The only way other subsystems obtain device memory. Four allocation strategies:
//!
//! - **Static**: immutable after creation, never needs a barrier.
//! - **Temporary**: a sub-range of the per-frame ring, valid until the next reset.
//! - **HostMapped**: persistently mapped, written by the host.
//! - **DeviceOnly**: never host visible, written by device passes.
//!
//! Backing storage is realized on first touch, at most once. The manager tracks which
//! buffers carry unflushed writes and `flush` turns that into the minimal barrier a
//! following pass has to wait on.

use bytemuck::Pod;

use super::ring::{RingSlice, TemporaryRing};
use crate::config::MemoryConfig;
use crate::error::BufferError;
use crate::gpu::barrier::BarrierBits;
use crate::gpu::device::{BufferBinding, BufferUsage, Device, RawBuffer};

/// Allocation strategy of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Static,
    Temporary,
    HostMapped,
    DeviceOnly,
}

/// Handle to a managed buffer
///
/// For temporaries `generation` is the ring epoch the buffer was carved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    kind: BufferKind,
    index: u32,
    generation: u32,
}

impl BufferHandle {
    pub fn kind(&self) -> BufferKind {
        self.kind
    }
}

#[derive(Debug)]
struct BufferRecord {
    kind: BufferKind,
    size: u64,
    raw: Option<RawBuffer>,
    /// Contents of a static buffer until it is realized
    initial: Option<Vec<u8>>,
    host_dirty: bool,
    /// Read classes that have not seen a barrier since the last device write
    outstanding: BarrierBits,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<BufferRecord>,
}

#[derive(Debug)]
struct TemporaryRecord {
    slice: RingSlice,
    host_dirty: bool,
    outstanding: BarrierBits,
}

/// Owner of every buffer handed out by the runtime
pub struct BufferManager {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    temporaries: Vec<TemporaryRecord>,
    ring: TemporaryRing,
    assert_temporary_lifetime: bool,
}

impl BufferManager {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            temporaries: Vec::new(),
            ring: TemporaryRing::new(config.temporary_block_size, config.temporary_alignment),
            assert_temporary_lifetime: config.assert_temporary_lifetime,
        }
    }

    fn insert(&mut self, record: BufferRecord) -> BufferHandle {
        let kind = record.kind;
        let index = match self.free_slots.pop() {
            Some(index) => {
                self.slots[index as usize].record = Some(record);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                (self.slots.len() - 1) as u32
            }
        };
        BufferHandle {
            kind,
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn record(&self, handle: BufferHandle) -> Result<&BufferRecord, BufferError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_ref())
            .ok_or(BufferError::Unknown(handle.index))
    }

    fn record_mut(&mut self, handle: BufferHandle) -> Result<&mut BufferRecord, BufferError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_mut())
            .ok_or(BufferError::Unknown(handle.index))
    }

    fn temporary_mut(&mut self, handle: BufferHandle) -> Result<&mut TemporaryRecord, BufferError> {
        let current = self.ring.epoch();
        if handle.generation != current {
            if self.assert_temporary_lifetime {
                log::error!(
                    "[BufferManager] Temporary buffer from frame {} used in frame {}",
                    handle.generation,
                    current
                );
                panic!(
                    "temporary buffer from frame {} used after the ring was reset (frame {})",
                    handle.generation, current
                );
            }
            return Err(BufferError::StaleTemporary {
                allocated: handle.generation,
                current,
            });
        }
        self.temporaries
            .get_mut(handle.index as usize)
            .ok_or(BufferError::Unknown(handle.index))
    }

    /// Immutable buffer initialised from `data`, padded with zeroes to `size`
    pub fn allocate_static(&mut self, size: u64, data: &[u8]) -> BufferHandle {
        let mut initial = data.to_vec();
        initial.resize(size.max(data.len() as u64) as usize, 0);
        log::debug!("[BufferManager] Static buffer of {} bytes", initial.len());
        self.insert(BufferRecord {
            kind: BufferKind::Static,
            size: initial.len() as u64,
            raw: None,
            initial: Some(initial),
            host_dirty: false,
            outstanding: BarrierBits::empty(),
        })
    }

    /// Immutable buffer holding `data`
    pub fn allocate_static_from<T: Pod>(&mut self, data: &[T]) -> BufferHandle {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.allocate_static(bytes.len() as u64, bytes)
    }

    /// Per-frame buffer carved from the temporary ring
    pub fn allocate_temporary(&mut self, size: u64) -> BufferHandle {
        let slice = self.ring.allocate(size);
        self.temporaries.push(TemporaryRecord {
            slice,
            host_dirty: false,
            outstanding: BarrierBits::empty(),
        });
        BufferHandle {
            kind: BufferKind::Temporary,
            index: (self.temporaries.len() - 1) as u32,
            generation: self.ring.epoch(),
        }
    }

    /// Temporary buffer holding a copy of `data`
    pub fn allocate_temporary_from(
        &mut self,
        device: &mut dyn Device,
        data: &[u8],
    ) -> Result<BufferHandle, BufferError> {
        let handle = self.allocate_temporary(data.len() as u64);
        self.write(device, handle, 0, data)?;
        Ok(handle)
    }

    pub fn allocate_host_mapped(&mut self, size: u64) -> BufferHandle {
        log::debug!("[BufferManager] Host-mapped buffer of {} bytes", size);
        self.insert(BufferRecord {
            kind: BufferKind::HostMapped,
            size,
            raw: None,
            initial: None,
            host_dirty: false,
            outstanding: BarrierBits::empty(),
        })
    }

    pub fn allocate_device_only(&mut self, size: u64) -> BufferHandle {
        log::debug!("[BufferManager] Device-only buffer of {} bytes", size);
        self.insert(BufferRecord {
            kind: BufferKind::DeviceOnly,
            size,
            raw: None,
            initial: None,
            host_dirty: false,
            outstanding: BarrierBits::empty(),
        })
    }

    pub fn size(&mut self, handle: BufferHandle) -> Result<u64, BufferError> {
        match handle.kind {
            BufferKind::Temporary => Ok(self.temporary_mut(handle)?.slice.size),
            _ => Ok(self.record(handle)?.size),
        }
    }

    /// Whether backing storage has been created
    pub fn is_realized(&mut self, handle: BufferHandle) -> Result<bool, BufferError> {
        match handle.kind {
            BufferKind::Temporary => {
                self.temporary_mut(handle)?;
                Ok(true)
            }
            _ => Ok(self.record(handle)?.raw.is_some()),
        }
    }

    /// Device range of the buffer, realizing it if needed
    pub fn binding(
        &mut self,
        device: &mut dyn Device,
        handle: BufferHandle,
    ) -> Result<BufferBinding, BufferError> {
        if handle.kind == BufferKind::Temporary {
            let slice = self.temporary_mut(handle)?.slice;
            let buffer = self.ring.realize(device, slice.block);
            return Ok(BufferBinding {
                buffer,
                offset: slice.offset,
                size: slice.size,
            });
        }

        let record = self.record_mut(handle)?;
        let size = record.size;
        let buffer = match record.raw {
            Some(raw) => raw,
            None => {
                let (usage, initial) = match record.kind {
                    BufferKind::Static => (BufferUsage::Immutable, record.initial.take()),
                    BufferKind::HostMapped => (BufferUsage::HostVisible, None),
                    _ => (BufferUsage::DeviceLocal, None),
                };
                let raw = device.create_buffer(size, usage, initial.as_deref());
                log::debug!(
                    "[BufferManager] Realized {:?} buffer {:?} ({} bytes)",
                    record.kind,
                    raw,
                    size
                );
                record.raw = Some(raw);
                raw
            }
        };
        Ok(BufferBinding {
            buffer,
            offset: 0,
            size,
        })
    }

    /// Host write into a temporary or host-mapped buffer
    pub fn write(
        &mut self,
        device: &mut dyn Device,
        handle: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BufferError> {
        if matches!(handle.kind, BufferKind::Static | BufferKind::DeviceOnly) {
            return Err(BufferError::NotHostVisible(handle.kind));
        }
        let binding = self.binding(device, handle)?;
        let len = data.len() as u64;
        if offset + len > binding.size {
            return Err(BufferError::OutOfRange {
                offset,
                len,
                size: binding.size,
            });
        }

        device.write_buffer(binding.buffer, binding.offset + offset, data);
        match handle.kind {
            BufferKind::Temporary => self.temporary_mut(handle)?.host_dirty = true,
            _ => self.record_mut(handle)?.host_dirty = true,
        }
        Ok(())
    }

    /// Typed host write
    pub fn write_pod<T: Pod>(
        &mut self,
        device: &mut dyn Device,
        handle: BufferHandle,
        offset: u64,
        data: &[T],
    ) -> Result<(), BufferError> {
        self.write(device, handle, offset, bytemuck::cast_slice(data))
    }

    /// Record that a device pass wrote the buffer
    pub fn mark_device_written(&mut self, handle: BufferHandle) -> Result<(), BufferError> {
        match handle.kind {
            BufferKind::Static => {
                log::warn!("[BufferManager] Ignoring device write to a static buffer");
            }
            BufferKind::Temporary => {
                self.temporary_mut(handle)?.outstanding = BarrierBits::DEVICE_READS;
            }
            _ => self.record_mut(handle)?.outstanding = BarrierBits::DEVICE_READS,
        }
        Ok(())
    }

    /// Barrier bits a pass reading the buffer through `read_mask` must wait on
    ///
    /// Clears what it reports, so a second flush without an intervening write yields nothing.
    pub fn flush(
        &mut self,
        device: &mut dyn Device,
        handle: BufferHandle,
        read_mask: BarrierBits,
    ) -> Result<BarrierBits, BufferError> {
        let (host_dirty, outstanding) = match handle.kind {
            BufferKind::Static => {
                self.record(handle)?;
                return Ok(BarrierBits::empty());
            }
            BufferKind::Temporary => {
                let temp = self.temporary_mut(handle)?;
                let state = (temp.host_dirty, temp.outstanding);
                temp.host_dirty = false;
                temp.outstanding -= read_mask;
                state
            }
            _ => {
                let record = self.record_mut(handle)?;
                let state = (record.host_dirty, record.outstanding);
                record.host_dirty = false;
                record.outstanding -= read_mask;
                state
            }
        };

        let mut bits = outstanding & read_mask;
        if host_dirty {
            let binding = self.binding(device, handle)?;
            device.flush_mapped_range(binding.buffer, binding.offset, binding.size);
            bits |= BarrierBits::CLIENT_MAPPED_BUFFER;
        }
        Ok(bits)
    }

    /// Debug read-back of the whole buffer
    pub fn read(&mut self, device: &mut dyn Device, handle: BufferHandle) -> Result<Vec<u8>, BufferError> {
        let binding = self.binding(device, handle)?;
        Ok(device.read_buffer(binding.buffer, binding.offset, binding.size))
    }

    /// Typed debug read-back
    pub fn read_pod<T: Pod>(
        &mut self,
        device: &mut dyn Device,
        handle: BufferHandle,
    ) -> Result<Vec<T>, BufferError> {
        let bytes = self.read(device, handle)?;
        Ok(bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Release a static, host-mapped or device-only buffer
    pub fn free(&mut self, device: &mut dyn Device, handle: BufferHandle) -> Result<(), BufferError> {
        if handle.kind == BufferKind::Temporary {
            return Err(BufferError::NotFreeable(handle.kind));
        }
        self.record(handle)?;

        let slot = &mut self.slots[handle.index as usize];
        if let Some(raw) = slot.record.take().and_then(|r| r.raw) {
            device.destroy_buffer(raw);
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);
        Ok(())
    }

    /// Frame boundary: every temporary handed out so far becomes invalid
    pub fn reset_temporary(&mut self) -> u32 {
        let released = self.temporaries.len();
        self.temporaries.clear();
        let epoch = self.ring.reset();
        log::debug!(
            "[BufferManager] Temporary ring reset ({} buffers released, epoch {})",
            released,
            epoch
        );
        epoch
    }

    /// `(allocated, used)` bytes of the temporary ring
    pub fn temporary_stats(&self) -> (u64, u64) {
        self.ring.stats()
    }

    /// Destroy every realized buffer
    pub fn release_all(&mut self, device: &mut dyn Device) {
        for slot in &mut self.slots {
            if let Some(raw) = slot.record.take().and_then(|r| r.raw) {
                device.destroy_buffer(raw);
            }
        }
        self.temporaries.clear();
        self.ring.release(device);
    }
}
