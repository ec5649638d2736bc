//! Word-addressed buffer memory of the CPU device
//!
//! Every buffer carries the set of barrier classes it still needs before a read of that
//! class is safe. Device writes raise all device-read classes, host writes raise the
//! client-mapped class, and `memory_barrier` lowers whatever it names on every buffer.

use rustc_hash::FxHashMap;

use crate::gpu::barrier::BarrierBits;
use crate::gpu::device::{BufferBinding, BufferUsage, RawBuffer};

#[derive(Debug)]
pub(crate) struct CpuBuffer {
    words: Vec<u32>,
    size: u64,
    usage: BufferUsage,
    pending: BarrierBits,
}

impl CpuBuffer {
    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u32, u8>(&self.words)[..self.size as usize]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u32, u8>(&mut self.words)[..self.size as usize]
    }
}

#[derive(Debug, Default)]
pub(crate) struct BufferStore {
    buffers: FxHashMap<RawBuffer, CpuBuffer>,
    next_id: u32,
    pub faults: u64,
    pub hazards: u64,
}

impl BufferStore {
    pub fn create(&mut self, size: u64, usage: BufferUsage, data: Option<&[u8]>) -> RawBuffer {
        self.next_id += 1;
        let raw = RawBuffer(self.next_id);
        let mut buffer = CpuBuffer {
            words: vec![0; size.div_ceil(4) as usize],
            size,
            usage,
            pending: BarrierBits::empty(),
        };
        if let Some(data) = data {
            let len = data.len().min(size as usize);
            buffer.bytes_mut()[..len].copy_from_slice(&data[..len]);
        }
        self.buffers.insert(raw, buffer);
        raw
    }

    pub fn destroy(&mut self, raw: RawBuffer) {
        if self.buffers.remove(&raw).is_none() {
            self.fault(format_args!("destroy of unknown buffer {:?}", raw));
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn fault(&mut self, what: std::fmt::Arguments<'_>) {
        self.faults += 1;
        log::warn!("[CpuDevice] Fault: {}", what);
    }

    /// Host write through the mapping
    pub fn host_write(&mut self, raw: RawBuffer, offset: u64, data: &[u8]) {
        let Some(buffer) = self.buffers.get_mut(&raw) else {
            self.fault(format_args!("host write to unknown buffer {:?}", raw));
            return;
        };
        if buffer.usage != BufferUsage::HostVisible {
            let usage = buffer.usage;
            self.fault(format_args!("host write to {:?} buffer {:?}", usage, raw));
            return;
        }
        let end = offset + data.len() as u64;
        if end > buffer.size {
            let size = buffer.size;
            self.fault(format_args!("host write of {}..{} past {} bytes of {:?}", offset, end, size, raw));
            return;
        }
        buffer.bytes_mut()[offset as usize..end as usize].copy_from_slice(data);
        buffer.pending |= BarrierBits::CLIENT_MAPPED_BUFFER;
    }

    /// Read-back; bytes outside the buffer read as zero
    pub fn read(&self, raw: RawBuffer, offset: u64, size: u64) -> Vec<u8> {
        let mut out = vec![0u8; size as usize];
        if let Some(buffer) = self.buffers.get(&raw) {
            let bytes = buffer.bytes();
            let start = (offset as usize).min(bytes.len());
            let end = ((offset + size) as usize).min(bytes.len());
            out[..end - start].copy_from_slice(&bytes[start..end]);
        }
        out
    }

    fn word_address(&self, binding: &BufferBinding, index: u32) -> Option<(RawBuffer, usize)> {
        let byte = binding.offset + index as u64 * 4;
        if index as u64 * 4 + 4 > binding.size || byte % 4 != 0 {
            return None;
        }
        let buffer = self.buffers.get(&binding.buffer)?;
        if byte + 4 > buffer.size.next_multiple_of(4) {
            return None;
        }
        Some((binding.buffer, (byte / 4) as usize))
    }

    /// Robust load: out-of-range reads return 0
    pub fn load(&mut self, binding: &BufferBinding, index: u32) -> u32 {
        match self.word_address(binding, index) {
            Some((raw, word)) => self.buffers[&raw].words[word],
            None => {
                self.fault(format_args!("load of word {} outside {:?}", index, binding));
                0
            }
        }
    }

    /// Robust store: out-of-range writes are dropped
    pub fn store(&mut self, binding: &BufferBinding, index: u32, value: u32) {
        match self.word_address(binding, index) {
            Some((raw, word)) => {
                if let Some(buffer) = self.buffers.get_mut(&raw) {
                    buffer.words[word] = value;
                    buffer.pending |= BarrierBits::DEVICE_READS;
                }
            }
            None => self.fault(format_args!("store to word {} outside {:?}", index, binding)),
        }
    }

    /// Lower `bits` on every buffer
    pub fn barrier(&mut self, bits: BarrierBits) {
        for buffer in self.buffers.values_mut() {
            buffer.pending -= bits;
        }
    }

    /// Count a hazard when `raw` is about to be read through `class` without the barrier it needs
    pub fn check_read(&mut self, raw: RawBuffer, class: BarrierBits, what: &str) {
        let Some(buffer) = self.buffers.get(&raw) else {
            return;
        };
        let missing = buffer.pending & (class | BarrierBits::CLIENT_MAPPED_BUFFER);
        if !missing.is_empty() {
            self.hazards += 1;
            log::warn!(
                "[CpuDevice] Hazard: {} reads {:?} with pending {:?}",
                what,
                raw,
                missing
            );
        }
    }

    /// Words of a binding, for indirect argument reads
    pub fn words(&mut self, binding: &BufferBinding, count: u32) -> Vec<u32> {
        (0..count).map(|i| self.load(binding, i)).collect()
    }

    pub fn whole(&self, raw: RawBuffer) -> Option<BufferBinding> {
        self.buffers.get(&raw).map(|buffer| BufferBinding {
            buffer: raw,
            offset: 0,
            size: buffer.size,
        })
    }
}
