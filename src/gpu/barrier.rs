//! Memory barrier classes
//!
//! A barrier makes prior device writes visible to one class of subsequent reads.
//! Bit values follow the conventional memory-barrier bit assignments so a native
//! backend can pass them through unchanged.

use bitflags::bitflags;

bitflags! {
    /// Classes of reads a barrier makes prior writes visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BarrierBits: u32 {
        const VERTEX_ATTRIB_ARRAY = 0x0001;
        const ELEMENT_ARRAY = 0x0002;
        const UNIFORM = 0x0004;
        const TEXTURE_FETCH = 0x0008;
        const SHADER_IMAGE_ACCESS = 0x0020;
        const COMMAND = 0x0040;
        const BUFFER_UPDATE = 0x0200;
        const SHADER_STORAGE = 0x2000;
        const CLIENT_MAPPED_BUFFER = 0x4000;
    }
}

impl BarrierBits {
    /// Every class of device read that can observe a device write
    pub const DEVICE_READS: BarrierBits = BarrierBits::VERTEX_ATTRIB_ARRAY
        .union(BarrierBits::ELEMENT_ARRAY)
        .union(BarrierBits::UNIFORM)
        .union(BarrierBits::TEXTURE_FETCH)
        .union(BarrierBits::SHADER_IMAGE_ACCESS)
        .union(BarrierBits::COMMAND)
        .union(BarrierBits::BUFFER_UPDATE)
        .union(BarrierBits::SHADER_STORAGE);
}
