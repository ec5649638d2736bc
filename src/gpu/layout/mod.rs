//! Shared host/device layouts
//!
//! A layout is declared once as a table of `(name, encoding, width)` fields. From that
//! table the registry derives the packed memory layout (offsets follow the storage
//! alignment rules of the target), host-side pack/unpack, and the WGSL mirror: the
//! unpacked struct, the `…Packed` struct and the `…_pack`/`…_unpack` functions.

mod encoding;
mod pack;
mod registry;
mod wgsl;

pub use encoding::{Encoding, PackedForm};
pub use pack::FieldValue;
pub use registry::{LayoutId, LayoutRegistry};

use std::sync::Arc;

use crate::gpu::snippet::SnippetId;

/// Field declaration, as passed to [`LayoutRegistry::define`]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub source: FieldSource,
    /// Element count of a fixed-size array, `None` for a single value
    pub array: Option<u32>,
}

/// What a declared field stores
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldSource {
    Encoded { encoding: Encoding, width: u32 },
    Nested(LayoutId),
}

impl FieldSpec {
    pub fn new(name: &str, encoding: Encoding, width: u32) -> Self {
        Self {
            name: name.to_string(),
            source: FieldSource::Encoded { encoding, width },
            array: None,
        }
    }

    pub fn nested(name: &str, layout: LayoutId) -> Self {
        Self {
            name: name.to_string(),
            source: FieldSource::Nested(layout),
            array: None,
        }
    }

    /// Turn the field into a fixed-size array of `count` elements
    pub fn array(mut self, count: u32) -> Self {
        self.array = Some(count);
        self
    }
}

/// Resolved field storage
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Encoded { encoding: Encoding, width: u32 },
    Nested(Arc<Layout>),
}

/// A field with its packed placement resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub array: Option<u32>,
    /// Byte offset inside the packed struct
    pub offset: u32,
    /// Byte size of one element
    pub element_size: u32,
    /// Byte distance between array elements
    pub stride: u32,
    pub align: u32,
}

impl Field {
    pub fn count(&self) -> u32 {
        self.array.unwrap_or(1)
    }

    /// Bytes occupied inside the parent struct
    pub fn size(&self) -> u32 {
        match self.array {
            Some(n) => self.stride * n,
            None => self.element_size,
        }
    }
}

/// A registered shared layout
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub name: String,
    pub fields: Vec<Field>,
    /// Packed size in bytes, rounded up to `align`
    pub size: u32,
    pub align: u32,
    /// Snippet carrying the WGSL mirror, for `requires` lists
    pub snippet: SnippetId,
}

impl Layout {
    /// Packed size in 32-bit words
    pub fn words(&self) -> usize {
        (self.size / 4) as usize
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Name of the packed WGSL struct
    pub fn packed_name(&self) -> String {
        format!("{}Packed", self.name)
    }
}

pub(crate) fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}
