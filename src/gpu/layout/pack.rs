//! Host-side pack/unpack through the layout table
//!
//! One generic path serves every layout: walk the resolved fields, and encode or
//! decode each element at its byte offset.

use glam::{Vec3, Vec4};

use super::{Encoding, Field, FieldKind, Layout};
use crate::error::PackError;

/// An unpacked field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Components of a normalized or float field
    Float(Vec<f32>),
    Uint(u32),
    Int(i32),
    /// Values of a nested layout, in field order
    Struct(Vec<FieldValue>),
    /// Elements of a fixed-size array
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn scalar(value: f32) -> Self {
        FieldValue::Float(vec![value])
    }

    pub fn vec3(value: Vec3) -> Self {
        FieldValue::Float(value.to_array().to_vec())
    }

    pub fn vec4(value: Vec4) -> Self {
        FieldValue::Float(value.to_array().to_vec())
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            FieldValue::Float(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            FieldValue::Float(v) if v.len() == 3 => Some(Vec3::from_slice(v)),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<Vec4> {
        match self {
            FieldValue::Float(v) if v.len() == 4 => Some(Vec4::from_slice(v)),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

impl Layout {
    /// Pack one value per field into a fresh word buffer
    pub fn pack(&self, values: &[FieldValue]) -> Result<Vec<u32>, PackError> {
        let mut words = vec![0u32; self.words()];
        self.pack_into(values, &mut words)?;
        Ok(words)
    }

    /// Pack into `out`, which must hold at least [`Layout::words`] words
    pub fn pack_into(&self, values: &[FieldValue], out: &mut [u32]) -> Result<(), PackError> {
        if values.len() != self.fields.len() {
            return Err(PackError::FieldCount {
                layout: self.name.clone(),
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        if out.len() < self.words() {
            return Err(PackError::Truncated {
                needed: self.words(),
                actual: out.len(),
            });
        }

        for (field, value) in self.fields.iter().zip(values) {
            let base = (field.offset / 4) as usize;
            match (field.array, value) {
                (None, value) => pack_element(field, value, &mut out[base..])?,
                (Some(n), FieldValue::Array(elements)) if elements.len() == n as usize => {
                    let stride = (field.stride / 4) as usize;
                    for (i, element) in elements.iter().enumerate() {
                        pack_element(field, element, &mut out[base + i * stride..])?;
                    }
                }
                (Some(n), _) => return Err(shape_error(field, format!("an array of {}", n))),
            }
        }
        Ok(())
    }

    /// Unpack one value per field
    pub fn unpack(&self, words: &[u32]) -> Result<Vec<FieldValue>, PackError> {
        if words.len() < self.words() {
            return Err(PackError::Truncated {
                needed: self.words(),
                actual: words.len(),
            });
        }

        let values = self
            .fields
            .iter()
            .map(|field| {
                let base = (field.offset / 4) as usize;
                match field.array {
                    None => unpack_element(field, &words[base..]),
                    Some(n) => {
                        let stride = (field.stride / 4) as usize;
                        let elements = (0..n as usize)
                            .map(|i| unpack_element(field, &words[base + i * stride..]))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(FieldValue::Array(elements))
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

fn pack_element(field: &Field, value: &FieldValue, out: &mut [u32]) -> Result<(), PackError> {
    let words = (field.element_size / 4) as usize;
    match (&field.kind, value) {
        (FieldKind::Nested(layout), FieldValue::Struct(values)) => {
            layout.pack_into(values, &mut out[..layout.words()])
        }
        (FieldKind::Encoded { encoding: Encoding::Uint32, .. }, FieldValue::Uint(v)) => {
            out[0] = *v;
            Ok(())
        }
        (FieldKind::Encoded { encoding: Encoding::Int32, .. }, FieldValue::Int(v)) => {
            out[0] = *v as u32;
            Ok(())
        }
        (FieldKind::Encoded { encoding, width }, FieldValue::Float(components))
            if !matches!(encoding, Encoding::Uint32 | Encoding::Int32)
                && components.len() == *width as usize =>
        {
            encoding.pack_components(components, &mut out[..words]);
            Ok(())
        }
        (kind, _) => Err(shape_error(field, describe(kind))),
    }
}

fn unpack_element(field: &Field, words: &[u32]) -> Result<FieldValue, PackError> {
    match &field.kind {
        FieldKind::Nested(layout) => Ok(FieldValue::Struct(layout.unpack(words)?)),
        FieldKind::Encoded { encoding: Encoding::Uint32, .. } => Ok(FieldValue::Uint(words[0])),
        FieldKind::Encoded { encoding: Encoding::Int32, .. } => Ok(FieldValue::Int(words[0] as i32)),
        FieldKind::Encoded { encoding, width } => {
            Ok(FieldValue::Float(encoding.unpack_components(words, *width)))
        }
    }
}

fn describe(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Nested(layout) => format!("a {} struct", layout.name),
        FieldKind::Encoded { encoding: Encoding::Uint32, .. } => "a u32".to_string(),
        FieldKind::Encoded { encoding: Encoding::Int32, .. } => "an i32".to_string(),
        FieldKind::Encoded { width, .. } => format!("{} float component(s)", width),
    }
}

fn shape_error(field: &Field, expected: String) -> PackError {
    PackError::ValueShape {
        field: field.name.clone(),
        expected,
    }
}
