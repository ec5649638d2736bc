//! Packed storage encodings
//!
//! Normalized encodings quantize exactly like the WGSL `pack4x8unorm`,
//! `pack2x16unorm` and `pack2x16snorm` builtins, so host packing and device
//! unpacking agree bit for bit.

/// Storage encoding of a shared-layout field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// 8-bit unsigned normalized, up to 4 components in one word
    Unorm8,
    /// 16-bit unsigned normalized, 2 components per word
    Unorm16,
    /// 16-bit signed normalized, 2 components per word
    Snorm16,
    Uint32,
    Int32,
    Float32,
}

/// Size and alignment of one packed element, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedForm {
    pub size: u32,
    pub align: u32,
}

impl Encoding {
    /// Packed form for `width` components, or `None` if the encoding cannot hold them
    pub fn packed_form(self, width: u32) -> Option<PackedForm> {
        let form = |size, align| Some(PackedForm { size, align });
        match (self, width) {
            (Encoding::Unorm8, 1..=4) => form(4, 4),
            (Encoding::Unorm16 | Encoding::Snorm16, 1..=2) => form(4, 4),
            (Encoding::Unorm16 | Encoding::Snorm16, 3..=4) => form(8, 8),
            (Encoding::Uint32 | Encoding::Int32, 1) => form(4, 4),
            (Encoding::Float32, 1) => form(4, 4),
            (Encoding::Float32, 2) => form(8, 8),
            (Encoding::Float32, 3) => form(12, 16),
            (Encoding::Float32, 4) => form(16, 16),
            _ => None,
        }
    }

    pub fn is_normalized(self) -> bool {
        matches!(self, Encoding::Unorm8 | Encoding::Unorm16 | Encoding::Snorm16)
    }

    /// Largest round-trip error for one component; zero for exact encodings
    pub fn quantization_step(self) -> f32 {
        match self {
            Encoding::Unorm8 => 1.0 / 255.0,
            Encoding::Unorm16 => 1.0 / 65535.0,
            Encoding::Snorm16 => 1.0 / 32767.0,
            Encoding::Uint32 | Encoding::Int32 | Encoding::Float32 => 0.0,
        }
    }

    /// Quantize one normalized component to its integer code
    pub fn quantize(self, value: f32) -> u32 {
        match self {
            Encoding::Unorm8 => (value.clamp(0.0, 1.0) * 255.0).round() as u32,
            Encoding::Unorm16 => (value.clamp(0.0, 1.0) * 65535.0).round() as u32,
            Encoding::Snorm16 => {
                let code = (value.clamp(-1.0, 1.0) * 32767.0).round() as i16;
                code as u16 as u32
            }
            Encoding::Float32 => value.to_bits(),
            Encoding::Uint32 | Encoding::Int32 => value as u32,
        }
    }

    /// Inverse of [`Encoding::quantize`]
    pub fn dequantize(self, code: u32) -> f32 {
        match self {
            Encoding::Unorm8 => (code & 0xff) as f32 / 255.0,
            Encoding::Unorm16 => (code & 0xffff) as f32 / 65535.0,
            Encoding::Snorm16 => ((code & 0xffff) as u16 as i16 as f32 / 32767.0).max(-1.0),
            Encoding::Float32 => f32::from_bits(code),
            Encoding::Uint32 | Encoding::Int32 => code as f32,
        }
    }

    /// Bits per component inside a packed word
    fn component_bits(self) -> u32 {
        match self {
            Encoding::Unorm8 => 8,
            Encoding::Unorm16 | Encoding::Snorm16 => 16,
            Encoding::Uint32 | Encoding::Int32 | Encoding::Float32 => 32,
        }
    }

    /// Pack normalized or float components into `out`, which holds the element's words
    pub fn pack_components(self, components: &[f32], out: &mut [u32]) {
        let bits = self.component_bits();
        if bits == 32 {
            for (word, &value) in out.iter_mut().zip(components) {
                *word = value.to_bits();
            }
            return;
        }

        let per_word = (32 / bits) as usize;
        let mask = (1u32 << bits) - 1;
        for word in out.iter_mut() {
            *word = 0;
        }
        for (i, &value) in components.iter().enumerate() {
            let shift = (i % per_word) as u32 * bits;
            out[i / per_word] |= (self.quantize(value) & mask) << shift;
        }
    }

    /// Unpack `width` components from the element's words
    pub fn unpack_components(self, words: &[u32], width: u32) -> Vec<f32> {
        let bits = self.component_bits();
        if bits == 32 {
            return words[..width as usize].iter().map(|&w| f32::from_bits(w)).collect();
        }

        let per_word = (32 / bits) as usize;
        let mask = (1u32 << bits) - 1;
        (0..width as usize)
            .map(|i| {
                let shift = (i % per_word) as u32 * bits;
                self.dequantize((words[i / per_word] >> shift) & mask)
            })
            .collect()
    }

    /// WGSL type of the unpacked, in-register value
    pub fn wgsl_unpacked_type(self, width: u32) -> String {
        let scalar = match self {
            Encoding::Uint32 => "u32",
            Encoding::Int32 => "i32",
            _ => "f32",
        };
        match width {
            1 => scalar.to_string(),
            n => format!("vec{}<{}>", n, scalar),
        }
    }

    /// WGSL type of the packed, in-memory value
    pub fn wgsl_packed_type(self, width: u32) -> String {
        match self {
            Encoding::Unorm8 => "u32".to_string(),
            Encoding::Unorm16 | Encoding::Snorm16 if width <= 2 => "u32".to_string(),
            Encoding::Unorm16 | Encoding::Snorm16 => "vec2<u32>".to_string(),
            _ => self.wgsl_unpacked_type(width),
        }
    }

    /// WGSL expression packing `value` of the unpacked type
    pub fn wgsl_pack_expr(self, width: u32, value: &str) -> String {
        match self {
            Encoding::Unorm8 => {
                let padded = pad_to_vec(value, width, 4);
                format!("pack4x8unorm({})", padded)
            }
            Encoding::Unorm16 | Encoding::Snorm16 => {
                let builtin = self.wgsl_pair_builtin("pack");
                match width {
                    1 | 2 => format!("{}({})", builtin, pad_to_vec(value, width, 2)),
                    3 => format!(
                        "vec2<u32>({b}({v}.xy), {b}(vec2<f32>({v}.z, 0.0)))",
                        b = builtin,
                        v = value
                    ),
                    _ => format!("vec2<u32>({b}({v}.xy), {b}({v}.zw))", b = builtin, v = value),
                }
            }
            _ => value.to_string(),
        }
    }

    /// WGSL expression unpacking `packed` to the unpacked type
    pub fn wgsl_unpack_expr(self, width: u32, packed: &str) -> String {
        match self {
            Encoding::Unorm8 => {
                format!("unpack4x8unorm({}){}", packed, swizzle(width, 4))
            }
            Encoding::Unorm16 | Encoding::Snorm16 => {
                let builtin = self.wgsl_pair_builtin("unpack");
                match width {
                    1 | 2 => format!("{}({}){}", builtin, packed, swizzle(width, 2)),
                    3 => format!(
                        "vec3<f32>({b}({p}.x), {b}({p}.y).x)",
                        b = builtin,
                        p = packed
                    ),
                    _ => format!("vec4<f32>({b}({p}.x), {b}({p}.y))", b = builtin, p = packed),
                }
            }
            _ => packed.to_string(),
        }
    }

    fn wgsl_pair_builtin(self, direction: &str) -> String {
        let kind = if self == Encoding::Snorm16 { "snorm" } else { "unorm" };
        format!("{}2x16{}", direction, kind)
    }
}

fn pad_to_vec(value: &str, width: u32, target: u32) -> String {
    if width == target {
        return value.to_string();
    }
    let zeros = vec!["0.0"; (target - width) as usize].join(", ");
    format!("vec{}<f32>({}, {})", target, value, zeros)
}

fn swizzle(width: u32, full: u32) -> &'static str {
    if width == full {
        return "";
    }
    match width {
        1 => ".x",
        2 => ".xy",
        _ => ".xyz",
    }
}
