//! Layout registration and placement

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::wgsl::emit_layout;
use super::{round_up, Field, FieldKind, FieldSource, FieldSpec, Layout};
use crate::error::LayoutError;
use crate::gpu::snippet::{SnippetGraph, SnippetId};

/// Handle to a registered layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutId(usize);

/// All shared layouts known to the process
#[derive(Default)]
pub struct LayoutRegistry {
    layouts: Vec<Arc<Layout>>,
    by_name: FxHashMap<String, LayoutId>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a layout and register its WGSL mirror as a snippet of the same name
    pub fn define(
        &mut self,
        snippets: &mut SnippetGraph,
        name: &str,
        specs: Vec<FieldSpec>,
    ) -> Result<LayoutId, LayoutError> {
        if self.by_name.contains_key(name) {
            return Err(LayoutError::Duplicate(name.to_string()));
        }
        if specs.is_empty() {
            return Err(LayoutError::Empty(name.to_string()));
        }

        let mut fields = Vec::with_capacity(specs.len());
        let mut requires: Vec<SnippetId> = Vec::new();
        let mut cursor = 0u32;
        let mut struct_align = 4u32;

        for spec in specs {
            if fields.iter().any(|f: &Field| f.name == spec.name) {
                return Err(LayoutError::DuplicateField {
                    layout: name.to_string(),
                    field: spec.name,
                });
            }
            if spec.array == Some(0) {
                return Err(LayoutError::EmptyArray { field: spec.name });
            }

            let (kind, element_size, align) = match spec.source {
                FieldSource::Encoded { encoding, width } => {
                    let form = encoding.packed_form(width).ok_or_else(|| {
                        LayoutError::IncompatibleWidth {
                            field: spec.name.clone(),
                            encoding,
                            width,
                        }
                    })?;
                    (FieldKind::Encoded { encoding, width }, form.size, form.align)
                }
                FieldSource::Nested(id) => {
                    let nested = self.get(id)?.clone();
                    if !requires.contains(&nested.snippet) {
                        requires.push(nested.snippet);
                    }
                    let (size, align) = (nested.size, nested.align);
                    (FieldKind::Nested(nested), size, align)
                }
            };

            let offset = round_up(cursor, align);
            let stride = round_up(element_size, align);
            let field = Field {
                name: spec.name,
                kind,
                array: spec.array,
                offset,
                element_size,
                stride,
                align,
            };
            cursor = offset + field.size();
            struct_align = struct_align.max(align);
            fields.push(field);
        }

        let size = round_up(cursor, struct_align);
        let snippet = snippets.register(
            name,
            &emit_layout(name, &fields, size, struct_align),
            &requires,
        )?;
        let layout = Layout {
            name: name.to_string(),
            fields,
            size,
            align: struct_align,
            snippet,
        };

        log::debug!(
            "[LayoutRegistry] Defined '{}': {} fields, {} bytes, align {}",
            name,
            layout.fields.len(),
            layout.size,
            layout.align
        );

        let id = LayoutId(self.layouts.len());
        self.layouts.push(Arc::new(layout));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn get(&self, id: LayoutId) -> Result<&Arc<Layout>, LayoutError> {
        self.layouts.get(id.0).ok_or(LayoutError::UnknownLayout(id.0))
    }

    pub fn lookup(&self, name: &str) -> Option<LayoutId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::layout::{Encoding, FieldValue};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn setup() -> (LayoutRegistry, SnippetGraph) {
        (LayoutRegistry::new(), SnippetGraph::new())
    }

    #[test]
    fn test_offsets_follow_alignment_rules() {
        let (mut registry, mut snippets) = setup();
        let id = registry
            .define(
                &mut snippets,
                "Mixed",
                vec![
                    FieldSpec::new("flag", Encoding::Uint32, 1),
                    FieldSpec::new("normal", Encoding::Snorm16, 3),
                    FieldSpec::new("position", Encoding::Float32, 3),
                    FieldSpec::new("color", Encoding::Unorm8, 4),
                ],
            )
            .unwrap();
        let layout = registry.get(id).unwrap();

        let offsets: Vec<u32> = layout.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 28]);
        assert_eq!(layout.align, 16);
        assert_eq!(layout.size, 32);
    }

    #[test]
    fn test_array_stride_pads_vec3() {
        let (mut registry, mut snippets) = setup();
        let id = registry
            .define(
                &mut snippets,
                "Path",
                vec![
                    FieldSpec::new("points", Encoding::Float32, 3).array(4),
                    FieldSpec::new("count", Encoding::Uint32, 1),
                ],
            )
            .unwrap();
        let layout = registry.get(id).unwrap();
        assert_eq!(layout.fields[0].stride, 16);
        assert_eq!(layout.fields[1].offset, 64);
        assert_eq!(layout.size, 80);
    }

    #[test]
    fn test_definition_errors() {
        let (mut registry, mut snippets) = setup();
        assert_eq!(
            registry.define(&mut snippets, "Empty", vec![]),
            Err(LayoutError::Empty("Empty".to_string()))
        );
        assert!(matches!(
            registry.define(
                &mut snippets,
                "Wide",
                vec![FieldSpec::new("v", Encoding::Unorm16, 5)]
            ),
            Err(LayoutError::IncompatibleWidth { width: 5, .. })
        ));
        assert!(matches!(
            registry.define(
                &mut snippets,
                "Twice",
                vec![
                    FieldSpec::new("a", Encoding::Float32, 1),
                    FieldSpec::new("a", Encoding::Float32, 2),
                ]
            ),
            Err(LayoutError::DuplicateField { .. })
        ));
        assert!(matches!(
            registry.define(
                &mut snippets,
                "NoElems",
                vec![FieldSpec::new("a", Encoding::Float32, 1).array(0)]
            ),
            Err(LayoutError::EmptyArray { .. })
        ));

        registry
            .define(&mut snippets, "Ok", vec![FieldSpec::new("a", Encoding::Int32, 1)])
            .unwrap();
        assert_eq!(
            registry.define(&mut snippets, "Ok", vec![FieldSpec::new("b", Encoding::Int32, 1)]),
            Err(LayoutError::Duplicate("Ok".to_string()))
        );
    }

    #[test]
    fn test_nested_layout_requires_its_snippet() {
        let (mut registry, mut snippets) = setup();
        let inner = registry
            .define(&mut snippets, "Inner", vec![FieldSpec::new("v", Encoding::Float32, 2)])
            .unwrap();
        let outer = registry
            .define(
                &mut snippets,
                "Outer",
                vec![
                    FieldSpec::new("id", Encoding::Uint32, 1),
                    FieldSpec::nested("inner", inner).array(2),
                ],
            )
            .unwrap();

        let outer_layout = registry.get(outer).unwrap().clone();
        assert_eq!(outer_layout.fields[1].offset, 8);
        assert_eq!(outer_layout.size, 24);

        let source = snippets.compose(&[outer_layout.snippet]);
        let inner_pos = source.find("struct InnerPacked").unwrap();
        let outer_pos = source.find("struct OuterPacked").unwrap();
        assert!(inner_pos < outer_pos);
        assert!(source.contains("packed.inner[i] = Inner_pack(value.inner[i]);"));
    }

    #[test]
    fn test_wgsl_mirror_uses_builtins() {
        let (mut registry, mut snippets) = setup();
        let id = registry
            .define(
                &mut snippets,
                "Vertex",
                vec![
                    FieldSpec::new("position", Encoding::Float32, 3),
                    FieldSpec::new("color", Encoding::Unorm8, 4),
                ],
            )
            .unwrap();
        let layout = registry.get(id).unwrap().clone();
        let source = snippets.compose(&[layout.snippet]);

        assert!(source.contains("struct Vertex {\n    position: vec3<f32>,\n    color: vec4<f32>,\n}"));
        assert!(source.contains("struct VertexPacked {\n    position: vec3<f32>,\n    color: u32,\n}"));
        assert!(source.contains("fn Vertex_pack(value: Vertex) -> VertexPacked {"));
        assert!(source.contains("packed.color = pack4x8unorm(value.color);"));
        assert!(source.contains("value.color = unpack4x8unorm(packed.color);"));
    }

    #[test]
    fn test_pack_unpack_round_trip_randomized() {
        let (mut registry, mut snippets) = setup();
        let id = registry
            .define(
                &mut snippets,
                "Everything",
                vec![
                    FieldSpec::new("u8x3", Encoding::Unorm8, 3),
                    FieldSpec::new("u16x4", Encoding::Unorm16, 4),
                    FieldSpec::new("s16x2", Encoding::Snorm16, 2),
                    FieldSpec::new("s16x3", Encoding::Snorm16, 3),
                    FieldSpec::new("index", Encoding::Uint32, 1),
                    FieldSpec::new("offset", Encoding::Int32, 1),
                    FieldSpec::new("f32x3", Encoding::Float32, 3).array(2),
                ],
            )
            .unwrap();
        let layout = registry.get(id).unwrap().clone();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let mut floats = |n: usize, lo: f32| -> FieldValue {
                FieldValue::Float((0..n).map(|_| rng.gen_range(lo..=1.0)).collect())
            };
            let values = vec![
                floats(3, 0.0),
                floats(4, 0.0),
                floats(2, -1.0),
                floats(3, -1.0),
                FieldValue::Uint(0xdead_beef),
                FieldValue::Int(-42),
                FieldValue::Array(vec![
                    FieldValue::Float(vec![1.5, -2.25, 1e6]),
                    FieldValue::Float(vec![0.0, f32::MIN_POSITIVE, -0.0]),
                ]),
            ];

            let packed = layout.pack(&values).unwrap();
            assert_eq!(packed.len(), layout.words());
            let unpacked = layout.unpack(&packed).unwrap();

            for (field, (before, after)) in layout.fields.iter().zip(values.iter().zip(&unpacked)) {
                match (&field.kind, before, after) {
                    (
                        FieldKind::Encoded { encoding, .. },
                        FieldValue::Float(a),
                        FieldValue::Float(b),
                    ) => {
                        let step = encoding.quantization_step();
                        for (x, y) in a.iter().zip(b) {
                            assert!((x - y).abs() <= step, "{}: {} vs {}", field.name, x, y);
                        }
                    }
                    _ => assert_eq!(before, after, "{}", field.name),
                }
            }
        }
    }

    #[test]
    fn test_pack_rejects_wrong_shapes() {
        let (mut registry, mut snippets) = setup();
        let id = registry
            .define(&mut snippets, "Pair", vec![
                FieldSpec::new("a", Encoding::Float32, 2),
                FieldSpec::new("b", Encoding::Uint32, 1),
            ])
            .unwrap();
        let layout = registry.get(id).unwrap();

        assert!(matches!(
            layout.pack(&[FieldValue::scalar(1.0)]),
            Err(crate::error::PackError::FieldCount { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            layout.pack(&[FieldValue::scalar(1.0), FieldValue::Uint(1)]),
            Err(crate::error::PackError::ValueShape { .. })
        ));
        assert!(matches!(
            layout.unpack(&[0u32]),
            Err(crate::error::PackError::Truncated { needed: 4, actual: 1 })
        ));
    }
}
