//! Indirect command layouts
//!
//! Argument records a device pass writes and a later dispatch or draw consumes. Each is
//! both a `Pod` host struct and a shared layout, so passes can `require` the WGSL mirror.

use bytemuck::{Pod, Zeroable};

use crate::error::LayoutError;
use crate::gpu::layout::{Encoding, FieldSpec, LayoutId};
use crate::gpu::library::ShaderLibrary;

/// Indirect dispatch arguments
/// Total size: 12 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchIndirectCommand {
    /// Number of workgroups in X dimension
    pub workgroups_x: u32,

    /// Number of workgroups in Y dimension
    pub workgroups_y: u32,

    /// Number of workgroups in Z dimension
    pub workgroups_z: u32,
}

impl DispatchIndirectCommand {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self {
            workgroups_x: x,
            workgroups_y: y,
            workgroups_z: z,
        }
    }

    pub fn dispatch_1d(workgroups: u32) -> Self {
        Self::new(workgroups, 1, 1)
    }

    /// Enough workgroups of `workgroup_size` to cover `items`; zero groups for zero items
    pub fn covering(items: u32, workgroup_size: u32) -> Self {
        Self::dispatch_1d(items.div_ceil(workgroup_size))
    }

    pub fn groups(&self) -> [u32; 3] {
        [self.workgroups_x, self.workgroups_y, self.workgroups_z]
    }
}

/// Non-indexed indirect draw arguments
/// Total size: 16 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawArraysIndirectCommand {
    /// Number of vertices to draw
    pub vertex_count: u32,

    /// Number of instances to draw
    pub instance_count: u32,

    /// First vertex
    pub first_vertex: u32,

    /// First instance
    pub first_instance: u32,
}

impl DrawArraysIndirectCommand {
    pub fn new(vertex_count: u32, instance_count: u32) -> Self {
        Self {
            vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    pub fn with_offsets(
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Self {
        Self {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        }
    }
}

/// Indexed indirect draw arguments
/// Total size: 20 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawElementsIndirectCommand {
    /// Number of indices to draw
    pub index_count: u32,

    /// Number of instances to draw
    pub instance_count: u32,

    /// First index in the index buffer
    pub first_index: u32,

    /// Value added to each index before fetching vertex
    pub base_vertex: i32,

    /// First instance
    pub first_instance: u32,
}

impl DrawElementsIndirectCommand {
    pub fn new(index_count: u32, instance_count: u32) -> Self {
        Self {
            index_count,
            instance_count,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }

    pub fn with_offsets(
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Self {
        Self {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        }
    }
}

/// Shared-layout ids of the command records
#[derive(Debug, Clone, Copy)]
pub struct CommandLayouts {
    pub dispatch: LayoutId,
    pub draw_arrays: LayoutId,
    pub draw_elements: LayoutId,
}

impl CommandLayouts {
    /// Register the command layouts, or return the existing ones
    pub fn register(library: &mut ShaderLibrary) -> Result<Self, LayoutError> {
        let u32_field = |name: &str| FieldSpec::new(name, Encoding::Uint32, 1);
        let mut define = |name: &str, fields: Vec<FieldSpec>| match library.layouts.lookup(name) {
            Some(id) => Ok(id),
            None => library.define_layout(name, fields),
        };

        Ok(Self {
            dispatch: define(
                "DispatchIndirectCommand",
                vec![u32_field("workgroups_x"), u32_field("workgroups_y"), u32_field("workgroups_z")],
            )?,
            draw_arrays: define(
                "DrawArraysIndirectCommand",
                vec![
                    u32_field("vertex_count"),
                    u32_field("instance_count"),
                    u32_field("first_vertex"),
                    u32_field("first_instance"),
                ],
            )?,
            draw_elements: define(
                "DrawElementsIndirectCommand",
                vec![
                    u32_field("index_count"),
                    u32_field("instance_count"),
                    u32_field("first_index"),
                    FieldSpec::new("base_vertex", Encoding::Int32, 1),
                    u32_field("first_instance"),
                ],
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::layout::FieldValue;

    #[test]
    fn test_layouts_match_host_structs() {
        let mut library = ShaderLibrary::new();
        let layouts = CommandLayouts::register(&mut library).unwrap();

        let size = |id| library.layout(id).unwrap().size as usize;
        assert_eq!(size(layouts.dispatch), std::mem::size_of::<DispatchIndirectCommand>());
        assert_eq!(size(layouts.draw_arrays), std::mem::size_of::<DrawArraysIndirectCommand>());
        assert_eq!(size(layouts.draw_elements), std::mem::size_of::<DrawElementsIndirectCommand>());
    }

    #[test]
    fn test_generic_pack_matches_pod_bytes() {
        let mut library = ShaderLibrary::new();
        let layouts = CommandLayouts::register(&mut library).unwrap();
        let layout = library.layout(layouts.draw_elements).unwrap();

        let command = DrawElementsIndirectCommand::with_offsets(36, 2, 6, -4, 1);
        let packed = layout
            .pack(&[
                FieldValue::Uint(36),
                FieldValue::Uint(2),
                FieldValue::Uint(6),
                FieldValue::Int(-4),
                FieldValue::Uint(1),
            ])
            .unwrap();
        assert_eq!(bytemuck::cast_slice::<u32, u8>(&packed), bytemuck::bytes_of(&command));
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut library = ShaderLibrary::new();
        let first = CommandLayouts::register(&mut library).unwrap();
        let second = CommandLayouts::register(&mut library).unwrap();
        assert_eq!(first.dispatch, second.dispatch);
        assert_eq!(library.layouts.len(), 3);
    }

    #[test]
    fn test_covering_dispatch() {
        assert_eq!(DispatchIndirectCommand::covering(0, 128).groups(), [0, 1, 1]);
        assert_eq!(DispatchIndirectCommand::covering(1, 128).groups(), [1, 1, 1]);
        assert_eq!(DispatchIndirectCommand::covering(129, 128).groups(), [2, 1, 1]);
    }
}
