//! WGSL mirror generation for shared layouts

use std::fmt::Write as FmtWrite;

use super::{Field, FieldKind};

/// Unpacked WGSL type of one element of `field`
fn unpacked_type(field: &Field) -> String {
    match &field.kind {
        FieldKind::Encoded { encoding, width } => encoding.wgsl_unpacked_type(*width),
        FieldKind::Nested(layout) => layout.name.clone(),
    }
}

/// Packed WGSL type of one element of `field`
fn packed_type(field: &Field) -> String {
    match &field.kind {
        FieldKind::Encoded { encoding, width } => encoding.wgsl_packed_type(*width),
        FieldKind::Nested(layout) => layout.packed_name(),
    }
}

fn declared(ty: String, array: Option<u32>) -> String {
    match array {
        Some(n) => format!("array<{}, {}>", ty, n),
        None => ty,
    }
}

fn pack_expr(field: &Field, value: &str) -> String {
    match &field.kind {
        FieldKind::Encoded { encoding, width } => encoding.wgsl_pack_expr(*width, value),
        FieldKind::Nested(layout) => format!("{}_pack({})", layout.name, value),
    }
}

fn unpack_expr(field: &Field, packed: &str) -> String {
    match &field.kind {
        FieldKind::Encoded { encoding, width } => encoding.wgsl_unpack_expr(*width, packed),
        FieldKind::Nested(layout) => format!("{}_unpack({})", layout.name, packed),
    }
}

/// Emit the unpacked struct, the packed struct and both conversion functions
pub(super) fn emit_layout(name: &str, fields: &[Field], size: u32, align: u32) -> String {
    let mut wgsl = String::new();
    let packed = format!("{}Packed", name);

    writeln!(&mut wgsl, "struct {} {{", name)
        .expect("[LayoutWgsl] writeln! to String should never fail");
    for field in fields {
        writeln!(&mut wgsl, "    {}: {},", field.name, declared(unpacked_type(field), field.array))
            .expect("[LayoutWgsl] writeln! to String should never fail");
    }
    wgsl.push_str("}\n\n");

    writeln!(&mut wgsl, "// Size: {} bytes, Alignment: {} bytes", size, align)
        .expect("[LayoutWgsl] writeln! to String should never fail");
    writeln!(&mut wgsl, "struct {} {{", packed)
        .expect("[LayoutWgsl] writeln! to String should never fail");
    for field in fields {
        writeln!(&mut wgsl, "    {}: {},", field.name, declared(packed_type(field), field.array))
            .expect("[LayoutWgsl] writeln! to String should never fail");
    }
    wgsl.push_str("}\n\n");

    writeln!(
        &mut wgsl,
        "fn {}_pack(value: {}) -> {} {{\n    var packed: {};",
        name, name, packed, packed
    )
    .expect("[LayoutWgsl] writeln! to String should never fail");
    for field in fields {
        emit_assignment(&mut wgsl, field, "packed", &|v: &str| pack_expr(field, v), "value");
    }
    wgsl.push_str("    return packed;\n}\n\n");

    writeln!(
        &mut wgsl,
        "fn {}_unpack(packed: {}) -> {} {{\n    var value: {};",
        name, packed, name, name
    )
    .expect("[LayoutWgsl] writeln! to String should never fail");
    for field in fields {
        emit_assignment(&mut wgsl, field, "value", &|p: &str| unpack_expr(field, p), "packed");
    }
    wgsl.push_str("    return value;\n}\n");

    wgsl
}

fn emit_assignment(
    wgsl: &mut String,
    field: &Field,
    target: &str,
    convert: &dyn Fn(&str) -> String,
    source: &str,
) {
    match field.array {
        None => {
            let value = format!("{}.{}", source, field.name);
            writeln!(wgsl, "    {}.{} = {};", target, field.name, convert(&value))
                .expect("[LayoutWgsl] writeln! to String should never fail");
        }
        Some(n) => {
            let value = format!("{}.{}[i]", source, field.name);
            writeln!(
                wgsl,
                "    for (var i = 0u; i < {}u; i++) {{\n        {}.{}[i] = {};\n    }}",
                n,
                target,
                field.name,
                convert(&value)
            )
            .expect("[LayoutWgsl] writeln! to String should never fail");
        }
    }
}
