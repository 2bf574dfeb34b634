//! Template Renderer
//!
//! Projects a read-only [`SchemaInfo`] into a serializable render model and
//! feeds it through Tera templates loaded at runtime from the template
//! directory. Templates only ever see this projection, never the schema
//! maps themselves. Three renders per root file produce the pod header, the
//! conversion header, and the conversion source; any template or output
//! failure here is fatal for the whole run.

pub mod naming;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tera::Tera;
use tracing::info;

use crate::error::{PodgenError, Result};
use crate::graph::{ResolvedType, SchemaInfo, TypeId, TypeKind};
use crate::parser::PrimitiveKind;

/// Template file names looked up inside the `-t` directory
pub const POD_TEMPLATE: &str = "pod.hpp.tmpl";
pub const CONVERT_HEADER_TEMPLATE: &str = "pod_convert.hpp.tmpl";
pub const CONVERT_SOURCE_TEMPLATE: &str = "pod_convert.cpp.tmpl";

// =============================================================================
// Render model
// =============================================================================

#[derive(Debug, Serialize)]
struct FileCtx {
    path: String,
    stem: String,
    pod_include: String,
    convert_include: String,
}

#[derive(Debug, Serialize)]
struct FieldCtx {
    name: String,
    /// PascalCase spelling for the serialization library's get/set accessors
    accessor: String,
    ordinal: u16,
    cpp_type: String,
    is_union_member: bool,
    discriminant: Option<u16>,
    is_list: bool,
    /// Referenced struct type, when the field needs a nested conversion call
    struct_ref: Option<String>,
    /// Referenced enum type, when the field converts through a cast
    enum_ref: Option<String>,
}

#[derive(Debug, Serialize)]
struct EnumerantCtx {
    name: String,
    ordinal: u16,
}

#[derive(Debug, Serialize)]
struct TypeCtx {
    /// Flattened generated name, `Outer_Inner`
    name: String,
    local_name: String,
    display_name: String,
    /// Serialization-library C++ path, `Outer::Inner`
    capnp_path: String,
    is_struct: bool,
    is_enum: bool,
    has_union: bool,
    fields: Vec<FieldCtx>,
    enumerants: Vec<EnumerantCtx>,
}

#[derive(Debug, Serialize)]
struct ExternalCtx {
    include: String,
    namespace: String,
}

#[derive(Debug, Serialize)]
struct RenderModel {
    namespace: String,
    file: FileCtx,
    /// Internal types, children before their declaring struct
    types: Vec<TypeCtx>,
    /// Pod headers of imported files whose types are referenced, deduplicated
    externals: Vec<ExternalCtx>,
    /// Using-aliases that contributed types, alias -> file identity
    aliases: BTreeMap<String, String>,
}

fn primitive_cpp(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Void => "std::monostate",
        PrimitiveKind::Bool => "bool",
        PrimitiveKind::Int8 => "std::int8_t",
        PrimitiveKind::Int16 => "std::int16_t",
        PrimitiveKind::Int32 => "std::int32_t",
        PrimitiveKind::Int64 => "std::int64_t",
        PrimitiveKind::UInt8 => "std::uint8_t",
        PrimitiveKind::UInt16 => "std::uint16_t",
        PrimitiveKind::UInt32 => "std::uint32_t",
        PrimitiveKind::UInt64 => "std::uint64_t",
        PrimitiveKind::Float32 => "float",
        PrimitiveKind::Float64 => "double",
        PrimitiveKind::Text => "std::string",
        PrimitiveKind::Data => "std::vector<std::uint8_t>",
    }
}

/// Generated pod spelling of a referenced type: plain flat name for internal
/// types, the owning file's namespace-qualified flat name for external ones.
fn pod_type_name(info: &SchemaInfo, id: TypeId) -> String {
    let Some(descriptor) = info.descriptor(id) else {
        return String::from("void");
    };
    let flat = descriptor.flat_name();
    if info.is_internal(id) {
        return flat;
    }
    let namespace = info.namespace_of(id);
    if namespace.is_empty() {
        flat
    } else {
        format!("{namespace}::{flat}")
    }
}

fn cpp_type(info: &SchemaInfo, ty: &ResolvedType) -> String {
    match ty {
        ResolvedType::Primitive(p) => primitive_cpp(*p).to_string(),
        ResolvedType::List(inner) => format!("std::vector<{}>", cpp_type(info, inner)),
        ResolvedType::Type(id) => pod_type_name(info, *id),
        // degraded output keeps the reference as written; the resolver
        // already flagged it
        ResolvedType::Unresolved(name) => name.replace('.', "::"),
    }
}

fn accessor_name(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn field_ctx(info: &SchemaInfo, field: &crate::graph::FieldDescriptor) -> FieldCtx {
    let referenced = match &field.ty {
        ResolvedType::Type(id) => info.descriptor(*id),
        _ => None,
    };
    let (struct_ref, enum_ref) = match referenced {
        Some(d) if d.is_struct() => (Some(pod_type_name(info, d.id)), None),
        Some(d) => (None, Some(pod_type_name(info, d.id))),
        None => (None, None),
    };

    FieldCtx {
        name: field.name.clone(),
        accessor: accessor_name(&field.name),
        ordinal: field.ordinal,
        cpp_type: cpp_type(info, &field.ty),
        is_union_member: field.discriminant.is_some(),
        discriminant: field.discriminant,
        is_list: matches!(field.ty, ResolvedType::List(_)),
        struct_ref,
        enum_ref,
    }
}

fn build_model(info: &SchemaInfo, root: &Path) -> RenderModel {
    let root_key = root.to_string_lossy().replace('\\', "/");
    let stem = root
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let namespace = info
        .import_namespaces
        .get(&info.anchor)
        .cloned()
        .unwrap_or_default();

    let types = info
        .internal_order
        .iter()
        .filter_map(|id| info.internal_types_by_id.get(id))
        .map(|descriptor| {
            let (fields, enumerants) = match &descriptor.kind {
                TypeKind::Struct { fields } => (
                    fields.iter().map(|f| field_ctx(info, f)).collect(),
                    Vec::new(),
                ),
                TypeKind::Enum { enumerants } => (
                    Vec::new(),
                    enumerants
                        .iter()
                        .map(|e| EnumerantCtx {
                            name: e.name.clone(),
                            ordinal: e.ordinal,
                        })
                        .collect(),
                ),
            };
            TypeCtx {
                name: descriptor.flat_name(),
                local_name: descriptor.local_name().to_string(),
                display_name: descriptor.display_name.clone(),
                capnp_path: descriptor.local_path.join("::"),
                is_struct: descriptor.is_struct(),
                is_enum: !descriptor.is_struct(),
                has_union: info.unions.contains_key(&descriptor.id),
                fields,
                enumerants,
            }
        })
        .collect();

    // dedup includes; BTreeMap keeps emission deterministic
    let mut externals: BTreeMap<String, String> = BTreeMap::new();
    for (id, include) in &info.pod_headers {
        externals
            .entry(include.clone())
            .or_insert_with(|| info.namespace_of(*id).to_string());
    }

    let aliases = info
        .import_aliases
        .iter()
        .map(|(alias, file)| (alias.clone(), file.0.clone()))
        .collect();

    RenderModel {
        namespace,
        file: FileCtx {
            pod_include: naming::pod_include_name(&root_key),
            convert_include: naming::convert_include_name(&root_key),
            path: root_key,
            stem,
        },
        types,
        externals: externals
            .into_iter()
            .map(|(include, namespace)| ExternalCtx { include, namespace })
            .collect(),
        aliases,
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Render one artifact from a template file. Template read failures and
/// render failures are both fatal errors.
pub fn render_artifact(template_path: &Path, info: &SchemaInfo, root: &Path) -> Result<String> {
    let text = fs::read_to_string(template_path).map_err(|source| PodgenError::Template {
        path: template_path.to_path_buf(),
        source,
    })?;

    let mut tera = Tera::default();
    tera.add_raw_template("artifact", &text)?;
    let context = tera::Context::from_serialize(build_model(info, root))?;
    Ok(tera.render("artifact", &context)?)
}

/// Render one artifact and write it, creating parent directories as needed
pub fn write_artifact(
    template_path: &Path,
    dest: &Path,
    info: &SchemaInfo,
    root: &Path,
) -> Result<()> {
    let output = render_artifact(template_path, info, root)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| PodgenError::Output {
            path: dest.to_path_buf(),
            source,
        })?;
    }
    info!(dest = %dest.display(), "generating file");
    fs::write(dest, output).map_err(|source| PodgenError::Output {
        path: dest.to_path_buf(),
        source,
    })
}

/// Paths of the three artifacts generated for one root file
#[derive(Debug)]
pub struct Artifacts {
    pub pod_header: PathBuf,
    pub convert_header: PathBuf,
    pub convert_source: PathBuf,
}

/// Relative spelling of the root path for output placement. An absolute
/// root would replace the output directory when joined onto it, so it is
/// made relative first: stripped of the working directory when under it,
/// otherwise stripped of its root component.
fn output_root(root: &Path) -> PathBuf {
    if !root.is_absolute() {
        return root.to_path_buf();
    }
    if let Ok(cwd) = std::env::current_dir() {
        if let Ok(stripped) = root.strip_prefix(&cwd) {
            return stripped.to_path_buf();
        }
    }
    root.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Run all three renders for one root file
pub fn generate_for_root(
    info: &SchemaInfo,
    root: &Path,
    template_dir: &Path,
    output_dir: &Path,
) -> Result<Artifacts> {
    let root = output_root(root);
    let artifacts = Artifacts {
        pod_header: output_dir.join(naming::pod_header_path(&root)),
        convert_header: output_dir.join(naming::convert_header_path(&root)),
        convert_source: output_dir.join(naming::convert_source_path(&root)),
    };

    write_artifact(&template_dir.join(POD_TEMPLATE), &artifacts.pod_header, info, &root)?;
    write_artifact(
        &template_dir.join(CONVERT_HEADER_TEMPLATE),
        &artifacts.convert_header,
        info,
        &root,
    )?;
    write_artifact(
        &template_dir.join(CONVERT_SOURCE_TEMPLATE),
        &artifacts.convert_source,
        info,
        &root,
    )?;

    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{classify_tree, FileId};
    use crate::parser::capnp::parse_schema_text;

    fn info_for(source: &str, file: &str) -> SchemaInfo {
        let tree = parse_schema_text(source, file).unwrap();
        let anchor = FileId(file.to_string());
        let mut info = SchemaInfo::new(anchor.clone());
        info.import_namespaces.insert(anchor.clone(), tree.namespace.clone());
        classify_tree(&tree, &anchor, &mut info).unwrap();
        crate::graph::classify::resolve_field_references(&mut info);
        info
    }

    #[test]
    fn test_primitive_spellings() {
        assert_eq!(primitive_cpp(PrimitiveKind::Text), "std::string");
        assert_eq!(primitive_cpp(PrimitiveKind::UInt16), "std::uint16_t");
        assert_eq!(
            primitive_cpp(PrimitiveKind::Data),
            "std::vector<std::uint8_t>"
        );
    }

    #[test]
    fn test_model_preserves_field_declaration_order() {
        let info = info_for(
            "struct S { c @0 :Bool; a @1 :Text; b @2 :List(Int32); }",
            "s.capnp",
        );
        let model = build_model(&info, Path::new("s.capnp"));

        assert_eq!(model.types.len(), 1);
        let names: Vec<&str> = model.types[0]
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(model.types[0].fields[2].cpp_type, "std::vector<std::int32_t>");
        assert!(model.types[0].fields[2].is_list);
    }

    #[test]
    fn test_model_union_markers() {
        let info = info_for(
            "struct S { id @0 :UInt32; union { x @1 :Bool; y @2 :Text; } }",
            "s.capnp",
        );
        let model = build_model(&info, Path::new("s.capnp"));
        let t = &model.types[0];

        assert!(t.has_union);
        assert_eq!(t.fields[0].discriminant, None);
        assert_eq!(t.fields[1].discriminant, Some(0));
        assert_eq!(t.fields[2].discriminant, Some(1));
        assert_eq!(t.fields[1].accessor, "X");
    }

    #[test]
    fn test_model_file_naming() {
        let info = info_for("struct S { x @0 :Bool; }", "msg/s.capnp");
        let model = build_model(&info, Path::new("msg/s.capnp"));

        assert_eq!(model.file.stem, "s");
        assert_eq!(model.file.pod_include, "msg/s.pod.hpp");
        assert_eq!(model.file.convert_include, "msg/s.convert.hpp");
    }

    #[test]
    fn test_absolute_root_made_relative_for_output() {
        assert_eq!(
            output_root(Path::new("msg/s.capnp")),
            PathBuf::from("msg/s.capnp")
        );

        let rooted = output_root(Path::new("/somewhere/schemas/s.capnp"));
        assert!(!rooted.is_absolute());
        assert!(rooted.ends_with("s.capnp"));
    }

    #[test]
    fn test_missing_template_is_fatal_error() {
        let info = info_for("struct S { x @0 :Bool; }", "s.capnp");
        let err = render_artifact(Path::new("no/such/dir/pod.hpp.tmpl"), &info, Path::new("s.capnp"))
            .unwrap_err();
        assert!(matches!(err, PodgenError::Template { .. }));
    }
}
