//! Type Classifier
//!
//! Walks a parsed schema tree and flattens every struct and enum declaration
//! (nested ones included) into the [`SchemaInfo`] being built: internal maps
//! when the declaring file anchors the run, external maps otherwise. A
//! second pass, run after all imports have merged, rewrites textual field
//! references into type ids; whatever still resolves to nothing is flagged,
//! never treated as internal.

use tracing::{debug, warn};

use crate::error::Result;
use crate::parser::{FieldType, SchemaTree, TypeBody, TypeDecl};
use crate::render::naming;

use super::{
    unions, Enumerant, FieldDescriptor, FileId, ResolvedType, SchemaInfo, TypeDescriptor, TypeId,
    TypeKind,
};

/// Classify every declaration of `tree` into `info`.
///
/// `file` is the identity the tree was loaded under. Returns the number of
/// types newly merged, which the resolver uses to decide whether an import
/// contributed anything (aliases are only registered for imports that did).
pub fn classify_tree(tree: &SchemaTree, file: &FileId, info: &mut SchemaInfo) -> Result<usize> {
    let mut added = 0;
    let file_scope_id = TypeId(tree.file_id);
    for decl in &tree.types {
        added += visit(decl, file, file_scope_id, &[], info)?;
    }
    Ok(added)
}

fn visit(
    decl: &TypeDecl,
    file: &FileId,
    parent: TypeId,
    parent_path: &[String],
    info: &mut SchemaInfo,
) -> Result<usize> {
    let mut path = parent_path.to_vec();
    path.push(decl.name.clone());
    let dotted = path.join(".");
    let display_name = format!("{}:{}", file, dotted);
    let id = TypeId(decl.id);

    let kind = match &decl.body {
        TypeBody::Struct {
            fields,
            union_blocks,
        } => {
            let group = unions::analyze(&dotted, id, fields, *union_blocks)?;
            let descriptors = fields
                .iter()
                .map(|f| FieldDescriptor {
                    name: f.name.clone(),
                    ordinal: f.ordinal,
                    ty: lower_type(&f.ty),
                    discriminant: unions::discriminant_of(group.as_ref(), &f.name),
                })
                .collect();
            if let Some(group) = group {
                info.unions.insert(id, group);
            }
            TypeKind::Struct {
                fields: descriptors,
            }
        }
        TypeBody::Enum { enumerants } => TypeKind::Enum {
            enumerants: enumerants
                .iter()
                .map(|e| Enumerant {
                    name: e.name.clone(),
                    ordinal: e.ordinal,
                })
                .collect(),
        },
    };

    // children before their declaring struct, so emission order can simply
    // follow internal_order
    let mut added = 0;
    for nested in &decl.nested {
        added += visit(nested, file, id, &path, info)?;
    }

    let descriptor = TypeDescriptor {
        display_name: display_name.clone(),
        local_path: path.clone(),
        id,
        file: file.clone(),
        kind,
    };

    let pod_header = if *file == info.anchor {
        None
    } else {
        Some(naming::pod_include_name(file.as_str()))
    };

    if info.merge_descriptor(descriptor, pod_header)? {
        added += 1;
        debug!(name = %display_name, id = id.0, "classified type");
    }

    info.schema_parent_of.entry(id).or_insert(parent);
    if parent_path.is_empty() {
        info.file_scopes
            .entry(file.clone())
            .or_default()
            .insert(decl.name.clone(), id);
    } else {
        info.children
            .entry(parent)
            .or_default()
            .insert(decl.name.clone(), id);
    }

    Ok(added)
}

fn lower_type(ty: &FieldType) -> ResolvedType {
    match ty {
        FieldType::Primitive(p) => ResolvedType::Primitive(*p),
        FieldType::List(inner) => ResolvedType::List(Box::new(lower_type(inner))),
        FieldType::Named(path) => ResolvedType::Unresolved(path.clone()),
    }
}

// =============================================================================
// Reference resolution
// =============================================================================

/// Rewrite textual field references to type ids, now that every reachable
/// file has been merged. Returns the number of references that stayed
/// unresolved; each one is flagged with a diagnostic.
pub fn resolve_field_references(info: &mut SchemaInfo) -> usize {
    // collect first: resolution reads the maps the rewrite mutates
    let mut rewrites: Vec<(TypeId, usize, ResolvedType)> = Vec::new();
    let mut unresolved = 0;

    let owners: Vec<TypeId> = info
        .internal_types_by_id
        .keys()
        .chain(info.external_types.keys())
        .copied()
        .collect();

    for owner in owners {
        let fields = match info.descriptor(owner).map(|d| &d.kind) {
            Some(TypeKind::Struct { fields }) => fields.clone(),
            _ => continue,
        };
        for (idx, field) in fields.iter().enumerate() {
            if !has_unresolved(&field.ty) {
                continue;
            }
            let (ty, missing) = rewrite_type(info, owner, &field.ty);
            if let Some(reference) = missing {
                unresolved += 1;
                let owner_name = info
                    .descriptor(owner)
                    .map(|d| d.display_name.clone())
                    .unwrap_or_default();
                warn!(
                    owner = %owner_name,
                    field = %field.name,
                    reference = %reference,
                    "unresolved type reference"
                );
                info.diagnostics.push(format!(
                    "unresolved type reference {reference} in {owner_name}.{}",
                    field.name
                ));
            }
            rewrites.push((owner, idx, ty));
        }
    }

    for (owner, idx, ty) in rewrites {
        let descriptor = info
            .internal_types_by_id
            .get_mut(&owner)
            .or_else(|| info.external_types.get_mut(&owner));
        if let Some(TypeDescriptor {
            kind: TypeKind::Struct { fields },
            ..
        }) = descriptor
        {
            fields[idx].ty = ty;
        }
    }

    unresolved
}

fn has_unresolved(ty: &ResolvedType) -> bool {
    match ty {
        ResolvedType::Unresolved(_) => true,
        ResolvedType::List(inner) => has_unresolved(inner),
        _ => false,
    }
}

/// Resolve one type expression. The second value carries the reference text
/// when resolution failed somewhere inside it.
fn rewrite_type(info: &SchemaInfo, owner: TypeId, ty: &ResolvedType) -> (ResolvedType, Option<String>) {
    match ty {
        ResolvedType::Unresolved(path) => match resolve_named(info, owner, path) {
            Some(id) => (ResolvedType::Type(id), None),
            None => (ResolvedType::Unresolved(path.clone()), Some(path.clone())),
        },
        ResolvedType::List(inner) => {
            let (inner, missing) = rewrite_type(info, owner, inner);
            (ResolvedType::List(Box::new(inner)), missing)
        }
        other => (other.clone(), None),
    }
}

/// Resolve a dotted reference from inside `owner`'s declaration scope.
///
/// Lookup order: the owner's own nested types and its name, then each
/// enclosing struct outward, then the declaring file's top level, then
/// alias-qualified imports of that file.
fn resolve_named(info: &SchemaInfo, owner: TypeId, path: &str) -> Option<TypeId> {
    let segments: Vec<&str> = path.split('.').collect();
    let head = *segments.first()?;
    let file = info.descriptor(owner)?.file.clone();

    let mut start: Option<TypeId> = None;
    let mut rest: &[&str] = &segments[1..];

    let mut scope = Some(owner);
    while let Some(sid) = scope {
        let descriptor = match info.descriptor(sid) {
            Some(d) => d,
            None => break, // reached the file scope id
        };
        if descriptor.local_name() == head {
            start = Some(sid);
            break;
        }
        if let Some(&tid) = info.children.get(&sid).and_then(|m| m.get(head)) {
            start = Some(tid);
            break;
        }
        scope = info.schema_parent_of.get(&sid).copied();
    }

    if start.is_none() {
        start = info
            .file_scopes
            .get(&file)
            .and_then(|m| m.get(head))
            .copied();
    }

    if start.is_none() {
        // alias-qualified: first segment names an imported file
        let target = info.file_aliases.get(&file)?.get(head)?;
        let next = *rest.first()?;
        start = info
            .file_scopes
            .get(target)
            .and_then(|m| m.get(next))
            .copied();
        rest = &rest[1..];
    }

    let mut current = start?;
    for segment in rest {
        current = *info.children.get(&current)?.get(*segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::capnp::parse_schema_text;

    fn classify(source: &str, file: &str, info: &mut SchemaInfo) -> usize {
        let tree = parse_schema_text(source, file).unwrap();
        classify_tree(&tree, &FileId(file.to_string()), info).unwrap()
    }

    #[test]
    fn test_internal_vs_external_is_per_run() {
        let mut info = SchemaInfo::new(FileId("main.capnp".into()));
        classify("struct A { x @0 :Bool; }", "main.capnp", &mut info);
        classify("struct B { y @0 :Bool; }", "other.capnp", &mut info);

        let a = info.internal_types_by_name["main.capnp:A"];
        assert!(info.is_internal(a));
        assert_eq!(info.internal_types_by_id.len(), 1);
        assert_eq!(info.external_types.len(), 1);

        let (&b, b_desc) = info.external_types.iter().next().unwrap();
        assert_eq!(b_desc.file, FileId("other.capnp".into()));
        assert_eq!(info.pod_headers.get(&b).unwrap(), "other.pod.hpp");
    }

    #[test]
    fn test_nested_types_get_parent_links() {
        let mut info = SchemaInfo::new(FileId("m.capnp".into()));
        let count = classify(
            "struct Outer { a @0 :Bool; struct Inner { b @0 :Bool; } }",
            "m.capnp",
            &mut info,
        );
        assert_eq!(count, 2);

        let outer = info.internal_types_by_name["m.capnp:Outer"];
        let inner = info.internal_types_by_name["m.capnp:Outer.Inner"];
        assert_eq!(info.schema_parent_of[&inner], outer);
        assert_eq!(info.descriptor(inner).unwrap().flat_name(), "Outer_Inner");
        // children precede their declaring struct in emission order
        assert_eq!(info.internal_order, vec![inner, outer]);
    }

    #[test]
    fn test_same_name_in_two_files_distinguished_by_id() {
        let mut info = SchemaInfo::new(FileId("a.capnp".into()));
        classify("struct Point { x @0 :Int32; }", "a.capnp", &mut info);
        classify("struct Point { x @0 :Int32; }", "b.capnp", &mut info);

        assert_eq!(info.internal_types_by_id.len(), 1);
        assert_eq!(info.external_types.len(), 1);
        let internal = info.internal_types_by_name["a.capnp:Point"];
        assert!(info.descriptor(internal).is_some());
    }

    #[test]
    fn test_field_reference_resolution_scopes() {
        let mut info = SchemaInfo::new(FileId("m.capnp".into()));
        classify(
            r#"
            struct Outer {
                inner @0 :Inner;
                deep @1 :Inner.Deep;
                struct Inner {
                    sibling @0 :Deep;
                    up @1 :Outer;
                    struct Deep { v @0 :Bool; }
                }
            }
            "#,
            "m.capnp",
            &mut info,
        );

        let unresolved = resolve_field_references(&mut info);
        assert_eq!(unresolved, 0);

        let outer = info.internal_types_by_name["m.capnp:Outer"];
        let inner = info.internal_types_by_name["m.capnp:Outer.Inner"];
        let deep = info.internal_types_by_name["m.capnp:Outer.Inner.Deep"];

        let fields_of = |id: TypeId| match &info.descriptor(id).unwrap().kind {
            TypeKind::Struct { fields } => fields.clone(),
            _ => panic!("expected struct"),
        };

        assert_eq!(fields_of(outer)[0].ty, ResolvedType::Type(inner));
        assert_eq!(fields_of(outer)[1].ty, ResolvedType::Type(deep));
        assert_eq!(fields_of(inner)[0].ty, ResolvedType::Type(deep));
        assert_eq!(fields_of(inner)[1].ty, ResolvedType::Type(outer));
    }

    #[test]
    fn test_alias_qualified_reference() {
        let mut info = SchemaInfo::new(FileId("m.capnp".into()));
        classify("struct Home { pos @0 :Geo.Point; }", "m.capnp", &mut info);
        classify("struct Point { x @0 :Float64; }", "geo.capnp", &mut info);
        info.file_aliases
            .entry(FileId("m.capnp".into()))
            .or_default()
            .insert("Geo".to_string(), FileId("geo.capnp".into()));

        assert_eq!(resolve_field_references(&mut info), 0);

        let home = info.internal_types_by_name["m.capnp:Home"];
        let point = info.file_scopes[&FileId("geo.capnp".into())]["Point"];
        match &info.descriptor(home).unwrap().kind {
            TypeKind::Struct { fields } => {
                assert_eq!(fields[0].ty, ResolvedType::Type(point))
            }
            _ => panic!("expected struct"),
        }
    }

    #[test]
    fn test_unresolved_reference_is_flagged_not_internal() {
        let mut info = SchemaInfo::new(FileId("m.capnp".into()));
        classify("struct S { bad @0 :Missing.Thing; }", "m.capnp", &mut info);

        assert_eq!(resolve_field_references(&mut info), 1);
        assert_eq!(info.diagnostics.len(), 1);
        assert!(info.diagnostics[0].contains("Missing.Thing"));

        let s = info.internal_types_by_name["m.capnp:S"];
        match &info.descriptor(s).unwrap().kind {
            TypeKind::Struct { fields } => assert_eq!(
                fields[0].ty,
                ResolvedType::Unresolved("Missing.Thing".to_string())
            ),
            _ => panic!("expected struct"),
        }
    }
}
