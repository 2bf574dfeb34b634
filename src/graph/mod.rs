//! Schema type graph
//!
//! Flat id-indexed type maps with explicit parent links, built per root
//! input file. The parser's recursive declaration tree is flattened here so
//! lookup by id is O(1) and no ownership cycles exist. All lookup structures
//! live in [`SchemaInfo`], which is mutable while the import resolver runs
//! and read-only during rendering.

pub mod classify;
pub mod resolve;
pub mod unions;

pub use classify::classify_tree;
pub use resolve::ImportResolver;

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::error::{PodgenError, Result};
use crate::parser::PrimitiveKind;

/// Identity of a schema file within one run: its normalized, CWD-relative
/// path with forward slashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque wrapper over the parser collaborator's numeric id. Resolution and
/// generation never depend on the concrete numbering scheme behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub u64);

/// A field's type after reference resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedType {
    Primitive(PrimitiveKind),
    List(Box<ResolvedType>),
    Type(TypeId),
    /// A reference that resolved to neither a primitive nor a known type.
    /// Flagged with a diagnostic when detected; kept so degraded output can
    /// still name what was written in the schema.
    Unresolved(String),
}

/// A struct field, ordinal-ordered within its descriptor
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub ordinal: u16,
    pub ty: ResolvedType,
    /// Set only for members of the owning struct's union group
    pub discriminant: Option<u16>,
}

/// An enum variant
#[derive(Debug, Clone)]
pub struct Enumerant {
    pub name: String,
    pub ordinal: u16,
}

/// Kind-specific payload of a type descriptor
#[derive(Debug, Clone)]
pub enum TypeKind {
    Struct { fields: Vec<FieldDescriptor> },
    Enum { enumerants: Vec<Enumerant> },
}

/// One declared type, flattened out of the parser tree
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Globally unique display name within one run: `<file>:<Outer.Inner>`
    pub display_name: String,
    /// Declaration path within the file, outermost first
    pub local_path: Vec<String>,
    pub id: TypeId,
    /// File that declares this type
    pub file: FileId,
    pub kind: TypeKind,
}

impl TypeDescriptor {
    /// Last segment of the declaration path
    pub fn local_name(&self) -> &str {
        self.local_path.last().map(String::as_str).unwrap_or("")
    }

    /// Declaration path joined with `_`, the flattened generated name
    pub fn flat_name(&self) -> String {
        self.local_path.join("_")
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct { .. })
    }
}

/// A member of an anonymous union group
#[derive(Debug, Clone)]
pub struct UnionMember {
    pub field_name: String,
    pub discriminant: u16,
}

/// The single anonymous union group of a struct, discriminants assigned
/// 0..n-1 in declaration order.
#[derive(Debug, Clone)]
pub struct UnionGroup {
    pub owner: TypeId,
    pub members: Vec<UnionMember>,
}

/// Everything generation needs for one root input file.
///
/// Created fresh per root file, populated by the import resolver, consumed
/// by the three render calls, then discarded.
#[derive(Debug)]
pub struct SchemaInfo {
    /// The file whose artifacts are being generated; types declared here are
    /// internal, everything else is external.
    pub anchor: FileId,

    /// Internal types indexed by display name
    pub internal_types_by_name: HashMap<String, TypeId>,
    /// Internal types indexed by id
    pub internal_types_by_id: HashMap<TypeId, TypeDescriptor>,
    /// Internal ids in emission order: children before their declaring
    /// struct, otherwise declaration order.
    pub internal_order: Vec<TypeId>,

    /// Child type id -> enclosing scope id (a struct's id, or the file id
    /// for top-level declarations). Acyclic by construction: every parent is
    /// recorded before its children are visited.
    pub schema_parent_of: HashMap<TypeId, TypeId>,

    /// Types referenced but declared in an imported file
    pub external_types: HashMap<TypeId, TypeDescriptor>,
    /// External type id -> include path of its generated pod header
    pub pod_headers: HashMap<TypeId, String>,

    /// Declared output namespace per file identity ("" = global)
    pub import_namespaces: HashMap<FileId, String>,
    /// Using-alias -> resolved file identity, recorded only for imports that
    /// contributed at least one type.
    pub import_aliases: HashMap<String, FileId>,

    /// Union group per owning struct id
    pub unions: HashMap<TypeId, UnionGroup>,

    /// Human-readable diagnostic lines collected while building (skipped
    /// imports, unresolved references). Also traced at `warn`; the CLI
    /// prints them so degraded output is never silent.
    pub diagnostics: Vec<String>,

    // Construction-time indexes for the field-reference resolution pass.
    /// Top-level type name -> id, per file
    pub(crate) file_scopes: HashMap<FileId, HashMap<String, TypeId>>,
    /// Nested type name -> id, per declaring struct
    pub(crate) children: HashMap<TypeId, HashMap<String, TypeId>>,
    /// Alias -> imported file, per importing file
    pub(crate) file_aliases: HashMap<FileId, HashMap<String, FileId>>,
}

impl SchemaInfo {
    pub fn new(anchor: FileId) -> Self {
        SchemaInfo {
            anchor,
            internal_types_by_name: HashMap::new(),
            internal_types_by_id: HashMap::new(),
            internal_order: Vec::new(),
            schema_parent_of: HashMap::new(),
            external_types: HashMap::new(),
            pod_headers: HashMap::new(),
            import_namespaces: HashMap::new(),
            import_aliases: HashMap::new(),
            unions: HashMap::new(),
            diagnostics: Vec::new(),
            file_scopes: HashMap::new(),
            children: HashMap::new(),
            file_aliases: HashMap::new(),
        }
    }

    /// Look up a descriptor regardless of classification
    pub fn descriptor(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.internal_types_by_id
            .get(&id)
            .or_else(|| self.external_types.get(&id))
    }

    pub fn is_internal(&self, id: TypeId) -> bool {
        self.internal_types_by_id.contains_key(&id)
    }

    /// Namespace of the file declaring `id`, empty when undeclared
    pub fn namespace_of(&self, id: TypeId) -> &str {
        self.descriptor(id)
            .and_then(|d| self.import_namespaces.get(&d.file))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Additive, idempotent merge of one descriptor.
    ///
    /// Returns `true` when the descriptor was newly added. Re-encountering
    /// the same id with identical data (diamond imports) is a no-op.
    /// Divergent data for an already-merged id is a resolver bug and is
    /// surfaced, never overwritten.
    pub fn merge_descriptor(
        &mut self,
        descriptor: TypeDescriptor,
        pod_header: Option<String>,
    ) -> Result<bool> {
        let id = descriptor.id;
        if let Some(existing) = self.descriptor(id) {
            if existing.display_name != descriptor.display_name
                || existing.file != descriptor.file
            {
                warn!(
                    id = id.0,
                    existing = %existing.display_name,
                    merged = %descriptor.display_name,
                    "divergent data for already-merged type id"
                );
                return Err(PodgenError::DivergentMerge {
                    name: descriptor.display_name,
                });
            }
            return Ok(false);
        }

        if descriptor.file == self.anchor {
            self.internal_types_by_name
                .insert(descriptor.display_name.clone(), id);
            self.internal_order.push(id);
            self.internal_types_by_id.insert(id, descriptor);
        } else {
            self.external_types.insert(id, descriptor);
            if let Some(header) = pod_header {
                self.pod_headers.insert(id, header);
            }
        }
        Ok(true)
    }
}
