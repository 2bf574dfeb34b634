//! Schema parser collaborator interface
//!
//! The generation pipeline never talks to a concrete IDL front end directly.
//! It consumes [`SchemaParser`], which hands back a navigable [`SchemaTree`]
//! with stable numeric ids, display names, field lists, and the namespace
//! annotation. The built-in front end for the supported `.capnp` subset
//! lives in [`capnp`]; a different front end can be substituted behind the
//! same trait without touching resolution or rendering.

pub mod capnp;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use capnp::CapnpParser;

/// Primitive field types understood by the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Text,
    Data,
}

impl PrimitiveKind {
    /// Parse a primitive type name, if it is one
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Void" => PrimitiveKind::Void,
            "Bool" => PrimitiveKind::Bool,
            "Int8" => PrimitiveKind::Int8,
            "Int16" => PrimitiveKind::Int16,
            "Int32" => PrimitiveKind::Int32,
            "Int64" => PrimitiveKind::Int64,
            "UInt8" => PrimitiveKind::UInt8,
            "UInt16" => PrimitiveKind::UInt16,
            "UInt32" => PrimitiveKind::UInt32,
            "UInt64" => PrimitiveKind::UInt64,
            "Float32" => PrimitiveKind::Float32,
            "Float64" => PrimitiveKind::Float64,
            "Text" => PrimitiveKind::Text,
            "Data" => PrimitiveKind::Data,
            _ => return None,
        })
    }
}

/// A field's declared type, before reference resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(PrimitiveKind),
    List(Box<FieldType>),
    /// Dotted reference to a declared type, e.g. `Address` or `geo.Point`
    Named(String),
}

/// A field declaration inside a struct
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ordinal: u16,
    pub ty: FieldType,
    /// Index of the anonymous union block this field belongs to, if any.
    /// Block indices are assigned in source order per struct level.
    pub union_block: Option<usize>,
}

/// A single enumerant of an enum declaration
#[derive(Debug, Clone)]
pub struct EnumerantDecl {
    pub name: String,
    pub ordinal: u16,
}

/// Body of a type declaration
#[derive(Debug, Clone)]
pub enum TypeBody {
    Struct {
        fields: Vec<FieldDecl>,
        /// Number of anonymous union blocks seen directly at this level
        union_blocks: usize,
    },
    Enum {
        enumerants: Vec<EnumerantDecl>,
    },
}

/// A struct or enum declaration, possibly with nested declarations
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    /// Stable numeric id, declared via `@0x…` or derived by the front end
    pub id: u64,
    pub body: TypeBody,
    pub nested: Vec<TypeDecl>,
}

impl TypeDecl {
    pub fn is_struct(&self) -> bool {
        matches!(self.body, TypeBody::Struct { .. })
    }
}

/// An import declaration found in a schema file
#[derive(Debug, Clone)]
pub struct ImportDecl {
    /// `using Alias = import "…";` carries an alias; bare imports do not
    pub alias: Option<String>,
    /// The raw reference text, exactly as written in the schema
    pub target: String,
}

/// A parsed schema file
#[derive(Debug, Clone)]
pub struct SchemaTree {
    /// Stable numeric id of the file itself (scope parent of top-level types)
    pub file_id: u64,
    /// Declared output namespace, empty when the file declares none
    pub namespace: String,
    pub imports: Vec<ImportDecl>,
    pub types: Vec<TypeDecl>,
}

/// The parser collaborator consumed by the import resolver.
///
/// Failures are reported as error values carrying the offending path and a
/// human-readable description; they never unwind past the resolver except
/// for the root file's own parse.
pub trait SchemaParser {
    fn parse(
        &self,
        base_dir: &Path,
        relative_path: &Path,
        search_paths: &[PathBuf],
    ) -> Result<SchemaTree>;
}
