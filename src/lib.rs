//! podgen
//!
//! Schema-driven code generator for Cap'n Proto schemas. Reads `.capnp`
//! files and emits, per root input file, plain-data (POD) record
//! declarations plus bidirectional conversion routines between those records
//! and the serialization library's generated representation, rendered
//! through runtime-loaded templates.
//!
//! ## Pipeline
//!
//! ```text
//! ImportResolver ──> parser collaborator (one tree per reachable file)
//!        │
//!        ├── Type Classifier   internal vs external, parent links
//!        ├── Union Analyzer    discriminant assignment
//!        └── Namespace registry per file
//!        ▼
//!   SchemaInfo (one per root file)
//!        ▼
//!   Template Renderer ── pod header / convert header / convert source
//! ```
//!
//! Each root file is processed independently; nothing outlives its run.

pub mod error;
pub mod graph;
pub mod parser;
pub mod render;

pub use error::{PodgenError, Result};
pub use graph::{FileId, ImportResolver, SchemaInfo, TypeId};
pub use parser::{CapnpParser, SchemaParser};
pub use render::{generate_for_root, Artifacts};
