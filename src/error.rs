//! Error types for the generation pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Result type for podgen operations
pub type Result<T> = std::result::Result<T, PodgenError>;

/// Generation pipeline errors
#[derive(Error, Debug)]
pub enum PodgenError {
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("error loading template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("template render error: {0}")]
    Render(#[from] tera::Error),

    #[error("error writing to {}: {source}", path.display())]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("struct {type_name} declares more than one anonymous union group")]
    MultipleUnionGroups { type_name: String },

    #[error("conflicting definitions merged for type {name}")]
    DivergentMerge { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
