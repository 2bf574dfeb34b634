//! Artifact naming transforms
//!
//! One fixed transform derives the pod header path (and the include name
//! dependents use); a second adds the `.convert` marker for the conversion
//! header and source. Deterministic per schema path, so output paths never
//! collide across root files.

use std::path::{Path, PathBuf};

/// `a/b/foo.capnp` -> `a/b/foo.pod.hpp`
pub fn pod_header_path(schema: &Path) -> PathBuf {
    schema.with_extension("pod.hpp")
}

/// `a/b/foo.capnp` -> `a/b/foo.convert.hpp`
pub fn convert_header_path(schema: &Path) -> PathBuf {
    schema.with_extension("convert.hpp")
}

/// `a/b/foo.capnp` -> `a/b/foo.convert.cpp`
pub fn convert_source_path(schema: &Path) -> PathBuf {
    schema.with_extension("convert.cpp")
}

/// Include path for a file's generated pod header, from its identity string
pub fn pod_include_name(file_key: &str) -> String {
    pod_header_path(Path::new(file_key))
        .to_string_lossy()
        .replace('\\', "/")
}

/// Include path for a file's generated conversion header
pub fn convert_include_name(file_key: &str) -> String {
    convert_header_path(Path::new(file_key))
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_and_convert_transforms() {
        let schema = Path::new("msg/person.capnp");
        assert_eq!(pod_header_path(schema), PathBuf::from("msg/person.pod.hpp"));
        assert_eq!(
            convert_header_path(schema),
            PathBuf::from("msg/person.convert.hpp")
        );
        assert_eq!(
            convert_source_path(schema),
            PathBuf::from("msg/person.convert.cpp")
        );
    }

    #[test]
    fn test_include_names() {
        assert_eq!(pod_include_name("geo/point.capnp"), "geo/point.pod.hpp");
        assert_eq!(
            convert_include_name("geo/point.capnp"),
            "geo/point.convert.hpp"
        );
    }
}
