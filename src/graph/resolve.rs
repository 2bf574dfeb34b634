//! Import Resolver
//!
//! Turns raw import references into loadable paths, drives the parser over
//! the transitive import set, and aggregates every per-file result into one
//! [`SchemaInfo`] for the root input file. A failing import is logged and
//! skipped; only the root file's own parse is allowed to fail the run.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::parser::SchemaParser;

use super::{classify, FileId, SchemaInfo};

/// Import references under this prefix are the serialization library's own
/// built-ins; they are never resolved or merged.
pub const RESERVED_IMPORT_PREFIX: &str = "/capnp/";

/// Resolve a raw import reference found in `importing`.
///
/// Returns `None` for reserved system imports. References starting with `/`
/// are rooted at `schema_root` with the separator stripped; everything else
/// resolves against the importing file's parent directory, `..` components
/// popping one level.
pub fn resolve_import(importing: &Path, raw: &str, schema_root: &Path) -> Option<PathBuf> {
    if raw.starts_with(RESERVED_IMPORT_PREFIX) {
        return None;
    }
    if let Some(rooted) = raw.strip_prefix('/') {
        return Some(schema_root.join(rooted));
    }

    let mut path = importing.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    for component in Path::new(raw).components() {
        match component {
            Component::ParentDir => {
                path.pop();
            }
            Component::Normal(part) => path.push(part),
            _ => {}
        }
    }
    Some(path)
}

/// Normalize a path into a run-wide file identity: its spelling relative to
/// the process working directory. Absolute and relative references to the
/// same file collapse to one identity, so the visited set and the
/// idempotent merge see one spelling per file.
pub fn file_identity(path: &Path) -> FileId {
    let key = relative_to_cwd(path).to_string_lossy().replace('\\', "/");
    FileId(key)
}

fn relative_to_cwd(path: &Path) -> PathBuf {
    let cwd = match std::env::current_dir() {
        Ok(cwd) => lexical_normal(&cwd),
        Err(_) => return lexical_normal(path),
    };
    let absolute = if path.is_absolute() {
        lexical_normal(path)
    } else {
        lexical_normal(&cwd.join(path))
    };
    relative_between(&absolute, &cwd)
}

/// Resolve `.` and `..` components without touching the filesystem
fn lexical_normal(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn relative_between(target: &Path, base: &Path) -> PathBuf {
    let mut target = target.components().peekable();
    let mut base = base.components().peekable();
    while let (Some(t), Some(b)) = (target.peek(), base.peek()) {
        if t != b {
            break;
        }
        target.next();
        base.next();
    }
    let mut out = PathBuf::new();
    for _ in base {
        out.push("..");
    }
    for component in target {
        out.push(component.as_os_str());
    }
    out
}

/// Drives parsing and classification over a root file and its transitive
/// imports, producing a fresh [`SchemaInfo`] per root file.
pub struct ImportResolver<'p, P: SchemaParser> {
    parser: &'p P,
    schema_root: PathBuf,
    search_paths: Vec<PathBuf>,
}

impl<'p, P: SchemaParser> ImportResolver<'p, P> {
    pub fn new(parser: &'p P, schema_root: impl Into<PathBuf>) -> Self {
        ImportResolver {
            parser,
            schema_root: schema_root.into(),
            search_paths: Vec::new(),
        }
    }

    /// Extra directories handed through to the parser collaborator
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Build the root file's SchemaInfo.
    ///
    /// The root parse and its classification propagate errors; each import
    /// is contained: a failure is logged and that import skipped, leaving
    /// its types absent from the external map (degraded, not aborted).
    pub fn build_schema_info(&self, root: &Path) -> Result<SchemaInfo> {
        let anchor = file_identity(root);
        let tree = self
            .parser
            .parse(Path::new(""), root, &self.search_paths)?;

        let mut schema = SchemaInfo::new(anchor.clone());
        if !tree.namespace.is_empty() {
            info!(namespace = %tree.namespace, "found namespace");
        }
        schema
            .import_namespaces
            .insert(anchor.clone(), tree.namespace.clone());

        classify::classify_tree(&tree, &anchor, &mut schema)?;

        let mut visited: HashSet<FileId> = HashSet::new();
        visited.insert(anchor.clone());
        // files that contributed at least one type; only their aliases count
        let mut contributing: HashSet<FileId> = HashSet::new();

        // (importing file, declared alias, resolved path)
        let mut queue: Vec<(FileId, Option<String>, PathBuf)> = Vec::new();
        enqueue_imports(&tree, &anchor, &self.schema_root, &mut queue);

        while let Some((from, alias, path)) = queue.pop() {
            let identity = file_identity(&path);
            if !visited.insert(identity.clone()) {
                // already merged in this run: re-encounter is a no-op, but
                // the alias still has to work for reference resolution
                if let Some(alias) = alias {
                    if contributing.contains(&identity) {
                        self.register_alias(&mut schema, &from, alias, &identity);
                    }
                }
                continue;
            }

            let imported = match self.parser.parse(Path::new(""), &path, &self.search_paths) {
                Ok(tree) => tree,
                Err(e) => {
                    warn!(import = %identity, "ignoring import error: {e}");
                    schema.diagnostics.push(format!("ignoring import error: {e}"));
                    continue;
                }
            };

            let contributed = match classify::classify_tree(&imported, &identity, &mut schema) {
                Ok(count) => count,
                Err(e) => {
                    warn!(import = %identity, "ignoring import error: {e}");
                    schema.diagnostics.push(format!("ignoring import error: {e}"));
                    continue;
                }
            };

            info!(import = %identity, namespace = %imported.namespace, "parsed import");

            if contributed > 0 {
                contributing.insert(identity.clone());
                schema
                    .import_namespaces
                    .insert(identity.clone(), imported.namespace.clone());
                if let Some(alias) = alias {
                    self.register_alias(&mut schema, &from, alias, &identity);
                }
            }

            enqueue_imports(&imported, &identity, &self.schema_root, &mut queue);
        }

        let unresolved = classify::resolve_field_references(&mut schema);
        if unresolved > 0 {
            warn!(
                count = unresolved,
                root = %schema.anchor,
                "schema graph has unresolved type references"
            );
        }

        Ok(schema)
    }

    fn register_alias(&self, schema: &mut SchemaInfo, from: &FileId, alias: String, target: &FileId) {
        schema
            .file_aliases
            .entry(from.clone())
            .or_default()
            .insert(alias.clone(), target.clone());
        schema.import_aliases.insert(alias, target.clone());
    }
}

fn enqueue_imports(
    tree: &crate::parser::SchemaTree,
    from: &FileId,
    schema_root: &Path,
    queue: &mut Vec<(FileId, Option<String>, PathBuf)>,
) {
    // queue is a stack; push in reverse so imports process in declaration order
    for import in tree.imports.iter().rev() {
        if let Some(path) = resolve_import(Path::new(from.as_str()), &import.target, schema_root) {
            queue.push((from.clone(), import.alias.clone(), path));
        }
    }
}
