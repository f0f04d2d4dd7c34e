//! Locating imported protocols.

use crate::error::{RunError, RunResult};
use fcp_types::SourceFile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Turns an `import "uri"` into protocol source text.
pub trait ImportResolver {
    /// Resolve `uri` as written in `from`.
    fn resolve(&self, from: &SourceFile, uri: &str) -> RunResult<SourceFile>;
}

/// Reads imports from disk, relative to the importing file's directory.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    /// Searched after the importing file's directory.
    pub search_paths: Vec<PathBuf>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}

impl ImportResolver for FileResolver {
    fn resolve(&self, from: &SourceFile, uri: &str) -> RunResult<SourceFile> {
        let relative = Path::new(&from.name)
            .parent()
            .map(|dir| dir.join(uri))
            .unwrap_or_else(|| PathBuf::from(uri));
        let candidates = std::iter::once(relative)
            .chain(self.search_paths.iter().map(|dir| dir.join(uri)));
        for path in candidates {
            if path.is_file() {
                let name = path.to_string_lossy().into_owned();
                tracing::debug!(import = uri, path = %name, "resolved import");
                let source = std::fs::read_to_string(&path).map_err(|source| RunError::Io {
                    path: name.clone(),
                    source,
                })?;
                return Ok(SourceFile::new(name, source));
            }
        }
        Err(RunError::ImportNotFound(uri.to_string()))
    }
}

/// Serves imports from an in-memory map of `uri -> source`.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    files: BTreeMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, uri: impl Into<String>, source: impl Into<String>) -> Self {
        self.files.insert(uri.into(), source.into());
        self
    }
}

impl ImportResolver for MemoryResolver {
    fn resolve(&self, _from: &SourceFile, uri: &str) -> RunResult<SourceFile> {
        self.files
            .get(uri)
            .map(|source| SourceFile::new(uri, source.as_str()))
            .ok_or_else(|| RunError::ImportNotFound(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryResolver::new().with_file("lib.txt", "library {\n}\n");
        let from = SourceFile::new("main.txt", "");
        assert_eq!(resolver.resolve(&from, "lib.txt").unwrap().name, "lib.txt");
        assert!(matches!(
            resolver.resolve(&from, "missing.txt"),
            Err(RunError::ImportNotFound(uri)) if uri == "missing.txt"
        ));
    }

    #[test]
    fn test_file_resolver_reads_relative_to_importer() {
        let dir = std::env::temp_dir().join(format!("fcp-resolver-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("lib.txt"), "inputs {\n    x = 1\n}\n").unwrap();
        let from = SourceFile::new(dir.join("main.txt").to_string_lossy(), "");

        let resolved = FileResolver::new().resolve(&from, "lib.txt").unwrap();
        assert!(resolved.source.contains("x = 1"));
        assert!(matches!(
            FileResolver::new().resolve(&from, "nope.txt"),
            Err(RunError::ImportNotFound(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
