//! Module sources
//!
//! The file system seen by resolution and loading. Paths handed to a
//! [`ModuleSource`] are always root-relative, `/`-separated and normalized.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Read-only view of the tree modules are bundled from
pub trait ModuleSource {
    /// Whether `path` names a readable file
    fn is_file(&self, path: &str) -> bool;

    /// Whether `path` names a directory
    fn is_dir(&self, path: &str) -> bool;

    /// Read the text of the file at `path`
    fn read(&self, path: &str) -> io::Result<String>;
}

impl<S: ModuleSource + ?Sized> ModuleSource for &S {
    fn is_file(&self, path: &str) -> bool {
        (**self).is_file(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        (**self).is_dir(path)
    }

    fn read(&self, path: &str) -> io::Result<String> {
        (**self).read(path)
    }
}

/// Modules on disk under a project root
#[derive(Debug, Clone)]
pub struct FileSystem {
    root: PathBuf,
}

impl FileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

impl ModuleSource for FileSystem {
    fn is_file(&self, path: &str) -> bool {
        self.locate(path).is_file()
    }

    fn is_dir(&self, path: &str) -> bool {
        self.locate(path).is_dir()
    }

    fn read(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.locate(path))
    }
}

/// An in-memory module tree
///
/// Directories exist implicitly as prefixes of inserted files.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file
    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }

    /// Builder-style [`MemorySource::insert`]
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ModuleSource for MemorySource {
    fn is_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        let prefix = format!("{}/", path);
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(name, _)| name.starts_with(&prefix))
    }

    fn read(&self, path: &str) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such module: {}", path))
        })
    }
}
