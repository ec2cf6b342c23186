//! Module path resolution
//!
//! Turns import specifiers into canonical [`ModuleId`]s.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use super::id::{normalize, ModuleId};
use super::source::ModuleSource;
use crate::options::Dialect;

/// Errors that can occur during module resolution
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No candidate file exists
    #[error("Module not found: {specifier} (tried: {tried:?})")]
    ModuleNotFound { specifier: String, tried: Vec<String> },

    /// The specifier climbs above the project root
    #[error("Module path escapes the project root: {0}")]
    OutsideRoot(String),

    /// Empty import specifier
    #[error("Empty import specifier")]
    EmptySpecifier,

    /// Bare package specifiers have no package lookup to resolve against
    #[error("Package imports not supported: {0}")]
    PackageNotSupported(String),

    /// Remote modules are never fetched
    #[error("URL imports not supported: {0}")]
    UrlNotSupported(String),
}

/// Resolves specifiers against a [`ModuleSource`]
///
/// Resolution only consults the source for existence checks; it never reads
/// module contents.
#[derive(Clone, Copy)]
pub struct PathResolver<'s> {
    source: &'s dyn ModuleSource,
}

impl<'s> PathResolver<'s> {
    /// Create a new resolver over `source`
    pub fn new(source: &'s dyn ModuleSource) -> Self {
        Self { source }
    }

    /// Resolve an import specifier written in `importer`
    ///
    /// # Resolution Order
    /// For `require("./util")` under the typed-superset dialect:
    /// 1. `./util.ts` (the dialect suffix is appended when the specifier has no
    ///    recognised extension)
    /// 2. `./util/index.ts` when `./util` is a directory
    pub fn resolve(
        &self,
        specifier: &str,
        importer: &ModuleId,
        dialect: Dialect,
    ) -> Result<ModuleId, ResolveError> {
        if specifier.is_empty() {
            return Err(ResolveError::EmptySpecifier);
        }

        if specifier.starts_with("http://") || specifier.starts_with("https://") {
            return Err(ResolveError::UrlNotSupported(specifier.to_string()));
        }

        let base = if is_relative(specifier) {
            Path::new(importer.parent_dir()).join(specifier)
        } else if let Some(rooted) = specifier.strip_prefix('/') {
            PathBuf::from(rooted)
        } else {
            return Err(ResolveError::PackageNotSupported(specifier.to_string()));
        };

        let resolved = self.locate(specifier, &base, dialect)?;
        trace!(specifier, importer = %importer, resolved = %resolved, "resolved specifier");
        Ok(resolved)
    }

    /// Resolve the entry point, given as a path relative to the project root
    pub fn resolve_entry(&self, entry: &str, dialect: Dialect) -> Result<ModuleId, ResolveError> {
        if entry.is_empty() {
            return Err(ResolveError::EmptySpecifier);
        }
        self.locate(entry, Path::new(entry.trim_start_matches('/')), dialect)
    }

    fn locate(&self, specifier: &str, base: &Path, dialect: Dialect) -> Result<ModuleId, ResolveError> {
        let parts =
            normalize(base).ok_or_else(|| ResolveError::OutsideRoot(specifier.to_string()))?;
        let suffix = dialect.canonical_suffix();
        let mut tried = Vec::new();

        if parts.is_empty() {
            // The specifier names the root directory itself
            let index = ModuleId::new(format!("index.{}", suffix));
            tried.push(index.to_string());
            if self.source.is_file(index.as_str()) {
                return Ok(index);
            }
            return Err(ResolveError::ModuleNotFound {
                specifier: specifier.to_string(),
                tried,
            });
        }

        let candidate = ModuleId::new(parts.join("/"));

        // Try 1: the candidate with the dialect suffix rule applied
        let suffixed = with_dialect_suffix(&candidate, dialect);
        tried.push(suffixed.to_string());
        if self.source.is_file(suffixed.as_str()) {
            return Ok(suffixed);
        }

        // Try 2: candidate/index.<suffix>
        if self.source.is_dir(candidate.as_str()) {
            let index = ModuleId::new(format!("{}/index.{}", candidate, suffix));
            tried.push(index.to_string());
            if self.source.is_file(index.as_str()) {
                return Ok(index);
            }
        }

        Err(ResolveError::ModuleNotFound {
            specifier: specifier.to_string(),
            tried,
        })
    }
}

/// Append the dialect's canonical suffix unless the id already ends in an
/// extension the dialect recognises
pub fn with_dialect_suffix(id: &ModuleId, dialect: Dialect) -> ModuleId {
    match id.extension() {
        Some(ext) if dialect.recognizes(ext) => id.clone(),
        _ => ModuleId::new(format!("{}.{}", id, dialect.canonical_suffix())),
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}
