//! Bundling errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::module::{ClosureError, ModuleId, ResolveError};
use crate::transform::TransformError;

/// Errors that abort a build. No partial bundle is produced.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The entry point could not be located
    #[error("Cannot resolve entry '{entry}': {source}")]
    Entry {
        entry: String,
        #[source]
        source: ResolveError,
    },

    /// An import specifier could not be resolved
    #[error("Cannot resolve '{specifier}' imported by {importer}: {source}")]
    Resolution {
        importer: ModuleId,
        specifier: String,
        #[source]
        source: ResolveError,
    },

    /// The transformer rejected a module's source
    #[error("Transform error in {module}: {source}")]
    Transform {
        module: ModuleId,
        #[source]
        source: TransformError,
    },

    /// A module's source could not be read
    #[error("IO error reading {module}: {source}")]
    Io {
        module: ModuleId,
        #[source]
        source: io::Error,
    },

    /// The module table refers to a module it does not contain
    #[error(transparent)]
    Closure(#[from] ClosureError),

    /// The entry id is not a key of the module table
    #[error("Entry module {0} is not in the module table")]
    MissingEntry(ModuleId),

    /// The module table could not be serialized
    #[error("Failed to serialize module table: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The bundle could not be persisted
    #[error("Failed to write bundle to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid project configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BundleError {
    /// Module the failure is attributed to, if any
    pub fn module(&self) -> Option<&ModuleId> {
        match self {
            BundleError::Resolution { importer, .. } => Some(importer),
            BundleError::Transform { module, .. } | BundleError::Io { module, .. } => Some(module),
            BundleError::Closure(err) => Some(&err.module),
            BundleError::MissingEntry(id) => Some(id),
            _ => None,
        }
    }

    /// Specifier that triggered the failure, if any
    pub fn specifier(&self) -> Option<&str> {
        match self {
            BundleError::Entry { entry, .. } => Some(entry),
            BundleError::Resolution { specifier, .. } => Some(specifier),
            BundleError::Closure(err) => Some(&err.specifier),
            _ => None,
        }
    }
}

/// Result type for bundling operations
pub type BundleResult<T> = Result<T, BundleError>;
