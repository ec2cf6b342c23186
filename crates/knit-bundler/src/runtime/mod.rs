//! In-process module runtime
//!
//! The same instantiation state machine as the emitted bundle loader, driven
//! from Rust. Code evaluation is delegated to a [`ModuleHost`].

mod loader;

use thiserror::Error;

use crate::module::ModuleId;

pub use loader::{Loader, Require, DEFAULT_MAX_DEPTH};

/// Instantiation state of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleState {
    /// Never required
    #[default]
    Unrequested,
    /// Code is running (possibly re-entered through a cycle)
    Executing,
    /// The most recent execution finished
    Completed,
}

/// Errors raised while loading modules
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The id is not a key of the module table
    #[error("Module not found in bundle: {0}")]
    MissingModule(ModuleId),

    /// A module required a specifier its specifier map does not contain
    #[error("Cannot find module '{specifier}' from {module}")]
    UnresolvedSpecifier { module: ModuleId, specifier: String },

    /// Nested requires went deeper than the loader allows
    #[error("Maximum require depth {depth} exceeded loading {module}")]
    DepthExceeded { module: ModuleId, depth: usize },

    /// The host failed to run a module's code
    #[error("Error executing {module}: {message}")]
    Execution { module: ModuleId, message: String },
}

impl LoadError {
    pub fn execution(module: &ModuleId, message: impl Into<String>) -> Self {
        LoadError::Execution {
            module: module.clone(),
            message: message.into(),
        }
    }
}

/// Evaluates module code
///
/// This is the single point where compiled code is run. The host receives the
/// module's fresh exports container and a [`Require`] scoped to the module's
/// specifier map, and nothing else.
pub trait ModuleHost: Sized {
    /// Shared handle to a module's exports container
    type Exports: Clone;

    /// Create an empty exports container
    fn new_exports(&mut self) -> Self::Exports;

    /// Run `code` against `exports`
    fn execute(
        &mut self,
        module: &ModuleId,
        code: &str,
        exports: &Self::Exports,
        require: &mut Require<'_, '_, Self>,
    ) -> Result<(), LoadError>;
}
