//! Source transformation
//!
//! A [`Transformer`] turns module source text into the code stored in the
//! bundle and reports the raw specifiers that code imports. The graph builder
//! treats it as a black box; [`ModuleLowering`] is the built-in implementation.

mod lexer;
mod lower;
mod strip;

use thiserror::Error;

use crate::options::Dialect;

pub use lower::ModuleLowering;

/// Output of a single transformation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformed {
    /// Code the runtime evaluates with `exports` and `require` in scope
    pub code: String,
    /// Raw import specifiers, in first-occurrence order without duplicates
    pub specifiers: Vec<String>,
}

impl Transformed {
    pub fn new(code: impl Into<String>, specifiers: Vec<String>) -> Self {
        Self {
            code: code.into(),
            specifiers,
        }
    }
}

/// Errors raised when source text cannot be compiled
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Source could not be tokenized
    #[error("{message} (line {line}:{column})")]
    Lex {
        message: String,
        line: u32,
        column: u32,
    },

    /// Malformed or unsupported module syntax
    #[error("{message} (line {line}:{column})")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },

    /// Failure reported by an external transformer
    #[error("{0}")]
    Custom(String),
}

/// Compiles module source for a dialect
pub trait Transformer {
    fn transform(&self, source: &str, dialect: Dialect) -> Result<Transformed, TransformError>;
}

impl<F> Transformer for F
where
    F: Fn(&str, Dialect) -> Result<Transformed, TransformError>,
{
    fn transform(&self, source: &str, dialect: Dialect) -> Result<Transformed, TransformError> {
        self(source, dialect)
    }
}
