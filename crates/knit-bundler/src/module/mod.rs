//! Module identity, resolution and graph construction

mod graph;
mod id;
mod resolver;
mod source;
mod table;

pub use graph::GraphBuilder;
pub use id::ModuleId;
pub use resolver::{with_dialect_suffix, PathResolver, ResolveError};
pub use source::{FileSystem, MemorySource, ModuleSource};
pub use table::{ClosureError, ModuleRecord, ModuleTable, SpecifierMap};
