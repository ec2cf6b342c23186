//! Knit Bundler Library
//!
//! Builds a single self-executing script bundle from an entry module:
//! - **Resolution**: import specifiers to canonical module ids (`module`)
//! - **Graph**: cycle-safe discovery of every reachable module (`module`)
//! - **Transform**: module syntax lowering behind the `Transformer` trait (`transform`)
//! - **Emit**: the generated loader script (`emit`)
//! - **Runtime**: the same loader state machine, hosted in-process (`runtime`)
//!
//! # Example
//!
//! ```rust,ignore
//! use knit_bundler::{Bundler, MemorySource, ModuleLowering};
//!
//! let source = MemorySource::new()
//!     .with_file("index.js", "import add from './add';\nadd(3, 33);\n")
//!     .with_file("add.js", "export default function add(a, b) { console.log(a * b); }\n");
//!
//! let bundle = Bundler::new(&source, &ModuleLowering).build("index.js").unwrap();
//! println!("{}", bundle.text());
//! ```

#![warn(rust_2018_idioms)]

pub mod bundler;
pub mod config;
pub mod emit;
pub mod error;
pub mod module;
pub mod options;
pub mod runtime;
pub mod transform;

pub use bundler::{bundle, entry_in_root, Bundle, Bundler};
pub use config::{find_config_dir, BundleConfig, ConfigError, ProjectConfig, CONFIG_FILE};
pub use emit::RuntimeEmitter;
pub use error::{BundleError, BundleResult};
pub use module::{
    FileSystem, GraphBuilder, MemorySource, ModuleId, ModuleRecord, ModuleSource, ModuleTable,
    PathResolver, ResolveError, SpecifierMap,
};
pub use options::{BundleOptions, CachePolicy, Dialect};
pub use runtime::{Loader, LoadError, ModuleHost, ModuleState, Require};
pub use transform::{ModuleLowering, TransformError, Transformed, Transformer};
