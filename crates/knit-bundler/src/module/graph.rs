//! Module graph construction
//!
//! Walks the import graph from an entry module, transforming each reachable
//! module exactly once and recording its specifier map.

use rustc_hash::FxHashSet;
use tracing::{debug, info, instrument};

use super::id::ModuleId;
use super::resolver::PathResolver;
use super::source::ModuleSource;
use super::table::{ModuleRecord, ModuleTable, SpecifierMap};
use crate::error::{BundleError, BundleResult};
use crate::options::Dialect;
use crate::transform::Transformer;

/// A module whose dependencies are still being walked
struct Frame {
    id: ModuleId,
    code: String,
    specifiers: Vec<String>,
    next: usize,
    deps: SpecifierMap,
}

impl Frame {
    fn next_specifier(&mut self) -> Option<String> {
        let specifier = self.specifiers.get(self.next).cloned();
        self.next += 1;
        specifier
    }

    fn into_record(self) -> ModuleRecord {
        ModuleRecord::new(self.id, self.code, self.deps)
    }
}

/// Builds a [`ModuleTable`] from an entry module
///
/// Traversal is depth-first with an explicit stack. A module is marked
/// visited before its dependencies are walked, so cycles terminate and each
/// module is transformed once no matter how many modules import it. Records
/// are inserted once all of their dependencies have been walked: dependencies
/// come before their importers and the entry is last, except where a cycle
/// makes that impossible.
pub struct GraphBuilder<'a> {
    source: &'a dyn ModuleSource,
    transformer: &'a dyn Transformer,
    resolver: PathResolver<'a>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(source: &'a dyn ModuleSource, transformer: &'a dyn Transformer) -> Self {
        Self {
            source,
            transformer,
            resolver: PathResolver::new(source),
        }
    }

    /// Resolve an entry path relative to the project root
    pub fn resolve_entry(&self, entry: &str, dialect: Dialect) -> BundleResult<ModuleId> {
        self.resolver
            .resolve_entry(entry, dialect)
            .map_err(|source| BundleError::Entry {
                entry: entry.to_string(),
                source,
            })
    }

    /// Discover every module reachable from `entry`
    #[instrument(skip(self), fields(entry = %entry, dialect = %dialect))]
    pub fn build(&self, entry: &ModuleId, dialect: Dialect) -> BundleResult<ModuleTable> {
        let mut visited = FxHashSet::default();
        let mut table = ModuleTable::new();
        let mut stack = Vec::new();

        visited.insert(entry.clone());
        stack.push(self.enter(entry, dialect)?);

        while let Some(frame) = stack.last_mut() {
            let Some(specifier) = frame.next_specifier() else {
                if let Some(done) = stack.pop() {
                    table.insert(done.into_record());
                }
                continue;
            };

            let target = self
                .resolver
                .resolve(&specifier, &frame.id, dialect)
                .map_err(|source| BundleError::Resolution {
                    importer: frame.id.clone(),
                    specifier: specifier.clone(),
                    source,
                })?;
            debug!(importer = %frame.id, specifier = %specifier, target = %target, "resolved import");
            frame.deps.insert(specifier, target.clone());

            // Re-entry into a visited module is a no-op
            if visited.insert(target.clone()) {
                stack.push(self.enter(&target, dialect)?);
            }
        }

        info!(modules = table.len(), "module graph built");
        Ok(table)
    }

    /// Read and transform a module, ready to walk its specifiers
    fn enter(&self, id: &ModuleId, dialect: Dialect) -> BundleResult<Frame> {
        let source = self.source.read(id.as_str()).map_err(|source| BundleError::Io {
            module: id.clone(),
            source,
        })?;

        let transformed = self
            .transformer
            .transform(&source, dialect)
            .map_err(|source| BundleError::Transform {
                module: id.clone(),
                source,
            })?;
        debug!(module = %id, specifiers = transformed.specifiers.len(), "transformed module");

        Ok(Frame {
            id: id.clone(),
            code: transformed.code,
            specifiers: transformed.specifiers,
            next: 0,
            deps: SpecifierMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;
    use crate::module::source::MemorySource;
    use crate::module::ResolveError;
    use crate::transform::{ModuleLowering, TransformError, Transformed};

    fn build(source: &MemorySource, entry: &str, dialect: Dialect) -> BundleResult<ModuleTable> {
        let builder = GraphBuilder::new(source, &ModuleLowering);
        builder.build(&ModuleId::new(entry), dialect)
    }

    fn ids(table: &ModuleTable) -> Vec<&str> {
        table.ids().map(ModuleId::as_str).collect()
    }

    #[test]
    fn test_single_module() {
        let source = MemorySource::new().with_file("index.js", "console.log(1);\n");
        let table = build(&source, "index.js", Dialect::Default).unwrap();

        assert_eq!(ids(&table), vec!["index.js"]);
        assert!(table.get(&ModuleId::new("index.js")).unwrap().deps().is_empty());
    }

    #[test]
    fn test_dependencies_precede_importers() {
        let source = MemorySource::new()
            .with_file("index.js", "import add from './add';\nimport { log } from './util/log';\n")
            .with_file("add.js", "import { log } from './util/log';\nexport default (a, b) => a + b;\n")
            .with_file("util/log.js", "export function log() {}\n");

        let table = build(&source, "index.js", Dialect::Default).unwrap();
        assert_eq!(ids(&table), vec!["util/log.js", "add.js", "index.js"]);

        let index = table.get(&ModuleId::new("index.js")).unwrap();
        let deps: Vec<(&str, &str)> = index
            .deps()
            .iter()
            .map(|(spec, id)| (spec.as_str(), id.as_str()))
            .collect();
        assert_eq!(deps, vec![("./add", "add.js"), ("./util/log", "util/log.js")]);
        assert!(table.check_closure().is_ok());
    }

    #[test]
    fn test_diamond_transforms_shared_module_once() {
        let source = MemorySource::new()
            .with_file("a.js", "require('./b'); require('./c');")
            .with_file("b.js", "var b = require('./d');")
            .with_file("c.js", "var c = require('./d');")
            .with_file("d.js", "exports.d = 1;");

        let calls: RefCell<HashMap<String, usize>> = RefCell::new(HashMap::new());
        let counting = |text: &str, dialect: Dialect| {
            *calls.borrow_mut().entry(text.to_string()).or_insert(0) += 1;
            ModuleLowering.transform(text, dialect)
        };

        let builder = GraphBuilder::new(&source, &counting);
        let table = builder.build(&ModuleId::new("a.js"), Dialect::Default).unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(calls.borrow().get("exports.d = 1;"), Some(&1));
        assert!(calls.borrow().values().all(|&n| n == 1));
    }

    #[test]
    fn test_cycle_terminates() {
        let source = MemorySource::new()
            .with_file("a.js", "const b = require('./b');")
            .with_file("b.js", "const a = require('./a');");

        let table = build(&source, "a.js", Dialect::Default).unwrap();
        assert_eq!(ids(&table), vec!["b.js", "a.js"]);

        let a = table.get(&ModuleId::new("a.js")).unwrap();
        let b = table.get(&ModuleId::new("b.js")).unwrap();
        assert_eq!(a.dependency("./b"), Some(&ModuleId::new("b.js")));
        assert_eq!(b.dependency("./a"), Some(&ModuleId::new("a.js")));
        assert!(table.check_closure().is_ok());
    }

    #[test]
    fn test_self_import() {
        let source = MemorySource::new().with_file("a.js", "require('./a');");

        let table = build(&source, "a.js", Dialect::Default).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(&ModuleId::new("a.js")).unwrap().dependency("./a"),
            Some(&ModuleId::new("a.js"))
        );
    }

    #[test]
    fn test_different_spellings_share_a_record() {
        let source = MemorySource::new()
            .with_file("src/index.ts", "import './util';\nimport './util.ts';\nimport '../src/util';\n")
            .with_file("src/util.ts", "export const x = 1;\n");

        let table = build(&source, "src/index.ts", Dialect::TypedSuperset).unwrap();
        assert_eq!(ids(&table), vec!["src/util.ts", "src/index.ts"]);

        let index = table.get(&ModuleId::new("src/index.ts")).unwrap();
        assert_eq!(index.deps().len(), 3);
        assert!(index.deps().values().all(|id| id.as_str() == "src/util.ts"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let source = MemorySource::new()
            .with_file("index.js", "import './z';\nimport './a';\nimport './m';\n")
            .with_file("z.js", "import './a';\n")
            .with_file("a.js", "import './m';\n")
            .with_file("m.js", "import './z';\n");

        let first = build(&source, "index.js", Dialect::Default).unwrap().to_json().unwrap();
        for _ in 0..5 {
            let again = build(&source, "index.js", Dialect::Default).unwrap().to_json().unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_resolution_failure_names_importer() {
        let source = MemorySource::new()
            .with_file("index.js", "require('./lib');")
            .with_file("lib.js", "require('./missing');");

        let err = build(&source, "index.js", Dialect::Default).unwrap_err();
        match err {
            BundleError::Resolution {
                importer,
                specifier,
                source: ResolveError::ModuleNotFound { .. },
            } => {
                assert_eq!(importer.as_str(), "lib.js");
                assert_eq!(specifier, "./missing");
            }
            other => panic!("expected resolution error, got {:?}", other),
        }
    }

    #[test]
    fn test_transform_failure_names_module() {
        let source = MemorySource::new()
            .with_file("index.js", "require('./bad');")
            .with_file("bad.js", "import { from './x';");

        let err = build(&source, "index.js", Dialect::Default).unwrap_err();
        assert_eq!(err.module(), Some(&ModuleId::new("bad.js")));
        assert!(matches!(err, BundleError::Transform { .. }));
    }

    #[test]
    fn test_custom_transformer_failure() {
        let source = MemorySource::new().with_file("index.js", "anything");
        let failing = |_: &str, _: Dialect| -> Result<Transformed, TransformError> {
            Err(TransformError::Custom("nope".to_string()))
        };

        let builder = GraphBuilder::new(&source, &failing);
        let err = builder.build(&ModuleId::new("index.js"), Dialect::Default).unwrap_err();
        assert_eq!(err.to_string(), "Transform error in index.js: nope");
    }

    #[test]
    fn test_missing_entry_is_io_error() {
        let source = MemorySource::new();
        let err = build(&source, "index.js", Dialect::Default).unwrap_err();
        assert!(matches!(err, BundleError::Io { .. }));
    }

    #[test]
    fn test_resolve_entry() {
        let source = MemorySource::new().with_file("src/index.ts", "");
        let builder = GraphBuilder::new(&source, &ModuleLowering);

        let id = builder.resolve_entry("src/index", Dialect::TypedSuperset).unwrap();
        assert_eq!(id.as_str(), "src/index.ts");

        let err = builder.resolve_entry("src/index", Dialect::Default).unwrap_err();
        assert_eq!(err.specifier(), Some("src/index"));
    }
}
