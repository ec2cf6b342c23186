//! Module loader

use rustc_hash::FxHashMap;
use tracing::trace;

use super::{LoadError, ModuleHost, ModuleState};
use crate::module::{ModuleId, ModuleRecord, ModuleTable};
use crate::options::CachePolicy;

/// Default bound on nested `require` calls
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Instantiates modules from a [`ModuleTable`] on demand
///
/// Under [`CachePolicy::PerImport`] every `require` creates a fresh exports
/// container and runs the module again. Under [`CachePolicy::Shared`] the
/// container is cached before the module runs, so later requires (including
/// cyclic ones made while it is still executing) get the same container.
pub struct Loader<'t, H: ModuleHost> {
    table: &'t ModuleTable,
    cache_policy: CachePolicy,
    max_depth: usize,
    depth: usize,
    states: FxHashMap<ModuleId, ModuleState>,
    executions: FxHashMap<ModuleId, usize>,
    cache: FxHashMap<ModuleId, H::Exports>,
}

impl<'t, H: ModuleHost> Loader<'t, H> {
    pub fn new(table: &'t ModuleTable, cache_policy: CachePolicy) -> Self {
        Self {
            table,
            cache_policy,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: 0,
            states: FxHashMap::default(),
            executions: FxHashMap::default(),
            cache: FxHashMap::default(),
        }
    }

    /// Bound nested requires; per-import loading of a cycle never finishes
    /// on its own
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Require the entry module and discard its exports
    pub fn run(&mut self, host: &mut H, entry: &ModuleId) -> Result<(), LoadError> {
        self.load(host, entry).map(|_| ())
    }

    /// Require a module by id
    pub fn load(&mut self, host: &mut H, id: &ModuleId) -> Result<H::Exports, LoadError> {
        let table = self.table;
        let record = table
            .get(id)
            .ok_or_else(|| LoadError::MissingModule(id.clone()))?;

        if self.cache_policy == CachePolicy::Shared {
            if let Some(exports) = self.cache.get(id) {
                trace!(module = %id, state = ?self.state(id), "cached exports");
                return Ok(exports.clone());
            }
        }

        if self.depth >= self.max_depth {
            return Err(LoadError::DepthExceeded {
                module: id.clone(),
                depth: self.max_depth,
            });
        }

        let exports = host.new_exports();
        if self.cache_policy == CachePolicy::Shared {
            self.cache.insert(id.clone(), exports.clone());
        }
        self.states.insert(id.clone(), ModuleState::Executing);
        *self.executions.entry(id.clone()).or_insert(0) += 1;
        trace!(module = %id, depth = self.depth, "executing");

        self.depth += 1;
        let result = {
            let mut require = Require { loader: self, record };
            host.execute(id, record.code(), &exports, &mut require)
        };
        self.depth -= 1;
        result?;

        self.states.insert(id.clone(), ModuleState::Completed);
        trace!(module = %id, "completed");
        Ok(exports)
    }

    pub fn state(&self, id: &ModuleId) -> ModuleState {
        self.states.get(id).copied().unwrap_or_default()
    }

    /// Number of times a module's code has been run
    pub fn executions(&self, id: &ModuleId) -> usize {
        self.executions.get(id).copied().unwrap_or(0)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }
}

/// The `require` handed to a module while it executes
///
/// Specifiers are looked up in the executing module's own specifier map.
pub struct Require<'r, 't, H: ModuleHost> {
    loader: &'r mut Loader<'t, H>,
    record: &'t ModuleRecord,
}

impl<'r, 't, H: ModuleHost> Require<'r, 't, H> {
    /// Module this `require` belongs to
    pub fn module(&self) -> &ModuleId {
        self.record.id()
    }

    pub fn require(&mut self, host: &mut H, specifier: &str) -> Result<H::Exports, LoadError> {
        let target = self
            .record
            .dependency(specifier)
            .ok_or_else(|| LoadError::UnresolvedSpecifier {
                module: self.record.id().clone(),
                specifier: specifier.to_string(),
            })?;
        self.loader.load(host, target)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::module::{GraphBuilder, MemorySource};
    use crate::options::Dialect;
    use crate::transform::Transformed;

    /// Host where code is one `require <specifier>` per line
    #[derive(Default)]
    struct LineHost {
        log: Vec<String>,
    }

    impl ModuleHost for LineHost {
        type Exports = Rc<RefCell<Vec<String>>>;

        fn new_exports(&mut self) -> Self::Exports {
            Rc::default()
        }

        fn execute(
            &mut self,
            module: &ModuleId,
            code: &str,
            exports: &Self::Exports,
            require: &mut Require<'_, '_, Self>,
        ) -> Result<(), LoadError> {
            self.log.push(module.to_string());
            for specifier in code.lines().filter_map(|l| l.strip_prefix("require ")) {
                require.require(self, specifier)?;
            }
            exports.borrow_mut().push(module.to_string());
            Ok(())
        }
    }

    fn passthrough(source: &str, _: Dialect) -> Result<Transformed, crate::transform::TransformError> {
        let specifiers = source
            .lines()
            .filter_map(|l| l.strip_prefix("require "))
            .map(str::to_string)
            .collect();
        Ok(Transformed::new(source, specifiers))
    }

    fn table(source: &MemorySource, entry: &str) -> ModuleTable {
        GraphBuilder::new(source, &passthrough)
            .build(&ModuleId::new(entry), Dialect::Default)
            .unwrap()
    }

    #[test]
    fn test_per_import_reexecutes() {
        let source = MemorySource::new()
            .with_file("a.js", "require ./b.js\nrequire ./b.js")
            .with_file("b.js", "");
        let table = table(&source, "a.js");

        let mut host = LineHost::default();
        let mut loader = Loader::new(&table, CachePolicy::PerImport);
        loader.run(&mut host, &ModuleId::new("a.js")).unwrap();

        assert_eq!(host.log, vec!["a.js", "b.js", "b.js"]);
        assert_eq!(loader.executions(&ModuleId::new("b.js")), 2);
        assert_eq!(loader.state(&ModuleId::new("a.js")), ModuleState::Completed);
    }

    #[test]
    fn test_shared_executes_once() {
        let source = MemorySource::new()
            .with_file("a.js", "require ./b.js\nrequire ./b.js")
            .with_file("b.js", "");
        let table = table(&source, "a.js");

        let mut host = LineHost::default();
        let mut loader = Loader::new(&table, CachePolicy::Shared);
        loader.run(&mut host, &ModuleId::new("a.js")).unwrap();

        assert_eq!(host.log, vec!["a.js", "b.js"]);
        assert_eq!(loader.executions(&ModuleId::new("b.js")), 1);
    }

    #[test]
    fn test_shared_cycle_sees_partial_exports() {
        let source = MemorySource::new()
            .with_file("a.js", "require ./b.js")
            .with_file("b.js", "require ./a.js");
        let table = table(&source, "a.js");

        let mut host = LineHost::default();
        let mut loader = Loader::new(&table, CachePolicy::Shared);
        let exports = loader.load(&mut host, &ModuleId::new("a.js")).unwrap();

        assert_eq!(host.log, vec!["a.js", "b.js"]);
        assert_eq!(*exports.borrow(), vec!["a.js".to_string()]);
    }

    #[test]
    fn test_per_import_cycle_hits_depth_bound() {
        let source = MemorySource::new()
            .with_file("a.js", "require ./b.js")
            .with_file("b.js", "require ./a.js");
        let table = table(&source, "a.js");

        let mut host = LineHost::default();
        let mut loader = Loader::new(&table, CachePolicy::PerImport).with_max_depth(8);
        let err = loader.run(&mut host, &ModuleId::new("a.js")).unwrap_err();

        assert!(matches!(err, LoadError::DepthExceeded { depth: 8, .. }));
        assert_eq!(host.log.len(), 8);
        assert_eq!(loader.state(&ModuleId::new("a.js")), ModuleState::Executing);
    }

    #[test]
    fn test_unmapped_specifier_fails() {
        let source = MemorySource::new().with_file("a.js", "");
        let table = table(&source, "a.js");

        struct Stray;
        impl ModuleHost for Stray {
            type Exports = ();

            fn new_exports(&mut self) {}

            fn execute(
                &mut self,
                _: &ModuleId,
                _: &str,
                _: &(),
                require: &mut Require<'_, '_, Self>,
            ) -> Result<(), LoadError> {
                require.require(self, "./elsewhere")
            }
        }

        let mut loader = Loader::new(&table, CachePolicy::PerImport);
        let err = loader.run(&mut Stray, &ModuleId::new("a.js")).unwrap_err();
        assert_eq!(
            err,
            LoadError::UnresolvedSpecifier {
                module: ModuleId::new("a.js"),
                specifier: "./elsewhere".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_module() {
        let source = MemorySource::new().with_file("a.js", "");
        let table = table(&source, "a.js");

        let mut loader = Loader::new(&table, CachePolicy::PerImport);
        let err = loader.run(&mut LineHost::default(), &ModuleId::new("nope.js")).unwrap_err();
        assert_eq!(err, LoadError::MissingModule(ModuleId::new("nope.js")));
        assert_eq!(loader.state(&ModuleId::new("nope.js")), ModuleState::Unrequested);
    }
}
