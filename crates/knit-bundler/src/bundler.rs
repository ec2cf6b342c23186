//! Build pipeline
//!
//! Entry path → [`GraphBuilder`] → [`ModuleTable`] → [`RuntimeEmitter`] →
//! [`Bundle`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::emit::RuntimeEmitter;
use crate::error::{BundleError, BundleResult};
use crate::module::{FileSystem, GraphBuilder, ModuleId, ModuleSource, ModuleTable, ResolveError};
use crate::options::BundleOptions;
use crate::transform::{ModuleLowering, Transformer};

/// A built bundle, held in memory until written
#[derive(Debug, Clone)]
pub struct Bundle {
    entry: ModuleId,
    table: ModuleTable,
    text: String,
}

impl Bundle {
    pub fn entry(&self) -> &ModuleId {
        &self.entry
    }

    pub fn table(&self) -> &ModuleTable {
        &self.table
    }

    /// The self-executing bundle script
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Write the bundle to `path`
    ///
    /// The text goes to a temporary file next to `path` which is then renamed
    /// over it, so `path` never holds a partial bundle. The parent directory
    /// must exist.
    pub fn write_to(&self, path: &Path) -> BundleResult<()> {
        let write_error = |source| BundleError::Write {
            path: path.to_path_buf(),
            source,
        };

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bundle.js".to_string());
        let temp = path.with_file_name(format!(".{}.tmp", file_name));

        if let Err(err) = fs::write(&temp, &self.text) {
            let _ = fs::remove_file(&temp);
            return Err(write_error(err));
        }
        if let Err(err) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(write_error(err));
        }

        info!(path = %path.display(), bytes = self.text.len(), "wrote bundle");
        Ok(())
    }
}

/// Builds bundles from a module source with a transformer
pub struct Bundler<'a> {
    source: &'a dyn ModuleSource,
    transformer: &'a dyn Transformer,
    options: BundleOptions,
}

impl<'a> Bundler<'a> {
    pub fn new(source: &'a dyn ModuleSource, transformer: &'a dyn Transformer) -> Self {
        Self {
            source,
            transformer,
            options: BundleOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BundleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> BundleOptions {
        self.options
    }

    /// Resolve `entry` and collect every module reachable from it
    pub fn graph(&self, entry: &str) -> BundleResult<(ModuleId, ModuleTable)> {
        let builder = GraphBuilder::new(self.source, self.transformer);
        let id = builder.resolve_entry(entry, self.options.dialect)?;
        let table = builder.build(&id, self.options.dialect)?;
        Ok((id, table))
    }

    /// Build the bundle for `entry`, a path relative to the project root
    #[instrument(skip(self), fields(dialect = %self.options.dialect, cache = %self.options.cache_policy))]
    pub fn build(&self, entry: &str) -> BundleResult<Bundle> {
        let (entry, table) = self.graph(entry)?;
        let text = RuntimeEmitter::new(self.options.cache_policy).emit(&table, &entry)?;

        info!(entry = %entry, modules = table.len(), bytes = text.len(), "bundle built");
        Ok(Bundle { entry, table, text })
    }
}

/// Bundle `entry` from the file system under `root` with the built-in
/// transformer
///
/// `entry` may be relative to `root` or an absolute path inside it.
pub fn bundle(root: &Path, entry: &Path, options: BundleOptions) -> BundleResult<Bundle> {
    let entry = entry_in_root(root, entry)?;
    let source = FileSystem::new(root);
    Bundler::new(&source, &ModuleLowering)
        .with_options(options)
        .build(&entry)
}

/// Express `entry` relative to `root`
pub fn entry_in_root(root: &Path, entry: &Path) -> BundleResult<String> {
    if entry.is_relative() {
        return Ok(path_to_entry(entry));
    }

    let outside = || BundleError::Entry {
        entry: entry.display().to_string(),
        source: ResolveError::OutsideRoot(entry.display().to_string()),
    };

    let module_path = |relative: &Path| {
        ModuleId::from_relative_path(relative)
            .map(|id| id.as_str().to_string())
            .ok_or_else(outside)
    };

    if let Ok(relative) = entry.strip_prefix(root) {
        return module_path(relative);
    }
    let root = root.canonicalize().map_err(|_| outside())?;
    let entry: PathBuf = entry.canonicalize().map_err(|_| outside())?;
    let relative = entry.strip_prefix(&root).map_err(|_| outside())?;
    module_path(relative)
}

fn path_to_entry(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::MemorySource;
    use crate::options::{CachePolicy, Dialect};
    use tempfile::TempDir;

    #[test]
    fn test_build_from_memory() {
        let source = MemorySource::new()
            .with_file("src/index.ts", "import { add } from './add';\nadd(1, 2);\n")
            .with_file("src/add.ts", "export function add(a: number, b: number) { return a + b; }\n");

        let bundle = Bundler::new(&source, &ModuleLowering)
            .with_options(BundleOptions::new().with_dialect(Dialect::TypedSuperset))
            .build("src/index")
            .unwrap();

        assert_eq!(bundle.entry().as_str(), "src/index.ts");
        assert_eq!(bundle.table().len(), 2);
        assert!(bundle.text().ends_with(", \"src/index.ts\");\n"));
    }

    #[test]
    fn test_build_failure_produces_no_bundle() {
        let source = MemorySource::new().with_file("index.js", "import './missing';\n");

        let err = Bundler::new(&source, &ModuleLowering).build("index.js").unwrap_err();
        assert!(matches!(err, BundleError::Resolution { .. }));
    }

    #[test]
    fn test_bundle_from_disk_and_write() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("index.js"), "const add = require('./add');\n").unwrap();
        fs::write(root.join("add.js"), "exports.add = (a, b) => a + b;\n").unwrap();

        let options = BundleOptions::new().with_cache_policy(CachePolicy::Shared);
        let bundle = bundle(root, &root.join("index.js"), options).unwrap();
        assert_eq!(bundle.entry().as_str(), "index.js");

        let out = root.join("bundle.js");
        bundle.write_to(&out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), bundle.text());
        assert!(!root.join(".bundle.js.tmp").exists());
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let source = MemorySource::new().with_file("index.js", "1;\n");
        let bundle = Bundler::new(&source, &ModuleLowering).build("index.js").unwrap();

        let out = temp.path().join("nope").join("bundle.js");
        let err = bundle.write_to(&out).unwrap_err();
        assert!(matches!(err, BundleError::Write { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_entry_outside_root_is_rejected() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        fs::write(other.path().join("index.js"), "").unwrap();

        let err = entry_in_root(root.path(), &other.path().join("index.js")).unwrap_err();
        assert!(matches!(
            err,
            BundleError::Entry {
                source: ResolveError::OutsideRoot(_),
                ..
            }
        ));
        assert_eq!(
            entry_in_root(root.path(), Path::new("./src/index.js")).unwrap(),
            "./src/index.js"
        );
    }

    #[test]
    fn test_absolute_entry_is_normalized() {
        let root = TempDir::new().unwrap();
        let entry = root.path().join("src").join("..").join("index.js");
        assert_eq!(entry_in_root(root.path(), &entry).unwrap(), "index.js");

        let escaping = root.path().join("..").join("index.js");
        assert!(entry_in_root(root.path(), &escaping).is_err());
        assert!(entry_in_root(root.path(), root.path()).is_err());
    }
}
