//! Subcommand implementations

pub mod bundle;
pub mod graph;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use knit_bundler::config::DEFAULT_OUT;
use knit_bundler::{
    entry_in_root, find_config_dir, BundleOptions, CachePolicy, Dialect, ProjectConfig,
    CONFIG_FILE,
};
use tracing::debug;

/// Project selection flags shared by every subcommand
#[derive(Debug, Default, Clone)]
pub struct ProjectArgs {
    pub entry: Option<String>,
    pub root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub dialect: Option<Dialect>,
    pub cache: Option<CachePolicy>,
    pub out: Option<PathBuf>,
}

/// A fully resolved build request
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    /// Entry path relative to `root`
    pub entry: String,
    pub out: PathBuf,
    pub options: BundleOptions,
}

impl ProjectArgs {
    /// Merge flags over `knit.toml`, flags taking precedence
    pub fn resolve(self, cwd: &Path) -> anyhow::Result<Project> {
        let found = self.load_config(cwd)?;
        let config = found.as_ref().map(|(dir, config)| (dir.as_path(), &config.bundle));

        let root = match (&self.root, config) {
            (Some(root), _) => cwd.join(root),
            (None, Some((dir, bundle))) => bundle.root_dir(dir),
            (None, None) => cwd.to_path_buf(),
        };

        let entry = match (&self.entry, config) {
            (Some(entry), _) => entry_in_root(&root, &cwd.join(entry))?,
            (None, Some((_, bundle))) => bundle.entry.clone(),
            (None, None) => {
                return Err(anyhow!(
                    "no entry module given and no {} found in {} or its parents",
                    CONFIG_FILE,
                    cwd.display()
                ))
            }
        };

        let out = match (&self.out, config) {
            (Some(out), _) => cwd.join(out),
            (None, Some((dir, bundle))) => bundle.out_path(dir),
            (None, None) => cwd.join(DEFAULT_OUT),
        };

        let mut options = config.map(|(_, bundle)| bundle.options).unwrap_or_default();
        if let Some(dialect) = self.dialect {
            options.dialect = dialect;
        }
        if let Some(cache) = self.cache {
            options.cache_policy = cache;
        }

        debug!(root = %root.display(), entry = %entry, out = %out.display(), "resolved project");
        Ok(Project {
            root,
            entry,
            out,
            options,
        })
    }

    fn load_config(&self, cwd: &Path) -> anyhow::Result<Option<(PathBuf, ProjectConfig)>> {
        let path = match &self.config {
            Some(path) => cwd.join(path),
            None => match find_config_dir(cwd) {
                Some(dir) => dir.join(CONFIG_FILE),
                None => return Ok(None),
            },
        };

        let config = ProjectConfig::from_file(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        debug!(config = %path.display(), "loaded project configuration");
        Ok(Some((dir, config)))
    }
}
