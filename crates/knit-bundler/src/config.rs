//! Project configuration (knit.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::BundleOptions;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "knit.toml";

/// Default bundle location, relative to the configuration directory
pub const DEFAULT_OUT: &str = "dist/bundle.js";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Contents of `knit.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    pub bundle: BundleConfig,
}

/// The `[bundle]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleConfig {
    /// Entry module, relative to `root`
    pub entry: String,

    /// Output file, relative to the configuration directory
    #[serde(default = "default_out")]
    pub out: PathBuf,

    /// Project root, relative to the configuration directory (default: the
    /// configuration directory itself)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(flatten)]
    pub options: BundleOptions,
}

fn default_out() -> PathBuf {
    PathBuf::from(DEFAULT_OUT)
}

impl ProjectConfig {
    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProjectConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bundle.entry.trim().is_empty() {
            return Err(ConfigError::Invalid("bundle.entry cannot be empty".to_string()));
        }
        if self.bundle.out.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("bundle.out cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl BundleConfig {
    /// Project root for a configuration found in `config_dir`
    pub fn root_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.root {
            Some(root) => config_dir.join(root),
            None => config_dir.to_path_buf(),
        }
    }

    /// Output path for a configuration found in `config_dir`
    pub fn out_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.out)
    }
}

/// Find the nearest directory at or above `start` containing `knit.toml`
pub fn find_config_dir(start: &Path) -> Option<PathBuf> {
    let mut dir = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };
    loop {
        if dir.join(CONFIG_FILE).is_file() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CachePolicy, Dialect};
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let config = ProjectConfig::from_str(
            r#"
[bundle]
entry = "src/index.js"
"#,
        )
        .unwrap();

        assert_eq!(config.bundle.entry, "src/index.js");
        assert_eq!(config.bundle.out, PathBuf::from("dist/bundle.js"));
        assert_eq!(config.bundle.root, None);
        assert_eq!(config.bundle.options, BundleOptions::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config = ProjectConfig::from_str(
            r#"
[bundle]
entry = "src/index.ts"
out = "build/app.js"
root = "packages/app"
dialect = "typed-superset"
cache = "shared"
"#,
        )
        .unwrap();

        assert_eq!(config.bundle.options.dialect, Dialect::TypedSuperset);
        assert_eq!(config.bundle.options.cache_policy, CachePolicy::Shared);
        assert_eq!(
            config.bundle.root_dir(Path::new("/work")),
            PathBuf::from("/work/packages/app")
        );
        assert_eq!(
            config.bundle.out_path(Path::new("/work")),
            PathBuf::from("/work/build/app.js")
        );
    }

    #[test]
    fn test_missing_entry_is_rejected() {
        let err = ProjectConfig::from_str("[bundle]\nout = \"x.js\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = ProjectConfig::from_str("[bundle]\nentry = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ProjectConfig::from_str("[bundle]\nentry = \"a.js\"\nout = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        let err = ProjectConfig::from_str("[bundle]\nentry = \"a.js\"\ndialect = \"coffee\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_find_config_dir_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "[bundle]\nentry = \"a.js\"\n").unwrap();
        let nested = temp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("file.js"), "").unwrap();

        assert_eq!(find_config_dir(&nested), Some(temp.path().to_path_buf()));
        assert_eq!(find_config_dir(&nested.join("file.js")), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_from_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join(CONFIG_FILE);

        let err = ProjectConfig::from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("knit.toml"));
    }
}
