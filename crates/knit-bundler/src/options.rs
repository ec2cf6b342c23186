//! Build options
//!
//! Everything a build needs to know is carried in [`BundleOptions`] and passed
//! down the call chain explicitly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Source language variant of the modules being bundled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// Plain scripts (`.js`, `.mjs`, `.cjs`)
    #[default]
    Default,
    /// Statically-typed superset (`.ts`, `.tsx`), which may also import plain scripts
    TypedSuperset,
}

impl Dialect {
    /// Suffix appended to specifiers that carry no recognised extension
    pub fn canonical_suffix(self) -> &'static str {
        match self {
            Dialect::Default => "js",
            Dialect::TypedSuperset => "ts",
        }
    }

    /// Extensions that already discriminate a module under this dialect
    pub fn recognized_extensions(self) -> &'static [&'static str] {
        match self {
            Dialect::Default => &["js", "mjs", "cjs"],
            Dialect::TypedSuperset => &["ts", "tsx", "js", "mjs", "cjs"],
        }
    }

    /// Whether `ext` is one of [`Dialect::recognized_extensions`]
    pub fn recognizes(self, ext: &str) -> bool {
        self.recognized_extensions().contains(&ext)
    }

    /// Name used in configuration files and on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Default => "default",
            Dialect::TypedSuperset => "typed-superset",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "js" => Ok(Dialect::Default),
            "typed-superset" | "ts" => Ok(Dialect::TypedSuperset),
            other => Err(format!(
                "unknown dialect '{}' (expected 'default' or 'typed-superset')",
                other
            )),
        }
    }
}

/// How the generated runtime treats repeated `require` calls for one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Every `require` creates a fresh exports object and re-runs the module body.
    ///
    /// Two importers never observe a shared instance and module side effects run
    /// once per import edge. An import cycle recurses without bound.
    #[default]
    PerImport,
    /// The first `require` instantiates the module; later calls return the same
    /// exports object. The object is cached before the body runs, so a cyclic
    /// importer sees the partially-populated exports.
    Shared,
}

impl CachePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePolicy::PerImport => "per-import",
            CachePolicy::Shared => "shared",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-import" => Ok(CachePolicy::PerImport),
            "shared" => Ok(CachePolicy::Shared),
            other => Err(format!(
                "unknown cache policy '{}' (expected 'per-import' or 'shared')",
                other
            )),
        }
    }
}

/// Options threaded through resolution, graph construction and emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BundleOptions {
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default, rename = "cache")]
    pub cache_policy: CachePolicy,
}

impl BundleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_suffixes() {
        assert_eq!(Dialect::Default.canonical_suffix(), "js");
        assert_eq!(Dialect::TypedSuperset.canonical_suffix(), "ts");
        assert!(Dialect::TypedSuperset.recognizes("js"));
        assert!(!Dialect::Default.recognizes("ts"));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("typed-superset".parse::<Dialect>().unwrap(), Dialect::TypedSuperset);
        assert_eq!("default".parse::<Dialect>().unwrap(), Dialect::Default);
        assert!("typescript".parse::<Dialect>().is_err());
        assert_eq!("shared".parse::<CachePolicy>().unwrap(), CachePolicy::Shared);
        assert!("always".parse::<CachePolicy>().is_err());
    }

    #[test]
    fn test_defaults_preserve_reexecution() {
        let options = BundleOptions::default();
        assert_eq!(options.dialect, Dialect::Default);
        assert_eq!(options.cache_policy, CachePolicy::PerImport);
    }
}
