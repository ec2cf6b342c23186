//! Canonical module identifiers

use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Canonical identifier of a module: its lexically normalized path relative to
/// the project root, with `/` separators (`src/util/math.js`).
///
/// Every spelling of an import that lands on the same file produces the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wrap an already-canonical id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id from a root-relative path, folding `.` and `..`.
    ///
    /// Returns `None` when the path climbs above the root, is absolute, or
    /// names the root itself.
    pub fn from_relative_path(path: &Path) -> Option<Self> {
        let parts = normalize(path)?;
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory containing this module, relative to the root (`""` at top level)
    pub fn parent_dir(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// Final path component
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Extension of the final component, if any
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }
}

/// Fold `.` and `..` out of a root-relative path.
///
/// An empty result names the root. `None` means the path escapes the root.
pub(crate) fn normalize(path: &Path) -> Option<Vec<String>> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts)
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_dot_segments() {
        let id = ModuleId::from_relative_path(Path::new("./src/lib/../util.js")).unwrap();
        assert_eq!(id.as_str(), "src/util.js");
        assert_eq!(id.parent_dir(), "src");
        assert_eq!(id.file_name(), "util.js");
        assert_eq!(id.extension(), Some("js"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        assert!(ModuleId::from_relative_path(Path::new("../outside.js")).is_none());
        assert!(ModuleId::from_relative_path(Path::new("a/../../b.js")).is_none());
        assert!(ModuleId::from_relative_path(Path::new(".")).is_none());
    }

    #[test]
    fn test_top_level_module() {
        let id = ModuleId::new("index.js");
        assert_eq!(id.parent_dir(), "");
        assert_eq!(id.file_name(), "index.js");
    }

    #[test]
    fn test_dotfile_has_no_extension() {
        assert_eq!(ModuleId::new("src/.env").extension(), None);
        assert_eq!(ModuleId::new("src/util").extension(), None);
        assert_eq!(ModuleId::new("config.prod").extension(), Some("prod"));
    }
}
