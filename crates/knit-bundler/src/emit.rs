//! Bundle runtime emission
//!
//! Wraps a serialized [`ModuleTable`] in a self-executing loader. The loader
//! instantiates modules on demand, translating every specifier through the
//! requiring module's own specifier map before indexing the table.

use tracing::{debug, instrument};

use crate::error::{BundleError, BundleResult};
use crate::module::{ModuleId, ModuleTable};
use crate::options::CachePolicy;

const LOADER_HEAD: &str = r#"(function (modules, entry) {
  "use strict";
"#;

const SHARED_CACHE: &str = r#"  var cache = {};
"#;

const LOAD_START: &str = r#"  function load(id) {
    if (!Object.prototype.hasOwnProperty.call(modules, id)) {
      throw new Error("Module not found in bundle: " + id);
    }
    var record = modules[id];
"#;

const SHARED_LOOKUP: &str = r#"    if (Object.prototype.hasOwnProperty.call(cache, id)) {
      return cache[id];
    }
    var exports = {};
    cache[id] = exports;
"#;

const FRESH_EXPORTS: &str = r#"    var exports = {};
"#;

const LOAD_END: &str = r#"    function require(specifier) {
      if (!Object.prototype.hasOwnProperty.call(record.deps, specifier)) {
        throw new Error("Cannot find module '" + specifier + "' from " + id);
      }
      return load(record.deps[specifier]);
    }
    new Function("exports", "require", record.code)(exports, require);
    return exports;
  }
  load(entry);
})("#;

/// Generates bundle text from a module table
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeEmitter {
    cache_policy: CachePolicy,
}

impl RuntimeEmitter {
    pub fn new(cache_policy: CachePolicy) -> Self {
        Self { cache_policy }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// Emit a loader that runs `entry` as soon as it is evaluated
    ///
    /// Fails if `entry` is not in the table or a specifier map points outside
    /// of it; such a bundle could only fail at run time.
    #[instrument(skip(self, table), fields(entry = %entry, modules = table.len()))]
    pub fn emit(&self, table: &ModuleTable, entry: &ModuleId) -> BundleResult<String> {
        if !table.contains(entry) {
            return Err(BundleError::MissingEntry(entry.clone()));
        }
        table.check_closure()?;

        let modules = script_safe(table.to_json()?);
        let entry_literal = script_safe(serde_json::to_string(entry.as_str())?);

        let mut out = String::with_capacity(modules.len() + LOAD_END.len() + 512);
        out.push_str(LOADER_HEAD);
        if self.cache_policy == CachePolicy::Shared {
            out.push_str(SHARED_CACHE);
        }
        out.push_str(LOAD_START);
        match self.cache_policy {
            CachePolicy::PerImport => out.push_str(FRESH_EXPORTS),
            CachePolicy::Shared => out.push_str(SHARED_LOOKUP),
        }
        out.push_str(LOAD_END);
        out.push_str(&modules);
        out.push_str(", ");
        out.push_str(&entry_literal);
        out.push_str(");\n");

        debug!(bytes = out.len(), cache = %self.cache_policy, "emitted bundle runtime");
        Ok(out)
    }
}

/// JSON is a subset of script syntax except for raw line and paragraph
/// separators in older engines
fn script_safe(json: String) -> String {
    if json.contains(['\u{2028}', '\u{2029}']) {
        json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
    } else {
        json
    }
}
