//! Shared helpers for integration tests
//!
//! `ScriptHost` runs a tiny line-oriented module language so loader
//! semantics can be observed without a script engine:
//!
//! ```text
//! require ./counter.js as c   bind the exports of a dependency
//! set count 0                 set a key on this module's exports
//! incr c.count                increment a key on a bound module's exports
//! log c.count                 record "<module> c.count=<value>"
//! ```

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::rc::Rc;

use knit_bundler::{Dialect, LoadError, ModuleHost, ModuleId, Require, TransformError, Transformed};

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub type Exports = Rc<RefCell<BTreeMap<String, i64>>>;

#[derive(Default)]
pub struct ScriptHost {
    pub log: Vec<String>,
}

impl ScriptHost {
    fn lookup(bindings: &HashMap<String, Exports>, target: &str) -> Option<(Exports, String)> {
        let (name, key) = target.split_once('.')?;
        Some((bindings.get(name)?.clone(), key.to_string()))
    }
}

impl ModuleHost for ScriptHost {
    type Exports = Exports;

    fn new_exports(&mut self) -> Exports {
        Rc::default()
    }

    fn execute(
        &mut self,
        module: &ModuleId,
        code: &str,
        exports: &Exports,
        require: &mut Require<'_, '_, Self>,
    ) -> Result<(), LoadError> {
        let mut bindings: HashMap<String, Exports> = HashMap::new();

        for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                ["require", specifier] => {
                    require.require(self, specifier)?;
                }
                ["require", specifier, "as", name] => {
                    let dependency = require.require(self, specifier)?;
                    bindings.insert(name.to_string(), dependency);
                }
                ["set", key, value] => {
                    let value = value
                        .parse()
                        .map_err(|_| LoadError::execution(module, format!("bad number: {}", value)))?;
                    exports.borrow_mut().insert(key.to_string(), value);
                }
                ["incr", target] => {
                    let (dependency, key) = Self::lookup(&bindings, target)
                        .ok_or_else(|| LoadError::execution(module, format!("unbound: {}", target)))?;
                    *dependency.borrow_mut().entry(key).or_insert(0) += 1;
                }
                ["log", target] => {
                    let (dependency, key) = Self::lookup(&bindings, target)
                        .ok_or_else(|| LoadError::execution(module, format!("unbound: {}", target)))?;
                    let value = dependency.borrow().get(&key).copied().unwrap_or(0);
                    self.log.push(format!("{} {}={}", module, target, value));
                }
                _ => return Err(LoadError::execution(module, format!("bad line: {}", line))),
            }
        }
        Ok(())
    }
}

/// Transformer for `ScriptHost` modules: code passes through unchanged and
/// every `require` line contributes its specifier
pub fn script_transform(source: &str, _dialect: Dialect) -> Result<Transformed, TransformError> {
    let mut specifiers: Vec<String> = Vec::new();
    for line in source.lines() {
        let mut words = line.split_whitespace();
        if words.next() == Some("require") {
            let specifier = words
                .next()
                .ok_or_else(|| TransformError::Custom(format!("require without specifier: {}", line)))?;
            if !specifiers.iter().any(|s| s == specifier) {
                specifiers.push(specifier.to_string());
            }
        }
    }
    Ok(Transformed::new(source, specifiers))
}

/// Path to `node`, if one is installed
pub fn node() -> Option<&'static str> {
    std::process::Command::new("node")
        .arg("--version")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|_| "node")
}
