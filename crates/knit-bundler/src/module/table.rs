//! Module table
//!
//! The complete, serializable result of graph construction.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use thiserror::Error;

use super::id::ModuleId;

/// Raw specifier (as written in the importing module) → resolved module,
/// in first-occurrence order
pub type SpecifierMap = IndexMap<String, ModuleId>;

/// A module's compiled code and its private specifier map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    id: ModuleId,
    code: String,
    deps: SpecifierMap,
}

impl ModuleRecord {
    pub fn new(id: ModuleId, code: String, deps: SpecifierMap) -> Self {
        Self { id, code, deps }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Transformer output, never the original source
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn deps(&self) -> &SpecifierMap {
        &self.deps
    }

    /// Module a specifier written in this module refers to
    pub fn dependency(&self, specifier: &str) -> Option<&ModuleId> {
        self.deps.get(specifier)
    }
}

impl Serialize for ModuleRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("ModuleRecord", 2)?;
        record.serialize_field("code", &self.code)?;
        record.serialize_field("deps", &self.deps)?;
        record.end()
    }
}

/// A specifier map entry pointing outside the table
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{module} maps '{specifier}' to {target}, which is not in the module table")]
pub struct ClosureError {
    pub module: ModuleId,
    pub specifier: String,
    pub target: ModuleId,
}

/// Every module reachable from an entry, keyed by id in insertion order
///
/// Serializes as `{ "<id>": { "code": ..., "deps": { "<specifier>": "<id>" } } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTable {
    modules: IndexMap<ModuleId, ModuleRecord>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a completed record. A record is never replaced once inserted.
    pub(crate) fn insert(&mut self, record: ModuleRecord) {
        debug_assert!(!self.modules.contains_key(record.id()));
        self.modules.entry(record.id.clone()).or_insert(record);
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleRecord> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module ids in table order
    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    /// Check that every specifier map value is itself a key of the table
    pub fn check_closure(&self) -> Result<(), ClosureError> {
        for record in self.records() {
            for (specifier, target) in record.deps() {
                if !self.modules.contains_key(target) {
                    return Err(ClosureError {
                        module: record.id().clone(),
                        specifier: specifier.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Compact JSON, as embedded in bundles
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Indented JSON, for inspection
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for ModuleTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.modules.len()))?;
        for (id, record) in &self.modules {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

impl<'a> IntoIterator for &'a ModuleTable {
    type Item = &'a ModuleRecord;
    type IntoIter = indexmap::map::Values<'a, ModuleId, ModuleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.values()
    }
}
