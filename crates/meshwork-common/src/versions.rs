//! Version propagation store
//!
//! An in-memory registry of resolved artifact versions, keyed by
//! (namespace, application). The deployment subroutine records facts here
//! as it resolves component metadata; the pipeline subroutine reads them
//! back when rewriting delivery-resource value documents, so it never
//! clobbers versions it does not own.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_yaml::Value;

use crate::error::Error;

/// A single resolved version: "set `version` at `path` in the values of
/// application `app` in `namespace`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFact {
    /// Dot-separated path into the values document (e.g. "image.tag")
    pub path: String,
    /// The resolved version string
    pub version: String,
}

/// Thread-safe registry of version facts.
///
/// Guarded by a single reader/writer lock; reads return defensive copies.
#[derive(Debug, Default)]
pub struct VersionStore {
    facts: RwLock<HashMap<(String, String), Vec<VersionFact>>>,
}

impl VersionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version fact, overwriting any existing fact with the same
    /// path for the same (namespace, app). Last write wins.
    pub fn set(&self, namespace: &str, app: &str, path: &str, version: &str) {
        let mut facts = self.facts.write().expect("version store lock poisoned");
        let entry = facts
            .entry((namespace.to_string(), app.to_string()))
            .or_default();
        match entry.iter_mut().find(|f| f.path == path) {
            Some(existing) => existing.version = version.to_string(),
            None => entry.push(VersionFact {
                path: path.to_string(),
                version: version.to_string(),
            }),
        }
    }

    /// Get all facts for one application, as a copy. Returns `None` when no
    /// facts have been recorded.
    pub fn get(&self, namespace: &str, app: &str) -> Option<Vec<VersionFact>> {
        let facts = self.facts.read().expect("version store lock poisoned");
        facts
            .get(&(namespace.to_string(), app.to_string()))
            .cloned()
    }
}

/// Apply version facts to a YAML values document.
///
/// Each fact's version is set at its dot-separated path, creating
/// intermediate mappings as needed. A non-mapping value encountered
/// mid-path is replaced with a fresh mapping: lossy but deterministic,
/// the accepted resolution for path conflicts.
pub fn apply_facts_to_values(yaml: &str, facts: &[VersionFact]) -> Result<String, Error> {
    let mut root: Value = if yaml.trim().is_empty() {
        Value::Mapping(serde_yaml::Mapping::new())
    } else {
        serde_yaml::from_str(yaml).map_err(|e| Error::serialization(e.to_string()))?
    };

    if !root.is_mapping() {
        root = Value::Mapping(serde_yaml::Mapping::new());
    }

    for fact in facts {
        set_path(&mut root, &fact.path, &fact.version);
    }

    serde_yaml::to_string(&root).map_err(|e| Error::serialization(e.to_string()))
}

fn set_path(root: &mut Value, path: &str, version: &str) {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let map = match current {
            Value::Mapping(m) => m,
            other => {
                // Path conflict: replace the scalar with a mapping
                *other = Value::Mapping(serde_yaml::Mapping::new());
                match other {
                    Value::Mapping(m) => m,
                    _ => unreachable!(),
                }
            }
        };
        let key = Value::String(segment.to_string());
        if segments.peek().is_none() {
            map.insert(key, Value::String(version.to_string()));
            return;
        }
        let next = map
            .entry(key)
            .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
        current = next;
    }
}
