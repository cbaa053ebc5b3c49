//! Named reactive values shared between backend and frontend.
//!
//! Each atom tracks its current value, the last backend-confirmed
//! value, and the node ids that depend on it. A local write is
//! optimistic; a later backend sync is authoritative and is the only
//! thing that moves `last_backend`.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct AtomEntry {
    current: Value,
    last_backend: Value,
    dependents: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct AtomStore {
    atoms: HashMap<String, AtomEntry>,
}

impl AtomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of an atom, creating an empty entry lazily.
    pub fn read(&mut self, name: &str) -> Value {
        self.entry(name).current.clone()
    }

    /// Last backend-confirmed value (null until the first sync).
    pub fn last_backend(&self, name: &str) -> Value {
        self.atoms
            .get(name)
            .map(|entry| entry.last_backend.clone())
            .unwrap_or(Value::Null)
    }

    /// Set an atom's value, returning the dependent node ids whose
    /// version counters the caller must bump. The counters are bumped
    /// even when the value is unchanged: callers already decided the
    /// write was necessary.
    pub fn write(&mut self, name: &str, value: Value, from_backend: bool) -> Vec<String> {
        let entry = self.entry(name);
        entry.current = value.clone();
        if from_backend {
            entry.last_backend = value;
        }
        entry.dependents.iter().cloned().collect()
    }

    /// Register nodes entering the tree as dependents of the named
    /// atoms.
    pub fn bind_dependency(&mut self, node_id: &str, names: &[String]) {
        for name in names {
            self.entry(name).dependents.insert(node_id.to_string());
        }
    }

    /// Remove a node leaving the tree from the named atoms' dependent
    /// sets.
    pub fn unbind_dependency(&mut self, node_id: &str, names: &[String]) {
        for name in names {
            if let Some(entry) = self.atoms.get_mut(name) {
                entry.dependents.remove(node_id);
            }
        }
    }

    /// Drop all atoms. Used on session reset.
    pub fn clear(&mut self) {
        self.atoms.clear();
    }

    fn entry(&mut self, name: &str) -> &mut AtomEntry {
        self.atoms.entry(name.to_string()).or_default()
    }
}
