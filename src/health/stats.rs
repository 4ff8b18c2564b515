//! Concurrent two-layer stat store

use dashmap::DashMap;
use serde_json::{Map, Value};

/// Transient stats layered over persistent ones.
///
/// Both layers are safe for concurrent reads, inserts and deletes; the last
/// write to a key wins. A transient entry masks the persistent entry with the
/// same key until it is cleared.
#[derive(Debug, Default)]
pub struct StatStore {
    transient: DashMap<String, Value>,
    persistent: DashMap<String, Value>,
}

impl StatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a transient stat
    pub fn add(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.transient.insert(key.into(), value.into());
    }

    /// Set a persistent stat; survives [`StatStore::clear_transient`]
    pub fn persist(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.persistent.insert(key.into(), value.into());
    }

    /// Transient value if present, else the persistent one
    pub fn get(&self, key: &str) -> Option<Value> {
        self.transient
            .get(key)
            .or_else(|| self.persistent.get(key))
            .map(|entry| entry.value().clone())
    }

    /// Remove a transient stat, revealing any persistent value underneath
    pub fn clear(&self, key: &str) {
        self.transient.remove(key);
    }

    pub fn clear_transient(&self) {
        self.transient.clear();
    }

    pub fn clear_all(&self) {
        self.transient.clear();
        self.persistent.clear();
    }

    /// Persistent stats overlaid with transient stats
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for entry in self.persistent.iter() {
            merged.insert(entry.key().clone(), entry.value().clone());
        }
        for entry in self.transient.iter() {
            merged.insert(entry.key().clone(), entry.value().clone());
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.transient.is_empty() && self.persistent.is_empty()
    }
}
