//! In-memory trace storage.

use super::StorageBackend;
use crate::error::Result;
use crate::models::TraceGraph;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Entries {
    traces: HashMap<String, TraceGraph>,
    order: Vec<String>,
}

/// Store that keeps traces for the lifetime of the process
///
/// Traces are listed in the order they were first saved.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored traces
    pub fn len(&self) -> usize {
        self.entries.read().traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().traces.is_empty()
    }

    /// Remove all stored traces
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.traces.clear();
        entries.order.clear();
    }
}

impl StorageBackend for MemoryStore {
    fn save(&self, trace: &TraceGraph) -> Result<()> {
        let mut entries = self.entries.write();
        if !entries.traces.contains_key(&trace.trace_id) {
            entries.order.push(trace.trace_id.clone());
        }
        entries.traces.insert(trace.trace_id.clone(), trace.clone());
        Ok(())
    }

    fn load(&self, trace_id: &str) -> Result<Option<TraceGraph>> {
        Ok(self.entries.read().traces.get(trace_id).cloned())
    }

    fn list_traces(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let trace = TraceGraph::new("one");

        store.save(&trace).unwrap();

        assert_eq!(store.load(&trace.trace_id).unwrap(), Some(trace));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let store = MemoryStore::new();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_by_trace_id() {
        let store = MemoryStore::new();
        let mut trace = TraceGraph::new("first");
        store.save(&trace).unwrap();

        trace.name = "renamed".to_string();
        store.save(&trace).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.list_traces().unwrap(), vec![trace.trace_id.clone()]);
        assert_eq!(store.load(&trace.trace_id).unwrap().unwrap().name, "renamed");
    }

    #[test]
    fn test_list_in_first_save_order() {
        let store = MemoryStore::new();
        let a = TraceGraph::new("a");
        let b = TraceGraph::new("b");
        store.save(&a).unwrap();
        store.save(&b).unwrap();
        store.save(&a).unwrap();

        assert_eq!(store.list_traces().unwrap(), vec![a.trace_id, b.trace_id]);
    }

    #[test]
    fn test_clear() {
        let store = MemoryStore::new();
        store.save(&TraceGraph::new("x")).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(store.list_traces().unwrap().is_empty());
    }
}
