//! Filesystem-backed trace storage.

use super::StorageBackend;
use crate::error::{NodetracerError, Result};
use crate::models::TraceGraph;
use crate::serializers::{load_trace_json, save_trace_json};
use std::fs;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// Store that writes one `<trace_id>.json` file per trace
///
/// The directory is created on first save.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves the file for a trace id, rejecting ids that would escape the directory.
    fn path_for(&self, trace_id: &str) -> Result<PathBuf> {
        if trace_id.is_empty()
            || trace_id.contains('/')
            || trace_id.contains('\\')
            || trace_id.contains("..")
        {
            return Err(NodetracerError::StorageError(format!(
                "Trace id {:?} is not a valid file name",
                trace_id
            )));
        }
        Ok(self.root.join(format!("{}.{}", trace_id, EXTENSION)))
    }
}

impl StorageBackend for FileStore {
    fn save(&self, trace: &TraceGraph) -> Result<()> {
        let path = self.path_for(&trace.trace_id)?;
        save_trace_json(trace, path, Some(2))?;
        Ok(())
    }

    fn load(&self, trace_id: &str) -> Result<Option<TraceGraph>> {
        let path = self.path_for(trace_id)?;
        if !path.is_file() {
            return Ok(None);
        }
        load_trace_json(path).map(Some)
    }

    fn list_traces(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Node;
    use tempfile::TempDir;

    #[test]
    fn test_save_creates_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("traces"));
        let trace = TraceGraph::new("persisted");

        store.save(&trace).unwrap();

        let expected = dir.path().join("traces").join(format!("{}.json", trace.trace_id));
        assert!(expected.is_file());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let mut trace = TraceGraph::new("with-node");
        let seq = trace.next_sequence_number();
        trace.add_node(Node::new(seq, "only", "custom"));

        store.save(&trace).unwrap();

        assert_eq!(store.load(&trace.trace_id).unwrap(), Some(trace));
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load("absent").unwrap().is_none());
    }

    #[test]
    fn test_list_traces_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let a = TraceGraph::new("a");
        let b = TraceGraph::new("b");
        store.save(&a).unwrap();
        store.save(&b).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut expected = vec![a.trace_id, b.trace_id];
        expected.sort();
        assert_eq!(store.list_traces().unwrap(), expected);
    }

    #[test]
    fn test_list_traces_without_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("never-created"));
        assert!(store.list_traces().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let err = store.load("../escape").unwrap_err();
        assert!(matches!(err, NodetracerError::StorageError(_)));
    }
}
