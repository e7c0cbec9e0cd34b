//! Typed relations between nodes, orthogonal to the parent/child tree.

use super::node::Payload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Relationship semantics between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    CausedBy,
    DataFlow,
    BranchedFrom,
    RetryOf,
    FallbackOf,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::CausedBy => "caused_by",
            EdgeType::DataFlow => "data_flow",
            EdgeType::BranchedFrom => "branched_from",
            EdgeType::RetryOf => "retry_of",
            EdgeType::FallbackOf => "fallback_of",
        }
    }
}

impl Default for EdgeType {
    fn default() -> Self {
        EdgeType::CausedBy
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional relationship between two nodes of the same trace
///
/// Edges are immutable once added to a trace; both endpoints must already
/// exist in the trace's node map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub edge_type: EdgeType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub metadata: Payload,
}

impl Edge {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            label: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
