//! The aggregate root of a recorded execution.

use super::edge::Edge;
use super::node::{duration_between, new_id, Node, NodeStatus, Payload};
use crate::error::{NodetracerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Version tag written into every serialized trace.
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Root trace structure containing nodes and edges
///
/// Decoding a `TraceGraph` always re-runs [`TraceGraph::validate`], so a
/// graph obtained through serde is structurally sound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TraceGraphRecord", into = "TraceGraphRecord")]
pub struct TraceGraph {
    pub schema_version: String,
    pub trace_id: String,
    pub name: String,
    pub nodes: BTreeMap<String, Node>,
    pub edges: Vec<Edge>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub metadata: Payload,
    sequence_counter: u64,
}

impl TraceGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            trace_id: new_id(),
            name: name.into(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            start_time: None,
            end_time: None,
            metadata: HashMap::new(),
            sequence_counter: 0,
        }
    }

    /// Trace duration in milliseconds
    pub fn duration_ms(&self) -> Option<f64> {
        duration_between(self.start_time, self.end_time)
    }

    /// Allocate the next sequence number for this trace
    ///
    /// Callers sharing a trace across execution units go through
    /// [`crate::TraceHandle`], which serializes this call with node insertion.
    pub fn next_sequence_number(&mut self) -> u64 {
        let value = self.sequence_counter;
        self.sequence_counter += 1;
        value
    }

    /// Insert a node by id (last write wins)
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge after checking that both endpoints exist
    ///
    /// On failure the graph is left unchanged.
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        self.check_edge(&edge)?;
        self.edges.push(edge);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Nodes that do not have a parent, in sequence order
    pub fn root_nodes(&self) -> Vec<&Node> {
        self.collect_sorted(|node| node.parent_id.is_none())
    }

    /// Nodes that ended in failed status, in sequence order
    pub fn failed_nodes(&self) -> Vec<&Node> {
        self.collect_sorted(|node| node.status == NodeStatus::Failed)
    }

    /// Direct children of `parent_id`, in sequence order
    pub fn children_of(&self, parent_id: &str) -> Vec<&Node> {
        self.collect_sorted(|node| node.parent_id.as_deref() == Some(parent_id))
    }

    /// All nodes in allocation order
    pub fn nodes_by_sequence(&self) -> Vec<&Node> {
        self.collect_sorted(|_| true)
    }

    /// Check structural integrity after a bulk load
    pub fn validate(&self) -> Result<()> {
        for (key, node) in &self.nodes {
            if key != &node.id {
                return Err(NodetracerError::NodeIdMismatch {
                    key: key.clone(),
                    id: node.id.clone(),
                });
            }
        }
        for edge in &self.edges {
            self.check_edge(edge)?;
        }
        Ok(())
    }

    fn check_edge(&self, edge: &Edge) -> Result<()> {
        if !self.nodes.contains_key(&edge.source_id) {
            return Err(NodetracerError::UnknownEdgeSource(edge.source_id.clone()));
        }
        if !self.nodes.contains_key(&edge.target_id) {
            return Err(NodetracerError::UnknownEdgeTarget(edge.target_id.clone()));
        }
        Ok(())
    }

    fn collect_sorted<P>(&self, predicate: P) -> Vec<&Node>
    where
        P: Fn(&Node) -> bool,
    {
        let mut nodes: Vec<&Node> = self.nodes.values().filter(|node| predicate(node)).collect();
        nodes.sort_by_key(|node| node.sequence_number);
        nodes
    }
}

impl Default for TraceGraph {
    fn default() -> Self {
        Self::new("")
    }
}

// The sequence counter is process-local allocation state, not schema.
impl PartialEq for TraceGraph {
    fn eq(&self, other: &Self) -> bool {
        self.schema_version == other.schema_version
            && self.trace_id == other.trace_id
            && self.name == other.name
            && self.nodes == other.nodes
            && self.edges == other.edges
            && self.start_time == other.start_time
            && self.end_time == other.end_time
            && self.metadata == other.metadata
    }
}

/// Wire form of [`TraceGraph`]
#[derive(Serialize, Deserialize)]
struct TraceGraphRecord {
    #[serde(default = "default_schema_version")]
    schema_version: String,
    trace_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    nodes: BTreeMap<String, Node>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Payload,
    #[serde(default)]
    duration_ms: Option<f64>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl From<TraceGraph> for TraceGraphRecord {
    fn from(trace: TraceGraph) -> Self {
        let duration_ms = trace.duration_ms();
        Self {
            schema_version: trace.schema_version,
            trace_id: trace.trace_id,
            name: trace.name,
            nodes: trace.nodes,
            edges: trace.edges,
            start_time: trace.start_time,
            end_time: trace.end_time,
            metadata: trace.metadata,
            duration_ms,
        }
    }
}

impl TryFrom<TraceGraphRecord> for TraceGraph {
    type Error = NodetracerError;

    fn try_from(record: TraceGraphRecord) -> Result<Self> {
        // Resume allocation past every number already handed out.
        let mut sequence_counter = 0;
        for node in record.nodes.values() {
            let next = node
                .sequence_number
                .checked_add(1)
                .ok_or_else(|| NodetracerError::SequenceOverflow(node.id.clone()))?;
            sequence_counter = sequence_counter.max(next);
        }

        let trace = Self {
            schema_version: record.schema_version,
            trace_id: record.trace_id,
            name: record.name,
            nodes: record.nodes,
            edges: record.edges,
            start_time: record.start_time,
            end_time: record.end_time,
            metadata: record.metadata,
            sequence_counter,
        };
        trace.validate()?;
        Ok(trace)
    }
}
