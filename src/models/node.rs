//! Node types: one recorded unit of execution within a trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Open key-value payload attached to nodes and edges.
pub type Payload = HashMap<String, serde_json::Value>;

/// Lifecycle state for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Cancelled => "cancelled",
        }
    }

    /// True for the states a node ends in once its span has closed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Cancelled)
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Pending
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended node type vocabulary
///
/// `Node::node_type` is a free-form string; these are the values the
/// inspection tooling knows about. Anything else is still legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    LlmCall,
    ToolCall,
    Decision,
    Retrieval,
    Transformation,
    Validation,
    HumanInput,
    SubAgent,
    HttpRequest,
    Custom,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::LlmCall => "llm_call",
            NodeType::ToolCall => "tool_call",
            NodeType::Decision => "decision",
            NodeType::Retrieval => "retrieval",
            NodeType::Transformation => "transformation",
            NodeType::Validation => "validation",
            NodeType::HumanInput => "human_input",
            NodeType::SubAgent => "sub_agent",
            NodeType::HttpRequest => "http_request",
            NodeType::Custom => "custom",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_string()
    }
}

/// Single unit of execution in a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "NodeRecord", from = "NodeRecord")]
pub struct Node {
    pub id: String,
    /// Allocation order within the owning trace
    pub sequence_number: u64,
    pub name: String,
    pub node_type: String,
    pub status: NodeStatus,
    /// `None` marks a root node
    pub parent_id: Option<String>,
    pub depth: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub input_data: Payload,
    pub output_data: Payload,
    pub annotations: Vec<String>,
    pub metadata: Payload,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub error_traceback: Option<String>,
}

impl Node {
    /// Create a pending root node with a fresh id
    pub fn new(sequence_number: u64, name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            sequence_number,
            name: name.into(),
            node_type: node_type.into(),
            status: NodeStatus::Pending,
            parent_id: None,
            depth: 0,
            start_time: None,
            end_time: None,
            input_data: HashMap::new(),
            output_data: HashMap::new(),
            annotations: Vec::new(),
            metadata: HashMap::new(),
            error: None,
            error_type: None,
            error_traceback: None,
        }
    }

    /// Attach this node under `parent`, keeping `depth == parent.depth + 1`
    pub fn with_parent(mut self, parent_id: impl Into<String>, parent_depth: u32) -> Self {
        self.parent_id = Some(parent_id.into());
        self.depth = parent_depth + 1;
        self
    }

    /// Duration in milliseconds when both timestamps are available
    pub fn duration_ms(&self) -> Option<f64> {
        duration_between(self.start_time, self.end_time)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Generate an opaque 32-character hex identifier
pub(crate) fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub(crate) fn duration_between(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<f64> {
    let (start, end) = (start?, end?);
    let delta = end - start;
    match delta.num_nanoseconds() {
        Some(nanos) => Some(nanos as f64 / 1_000_000.0),
        None => Some(delta.num_milliseconds() as f64),
    }
}

/// Wire form of [`Node`], carrying the derived `duration_ms`
#[derive(Serialize, Deserialize)]
struct NodeRecord {
    id: String,
    sequence_number: u64,
    name: String,
    node_type: String,
    #[serde(default)]
    status: NodeStatus,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    depth: u32,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    input_data: Payload,
    #[serde(default)]
    output_data: Payload,
    #[serde(default)]
    annotations: Vec<String>,
    #[serde(default)]
    metadata: Payload,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error_traceback: Option<String>,
    // Recomputed from the timestamps on decode.
    #[serde(default)]
    duration_ms: Option<f64>,
}

impl From<Node> for NodeRecord {
    fn from(node: Node) -> Self {
        let duration_ms = node.duration_ms();
        Self {
            id: node.id,
            sequence_number: node.sequence_number,
            name: node.name,
            node_type: node.node_type,
            status: node.status,
            parent_id: node.parent_id,
            depth: node.depth,
            start_time: node.start_time,
            end_time: node.end_time,
            input_data: node.input_data,
            output_data: node.output_data,
            annotations: node.annotations,
            metadata: node.metadata,
            error: node.error,
            error_type: node.error_type,
            error_traceback: node.error_traceback,
            duration_ms,
        }
    }
}

impl From<NodeRecord> for Node {
    fn from(record: NodeRecord) -> Self {
        Self {
            id: record.id,
            sequence_number: record.sequence_number,
            name: record.name,
            node_type: record.node_type,
            status: record.status,
            parent_id: record.parent_id,
            depth: record.depth,
            start_time: record.start_time,
            end_time: record.end_time,
            input_data: record.input_data,
            output_data: record.output_data,
            annotations: record.annotations,
            metadata: record.metadata,
            error: record.error,
            error_type: record.error_type,
            error_traceback: record.error_traceback,
        }
    }
}
