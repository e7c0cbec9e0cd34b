//! Shared handles onto a live trace and its nodes.
//!
//! A [`TraceHandle`] is the form in which a [`TraceGraph`] is shared between
//! spans, context slots and concurrent execution units. All structural
//! mutation goes through its lock, so sequence allocation and node insertion
//! are serialized per trace. Two handles onto different traces share nothing.

use super::tracer_config::TracerConfig;
use crate::error::Result;
use crate::models::{Edge, Node, NodeStatus, TraceGraph};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct TraceInner {
    trace_id: String,
    graph: Mutex<TraceGraph>,
    config: TracerConfig,
    closed: AtomicBool,
}

/// Cloneable, thread-safe reference to one open trace
#[derive(Clone)]
pub struct TraceHandle {
    inner: Arc<TraceInner>,
}

impl TraceHandle {
    pub fn new(graph: TraceGraph, config: TracerConfig) -> Self {
        Self {
            inner: Arc::new(TraceInner {
                trace_id: graph.trace_id.clone(),
                graph: Mutex::new(graph),
                config,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    pub fn config(&self) -> &TracerConfig {
        &self.inner.config
    }

    /// Copy of the graph as it stands right now
    pub fn snapshot(&self) -> TraceGraph {
        self.inner.graph.lock().clone()
    }

    /// Run `f` against the graph under the trace lock
    pub fn with_graph<R>(&self, f: impl FnOnce(&TraceGraph) -> R) -> R {
        f(&self.inner.graph.lock())
    }

    pub(crate) fn with_graph_mut<R>(&self, f: impl FnOnce(&mut TraceGraph) -> R) -> R {
        if self.is_closed() {
            warn!(trace_id = self.trace_id(), "Mutating a trace that has already been closed");
        }
        f(&mut self.inner.graph.lock())
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.with_graph(|graph| graph.node(id).cloned())
    }

    pub fn node_count(&self) -> usize {
        self.with_graph(|graph| graph.nodes.len())
    }

    /// Add an edge; both endpoints must already be in this trace
    pub fn add_edge(&self, edge: Edge) -> Result<()> {
        self.with_graph_mut(|graph| graph.add_edge(edge))
    }

    /// Set a trace-level metadata entry, subject to the trace's redaction policy
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Serialize) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                let value = self.config().capture_metadata(&key, value);
                self.with_graph_mut(|graph| {
                    graph.metadata.insert(key, value);
                });
            }
            Err(e) => warn!(key = key.as_str(), error = %e, "Failed to record trace metadata"),
        }
    }

    pub fn next_sequence_number(&self) -> u64 {
        self.with_graph_mut(|graph| graph.next_sequence_number())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stamp the end time, mark the trace closed and return its final snapshot
    pub(crate) fn close(&self) -> TraceGraph {
        let mut graph = self.inner.graph.lock();
        graph.end_time = Some(Utc::now());
        self.inner.closed.store(true, Ordering::SeqCst);
        graph.clone()
    }

    /// True if both handles point at the same trace
    pub fn ptr_eq(&self, other: &TraceHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Allocate a sequence number and insert a pending node in one step
    pub(crate) fn create_node(
        &self,
        name: String,
        node_type: String,
        parent: Option<&NodeHandle>,
    ) -> NodeHandle {
        let (id, depth) = self.with_graph_mut(|graph| {
            let sequence_number = graph.next_sequence_number();
            let mut node = Node::new(sequence_number, name, node_type);
            if let Some(parent) = parent {
                node = node.with_parent(parent.id(), parent.depth());
            }
            debug!(
                trace_id = graph.trace_id.as_str(),
                node_id = node.id.as_str(),
                node_name = node.name.as_str(),
                sequence_number,
                depth = node.depth,
                "Node created"
            );
            let created = (node.id.clone(), node.depth);
            graph.add_node(node);
            created
        });
        NodeHandle {
            trace: self.clone(),
            id,
            depth,
        }
    }
}

impl fmt::Debug for TraceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceHandle")
            .field("trace_id", &self.inner.trace_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Error details recorded onto a failed node
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub message: String,
    pub error_type: String,
    pub traceback: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.into(),
            traceback: None,
        }
    }

    /// Capture an error's display text, type name and debug rendering
    pub fn from_error<E>(err: &E) -> Self
    where
        E: fmt::Display + fmt::Debug + ?Sized,
    {
        Self {
            message: err.to_string(),
            error_type: std::any::type_name::<E>().to_string(),
            traceback: Some(format!("{:?}", err)),
        }
    }

    pub(crate) fn panic() -> Self {
        Self::new("thread panicked while the span was active", "panic")
    }
}

/// How a span's scope ended
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Completed,
    Failed(ErrorInfo),
    Cancelled,
}

impl Outcome {
    pub(crate) fn from_result<T, E>(result: &std::result::Result<T, E>) -> Self
    where
        E: fmt::Display + fmt::Debug,
    {
        match result {
            Ok(_) => Outcome::Completed,
            Err(e) => Outcome::Failed(ErrorInfo::from_error(e)),
        }
    }

    /// Outcome for a scope left without an explicit exit
    pub(crate) fn on_drop(cancelled: bool) -> Self {
        if std::thread::panicking() {
            Outcome::Failed(ErrorInfo::panic())
        } else if cancelled {
            Outcome::Cancelled
        } else {
            Outcome::Completed
        }
    }
}

/// Cloneable reference to one node of one trace
///
/// This is the recording surface handed to traced code. Recording never
/// fails: problems are logged and skipped so they cannot disturb the work
/// being traced.
#[derive(Clone)]
pub struct NodeHandle {
    trace: TraceHandle,
    id: String,
    depth: u32,
}

impl NodeHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn trace(&self) -> &TraceHandle {
        &self.trace
    }

    /// Copy of the node as it stands right now
    pub fn snapshot(&self) -> Option<Node> {
        self.trace.node(&self.id)
    }

    pub fn status(&self) -> Option<NodeStatus> {
        self.trace.with_graph(|graph| graph.node(&self.id).map(|node| node.status))
    }

    /// Merge fields into the node's `input_data`
    pub fn input<I, K, V>(&self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let fields = to_payload(fields);
        if let Some(fields) = self.trace.config().capture_input(fields) {
            self.update(|node| node.input_data.extend(fields));
        }
    }

    /// Merge fields into the node's `output_data`
    pub fn output<I, K, V>(&self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let fields = to_payload(fields);
        if let Some(fields) = self.trace.config().capture_output(fields) {
            self.update(|node| node.output_data.extend(fields));
        }
    }

    /// Append a free-text note
    pub fn annotate(&self, note: impl Into<String>) {
        let note = note.into();
        self.update(|node| node.annotations.push(note));
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Serialize) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                let value = self.trace.config().capture_metadata(&key, value);
                self.update(|node| {
                    node.metadata.insert(key, value);
                });
            }
            Err(e) => warn!(key = key.as_str(), error = %e, "Failed to record node metadata"),
        }
    }

    /// Explicitly override the node's status
    ///
    /// A `cancelled` or `failed` override survives a normal span exit.
    pub fn set_status(&self, status: NodeStatus) {
        self.update(|node| node.status = status);
    }

    pub(crate) fn mark_running(&self) {
        self.update(|node| {
            node.status = NodeStatus::Running;
            node.start_time = Some(Utc::now());
        });
    }

    pub(crate) fn finalize(&self, outcome: Outcome) {
        let config = self.trace.config();
        self.update(|node| {
            node.end_time = Some(Utc::now());
            match outcome {
                Outcome::Failed(info) => {
                    node.status = NodeStatus::Failed;
                    node.error = Some(info.message);
                    node.error_type = Some(info.error_type);
                    node.error_traceback = info.traceback.and_then(|tb| config.capture_traceback(tb));
                }
                Outcome::Cancelled if !node.status.is_terminal() => {
                    node.status = NodeStatus::Cancelled;
                }
                Outcome::Completed if !node.status.is_terminal() => {
                    node.status = NodeStatus::Completed;
                }
                _ => {}
            }
            debug!(
                node_id = node.id.as_str(),
                node_name = node.name.as_str(),
                status = node.status.as_str(),
                "Node closed"
            );
        });
    }

    fn update(&self, f: impl FnOnce(&mut Node)) {
        let found = self.trace.with_graph_mut(|graph| match graph.node_mut(&self.id) {
            Some(node) => {
                f(node);
                true
            }
            None => false,
        });
        if !found {
            warn!(
                trace_id = self.trace.trace_id(),
                node_id = self.id.as_str(),
                "Node missing from its trace; recording skipped"
            );
        }
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("trace_id", &self.trace.trace_id())
            .field("id", &self.id)
            .field("depth", &self.depth)
            .finish()
    }
}

fn to_payload<I, K, V>(fields: I) -> crate::models::Payload
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Serialize,
{
    let mut payload = crate::models::Payload::new();
    for (key, value) in fields {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                payload.insert(key, value);
            }
            Err(e) => warn!(key = key.as_str(), error = %e, "Failed to serialize span field"),
        }
    }
    payload
}
