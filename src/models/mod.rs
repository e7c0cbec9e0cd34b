//! Data models for trace capture
//!
//! A trace is a [`TraceGraph`]: a map of [`Node`]s, each one unit of work,
//! plus an ordered list of typed [`Edge`]s between them. The parent/child
//! tree lives on the nodes themselves (`parent_id` and `depth`); edges carry
//! the relations that do not fit that tree, such as retries, fallbacks and
//! data flow.

pub mod edge;
pub mod node;
pub mod trace_graph;

pub use edge::{Edge, EdgeType};
pub use node::{Node, NodeStatus, NodeType, Payload};
pub use trace_graph::{TraceGraph, SCHEMA_VERSION};
