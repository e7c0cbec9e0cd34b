//! # nodetracer
//!
//! Causal execution tracing for nested and concurrent call chains.
//!
//! Work is recorded as a [`TraceGraph`](models::TraceGraph): a set of nodes,
//! each one unit of work with a lifecycle status, timing and captured
//! payloads, linked by parent/child structure and typed edges. The current
//! trace and node follow the logical flow of execution, so nested calls
//! parent themselves without any handle being passed around.
//!
//! ```no_run
//! use nodetracer::prelude::*;
//!
//! let tracer = Tracer::default();
//! let result: std::result::Result<(), String> = tracer.trace("pipeline", |cx| {
//!     cx.span("fetch", NodeType::ToolCall).run(|node| {
//!         node.input([("query", "rust")]);
//!         Ok(())
//!     })
//! });
//! ```

pub mod cli;
pub mod config;
pub mod console;
pub mod core;
pub mod error;
pub mod instrumentation;
pub mod models;
pub mod serializers;
pub mod storage;

pub use crate::core::{
    clear_context, get_current_node, get_current_trace, propagate_context, trace_node, trace_node_async,
    Context, EnteredSpan, ErrorInfo, NodeHandle, Span, TraceContext, TraceContextExt, TraceHandle,
    TraceScope, Tracer, TracerConfig,
};
pub use error::{NodetracerError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{configure, get_settings, CaptureLevel, Settings};
    pub use crate::core::{
        get_current_node, get_current_trace, propagate_context, trace_node, trace_node_async, NodeHandle,
        Span, TraceContext, TraceContextExt, TraceHandle, Tracer, TracerConfig,
    };
    pub use crate::error::{NodetracerError, Result};
    pub use crate::models::{Edge, EdgeType, Node, NodeStatus, NodeType, TraceGraph};
    pub use crate::storage::{FileStore, MemoryStore, StorageBackend};
}
